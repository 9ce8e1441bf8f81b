use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect},
    routing,
};
use rearch::CapsuleHandle;
use tracing::{error, info, instrument};

use crate::{
    api::{ApiError, ShortLinkResponse},
    auth::CurrentUser,
    cart_service::{CartError, DownloadError, ShoppingCartService, shopping_cart_service_capsule},
    recipe_repo::RecipeSummary,
    shopping_list::DOWNLOAD_FILENAME,
    short_link_service::{
        self, GetLinkError, ResolveError, ShortLinkService, short_link_service_capsule,
    },
    user_repo::{UserRepository, user_repository_capsule},
};

/// Services the request handlers dispatch to.
#[derive(Clone)]
pub struct AppState {
    pub short_links: Arc<dyn ShortLinkService>,
    pub cart: Arc<dyn ShoppingCartService>,
    pub users: Arc<dyn UserRepository>,
}

pub fn app_state_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> AppState {
    AppState {
        short_links: Arc::clone(get.as_ref(short_link_service_capsule)),
        cart: Arc::clone(get.as_ref(shopping_cart_service_capsule)),
        users: Arc::clone(get.as_ref(user_repository_capsule)),
    }
}

/// One route per action; each handler picks its own request and response shapes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/recipes/{id}/get-link", routing::get(get_link))
        .route(
            "/api/recipes/{id}/shopping_cart",
            routing::post(add_to_cart).delete(remove_from_cart),
        )
        .route(
            "/api/recipes/download_shopping_cart",
            routing::get(download_shopping_cart),
        )
        .route("/s/{code}", routing::get(resolve_short_link))
        .route("/s/{code}/", routing::get(resolve_short_link))
        .with_state(state)
}

fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not found")
}

/// Recipe ids that aren't integers name no recipe.
fn recipe_id(raw: &str) -> Result<i32, ApiError> {
    raw.parse().map_err(|_| not_found())
}

#[instrument(skip(state))]
async fn get_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ShortLinkResponse>, ApiError> {
    let id = recipe_id(&id)?;
    state
        .short_links
        .get_link(id)
        .await
        .map(|short_link_service::ShareLink { url, .. }| {
            Json(ShortLinkResponse {
                short_link: url.into(),
            })
        })
        .map_err(|error: GetLinkError| match error {
            GetLinkError::RecipeNotFound => not_found(),
            GetLinkError::Internal(_) => {
                let api_error = ApiError::internal();
                error!(err_uuid = %api_error.error_id, ?error, "Encountered an error during a request");
                api_error
            }
        })
}

#[instrument(skip(state))]
async fn resolve_short_link(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    state
        .short_links
        .resolve(&code)
        .await
        .map(|short_link_service::Redirect { path }| Redirect::temporary(&path))
        .map_err(|error: ResolveError| match error {
            ResolveError::NotFound => not_found(),
            ResolveError::Internal(_) => {
                let api_error = ApiError::internal();
                error!(err_uuid = %api_error.error_id, ?error, "Encountered database error");
                api_error
            }
        })
}

fn cart_error_response(error: CartError) -> ApiError {
    match error {
        CartError::RecipeNotFound => not_found(),
        CartError::AlreadyInCart | CartError::NotInCart => {
            let api_error = ApiError::new(StatusCode::BAD_REQUEST, error.to_string());
            info!(err_uuid = %api_error.error_id, ?error, "User submitted a bad request");
            api_error
        }
        CartError::Internal(_) => {
            let api_error = ApiError::internal();
            error!(err_uuid = %api_error.error_id, ?error, "Encountered an error during a request");
            api_error
        }
    }
}

#[instrument(skip(state))]
async fn add_to_cart(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RecipeSummary>), ApiError> {
    let id = recipe_id(&id)?;
    state
        .cart
        .add_recipe(user.id, id)
        .await
        .map(|summary| (StatusCode::CREATED, Json(summary)))
        .map_err(cart_error_response)
}

#[instrument(skip(state))]
async fn remove_from_cart(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = recipe_id(&id)?;
    state
        .cart
        .remove_recipe(user.id, id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(cart_error_response)
}

#[instrument(skip(state))]
async fn download_shopping_cart(
    State(state): State<AppState>,
    user: CurrentUser,
) -> impl IntoResponse {
    state
        .cart
        .download_shopping_list(&user)
        .await
        .map(|document| {
            (
                [
                    (header::CONTENT_TYPE, "application/pdf".to_owned()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{DOWNLOAD_FILENAME}\""),
                    ),
                ],
                document,
            )
        })
        .map_err(|error: DownloadError| {
            let api_error = ApiError::internal();
            error!(err_uuid = %api_error.error_id, ?error, "Failed to build shopping list");
            api_error
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use anyhow::anyhow;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Method, Request, Response, header::AUTHORIZATION},
    };
    use mockall::{mock, predicate::*};
    use tower::ServiceExt;
    use url::Url;

    use crate::{
        aggregate::AggregateRow,
        orm::user,
        short_link_repo::ShortCode,
        short_link_service::{Redirect, ShareLink},
    };

    use super::*;

    mock! {
        ShortLinkService {}

        #[async_trait]
        impl ShortLinkService for ShortLinkService {
            async fn get_link(&self, recipe_id: i32) -> Result<ShareLink, GetLinkError>;
            async fn resolve(&self, code: &str) -> Result<Redirect, ResolveError>;
        }
    }

    mock! {
        ShoppingCartService {}

        #[async_trait]
        impl ShoppingCartService for ShoppingCartService {
            async fn aggregate(&self, user_id: i32) -> anyhow::Result<Vec<AggregateRow>>;
            async fn add_recipe(&self, user_id: i32, recipe_id: i32)
            -> Result<RecipeSummary, CartError>;
            async fn remove_recipe(&self, user_id: i32, recipe_id: i32) -> Result<(), CartError>;
            async fn download_shopping_list(&self, user: &CurrentUser)
            -> Result<Vec<u8>, DownloadError>;
        }
    }

    mock! {
        UserRepository {}

        #[async_trait]
        impl UserRepository for UserRepository {
            async fn find_by_token(&self, key: &str) -> anyhow::Result<Option<user::Model>>;
        }
    }

    const TOKEN: &str = "Token valid";

    fn chef() -> user::Model {
        user::Model {
            id: 5,
            username: "chef".to_owned(),
            email: "chef@example.com".to_owned(),
        }
    }

    fn users() -> MockUserRepository {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_token()
            .returning(|key| Ok((key == "valid").then(chef)));
        users
    }

    fn app(
        short_links: MockShortLinkService,
        cart: MockShoppingCartService,
        users: MockUserRepository,
    ) -> Router {
        router(AppState {
            short_links: Arc::new(short_links),
            cart: Arc::new(cart),
            users: Arc::new(users),
        })
    }

    fn request(method: Method, uri: &str, authorization: Option<&str>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        let builder = match authorization {
            Some(value) => builder.header(AUTHORIZATION, value),
            None => builder,
        };
        builder.body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_get_link() {
        let mut short_links = MockShortLinkService::new();
        short_links
            .expect_get_link()
            .with(eq(42))
            .once()
            .return_once(|_| {
                Ok(ShareLink {
                    code: ShortCode::new("AB12".to_owned()).unwrap(),
                    url: Url::parse("https://foodgram.example/s/AB12/").unwrap(),
                })
            });
        let app = app(short_links, MockShoppingCartService::new(), users());

        let response = app
            .oneshot(request(Method::GET, "/api/recipes/42/get-link", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            r#"{"short-link":"https://foodgram.example/s/AB12/"}"#
        );
    }

    #[tokio::test]
    async fn test_get_link_unknown_recipe() {
        let mut short_links = MockShortLinkService::new();
        short_links
            .expect_get_link()
            .with(eq(404))
            .once()
            .return_once(|_| Err(GetLinkError::RecipeNotFound));
        let app = app(short_links, MockShoppingCartService::new(), users());

        let response = app
            .oneshot(request(Method::GET, "/api/recipes/404/get-link", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_link_non_numeric_id_is_not_found() {
        let mut short_links = MockShortLinkService::new();
        short_links.expect_get_link().never();
        let app = app(short_links, MockShoppingCartService::new(), users());

        let response = app
            .oneshot(request(Method::GET, "/api/recipes/pancakes/get-link", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_string(response).await;
        assert!(body.contains(r#""error":"Not found""#));
        assert!(body.contains(r#""error_id":"#));
    }

    #[tokio::test]
    async fn test_get_link_internal_error() {
        let mut short_links = MockShortLinkService::new();
        short_links
            .expect_get_link()
            .once()
            .return_once(|_| Err(GetLinkError::Internal(anyhow!("connection reset"))));
        let app = app(short_links, MockShoppingCartService::new(), users());

        let response = app
            .oneshot(request(Method::GET, "/api/recipes/42/get-link", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body_string(response).await.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_resolve_redirects_with_and_without_trailing_slash() {
        for uri in ["/s/AB12/", "/s/AB12"] {
            let mut short_links = MockShortLinkService::new();
            short_links
                .expect_resolve()
                .with(eq("AB12"))
                .once()
                .return_once(|_| {
                    Ok(Redirect {
                        path: "/recipes/42".to_owned(),
                    })
                });
            let app = app(short_links, MockShoppingCartService::new(), users());

            let response = app.oneshot(request(Method::GET, uri, None)).await.unwrap();

            assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
            assert_eq!(response.headers()[header::LOCATION], "/recipes/42");
        }
    }

    #[tokio::test]
    async fn test_resolve_unknown_code_is_not_found() {
        let mut short_links = MockShortLinkService::new();
        short_links
            .expect_resolve()
            .once()
            .return_once(|_| Err(ResolveError::NotFound));
        let app = app(short_links, MockShoppingCartService::new(), users());

        let response = app
            .oneshot(request(Method::GET, "/s/ZZ99/", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::LOCATION).is_none());
    }

    #[tokio::test]
    async fn test_download_requires_token() {
        for authorization in [None, Some("Token unknown"), Some("Bearer valid")] {
            let mut cart = MockShoppingCartService::new();
            cart.expect_download_shopping_list().never();
            let app = app(MockShortLinkService::new(), cart, users());

            let response = app
                .oneshot(request(
                    Method::GET,
                    "/api/recipes/download_shopping_cart",
                    authorization,
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(
                body_string(response)
                    .await
                    .contains("Authentication credentials were not provided")
            );
        }
    }

    #[tokio::test]
    async fn test_download_token_lookup_failure() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_token()
            .once()
            .return_once(|_| Err(anyhow!("connection reset")));
        let app = app(
            MockShortLinkService::new(),
            MockShoppingCartService::new(),
            users,
        );

        let response = app
            .oneshot(request(
                Method::GET,
                "/api/recipes/download_shopping_cart",
                Some(TOKEN),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_download_shopping_cart() {
        let mut cart = MockShoppingCartService::new();
        cart.expect_download_shopping_list()
            .withf(|user| user.id == 5 && user.username == "chef")
            .once()
            .return_once(|_| Ok(b"%PDF-1.3 document".to_vec()));
        let app = app(MockShortLinkService::new(), cart, users());

        let response = app
            .oneshot(request(
                Method::GET,
                "/api/recipes/download_shopping_cart",
                Some(TOKEN),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"shopping_cart.pdf\""
        );
        assert_eq!(body_string(response).await, "%PDF-1.3 document");
    }

    #[tokio::test]
    async fn test_download_render_failure() {
        let mut cart = MockShoppingCartService::new();
        cart.expect_download_shopping_list()
            .once()
            .return_once(|_| Err(DownloadError::Internal(anyhow!("render task failed"))));
        let app = app(MockShortLinkService::new(), cart, users());

        let response = app
            .oneshot(request(
                Method::GET,
                "/api/recipes/download_shopping_cart",
                Some(TOKEN),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
    }

    #[tokio::test]
    async fn test_add_to_cart() {
        let mut cart = MockShoppingCartService::new();
        cart.expect_add_recipe()
            .with(eq(5), eq(42))
            .once()
            .return_once(|_, _| {
                Ok(RecipeSummary {
                    id: 42,
                    name: "Борщ".to_owned(),
                    image: None,
                    cooking_time: 90,
                })
            });
        let app = app(MockShortLinkService::new(), cart, users());

        let response = app
            .oneshot(request(
                Method::POST,
                "/api/recipes/42/shopping_cart",
                Some(TOKEN),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(body_string(response).await.contains(r#""name":"Борщ""#));
    }

    #[tokio::test]
    async fn test_add_to_cart_non_numeric_id_is_not_found() {
        let mut cart = MockShoppingCartService::new();
        cart.expect_add_recipe().never();
        let app = app(MockShortLinkService::new(), cart, users());

        let response = app
            .oneshot(request(
                Method::POST,
                "/api/recipes/borscht/shopping_cart",
                Some(TOKEN),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_remove_from_cart() {
        let mut cart = MockShoppingCartService::new();
        cart.expect_remove_recipe()
            .with(eq(5), eq(42))
            .once()
            .return_once(|_, _| Ok(()));
        let app = app(MockShortLinkService::new(), cart, users());

        let response = app
            .oneshot(request(
                Method::DELETE,
                "/api/recipes/42/shopping_cart",
                Some(TOKEN),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_cart_errors_map_to_statuses() {
        let cases = [
            (CartError::RecipeNotFound, StatusCode::NOT_FOUND),
            (CartError::AlreadyInCart, StatusCode::BAD_REQUEST),
            (CartError::NotInCart, StatusCode::BAD_REQUEST),
            (
                CartError::Internal(anyhow!("connection reset")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(cart_error_response(error).status, status);
        }
    }
}
