use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
};
use tracing::{error, info};

use crate::{api::ApiError, routes::AppState};

const TOKEN_SCHEME: &str = "Token";

/// The caller identified by an `Authorization: Token <key>` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
}

/// Extracts the token key, or [`None`] if the header is absent or uses another scheme.
#[must_use]
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, key) = value.trim().split_once(' ')?;
    let key = key.trim();
    (scheme.eq_ignore_ascii_case(TOKEN_SCHEME) && !key.is_empty()).then_some(key)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || {
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                "Authentication credentials were not provided",
            )
        };

        let key = token_from_headers(&parts.headers).ok_or_else(unauthorized)?;
        match state.users.find_by_token(key).await {
            Ok(Some(user)) => Ok(Self {
                id: user.id,
                username: user.username,
            }),
            Ok(None) => {
                let rejection = unauthorized();
                info!(error_id = %rejection.error_id, "Rejected unknown token");
                Err(rejection)
            }
            Err(err) => {
                let rejection = ApiError::internal();
                error!(error_id = %rejection.error_id, ?err, "Failed to look up token");
                Err(rejection)
            }
        }
    }
}
