use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rearch::CapsuleHandle;
use thiserror::Error;
use tracing::{info, instrument};

use crate::{
    aggregate::{AggregateRow, aggregate},
    auth::CurrentUser,
    cart_repo::{AddToCartError, CartRepository, cart_repository_capsule},
    recipe_repo::{RecipeRepository, RecipeSummary, recipe_repository_capsule},
    shopping_list::{RenderError, ShoppingListRenderer, shopping_list_renderer_capsule},
};

pub fn shopping_cart_service_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn ShoppingCartService> {
    let cart_repo = Arc::clone(get.as_ref(cart_repository_capsule));
    let recipe_repo = Arc::clone(get.as_ref(recipe_repository_capsule));
    let renderer = Arc::clone(get.as_ref(shopping_list_renderer_capsule));
    Arc::new(ShoppingCartServiceImpl {
        cart_repo,
        recipe_repo,
        renderer,
    })
}

#[async_trait]
pub trait ShoppingCartService: Send + Sync {
    /// Ingredient totals over every recipe in the user's cart.
    async fn aggregate(&self, user_id: i32) -> anyhow::Result<Vec<AggregateRow>>;

    async fn add_recipe(&self, user_id: i32, recipe_id: i32) -> Result<RecipeSummary, CartError>;

    async fn remove_recipe(&self, user_id: i32, recipe_id: i32) -> Result<(), CartError>;

    /// The PDF shopping list for the user's current cart.
    async fn download_shopping_list(&self, user: &CurrentUser) -> Result<Vec<u8>, DownloadError>;
}

#[derive(Debug, Error)]
pub enum CartError {
    #[error("recipe not found")]
    RecipeNotFound,
    #[error("recipe is already in the shopping cart")]
    AlreadyInCart,
    #[error("recipe is not in the shopping cart")]
    NotInCart,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to render shopping list: {0}")]
    Render(#[from] RenderError),
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

struct ShoppingCartServiceImpl {
    cart_repo: Arc<dyn CartRepository>,
    recipe_repo: Arc<dyn RecipeRepository>,
    renderer: Arc<dyn ShoppingListRenderer>,
}

impl ShoppingCartServiceImpl {
    async fn recipe_summary(&self, recipe_id: i32) -> Result<RecipeSummary, CartError> {
        self.recipe_repo
            .find_summary(recipe_id)
            .await
            .map_err(CartError::Internal)?
            .ok_or(CartError::RecipeNotFound)
    }
}

#[async_trait]
impl ShoppingCartService for ShoppingCartServiceImpl {
    #[instrument(skip(self))]
    async fn aggregate(&self, user_id: i32) -> anyhow::Result<Vec<AggregateRow>> {
        let lines = self.cart_repo.cart_ingredient_lines(user_id).await?;
        Ok(aggregate(lines))
    }

    #[instrument(skip(self))]
    async fn add_recipe(&self, user_id: i32, recipe_id: i32) -> Result<RecipeSummary, CartError> {
        let summary = self.recipe_summary(recipe_id).await?;
        match self.cart_repo.add_recipe(user_id, recipe_id).await {
            Ok(()) => Ok(summary),
            Err(AddToCartError::AlreadyInCart) => Err(CartError::AlreadyInCart),
            Err(AddToCartError::Internal(err)) => Err(CartError::Internal(err)),
        }
    }

    #[instrument(skip(self))]
    async fn remove_recipe(&self, user_id: i32, recipe_id: i32) -> Result<(), CartError> {
        self.recipe_summary(recipe_id).await?;
        if self
            .cart_repo
            .remove_recipe(user_id, recipe_id)
            .await
            .map_err(CartError::Internal)?
        {
            Ok(())
        } else {
            Err(CartError::NotInCart)
        }
    }

    #[instrument(skip(self))]
    async fn download_shopping_list(&self, user: &CurrentUser) -> Result<Vec<u8>, DownloadError> {
        let rows = self
            .aggregate(user.id)
            .await
            .map_err(DownloadError::Internal)?;
        info!(rows = rows.len(), "Aggregated shopping cart");

        let renderer = Arc::clone(&self.renderer);
        let username = user.username.clone();
        let document = tokio::task::spawn_blocking(move || renderer.render(&rows, &username))
            .await
            .context("Shopping list render task failed")
            .map_err(DownloadError::Internal)??;
        Ok(document)
    }
}
