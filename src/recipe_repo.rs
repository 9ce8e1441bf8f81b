use std::sync::Arc;

use async_trait::async_trait;
use rearch::CapsuleHandle;
use sea_orm::{DbConn, EntityTrait};
use serde::Serialize;
use tracing::instrument;

use crate::{config::db_conn_capsule, orm::recipe};

pub fn recipe_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn RecipeRepository> {
    let db = Arc::clone(get.as_ref(db_conn_capsule));
    Arc::new(RecipeRepositoryImpl { db })
}

#[async_trait]
pub trait RecipeRepository: Send + Sync {
    async fn find_summary(&self, recipe_id: i32) -> anyhow::Result<Option<RecipeSummary>>;
}

/// The short form of a recipe returned by cart endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecipeSummary {
    pub id: i32,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i32,
}

impl From<recipe::Model> for RecipeSummary {
    fn from(
        recipe::Model {
            id,
            name,
            image,
            cooking_time,
            ..
        }: recipe::Model,
    ) -> Self {
        Self {
            id,
            name,
            image,
            cooking_time,
        }
    }
}

/// Path of the recipe page that short links point at.
#[must_use]
pub fn canonical_recipe_path(recipe_id: i32) -> String {
    format!("/recipes/{recipe_id}")
}

struct RecipeRepositoryImpl {
    db: Arc<DbConn>,
}

#[async_trait]
impl RecipeRepository for RecipeRepositoryImpl {
    #[instrument(skip(self))]
    async fn find_summary(&self, recipe_id: i32) -> anyhow::Result<Option<RecipeSummary>> {
        Ok(recipe::Entity::find_by_id(recipe_id)
            .one(&*self.db)
            .await?
            .map(RecipeSummary::from))
    }
}
