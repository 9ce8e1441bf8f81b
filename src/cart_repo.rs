use std::sync::Arc;

use async_trait::async_trait;
use rearch::CapsuleHandle;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbConn, EntityTrait, FromQueryResult,
    JoinType, QueryFilter, QuerySelect, RelationTrait, SqlErr,
};
use thiserror::Error;
use tracing::instrument;

use crate::{
    config::db_conn_capsule,
    orm::{ingredient, recipe, recipe_ingredient, shopping_cart},
};

pub fn cart_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn CartRepository> {
    let db = Arc::clone(get.as_ref(db_conn_capsule));
    Arc::new(CartRepositoryImpl { db })
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Every ingredient line of every recipe in the user's cart, unaggregated.
    async fn cart_ingredient_lines(&self, user_id: i32)
    -> anyhow::Result<Vec<CartIngredientLine>>;

    async fn add_recipe(&self, user_id: i32, recipe_id: i32) -> Result<(), AddToCartError>;

    /// Returns `false` if the recipe was not in the cart.
    async fn remove_recipe(&self, user_id: i32, recipe_id: i32) -> anyhow::Result<bool>;
}

#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult)]
pub struct CartIngredientLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Error)]
pub enum AddToCartError {
    #[error("recipe is already in the shopping cart")]
    AlreadyInCart,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

struct CartRepositoryImpl {
    db: Arc<DbConn>,
}

#[async_trait]
impl CartRepository for CartRepositoryImpl {
    #[instrument(skip(self))]
    async fn cart_ingredient_lines(
        &self,
        user_id: i32,
    ) -> anyhow::Result<Vec<CartIngredientLine>> {
        Ok(shopping_cart::Entity::find()
            .select_only()
            .column_as(ingredient::Column::Name, "name")
            .column_as(ingredient::Column::MeasurementUnit, "measurement_unit")
            .column_as(recipe_ingredient::Column::Amount, "amount")
            .join(JoinType::InnerJoin, shopping_cart::Relation::Recipe.def())
            .join(JoinType::InnerJoin, recipe::Relation::RecipeIngredient.def())
            .join(
                JoinType::InnerJoin,
                recipe_ingredient::Relation::Ingredient.def(),
            )
            .filter(shopping_cart::Column::UserId.eq(user_id))
            .into_model::<CartIngredientLine>()
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    async fn add_recipe(&self, user_id: i32, recipe_id: i32) -> Result<(), AddToCartError> {
        let to_insert = shopping_cart::ActiveModel {
            user_id: Set(user_id),
            recipe_id: Set(recipe_id),
            ..Default::default()
        };
        match to_insert.insert(&*self.db).await {
            Ok(_) => Ok(()),
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(AddToCartError::AlreadyInCart)
            }
            Err(err) => Err(AddToCartError::Internal(err.into())),
        }
    }

    #[instrument(skip(self))]
    async fn remove_recipe(&self, user_id: i32, recipe_id: i32) -> anyhow::Result<bool> {
        let result = shopping_cart::Entity::delete_many()
            .filter(shopping_cart::Column::UserId.eq(user_id))
            .filter(shopping_cart::Column::RecipeId.eq(recipe_id))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};

    use super::*;

    fn line_row(name: &str, unit: &str, amount: i32) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("name", Value::from(name.to_owned())),
            ("measurement_unit", Value::from(unit.to_owned())),
            ("amount", Value::from(amount)),
        ])
    }

    #[tokio::test]
    async fn test_cart_ingredient_lines() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                line_row("Мука", "г", 200),
                line_row("Мука", "г", 150),
            ]])
            .into_connection();
        let repo = CartRepositoryImpl { db: Arc::new(db) };

        let lines = repo.cart_ingredient_lines(1).await.unwrap();
        assert_eq!(
            lines,
            vec![
                CartIngredientLine {
                    name: "Мука".to_owned(),
                    measurement_unit: "г".to_owned(),
                    amount: 200,
                },
                CartIngredientLine {
                    name: "Мука".to_owned(),
                    measurement_unit: "г".to_owned(),
                    amount: 150,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_cart_ingredient_lines_empty_cart() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<BTreeMap<&str, Value>>::new()])
            .into_connection();
        let repo = CartRepositoryImpl { db: Arc::new(db) };

        assert!(repo.cart_ingredient_lines(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_recipe() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![shopping_cart::Model {
                id: 1,
                user_id: 5,
                recipe_id: 42,
            }]])
            .into_connection();
        let repo = CartRepositoryImpl { db: Arc::new(db) };

        repo.add_recipe(5, 42).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_recipe() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();
        let repo = CartRepositoryImpl { db: Arc::new(db) };

        assert!(repo.remove_recipe(5, 42).await.unwrap());
        assert!(!repo.remove_recipe(5, 42).await.unwrap());
    }
}
