use sea_orm::{
    ColumnTrait, ConnectionTrait, DbConn, DbErr, EntityTrait, QueryFilter, Schema,
    sea_query::{Expr, Index, IndexCreateStatement},
};
use tracing::{info, instrument};

use crate::orm::{
    auth_token, ingredient, recipe, recipe_ingredient, recipe_tag, shopping_cart, short_link,
    tag, user,
};

/// Creates every table and unique index that is missing. Safe to rerun.
///
/// # Errors
/// Returns [`Err`] if any statement fails.
#[instrument(skip(db))]
pub async fn create_schema(db: &DbConn) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    // NOTE: parents before children so foreign keys resolve
    let tables = [
        schema.create_table_from_entity(user::Entity),
        schema.create_table_from_entity(auth_token::Entity),
        schema.create_table_from_entity(ingredient::Entity),
        schema.create_table_from_entity(tag::Entity),
        schema
            .create_table_from_entity(recipe::Entity)
            .check(Expr::col(recipe::Column::CookingTime).gt(0))
            .to_owned(),
        schema.create_table_from_entity(recipe_tag::Entity),
        schema
            .create_table_from_entity(recipe_ingredient::Entity)
            .check(Expr::col(recipe_ingredient::Column::Amount).gt(0))
            .to_owned(),
        schema.create_table_from_entity(shopping_cart::Entity),
        schema.create_table_from_entity(short_link::Entity),
    ];
    for mut table in tables {
        table.if_not_exists();
        db.execute(backend.build(&table)).await?;
    }

    for index in unique_pair_indexes() {
        db.execute(backend.build(&index)).await?;
    }

    // NOTE: unminted links are NULL so any number of them fit under the unique code index
    let normalized = short_link::Entity::update_many()
        .col_expr(short_link::Column::Code, Expr::value(Option::<String>::None))
        .filter(short_link::Column::Code.eq(""))
        .exec(db)
        .await?;
    if normalized.rows_affected > 0 {
        info!(
            rows = normalized.rows_affected,
            "Cleared empty short link codes"
        );
    }

    info!("Schema is up to date");
    Ok(())
}

fn unique_pair_index<E, A, B>(name: &str, entity: E, first: A, second: B) -> IndexCreateStatement
where
    E: EntityTrait,
    A: sea_orm::ColumnTrait,
    B: sea_orm::ColumnTrait,
{
    Index::create()
        .name(name)
        .table(entity)
        .col(first)
        .col(second)
        .unique()
        .if_not_exists()
        .to_owned()
}

/// A recipe lists an ingredient once; a user carts a recipe once.
fn unique_pair_indexes() -> [IndexCreateStatement; 2] {
    [
        unique_pair_index(
            "recipe_ingredients_recipe_ingredient_key",
            recipe_ingredient::Entity,
            recipe_ingredient::Column::RecipeId,
            recipe_ingredient::Column::IngredientId,
        ),
        unique_pair_index(
            "shopping_cart_user_recipe_key",
            shopping_cart::Entity,
            shopping_cart::Column::UserId,
            shopping_cart::Column::RecipeId,
        ),
    ]
}
