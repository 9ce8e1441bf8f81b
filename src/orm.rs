#[allow(warnings, clippy::all)]
pub mod user {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        #[sea_orm(unique)]
        pub username: String,
        pub email: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::auth_token::Entity")]
        AuthToken,
        #[sea_orm(has_many = "super::recipe::Entity")]
        Recipe,
        #[sea_orm(has_many = "super::shopping_cart::Entity")]
        ShoppingCart,
    }

    impl Related<super::auth_token::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::AuthToken.def()
        }
    }

    impl Related<super::recipe::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Recipe.def()
        }
    }

    impl Related<super::shopping_cart::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::ShoppingCart.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// API tokens, keyed the way `Authorization: Token <key>` headers carry them.
#[allow(warnings, clippy::all)]
pub mod auth_token {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "authtoken_token")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub key: String,
        pub user_id: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::user::Entity",
            from = "Column::UserId",
            to = "super::user::Column::Id",
            on_delete = "Cascade"
        )]
        User,
    }

    impl Related<super::user::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::User.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

#[allow(warnings, clippy::all)]
pub mod ingredient {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "ingredients")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub name: String,
        pub measurement_unit: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::recipe_ingredient::Entity")]
        RecipeIngredient,
    }

    impl Related<super::recipe_ingredient::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::RecipeIngredient.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

#[allow(warnings, clippy::all)]
pub mod tag {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "tags")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        #[sea_orm(unique)]
        pub name: String,
        #[sea_orm(unique)]
        pub slug: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::recipe_tag::Entity")]
        RecipeTag,
    }

    impl Related<super::recipe_tag::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::RecipeTag.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

#[allow(warnings, clippy::all)]
pub mod recipe {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "recipes")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub author_id: i32,
        #[sea_orm(unique)]
        pub name: String,
        pub image: Option<String>,
        #[sea_orm(column_type = "Text")]
        pub text: String,
        pub cooking_time: i32,
        pub published: Option<TimeDateTimeWithTimeZone>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::user::Entity",
            from = "Column::AuthorId",
            to = "super::user::Column::Id",
            on_delete = "Cascade"
        )]
        Author,
        #[sea_orm(has_many = "super::recipe_ingredient::Entity")]
        RecipeIngredient,
        #[sea_orm(has_many = "super::recipe_tag::Entity")]
        RecipeTag,
        #[sea_orm(has_many = "super::shopping_cart::Entity")]
        ShoppingCart,
        #[sea_orm(has_many = "super::short_link::Entity")]
        ShortLink,
    }

    impl Related<super::user::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Author.def()
        }
    }

    impl Related<super::recipe_ingredient::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::RecipeIngredient.def()
        }
    }

    impl Related<super::recipe_tag::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::RecipeTag.def()
        }
    }

    impl Related<super::shopping_cart::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::ShoppingCart.def()
        }
    }

    impl Related<super::short_link::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::ShortLink.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

#[allow(warnings, clippy::all)]
pub mod recipe_tag {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "recipe_tags")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub recipe_id: i32,
        #[sea_orm(primary_key, auto_increment = false)]
        pub tag_id: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::recipe::Entity",
            from = "Column::RecipeId",
            to = "super::recipe::Column::Id",
            on_delete = "Cascade"
        )]
        Recipe,
        #[sea_orm(
            belongs_to = "super::tag::Entity",
            from = "Column::TagId",
            to = "super::tag::Column::Id",
            on_delete = "Cascade"
        )]
        Tag,
    }

    impl Related<super::recipe::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Recipe.def()
        }
    }

    impl Related<super::tag::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Tag.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// One ingredient line of a recipe; `(recipe_id, ingredient_id)` is unique.
#[allow(warnings, clippy::all)]
pub mod recipe_ingredient {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "recipe_ingredients")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub recipe_id: i32,
        pub ingredient_id: i32,
        pub amount: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::recipe::Entity",
            from = "Column::RecipeId",
            to = "super::recipe::Column::Id",
            on_delete = "Cascade"
        )]
        Recipe,
        #[sea_orm(
            belongs_to = "super::ingredient::Entity",
            from = "Column::IngredientId",
            to = "super::ingredient::Column::Id",
            on_delete = "Cascade"
        )]
        Ingredient,
    }

    impl Related<super::recipe::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Recipe.def()
        }
    }

    impl Related<super::ingredient::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Ingredient.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// `(user_id, recipe_id)` is unique.
#[allow(warnings, clippy::all)]
pub mod shopping_cart {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "shopping_cart")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub user_id: i32,
        pub recipe_id: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::user::Entity",
            from = "Column::UserId",
            to = "super::user::Column::Id",
            on_delete = "Cascade"
        )]
        User,
        #[sea_orm(
            belongs_to = "super::recipe::Entity",
            from = "Column::RecipeId",
            to = "super::recipe::Column::Id",
            on_delete = "Cascade"
        )]
        Recipe,
    }

    impl Related<super::user::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::User.def()
        }
    }

    impl Related<super::recipe::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Recipe.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// `code` is `NULL` (or empty, for rows written before codes were minted
/// eagerly) until the recipe's first share-link request.
#[allow(warnings, clippy::all)]
pub mod short_link {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "short_links")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        #[sea_orm(unique)]
        pub recipe_id: i32,
        #[sea_orm(unique, column_type = "String(StringLen::N(4))", nullable)]
        pub code: Option<String>,
        #[sea_orm(column_type = "String(StringLen::N(300))")]
        pub original_path: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::recipe::Entity",
            from = "Column::RecipeId",
            to = "super::recipe::Column::Id",
            on_delete = "Cascade"
        )]
        Recipe,
    }

    impl Related<super::recipe::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Recipe.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}
