use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rand::{
    Rng,
    distr::{Alphanumeric, Distribution},
};
use rearch::CapsuleHandle;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DbConn, DbErr, EntityTrait,
    QueryFilter, SqlErr, sea_query::Expr,
};
use thiserror::Error;
use tracing::instrument;

use crate::{config::db_conn_capsule, orm::short_link};

pub const SHORT_CODE_LEN: usize = 4;

pub fn short_link_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn ShortLinkRepository> {
    let db = Arc::clone(get.as_ref(db_conn_capsule));
    Arc::new(ShortLinkRepositoryImpl { db })
}

#[async_trait]
pub trait ShortLinkRepository: Send + Sync {
    async fn find_by_recipe(&self, recipe_id: i32) -> anyhow::Result<Option<ShortLink>>;

    async fn find_by_code(&self, code: &ShortCode) -> anyhow::Result<Option<ShortLink>>;

    /// Inserts a new [`ShortLink`]; never overwrites an existing row.
    async fn insert_link(&self, link: ShortLink) -> Result<ShortLink, SaveShortLinkError>;

    /// Sets the code of an existing link whose code is still unset.
    async fn assign_code(
        &self,
        recipe_id: i32,
        code: ShortCode,
    ) -> Result<ShortLink, SaveShortLinkError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortLink {
    pub recipe_id: i32,
    /// [`None`] while the link is unminted.
    pub code: Option<ShortCode>,
    pub original_path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShortCode(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShortCodeValidationError {
    #[error("short code must be exactly {SHORT_CODE_LEN} characters long, got {actual}")]
    InvalidLength { actual: usize },
    #[error("short code contains invalid characters: {invalid_chars}")]
    InvalidCharacters { invalid_chars: String },
}

impl ShortCode {
    /// # Errors
    /// Returns [`Err`] unless `code` is exactly [`SHORT_CODE_LEN`] ASCII alphanumerics.
    pub fn new(code: String) -> Result<Self, ShortCodeValidationError> {
        let invalid_chars: String = code
            .chars()
            .filter(|c| !c.is_ascii_alphanumeric())
            .collect();
        if !invalid_chars.is_empty() {
            return Err(ShortCodeValidationError::InvalidCharacters { invalid_chars });
        }
        if code.len() != SHORT_CODE_LEN {
            return Err(ShortCodeValidationError::InvalidLength {
                actual: code.len(),
            });
        }
        Ok(Self(code))
    }

    /// Draws [`SHORT_CODE_LEN`] independent uniform samples from `[0-9a-zA-Z]`.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::rng())
    }

    #[must_use]
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(
            (0..SHORT_CODE_LEN)
                .map(|_| char::from(Alphanumeric.sample(rng)))
                .collect(),
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum SaveShortLinkError {
    #[error("recipe {} already has a short link", .0.recipe_id)]
    RecipeAlreadyLinked(ShortLink),
    #[error("short code is already taken")]
    CodeTaken,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

impl TryFrom<short_link::Model> for ShortLink {
    type Error = anyhow::Error;

    fn try_from(
        short_link::Model {
            recipe_id,
            code,
            original_path,
            ..
        }: short_link::Model,
    ) -> Result<Self, Self::Error> {
        let code = code
            .filter(|code| !code.is_empty())
            .map(ShortCode::new)
            .transpose()
            .with_context(|| format!("Stored short code of recipe {recipe_id} is invalid"))?;
        Ok(Self {
            recipe_id,
            code,
            original_path,
        })
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

struct ShortLinkRepositoryImpl {
    db: Arc<DbConn>,
}

#[async_trait]
impl ShortLinkRepository for ShortLinkRepositoryImpl {
    #[instrument(skip(self))]
    async fn find_by_recipe(&self, recipe_id: i32) -> anyhow::Result<Option<ShortLink>> {
        short_link::Entity::find()
            .filter(short_link::Column::RecipeId.eq(recipe_id))
            .one(&*self.db)
            .await?
            .map(ShortLink::try_from)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_code(&self, code: &ShortCode) -> anyhow::Result<Option<ShortLink>> {
        short_link::Entity::find()
            .filter(short_link::Column::Code.eq(code.as_str()))
            .one(&*self.db)
            .await?
            .map(ShortLink::try_from)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn insert_link(&self, link: ShortLink) -> Result<ShortLink, SaveShortLinkError> {
        let recipe_id = link.recipe_id;
        let to_insert = short_link::ActiveModel {
            recipe_id: Set(link.recipe_id),
            code: Set(link.code.map(ShortCode::into_inner)),
            original_path: Set(link.original_path),
            ..Default::default()
        };

        match to_insert.insert(&*self.db).await {
            Ok(inserted) => inserted.try_into().map_err(SaveShortLinkError::Internal),
            Err(err) if is_unique_violation(&err) => {
                // NOTE: either another request minted this recipe first or the code collided
                match self
                    .find_by_recipe(recipe_id)
                    .await
                    .map_err(SaveShortLinkError::Internal)?
                {
                    Some(existing) => Err(SaveShortLinkError::RecipeAlreadyLinked(existing)),
                    None => Err(SaveShortLinkError::CodeTaken),
                }
            }
            Err(err) => Err(SaveShortLinkError::Internal(err.into())),
        }
    }

    #[instrument(skip(self))]
    async fn assign_code(
        &self,
        recipe_id: i32,
        code: ShortCode,
    ) -> Result<ShortLink, SaveShortLinkError> {
        let update_result = short_link::Entity::update_many()
            .col_expr(short_link::Column::Code, Expr::value(code.as_str()))
            .filter(short_link::Column::RecipeId.eq(recipe_id))
            .filter(
                Condition::any()
                    .add(short_link::Column::Code.is_null())
                    .add(short_link::Column::Code.eq("")),
            )
            .exec(&*self.db)
            .await;

        let rows_affected = match update_result {
            Ok(result) => result.rows_affected,
            Err(err) if is_unique_violation(&err) => return Err(SaveShortLinkError::CodeTaken),
            Err(err) => return Err(SaveShortLinkError::Internal(err.into())),
        };

        let stored = self
            .find_by_recipe(recipe_id)
            .await
            .map_err(SaveShortLinkError::Internal)?
            .with_context(|| format!("Short link of recipe {recipe_id} vanished during update"))
            .map_err(SaveShortLinkError::Internal)?;

        if rows_affected == 0 {
            Err(SaveShortLinkError::RecipeAlreadyLinked(stored))
        } else {
            Ok(stored)
        }
    }
}
