use std::sync::Arc;

use async_trait::async_trait;
use rearch::CapsuleHandle;
use sea_orm::{ColumnTrait, DbConn, EntityTrait, QueryFilter};
use tracing::instrument;

use crate::{
    config::db_conn_capsule,
    orm::{auth_token, user},
};

pub fn user_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn UserRepository> {
    let db = Arc::clone(get.as_ref(db_conn_capsule));
    Arc::new(UserRepositoryImpl { db })
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_token(&self, key: &str) -> anyhow::Result<Option<user::Model>>;
}

struct UserRepositoryImpl {
    db: Arc<DbConn>,
}

#[async_trait]
impl UserRepository for UserRepositoryImpl {
    #[instrument(skip(self, key))]
    async fn find_by_token(&self, key: &str) -> anyhow::Result<Option<user::Model>> {
        Ok(user::Entity::find()
            .inner_join(auth_token::Entity)
            .filter(auth_token::Column::Key.eq(key))
            .one(&*self.db)
            .await?)
    }
}
