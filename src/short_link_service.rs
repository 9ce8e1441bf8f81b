use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use rearch::CapsuleHandle;
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;

use crate::{
    config::base_url_capsule,
    recipe_repo::{RecipeRepository, canonical_recipe_path, recipe_repository_capsule},
    short_link_repo::{
        SaveShortLinkError, ShortCode, ShortLink, ShortLinkRepository,
        short_link_repository_capsule,
    },
};

/// Upper bound on fresh codes tried before minting gives up.
pub const MINT_ATTEMPTS: usize = 5;

#[derive(Debug, PartialEq, Eq)]
pub struct ShareLink {
    pub code: ShortCode,
    pub url: Url,
}

#[derive(Debug)]
pub struct Redirect {
    pub path: String,
}

pub fn short_link_service_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn ShortLinkService> {
    let short_link_repo = Arc::clone(get.as_ref(short_link_repository_capsule));
    let recipe_repo = Arc::clone(get.as_ref(recipe_repository_capsule));
    let base_url = get.as_ref(base_url_capsule).clone();
    Arc::new(ShortLinkServiceImpl {
        short_link_repo,
        recipe_repo,
        base_url,
    })
}

#[async_trait]
pub trait ShortLinkService: Send + Sync {
    /// Returns the recipe's short link, minting it on first request.
    async fn get_link(&self, recipe_id: i32) -> Result<ShareLink, GetLinkError>;

    async fn resolve(&self, code: &str) -> Result<Redirect, ResolveError>;
}

#[derive(Debug, Error)]
pub enum GetLinkError {
    #[error("recipe not found")]
    RecipeNotFound,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error), // NOTE: no #[from] so we have to be explicit
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("short link not found")]
    NotFound,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

struct ShortLinkServiceImpl {
    short_link_repo: Arc<dyn ShortLinkRepository>,
    recipe_repo: Arc<dyn RecipeRepository>,
    base_url: Url,
}

impl ShortLinkServiceImpl {
    fn share_link(&self, code: ShortCode) -> Result<ShareLink, GetLinkError> {
        let url = self
            .base_url
            .join(&format!("/s/{}/", code.as_str()))
            .context("Failed to build absolute short link URL")
            .map_err(GetLinkError::Internal)?;
        Ok(ShareLink { code, url })
    }

    /// Reuses the stored code when there is one.
    fn minted(
        &self,
        link: ShortLink,
        canonical_path: &str,
    ) -> Option<Result<ShareLink, GetLinkError>> {
        let code = link.code?;
        if link.original_path != canonical_path {
            warn!(
                recipe_id = link.recipe_id,
                stored_path = %link.original_path,
                canonical_path,
                "Short link points at a stale path; keeping the path it was minted with"
            );
        }
        Some(self.share_link(code))
    }

    async fn mint(
        &self,
        recipe_id: i32,
        canonical_path: &str,
        mut row_exists: bool,
    ) -> Result<ShareLink, GetLinkError> {
        for _ in 0..MINT_ATTEMPTS {
            let attempt_code = ShortCode::generate();

            let result = if row_exists {
                self.short_link_repo
                    .assign_code(recipe_id, attempt_code.clone())
                    .await
            } else {
                self.short_link_repo
                    .insert_link(ShortLink {
                        recipe_id,
                        code: Some(attempt_code.clone()),
                        original_path: canonical_path.to_owned(),
                    })
                    .await
            };

            match result {
                Ok(link) => {
                    info!(recipe_id, code = attempt_code.as_str(), "Minted short link");
                    return match self.minted(link, canonical_path) {
                        Some(share_link) => share_link,
                        None => Err(GetLinkError::Internal(anyhow!(
                            "Stored short link has no code right after minting"
                        ))),
                    };
                }
                // NOTE: someone else got there first; theirs wins
                Err(SaveShortLinkError::RecipeAlreadyLinked(existing)) => {
                    if let Some(share_link) = self.minted(existing, canonical_path) {
                        info!(recipe_id, "Short link was minted concurrently; reusing it");
                        return share_link;
                    }
                    row_exists = true;
                }
                Err(SaveShortLinkError::CodeTaken) => {
                    warn!(
                        recipe_id,
                        code = attempt_code.as_str(),
                        "Generated short code that was already taken"
                    );
                }
                Err(SaveShortLinkError::Internal(err)) => {
                    return Err(GetLinkError::Internal(
                        err.context("Failed to persist short link"),
                    ));
                }
            }
        }

        Err(GetLinkError::Internal(anyhow!("Exhausted retry attempts")))
    }
}

#[async_trait]
impl ShortLinkService for ShortLinkServiceImpl {
    #[instrument(skip(self))]
    async fn get_link(&self, recipe_id: i32) -> Result<ShareLink, GetLinkError> {
        if self
            .recipe_repo
            .find_summary(recipe_id)
            .await
            .map_err(GetLinkError::Internal)?
            .is_none()
        {
            return Err(GetLinkError::RecipeNotFound);
        }

        let canonical_path = canonical_recipe_path(recipe_id);
        let existing = self
            .short_link_repo
            .find_by_recipe(recipe_id)
            .await
            .map_err(GetLinkError::Internal)?;

        match existing {
            Some(link) => match self.minted(link, &canonical_path) {
                Some(share_link) => share_link,
                None => self.mint(recipe_id, &canonical_path, true).await,
            },
            None => self.mint(recipe_id, &canonical_path, false).await,
        }
    }

    #[instrument(skip(self))]
    async fn resolve(&self, code: &str) -> Result<Redirect, ResolveError> {
        // NOTE: malformed codes can never have been minted
        let Ok(code) = ShortCode::new(code.to_owned()) else {
            return Err(ResolveError::NotFound);
        };

        match self.short_link_repo.find_by_code(&code).await {
            Ok(Some(link)) => Ok(Redirect {
                path: link.original_path,
            }),
            Ok(None) => Err(ResolveError::NotFound),
            Err(err) => Err(ResolveError::Internal(err)),
        }
    }
}
