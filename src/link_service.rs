use std::sync::Arc;

use async_trait::async_trait;
use rearch::CapsuleHandle;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::instrument;

use crate::{
    allocator::{AllocateError, KeyAllocator, LinkCreationStatus},
    config::{max_allocation_attempts_capsule, short_url_base_capsule},
    link_repo::{Link, LinkRepository, link_repository_capsule},
};

/// Body of a shorten request, `{"url": "..."}` and nothing else.
#[derive(Debug, PartialEq, Eq)]
pub struct ShortenRequest {
    pub url: String,
}

impl ShortenRequest {
    /// # Errors
    /// Will return [`Err`] if `body` is not a JSON object holding exactly one
    /// non-empty string field named `url` that is free of control characters.
    pub fn from_json(body: &str) -> Result<Self, ValidationError> {
        let mut fields: Map<String, Value> =
            serde_json::from_str(body).map_err(|_| ValidationError::FailedToDecode)?;

        let url = fields.remove("url").ok_or(ValidationError::UrlMissing)?;
        if !fields.is_empty() {
            return Err(ValidationError::OnlyUrlAllowed);
        }

        match url {
            Value::String(url) if is_valid_long_url(&url) => Ok(Self { url }),
            _ => Err(ValidationError::InvalidUrlFormat),
        }
    }
}

/// Long URLs are sent back verbatim in a `Location` header, so control
/// characters (CR/LF included) are never stored.
fn is_valid_long_url(url: &str) -> bool {
    !url.is_empty() && !url.chars().any(char::is_control)
}

#[derive(Debug)]
pub struct Resolved {
    pub long_url: String,
}

/// Client faults; the message is the machine-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("failed_to_decode")]
    FailedToDecode,
    #[error("url_missing")]
    UrlMissing,
    #[error("only_url_allowed")]
    OnlyUrlAllowed,
    #[error("invalid_url_format")]
    InvalidUrlFormat,
    #[error("key_missing")]
    KeyMissing,
}

#[derive(Debug, Error)]
pub enum ShortenError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("no free key found after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },
    #[error("internal/database error: {0}")]
    Store(anyhow::Error), // NOTE: no #[from] so we have to be explicit
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("no link for this key")]
    NotFound,
    #[error("internal/database error: {0}")]
    Store(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum RevokeError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("no link for this key")]
    NotFound,
    #[error("internal/database error: {0}")]
    Store(anyhow::Error),
}

impl From<AllocateError> for ShortenError {
    fn from(err: AllocateError) -> Self {
        match err {
            AllocateError::Exhausted { attempts } => Self::AllocationExhausted { attempts },
            AllocateError::Internal(err) => Self::Store(err),
        }
    }
}

pub fn link_service_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn LinkService> {
    let link_repo = Arc::clone(get.as_ref(link_repository_capsule));
    let short_url_base = get.as_ref(short_url_base_capsule).clone();
    let max_attempts = *get.as_ref(max_allocation_attempts_capsule);
    new_link_service(link_repo, short_url_base, max_attempts)
}

/// Builds a [`LinkService`] over an explicit store handle.
pub fn new_link_service(
    link_repo: Arc<dyn LinkRepository>,
    short_url_base: impl Into<String>,
    max_attempts: u32,
) -> Arc<dyn LinkService> {
    Arc::new(LinkServiceImpl {
        allocator: KeyAllocator::new(Arc::clone(&link_repo), short_url_base, max_attempts),
        link_repo,
    })
}

#[async_trait]
pub trait LinkService: Send + Sync {
    /// Returns the link for `url`, creating it on first request.
    async fn shorten(&self, url: &str) -> Result<(Link, LinkCreationStatus), ShortenError>;

    async fn resolve(&self, key: &str) -> Result<Resolved, ResolveError>;

    /// Permanently deletes the link stored under `key`.
    async fn revoke(&self, key: &str) -> Result<(), RevokeError>;
}

struct LinkServiceImpl {
    link_repo: Arc<dyn LinkRepository>,
    allocator: KeyAllocator,
}

#[async_trait]
impl LinkService for LinkServiceImpl {
    #[instrument(skip(self))]
    async fn shorten(&self, url: &str) -> Result<(Link, LinkCreationStatus), ShortenError> {
        if !is_valid_long_url(url) {
            return Err(ValidationError::InvalidUrlFormat.into());
        }
        Ok(self.allocator.allocate(url).await?)
    }

    #[instrument(skip(self))]
    async fn resolve(&self, key: &str) -> Result<Resolved, ResolveError> {
        if key.is_empty() {
            return Err(ValidationError::KeyMissing.into());
        }

        match self.link_repo.find_by_key(key).await {
            Ok(Some(link)) => Ok(Resolved {
                long_url: link.long_url,
            }),
            Ok(None) => Err(ResolveError::NotFound),
            Err(err) => Err(ResolveError::Store(err)),
        }
    }

    #[instrument(skip(self))]
    async fn revoke(&self, key: &str) -> Result<(), RevokeError> {
        if key.is_empty() {
            return Err(ValidationError::KeyMissing.into());
        }

        match self.link_repo.delete_by_key(key).await {
            Ok(0) => Err(RevokeError::NotFound),
            Ok(_) => Ok(()),
            Err(err) => Err(RevokeError::Store(err)),
        }
    }
}
