use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    fingerprint::fingerprint,
    link_repo::{InsertLinkError, Link, LinkRepository},
};

/// Salts are drawn uniformly from `0..SALT_RANGE`.
const SALT_RANGE: u32 = 10_000;

#[derive(Debug, PartialEq, Eq)]
pub enum LinkCreationStatus {
    NewlyCreated,
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum AllocateError {
    #[error("no free key found after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error), // NOTE: no #[from] so we have to be explicit
}

type SaltSource = Box<dyn Fn() -> String + Send + Sync>;

/// Finds or creates the [`Link`] for a long URL.
///
/// Keys are derived with [`fingerprint`], unsalted first and then with a
/// random salt for each collision, up to `max_attempts` keys per URL.
pub struct KeyAllocator {
    link_repo: Arc<dyn LinkRepository>,
    short_url_base: String,
    max_attempts: u32,
    next_salt: SaltSource,
}

impl KeyAllocator {
    pub fn new(
        link_repo: Arc<dyn LinkRepository>,
        short_url_base: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        Self {
            link_repo,
            short_url_base: short_url_base.into(),
            max_attempts,
            next_salt: Box::new(random_salt),
        }
    }

    #[cfg(test)]
    fn with_salts(mut self, next_salt: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.next_salt = Box::new(next_salt);
        self
    }

    #[must_use]
    pub fn short_url(&self, key: &str) -> String {
        format!("{}{key}", self.short_url_base)
    }

    /// Returns the link already stored for `long_url`, or stores a new one
    /// under the first key not bound to a different URL.
    ///
    /// The dedup check and the insert are separate round trips. A concurrent
    /// insert of the same URL surfaces as [`InsertLinkError::AlreadyExists`],
    /// after which the winner's link is re-read and returned.
    ///
    /// # Errors
    /// [`AllocateError::Exhausted`] when every attempted key was taken, and
    /// [`AllocateError::Internal`] on any store failure.
    #[instrument(skip(self))]
    pub async fn allocate(
        &self,
        long_url: &str,
    ) -> Result<(Link, LinkCreationStatus), AllocateError> {
        if let Some(existing) = self.find_by_long_url(long_url).await? {
            return Ok((existing, LinkCreationStatus::AlreadyExists));
        }

        // NOTE: the first key is unsalted so that it is reproducible from the URL alone
        let mut salt = String::new();

        for attempt in 1..=self.max_attempts {
            let key = fingerprint(long_url, &salt);

            match self
                .link_repo
                .find_by_key(&key)
                .await
                .map_err(AllocateError::Internal)?
            {
                Some(existing) if existing.long_url == long_url => {
                    return Ok((existing, LinkCreationStatus::AlreadyExists));
                }
                Some(_) => {
                    warn!(attempt, key, "Generated key is bound to a different URL");
                }
                None => {
                    let to_insert = Link {
                        short_url: self.short_url(&key),
                        key: key.clone(),
                        long_url: long_url.to_owned(),
                    };

                    match self.link_repo.insert_link(to_insert).await {
                        Ok(inserted) => {
                            debug!(attempt, key, "Stored new link");
                            return Ok((inserted, LinkCreationStatus::NewlyCreated));
                        }
                        Err(InsertLinkError::AlreadyExists) => {
                            if let Some(existing) = self.find_by_long_url(long_url).await? {
                                return Ok((existing, LinkCreationStatus::AlreadyExists));
                            }
                            warn!(attempt, key, "Generated key was taken concurrently");
                        }
                        Err(InsertLinkError::Internal(err)) => {
                            return Err(AllocateError::Internal(err));
                        }
                    }
                }
            }

            salt = (self.next_salt)();
        }

        Err(AllocateError::Exhausted {
            attempts: self.max_attempts,
        })
    }

    async fn find_by_long_url(&self, long_url: &str) -> Result<Option<Link>, AllocateError> {
        self.link_repo
            .find_by_long_url(long_url)
            .await
            .map_err(AllocateError::Internal)
    }
}

fn random_salt() -> String {
    let mut bytes = [0; 4];
    rand::rng().fill_bytes(&mut bytes);
    (u32::from_le_bytes(bytes) % SALT_RANGE).to_string()
}
