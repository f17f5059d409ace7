use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::link_repo::{InsertLinkError, Link, LinkRepository};

/// [`LinkRepository`] kept in process memory.
///
/// Both the key and the long URL are unique, and the uniqueness check and the
/// insert happen under one lock, so concurrent inserts behave like a database
/// with a unique constraint on each column.
#[derive(Debug, Default)]
pub struct InMemoryLinkRepository {
    links: Mutex<Links>,
}

#[derive(Debug, Default)]
struct Links {
    by_key: HashMap<String, Link>,
    keys_by_long_url: HashMap<String, String>,
}

impl InMemoryLinkRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.links.lock().await.by_key.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LinkRepository for InMemoryLinkRepository {
    #[instrument(skip(self))]
    async fn find_by_long_url(&self, long_url: &str) -> anyhow::Result<Option<Link>> {
        let links = self.links.lock().await;
        Ok(links
            .keys_by_long_url
            .get(long_url)
            .and_then(|key| links.by_key.get(key))
            .cloned())
    }

    #[instrument(skip(self))]
    async fn find_by_key(&self, key: &str) -> anyhow::Result<Option<Link>> {
        Ok(self.links.lock().await.by_key.get(key).cloned())
    }

    #[instrument(skip(self))]
    async fn insert_link(&self, link: Link) -> Result<Link, InsertLinkError> {
        let mut links = self.links.lock().await;
        if links.by_key.contains_key(&link.key)
            || links.keys_by_long_url.contains_key(&link.long_url)
        {
            return Err(InsertLinkError::AlreadyExists);
        }

        links
            .keys_by_long_url
            .insert(link.long_url.clone(), link.key.clone());
        links.by_key.insert(link.key.clone(), link.clone());
        Ok(link)
    }

    #[instrument(skip(self))]
    async fn delete_by_key(&self, key: &str) -> anyhow::Result<u64> {
        let mut links = self.links.lock().await;
        let Some(removed) = links.by_key.remove(key) else {
            return Ok(0);
        };
        links.keys_by_long_url.remove(&removed.long_url);
        Ok(1)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn link(key: &str, long_url: &str) -> Link {
        Link {
            key: key.to_owned(),
            short_url: format!("http://short.ly/{key}"),
            long_url: long_url.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_insert_then_find_both_ways() {
        let repo = InMemoryLinkRepository::new();
        repo.insert_link(link("abc", "https://example.com/a"))
            .await
            .unwrap();

        let by_key = repo.find_by_key("abc").await.unwrap().unwrap();
        let by_long_url = repo
            .find_by_long_url("https://example.com/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_key, link("abc", "https://example.com/a"));
        assert_eq!(by_key, by_long_url);
    }

    #[tokio::test]
    async fn test_find_missing() {
        let repo = InMemoryLinkRepository::new();
        assert!(repo.find_by_key("abc").await.unwrap().is_none());
        assert!(
            repo.find_by_long_url("https://example.com/a")
                .await
                .unwrap()
                .is_none()
        );
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_rejects_taken_key() {
        let repo = InMemoryLinkRepository::new();
        repo.insert_link(link("abc", "https://example.com/a"))
            .await
            .unwrap();

        let err = repo
            .insert_link(link("abc", "https://example.com/b"))
            .await
            .unwrap_err();
        assert!(matches!(err, InsertLinkError::AlreadyExists));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_taken_long_url() {
        let repo = InMemoryLinkRepository::new();
        repo.insert_link(link("abc", "https://example.com/a"))
            .await
            .unwrap();

        let err = repo
            .insert_link(link("xyz", "https://example.com/a"))
            .await
            .unwrap_err();
        assert!(matches!(err, InsertLinkError::AlreadyExists));
        assert!(repo.find_by_key("xyz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_frees_key_and_long_url() {
        let repo = InMemoryLinkRepository::new();
        repo.insert_link(link("abc", "https://example.com/a"))
            .await
            .unwrap();

        assert_eq!(repo.delete_by_key("abc").await.unwrap(), 1);
        assert_eq!(repo.delete_by_key("abc").await.unwrap(), 0);
        assert!(
            repo.find_by_long_url("https://example.com/a")
                .await
                .unwrap()
                .is_none()
        );

        repo.insert_link(link("xyz", "https://example.com/a"))
            .await
            .unwrap();
        assert_eq!(repo.len().await, 1);
    }
}
