use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rearch::CapsuleHandle;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbConn, DbErr, EntityTrait, QueryFilter,
    SqlErr,
};
use thiserror::Error;
use tracing::instrument;

use crate::{config::db_conn_capsule, memory_repo::InMemoryLinkRepository, orm::link};

/// A persisted mapping from a short key to the long URL it stands for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub key: String,
    /// Always the configured base prefix followed by `key`.
    pub short_url: String,
    pub long_url: String,
}

impl From<link::Model> for Link {
    fn from(
        link::Model {
            key,
            short_url,
            long_url,
        }: link::Model,
    ) -> Self {
        Self {
            key,
            short_url,
            long_url,
        }
    }
}

#[derive(Debug, Error)]
pub enum InsertLinkError {
    #[error("a link with the same key or long URL already exists")]
    AlreadyExists,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

/// Uses the database when one is connected, in-memory storage otherwise.
pub fn link_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn LinkRepository> {
    match get.as_ref(db_conn_capsule).clone() {
        Some(db) => Arc::new(SeaOrmLinkRepository { db }),
        None => Arc::new(InMemoryLinkRepository::new()),
    }
}

/// Store of [`Link`]s, addressable by key and by long URL.
///
/// Every method is a single round trip; none of them retries.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    async fn find_by_long_url(&self, long_url: &str) -> anyhow::Result<Option<Link>>;

    async fn find_by_key(&self, key: &str) -> anyhow::Result<Option<Link>>;

    /// Inserts `link`, failing with [`InsertLinkError::AlreadyExists`] when either
    /// its key or its long URL is already stored.
    async fn insert_link(&self, link: Link) -> Result<Link, InsertLinkError>;

    /// Returns the number of links deleted (zero or one).
    async fn delete_by_key(&self, key: &str) -> anyhow::Result<u64>;
}

struct SeaOrmLinkRepository {
    db: DbConn,
}

#[async_trait]
impl LinkRepository for SeaOrmLinkRepository {
    #[instrument(skip(self))]
    async fn find_by_long_url(&self, long_url: &str) -> anyhow::Result<Option<Link>> {
        Ok(link::Entity::find()
            .filter(link::Column::LongUrl.eq(long_url))
            .one(&self.db)
            .await
            .context("Failed to find link by long URL")?
            .map(Link::from))
    }

    #[instrument(skip(self))]
    async fn find_by_key(&self, key: &str) -> anyhow::Result<Option<Link>> {
        Ok(link::Entity::find_by_id(key)
            .one(&self.db)
            .await
            .context("Failed to find link by key")?
            .map(Link::from))
    }

    #[instrument(skip(self))]
    async fn insert_link(&self, link: Link) -> Result<Link, InsertLinkError> {
        let to_insert = link::ActiveModel {
            key: Set(link.key),
            short_url: Set(link.short_url),
            long_url: Set(link.long_url),
        };

        match to_insert.insert(&self.db).await {
            Ok(inserted) => Ok(inserted.into()),
            Err(db_err) => Err(insert_error(db_err.sql_err(), db_err)),
        }
    }

    #[instrument(skip(self))]
    async fn delete_by_key(&self, key: &str) -> anyhow::Result<u64> {
        let result = link::Entity::delete_by_id(key)
            .exec(&self.db)
            .await
            .context("Failed to delete link by key")?;
        Ok(result.rows_affected)
    }
}

/// Maps a failed insert, given how the driver classified it.
///
/// A unique violation on either the key or the long URL means another link
/// got there first; anything else is a store fault.
fn insert_error(sql_err: Option<SqlErr>, db_err: DbErr) -> InsertLinkError {
    match sql_err {
        Some(SqlErr::UniqueConstraintViolation(_)) => InsertLinkError::AlreadyExists,
        _ => InsertLinkError::Internal(anyhow::Error::new(db_err).context("Failed to insert link")),
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;

    fn model(key: &str, long_url: &str) -> link::Model {
        link::Model {
            key: key.to_owned(),
            short_url: format!("http://short.ly/{key}"),
            long_url: long_url.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_find_by_key_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model("abc123", "https://example.com/a")]])
            .into_connection();
        let repo = SeaOrmLinkRepository { db };

        let link = repo.find_by_key("abc123").await.unwrap().unwrap();
        assert_eq!(
            link,
            Link {
                key: "abc123".to_owned(),
                short_url: "http://short.ly/abc123".to_owned(),
                long_url: "https://example.com/a".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn test_find_by_key_missing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<link::Model>::new()])
            .into_connection();
        let repo = SeaOrmLinkRepository { db };

        assert!(repo.find_by_key("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_long_url_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model("abc123", "https://example.com/a")]])
            .into_connection();
        let repo = SeaOrmLinkRepository { db };

        let link = repo
            .find_by_long_url("https://example.com/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(link.key, "abc123");
    }

    #[tokio::test]
    async fn test_find_by_long_url_db_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([DbErr::Custom("connection reset".to_owned())])
            .into_connection();
        let repo = SeaOrmLinkRepository { db };

        let err = repo
            .find_by_long_url("https://example.com/a")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to find link by long URL");
    }

    #[tokio::test]
    async fn test_insert_link_success() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model("abc123", "https://example.com/a")]])
            .into_connection();
        let repo = SeaOrmLinkRepository { db };

        let to_insert = Link::from(model("abc123", "https://example.com/a"));
        let inserted = repo.insert_link(to_insert.clone()).await.unwrap();
        assert_eq!(inserted, to_insert);
    }

    #[tokio::test]
    async fn test_insert_link_db_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([DbErr::Custom("disk full".to_owned())])
            .into_connection();
        let repo = SeaOrmLinkRepository { db };

        let err = repo
            .insert_link(Link::from(model("abc123", "https://example.com/a")))
            .await
            .unwrap_err();
        assert!(matches!(err, InsertLinkError::Internal(_)));
    }

    #[test]
    fn test_insert_error_unique_violation_is_already_exists() {
        let err = insert_error(
            Some(SqlErr::UniqueConstraintViolation(
                "duplicate key value violates unique constraint \"links_long_url_key\"".to_owned(),
            )),
            DbErr::Custom("23505".to_owned()),
        );
        assert!(matches!(err, InsertLinkError::AlreadyExists));
    }

    #[test]
    fn test_insert_error_other_violations_are_internal() {
        let err = insert_error(
            Some(SqlErr::ForeignKeyConstraintViolation("fk".to_owned())),
            DbErr::Custom("23503".to_owned()),
        );
        assert!(matches!(err, InsertLinkError::Internal(_)));

        let err = insert_error(None, DbErr::Custom("connection reset".to_owned()));
        assert!(
            matches!(err, InsertLinkError::Internal(err) if err.to_string() == "Failed to insert link")
        );
    }

    #[tokio::test]
    async fn test_delete_by_key_reports_rows_affected() {
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
        let repo = SeaOrmLinkRepository { db };

        assert_eq!(repo.delete_by_key("abc123").await.unwrap(), 1);
        assert_eq!(repo.delete_by_key("abc123").await.unwrap(), 0);
    }
}
