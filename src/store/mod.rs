// src/store/mod.rs

//! Persistence for comment rows.
//!
//! The service only sees the [`CommentStore`] trait. Two sqlx backends implement it:
//! Postgres for deployments and SQLite for embedded use and tests.

pub mod postgres;
pub mod sqlite;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{config::Config, models::comment::CommentRow};

pub use postgres::PgCommentStore;
pub use sqlite::SqliteCommentStore;

const CONNECT_RETRIES: u32 = 5;

/// Result of [`CommentStore::insert_reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    Created(i64),
    ParentMissing,
    TooDeep,
}

impl ReplyOutcome {
    /// Maps the depth of the parent (`None` when it does not exist) to an outcome,
    /// or `None` when the insert may go ahead.
    fn rejection(parent_depth: Option<i64>, max_depth: u32) -> Option<Self> {
        match parent_depth {
            None => Some(ReplyOutcome::ParentMissing),
            Some(depth) if depth >= i64::from(max_depth) => Some(ReplyOutcome::TooDeep),
            Some(_) => None,
        }
    }
}

/// A concurrent subtree delete can remove the parent between the depth check and the insert.
fn is_missing_parent(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Inserts a comment without a parent and returns its id.
    async fn insert_root(&self, content: &str) -> Result<i64, sqlx::Error>;

    /// Inserts a reply to `parent_id`, unless the reply would sit deeper than
    /// `max_depth` levels (a thread root is level 1).
    async fn insert_reply(
        &self,
        parent_id: i64,
        content: &str,
        max_depth: u32,
    ) -> Result<ReplyOutcome, sqlx::Error>;

    /// All rows, ascending by id.
    async fn select_all(&self) -> Result<Vec<CommentRow>, sqlx::Error>;

    /// Row `id` plus every transitive descendant, ascending by id.
    /// Empty when `id` does not exist.
    async fn select_subtree(&self, id: i64) -> Result<Vec<CommentRow>, sqlx::Error>;

    /// Atomically removes row `id` and every transitive descendant.
    /// Returns the number of rows removed; 0 when `id` does not exist.
    async fn delete_subtree(&self, id: i64) -> Result<u64, sqlx::Error>;

    async fn close(&self);
}

/// Connects to the store named by `config.database_url` and applies migrations.
///
/// `sqlite:` URLs select the SQLite backend, anything else is treated as Postgres.
/// Connection attempts are retried while the database comes up.
pub async fn connect(config: &Config) -> Result<Arc<dyn CommentStore>, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        let attempt: Result<Arc<dyn CommentStore>, sqlx::Error> = if is_sqlite_url(&config.database_url) {
            SqliteCommentStore::connect(&config.database_url, config.max_connections)
                .await
                .map(|store| Arc::new(store) as Arc<dyn CommentStore>)
        } else {
            PgCommentStore::connect(&config.database_url, config.max_connections)
                .await
                .map(|store| Arc::new(store) as Arc<dyn CommentStore>)
        };

        match attempt {
            Ok(store) => return Ok(store),
            // A broken migration will not fix itself by waiting.
            Err(e @ sqlx::Error::Migrate(_)) => return Err(e),
            Err(e) => {
                retry_count += 1;
                if retry_count > CONNECT_RETRIES {
                    tracing::error!("Failed to connect to database after {} retries", CONNECT_RETRIES);
                    return Err(e);
                }
                tracing::warn!(
                    "Database not ready, retrying in 2s... (Attempt {}): {}",
                    retry_count,
                    e
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

fn is_sqlite_url(url: &str) -> bool {
    url.starts_with("sqlite:")
}
