// src/store/sqlite.rs

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use super::{CommentStore, ReplyOutcome, is_missing_parent};
use crate::models::comment::CommentRow;

/// SQLite-backed comment store.
#[derive(Clone)]
pub struct SqliteCommentStore {
    pool: SqlitePool,
}

impl SqliteCommentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool (creating the database file if needed) and runs the SQLite migrations.
    ///
    /// An in-memory database lives only as long as its connection, so it is pinned
    /// to a single connection that is never recycled.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = if database_url.contains(":memory:") || database_url.contains("mode=memory") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(options)
                .await?
        };

        tracing::info!("Database connected, running migrations...");
        sqlx::migrate!("./migrations/sqlite").run(&pool).await?;
        tracing::info!("Migrations applied successfully.");

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl CommentStore for SqliteCommentStore {
    async fn insert_root(&self, content: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("INSERT INTO comments (content) VALUES (?) RETURNING id")
            .bind(content)
            .fetch_one(&self.pool)
            .await
    }

    async fn insert_reply(
        &self,
        parent_id: i64,
        content: &str,
        max_depth: u32,
    ) -> Result<ReplyOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Depth of the parent (thread root = 1), walking no further than `max_depth` levels up.
        let parent_depth = sqlx::query_scalar::<_, Option<i64>>(
            r#"
            WITH RECURSIVE ancestors(id, answer_at, depth) AS (
                SELECT id, answer_at, 1 FROM comments WHERE id = ?
                UNION ALL
                SELECT c.id, c.answer_at, a.depth + 1
                FROM comments c
                JOIN ancestors a ON c.id = a.answer_at
                WHERE a.depth < ?
            )
            SELECT MAX(depth) FROM ancestors
            "#,
        )
        .bind(parent_id)
        .bind(i64::from(max_depth))
        .fetch_one(&mut *tx)
        .await?;

        if let Some(rejected) = ReplyOutcome::rejection(parent_depth, max_depth) {
            return Ok(rejected);
        }

        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO comments (content, answer_at) VALUES (?, ?) RETURNING id",
        )
        .bind(content)
        .bind(parent_id)
        .fetch_one(&mut *tx)
        .await;

        let id = match inserted {
            Ok(id) => id,
            Err(e) if is_missing_parent(&e) => return Ok(ReplyOutcome::ParentMissing),
            Err(e) => return Err(e),
        };

        tx.commit().await?;

        Ok(ReplyOutcome::Created(id))
    }

    async fn select_all(&self) -> Result<Vec<CommentRow>, sqlx::Error> {
        sqlx::query_as::<_, CommentRow>("SELECT id, content, answer_at FROM comments ORDER BY id")
            .fetch_all(&self.pool)
            .await
    }

    async fn select_subtree(&self, id: i64) -> Result<Vec<CommentRow>, sqlx::Error> {
        sqlx::query_as::<_, CommentRow>(
            r#"
            WITH RECURSIVE subtree(id, content, answer_at) AS (
                SELECT id, content, answer_at FROM comments WHERE id = ?
                UNION
                SELECT c.id, c.content, c.answer_at
                FROM comments c
                JOIN subtree s ON c.answer_at = s.id
            )
            SELECT id, content, answer_at FROM subtree
            ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
    }

    async fn delete_subtree(&self, id: i64) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // The change counter skips cascaded rows, so count the subtree up front.
        let size = sqlx::query_scalar::<_, i64>(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT id FROM comments WHERE id = ?
                UNION
                SELECT c.id FROM comments c JOIN subtree s ON c.answer_at = s.id
            )
            SELECT COUNT(*) FROM subtree
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if size == 0 {
            return Ok(0);
        }

        sqlx::query(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT id FROM comments WHERE id = ?
                UNION
                SELECT c.id FROM comments c JOIN subtree s ON c.answer_at = s.id
            )
            DELETE FROM comments
            WHERE id IN (SELECT id FROM subtree)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(size as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_DEPTH: u32 = 64;

    async fn reply(store: &SqliteCommentStore, parent_id: i64, content: &str) -> i64 {
        match store.insert_reply(parent_id, content, MAX_DEPTH).await.unwrap() {
            ReplyOutcome::Created(id) => id,
            other => panic!("reply to {} was not created: {:?}", parent_id, other),
        }
    }

    async fn memory_store() -> SqliteCommentStore {
        SqliteCommentStore::connect("sqlite::memory:", 1)
            .await
            .expect("Failed to open in-memory SQLite store")
    }

    #[tokio::test]
    async fn ids_are_positive_and_distinct() {
        let store = memory_store().await;

        let root = store.insert_root("hello").await.unwrap();
        let answer = reply(&store, root, "hi").await;

        assert!(root > 0);
        assert!(answer > 0);
        assert_ne!(root, answer);
    }

    #[tokio::test]
    async fn reply_to_missing_parent_is_rejected() {
        let store = memory_store().await;

        assert_eq!(
            store.insert_reply(42, "hi", MAX_DEPTH).await.unwrap(),
            ReplyOutcome::ParentMissing
        );
        assert!(store.select_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subtree_contains_node_and_all_descendants() {
        let store = memory_store().await;

        let a = store.insert_root("a").await.unwrap();
        let b = reply(&store, a, "b").await;
        let c = reply(&store, b, "c").await;
        let other = store.insert_root("other").await.unwrap();

        let rows = store.select_subtree(b).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b, c]);
        assert_eq!(rows[0].answer_at, Some(a));

        let all: Vec<i64> = store.select_all().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(all, vec![a, b, c, other]);

        assert!(store.select_subtree(9999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_whole_subtree_only() {
        let store = memory_store().await;

        let a = store.insert_root("a").await.unwrap();
        let b = reply(&store, a, "b").await;
        reply(&store, b, "c").await;
        reply(&store, a, "d").await;
        let other = store.insert_root("other").await.unwrap();

        assert_eq!(store.delete_subtree(a).await.unwrap(), 4);
        assert_eq!(store.delete_subtree(a).await.unwrap(), 0);

        let remaining: Vec<i64> = store.select_all().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(remaining, vec![other]);
    }

    #[tokio::test]
    async fn deleted_ids_are_not_reused() {
        let store = memory_store().await;

        let first = store.insert_root("a").await.unwrap();
        store.delete_subtree(first).await.unwrap();
        let second = store.insert_root("b").await.unwrap();

        assert!(second > first);
    }

    #[tokio::test]
    async fn reply_below_depth_limit_is_rejected() {
        let store = memory_store().await;

        let mut parent = store.insert_root("level 1").await.unwrap();
        for level in 2..=3 {
            parent = match store.insert_reply(parent, "deeper", 3).await.unwrap() {
                ReplyOutcome::Created(id) => id,
                other => panic!("level {} was not created: {:?}", level, other),
            };
        }

        assert_eq!(
            store.insert_reply(parent, "too deep", 3).await.unwrap(),
            ReplyOutcome::TooDeep
        );
        assert_eq!(store.select_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn dangling_parent_insert_is_classified_as_missing_parent() {
        let store = memory_store().await;

        // Insert directly against a dangling parent to exercise the constraint path.
        let err = sqlx::query("INSERT INTO comments (content, answer_at) VALUES ('x', 999)")
            .execute(&store.pool)
            .await
            .unwrap_err();

        assert!(is_missing_parent(&err));
    }
}
