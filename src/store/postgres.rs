// src/store/postgres.rs

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};

use super::{CommentStore, ReplyOutcome, is_missing_parent};
use crate::models::comment::CommentRow;

/// Postgres-backed comment store.
#[derive(Clone)]
pub struct PgCommentStore {
    pool: PgPool,
}

impl PgCommentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool and runs the Postgres migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;

        tracing::info!("Database connected, running migrations...");
        sqlx::migrate!("./migrations/postgres").run(&pool).await?;
        tracing::info!("Migrations applied successfully.");

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl CommentStore for PgCommentStore {
    async fn insert_root(&self, content: &str) -> Result<i64, sqlx::Error> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO comments (content)
            VALUES ($1)
            RETURNING id
            "#,
        )
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn insert_reply(
        &self,
        parent_id: i64,
        content: &str,
        max_depth: u32,
    ) -> Result<ReplyOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Lock the parent so a concurrent subtree delete cannot remove it under us.
        sqlx::query("SELECT id FROM comments WHERE id = $1 FOR SHARE")
            .bind(parent_id)
            .execute(&mut *tx)
            .await?;

        // Depth of the parent (thread root = 1), walking no further than `max_depth` levels up.
        let parent_depth = sqlx::query_scalar::<_, Option<i64>>(
            r#"
            WITH RECURSIVE ancestors AS (
                SELECT id, answer_at, 1::BIGINT AS depth FROM comments WHERE id = $1
                UNION ALL
                SELECT c.id, c.answer_at, a.depth + 1
                FROM comments c
                JOIN ancestors a ON c.id = a.answer_at
                WHERE a.depth < $2
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
            r#"
            INSERT INTO comments (content, answer_at)
            VALUES ($1, $2)
            RETURNING id
            "#,
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
            WITH RECURSIVE subtree AS (
                SELECT id, content, answer_at FROM comments WHERE id = $1
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
        let removed = sqlx::query(
            r#"
            WITH RECURSIVE subtree AS (
                SELECT id FROM comments WHERE id = $1
                UNION
                SELECT c.id
                FROM comments c
                JOIN subtree s ON c.answer_at = s.id
            )
            DELETE FROM comments
            WHERE id IN (SELECT id FROM subtree)
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(removed)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
