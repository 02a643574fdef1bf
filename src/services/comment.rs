// src/services/comment.rs

use std::{future::Future, sync::Arc, time::Duration};

use crate::{
    error::AppError,
    models::comment::CommentNode,
    store::{CommentStore, ReplyOutcome},
    utils::tree::build_forest,
};

/// Thread depth used unless `with_max_depth` says otherwise.
pub const DEFAULT_MAX_DEPTH: u32 = 100;

/// Comment operations on top of a [`CommentStore`].
///
/// Every store call runs under `timeout`; when it expires the call is dropped
/// (which aborts the in-flight query) and the caller gets `AppError::Timeout`.
/// Replies are refused below `max_depth` levels, which keeps every tree this
/// service hands out shallow enough to serialize and drop on a worker stack.
#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn CommentStore>,
    timeout: Duration,
    max_depth: u32,
}

impl CommentService {
    pub fn new(store: Arc<dyn CommentStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Creates a thread root (`parent_id <= 0`) or a reply, returning the new id.
    pub async fn create_comment(&self, content: &str, parent_id: i64) -> Result<i64, AppError> {
        if content.trim().is_empty() {
            return Err(AppError::BadRequest("Comment must not be blank".to_string()));
        }

        let id = if parent_id <= 0 {
            self.bounded("insert_root", self.store.insert_root(content))
                .await?
        } else {
            let outcome = self
                .bounded(
                    "insert_reply",
                    self.store.insert_reply(parent_id, content, self.max_depth),
                )
                .await?;
            match outcome {
                ReplyOutcome::Created(id) => id,
                ReplyOutcome::ParentMissing => {
                    return Err(AppError::NotFound("Parent comment not found".to_string()));
                }
                ReplyOutcome::TooDeep => {
                    return Err(AppError::BadRequest(format!(
                        "Replies cannot be nested deeper than {} levels",
                        self.max_depth
                    )));
                }
            }
        };

        tracing::info!(id, parent_id, "comment created");
        Ok(id)
    }

    /// Returns the whole forest when `parent_id <= 0`, otherwise the subtree rooted at `parent_id`.
    pub async fn comment_tree(&self, parent_id: i64) -> Result<Vec<CommentNode>, AppError> {
        let rows = if parent_id <= 0 {
            self.bounded("select_all", self.store.select_all()).await?
        } else {
            let rows = self
                .bounded("select_subtree", self.store.select_subtree(parent_id))
                .await?;
            if rows.is_empty() {
                return Err(AppError::NotFound(format!("Comment {} not found", parent_id)));
            }
            rows
        };

        tracing::debug!(parent_id, rows = rows.len(), "assembling comment tree");
        Ok(build_forest(rows))
    }

    /// Returns comment `id` with all of its replies nested under it.
    pub async fn comment(&self, id: i64) -> Result<CommentNode, AppError> {
        if id <= 0 {
            return Err(AppError::NotFound(format!("Comment {} not found", id)));
        }

        self.comment_tree(id)
            .await?
            .into_iter()
            .find(|node| node.id == id)
            .ok_or(AppError::NotFound(format!("Comment {} not found", id)))
    }

    /// Deletes comment `id` together with every reply below it.
    pub async fn delete_subtree(&self, id: i64) -> Result<(), AppError> {
        let removed = self
            .bounded("delete_subtree", self.store.delete_subtree(id))
            .await?;

        if removed == 0 {
            return Err(AppError::NotFound(format!("Comment {} not found", id)));
        }

        tracing::info!(id, removed, "comment subtree deleted");
        Ok(())
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(op, "store call failed: {:?}", e);
                Err(e.into())
            }
            Err(_) => Err(AppError::Timeout(format!(
                "{} did not finish within {:?}",
                op, self.timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::comment::CommentRow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves fixed rows, optionally after a delay, and counts writes.
    #[derive(Default)]
    struct FakeStore {
        rows: Vec<CommentRow>,
        delay: Option<Duration>,
        writes: AtomicUsize,
    }

    impl FakeStore {
        async fn wait(&self) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl CommentStore for FakeStore {
        async fn insert_root(&self, _content: &str) -> Result<i64, sqlx::Error> {
            self.wait().await;
            Ok(self.writes.fetch_add(1, Ordering::SeqCst) as i64 + 1)
        }

        async fn insert_reply(
            &self,
            parent_id: i64,
            _content: &str,
            max_depth: u32,
        ) -> Result<ReplyOutcome, sqlx::Error> {
            self.wait().await;
            if !self.rows.iter().any(|r| r.id == parent_id) {
                return Ok(ReplyOutcome::ParentMissing);
            }
            // Every fixture row counts as a thread root.
            if max_depth < 2 {
                return Ok(ReplyOutcome::TooDeep);
            }
            Ok(ReplyOutcome::Created(
                self.writes.fetch_add(1, Ordering::SeqCst) as i64 + 100,
            ))
        }

        async fn select_all(&self) -> Result<Vec<CommentRow>, sqlx::Error> {
            self.wait().await;
            Ok(self.rows.clone())
        }

        async fn select_subtree(&self, id: i64) -> Result<Vec<CommentRow>, sqlx::Error> {
            self.wait().await;
            Ok(self.rows.iter().filter(|r| r.id >= id).cloned().collect())
        }

        async fn delete_subtree(&self, id: i64) -> Result<u64, sqlx::Error> {
            self.wait().await;
            Ok(self.rows.iter().filter(|r| r.id == id).count() as u64)
        }

        async fn close(&self) {}
    }

    fn row(id: i64, parent: Option<i64>) -> CommentRow {
        CommentRow {
            id,
            content: format!("c{}", id),
            answer_at: parent,
        }
    }

    fn service(store: FakeStore, timeout: Duration) -> (CommentService, Arc<FakeStore>) {
        let store = Arc::new(store);
        (CommentService::new(store.clone(), timeout), store)
    }

    #[tokio::test]
    async fn blank_content_never_reaches_store() {
        let (svc, store) = service(FakeStore::default(), Duration::from_secs(1));

        let result = svc.create_comment("   ", 0).await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_positive_parent_creates_root() {
        let (svc, store) = service(FakeStore::default(), Duration::from_secs(1));

        assert_eq!(svc.create_comment("a", 0).await.unwrap(), 1);
        assert_eq!(svc.create_comment("b", -5).await.unwrap(), 2);
        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reply_to_missing_parent_is_not_found() {
        let (svc, _) = service(FakeStore::default(), Duration::from_secs(1));

        let result = svc.create_comment("hi", 7).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn reply_past_depth_limit_is_bad_request() {
        let store = FakeStore {
            rows: vec![row(1, None)],
            ..Default::default()
        };
        let (svc, store) = service(store, Duration::from_secs(1));

        let svc = svc.with_max_depth(1);

        assert!(matches!(svc.create_comment("hi", 1).await, Err(AppError::BadRequest(_))));
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);

        let svc = svc.with_max_depth(2);
        assert_eq!(svc.create_comment("hi", 1).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn empty_full_forest_is_ok_but_missing_subtree_is_not_found() {
        let (svc, _) = service(FakeStore::default(), Duration::from_secs(1));

        assert!(svc.comment_tree(0).await.unwrap().is_empty());
        assert!(matches!(svc.comment_tree(3).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.comment(3).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.delete_subtree(3).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn subtree_root_is_promoted_even_with_parent_reference() {
        let store = FakeStore {
            rows: vec![row(1, None), row(2, Some(1)), row(3, Some(2))],
            ..Default::default()
        };
        let (svc, _) = service(store, Duration::from_secs(1));

        let forest = svc.comment_tree(2).await.unwrap();

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].id, 2);
        assert_eq!(forest[0].answer_at, Some(1));
        assert_eq!(forest[0].children[0].id, 3);

        let node = svc.comment(2).await.unwrap();
        assert_eq!(node, forest[0]);
    }

    #[tokio::test]
    async fn slow_store_surfaces_timeout() {
        let store = FakeStore {
            rows: vec![row(1, None)],
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let (svc, store) = service(store, Duration::from_millis(20));

        assert!(matches!(svc.comment_tree(0).await, Err(AppError::Timeout(_))));
        assert!(matches!(svc.create_comment("a", 0).await, Err(AppError::Timeout(_))));
        assert!(matches!(svc.delete_subtree(1).await, Err(AppError::Timeout(_))));
        // The aborted insert never completed.
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }
}
