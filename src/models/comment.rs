use serde::{Deserialize, Deserializer, Serialize, de};
use sqlx::FromRow;
use validator::Validate;

/// Represents one row of the 'comments' table.
/// `answer_at` is the id of the comment being replied to; `None` for a thread root.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CommentRow {
    pub id: i64,
    pub content: String,
    pub answer_at: Option<i64>,
}

impl CommentRow {
    /// The parent reference, with zero and negative values read as "no parent".
    pub fn parent_id(&self) -> Option<i64> {
        self.answer_at.filter(|id| *id > 0)
    }
}

/// A comment with its replies nested under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    pub id: i64,
    pub content: String,
    pub answer_at: Option<i64>,
    /// Direct replies, ascending by id.
    pub children: Vec<CommentNode>,
}

/// Unlinks descendants onto a heap stack so dropping a deep thread does not recurse.
impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

impl From<CommentRow> for CommentNode {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            content: row.content,
            answer_at: row.answer_at,
            children: Vec::new(),
        }
    }
}

/// DTO for creating a new comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(
        length(
            min = 1,
            max = 2000,
            message = "Comment must be between 1 and 2000 characters"
        ),
        custom(function = validate_not_blank)
    )]
    pub content: String,

    /// Optional: the ID of the comment being replied to. 0 starts a new thread.
    #[serde(default)]
    pub id: i64,
}

/// Query parameters for fetching a comment tree.
#[derive(Debug, Deserialize)]
pub struct CommentTreeParams {
    /// Root of the subtree to fetch. Absent, empty or 0 returns the whole forest.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub parent: Option<i64>,
}

/// `?parent=` with no value reads the same as leaving the parameter out.
fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match Option::<String>::deserialize(deserializer)?.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("parent must be an integer, got {:?}", raw))),
    }
}

fn validate_not_blank(content: &str) -> Result<(), validator::ValidationError> {
    if content.trim().is_empty() {
        let mut err = validator::ValidationError::new("blank");
        err.message = Some("Comment must not be blank".into());
        return Err(err);
    }
    Ok(())
}
