use tracing::info;
use uuid::Uuid;

use crate::error::{FieldError, ReviewError};
use crate::models::Comment;
use crate::reviews::signed_in;
use crate::store::CommentStore;

/// Discussion threads under reviews
pub struct CommentService<S: CommentStore> {
    store: S,
}

impl<S: CommentStore> CommentService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Post a comment as the signed-in user
    pub async fn post(
        &self,
        review_id: &Uuid,
        author_id: Option<&str>,
        content: &str,
    ) -> Result<Comment, ReviewError> {
        let author_id = signed_in(author_id)?;

        let content = content.trim();
        if content.is_empty() {
            return Err(ReviewError::Invalid(vec![FieldError {
                field: "content",
                message: "must not be empty".to_string(),
            }]));
        }

        let comment = Comment::new(*review_id, author_id, content);
        if !self.store.add_comment(&comment).await? {
            return Err(ReviewError::NotFound(*review_id));
        }

        info!(review = %review_id, comment = %comment.id, author = %author_id, "Comment posted");

        Ok(comment)
    }

    /// Thread for a review, newest first
    pub async fn list(&self, review_id: &Uuid) -> Result<Vec<Comment>, ReviewError> {
        Ok(self.store.list_comments(review_id).await?)
    }
}
