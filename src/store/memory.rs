use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{newest_first, CommentStore, CommitOutcome, DocumentStore, Versioned};
use crate::error::StoreError;
use crate::models::{Comment, Review, ReviewDraft};
use crate::votes::VoteDelta;

/// In-process store, used for tests and embedding
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<Uuid, Versioned<Review>>>,
    // Always locked after `docs`
    comments: RwLock<HashMap<Uuid, Vec<Comment>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, id: &Uuid) -> Result<Option<Versioned<Review>>, StoreError> {
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn commit_if_version(
        &self,
        id: &Uuid,
        version: u64,
        delta: &VoteDelta,
    ) -> Result<CommitOutcome, StoreError> {
        let mut docs = self.docs.write().await;
        let Some(doc) = docs.get_mut(id) else {
            return Ok(CommitOutcome::NotFound);
        };

        if doc.version != version {
            debug!(id = %id, expected = version, actual = doc.version, "Version conflict");
            return Ok(CommitOutcome::VersionConflict);
        }

        delta.apply_to(&mut doc.value);
        doc.version += 1;

        Ok(CommitOutcome::Committed(doc.clone()))
    }

    async fn insert(&self, review: &Review) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        if docs.contains_key(&review.id) {
            return Err(StoreError::AlreadyExists(review.id));
        }
        docs.insert(
            review.id,
            Versioned {
                version: 1,
                value: review.clone(),
            },
        );
        Ok(())
    }

    async fn update_details(
        &self,
        id: &Uuid,
        draft: &ReviewDraft,
    ) -> Result<Option<Versioned<Review>>, StoreError> {
        let mut docs = self.docs.write().await;
        let Some(doc) = docs.get_mut(id) else {
            return Ok(None);
        };

        doc.value.apply_draft(draft);
        doc.version += 1;

        Ok(Some(doc.clone()))
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, StoreError> {
        let mut docs = self.docs.write().await;
        let removed = docs.remove(id).is_some();
        self.comments.write().await.remove(id);
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<Review>, StoreError> {
        Ok(self
            .docs
            .read()
            .await
            .values()
            .map(|doc| doc.value.clone())
            .collect())
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn add_comment(&self, comment: &Comment) -> Result<bool, StoreError> {
        let docs = self.docs.read().await;
        if !docs.contains_key(&comment.review_id) {
            return Ok(false);
        }

        self.comments
            .write()
            .await
            .entry(comment.review_id)
            .or_default()
            .push(comment.clone());
        Ok(true)
    }

    async fn list_comments(&self, review_id: &Uuid) -> Result<Vec<Comment>, StoreError> {
        Ok(self
            .comments
            .read()
            .await
            .get(review_id)
            .map(|thread| newest_first(thread))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sample_draft, Vote, VoteState};
    use crate::votes::transition;

    #[tokio::test]
    async fn test_commit_bumps_version() {
        let store = MemoryStore::new();
        let review = Review::from_draft(sample_draft(), "author");
        store.insert(&review).await.unwrap();

        let delta = transition(VoteState::None, Vote::Upvote).delta("alice");
        let outcome = store.commit_if_version(&review.id, 1, &delta).await.unwrap();

        match outcome {
            CommitOutcome::Committed(doc) => {
                assert_eq!(doc.version, 2);
                assert_eq!(doc.value.upvotes, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = MemoryStore::new();
        let review = Review::from_draft(sample_draft(), "author");
        store.insert(&review).await.unwrap();

        let delta = transition(VoteState::None, Vote::Upvote).delta("alice");
        store.commit_if_version(&review.id, 1, &delta).await.unwrap();
        let outcome = store.commit_if_version(&review.id, 1, &delta).await.unwrap();

        assert_eq!(outcome, CommitOutcome::VersionConflict);
        let current = store.read(&review.id).await.unwrap().unwrap();
        assert_eq!(current.value.upvotes, 1);
    }

    #[tokio::test]
    async fn test_missing_review() {
        let store = MemoryStore::new();
        let delta = transition(VoteState::None, Vote::Downvote).delta("alice");
        let outcome = store
            .commit_if_version(&Uuid::new_v4(), 1, &delta)
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_update_details_keeps_votes() {
        let store = MemoryStore::new();
        let review = Review::from_draft(sample_draft(), "author");
        store.insert(&review).await.unwrap();
        let delta = transition(VoteState::None, Vote::Upvote).delta("alice");
        store.commit_if_version(&review.id, 1, &delta).await.unwrap();

        let mut draft = review.to_draft();
        draft.title = "Dune Part Two (IMAX)".to_string();
        let updated = store.update_details(&review.id, &draft).await.unwrap().unwrap();

        assert_eq!(updated.version, 3);
        assert_eq!(updated.value.title, "Dune Part Two (IMAX)");
        assert_eq!(updated.value.upvotes, 1);
        assert!(updated.value.upvoted_by.contains("alice"));

        // A vote read before the edit must retry
        let outcome = store.commit_if_version(&review.id, 2, &delta).await.unwrap();
        assert_eq!(outcome, CommitOutcome::VersionConflict);

        assert!(store
            .update_details(&Uuid::new_v4(), &draft)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_comments_follow_their_review() {
        let store = MemoryStore::new();
        let review = Review::from_draft(sample_draft(), "author");
        store.insert(&review).await.unwrap();

        let first = Comment::new(review.id, "alice", "first");
        let second = Comment::new(review.id, "bob", "second");
        assert!(store.add_comment(&first).await.unwrap());
        assert!(store.add_comment(&second).await.unwrap());
        assert!(!store
            .add_comment(&Comment::new(Uuid::new_v4(), "bob", "orphan"))
            .await
            .unwrap());

        let thread = store.list_comments(&review.id).await.unwrap();
        assert_eq!(thread, vec![second, first]);

        store.delete(&review.id).await.unwrap();
        assert!(store.list_comments(&review.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryStore::new();
        let review = Review::from_draft(sample_draft(), "author");
        store.insert(&review).await.unwrap();

        let err = store.insert(&review).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == review.id));
    }
}
