pub mod json;
pub mod memory;
pub mod postgres;

pub use json::JsonStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::models::{Comment, Review, ReviewDraft};
use crate::votes::VoteDelta;

/// A value together with the store version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Result of a version-checked commit
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The delta was applied; carries the new state
    Committed(Versioned<Review>),
    /// The document changed since it was read
    VersionConflict,
    /// The document no longer exists
    NotFound,
}

/// Transactional document store holding review records.
///
/// `commit_if_version` must apply the whole delta or nothing, and only when the
/// stored version still equals `version`. Every successful commit or edit bumps the
/// version.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a review and its current version
    async fn read(&self, id: &Uuid) -> Result<Option<Versioned<Review>>, StoreError>;

    /// Apply a vote delta if the review is still at `version`
    async fn commit_if_version(
        &self,
        id: &Uuid,
        version: u64,
        delta: &VoteDelta,
    ) -> Result<CommitOutcome, StoreError>;

    /// Insert a new review
    async fn insert(&self, review: &Review) -> Result<(), StoreError>;

    /// Replace the author-editable fields of a review, leaving its votes alone.
    /// Returns `None` when the review does not exist.
    async fn update_details(
        &self,
        id: &Uuid,
        draft: &ReviewDraft,
    ) -> Result<Option<Versioned<Review>>, StoreError>;

    /// Delete a review, returning whether it existed
    async fn delete(&self, id: &Uuid) -> Result<bool, StoreError>;

    /// List every stored review
    async fn list(&self) -> Result<Vec<Review>, StoreError>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn read(&self, id: &Uuid) -> Result<Option<Versioned<Review>>, StoreError> {
        (**self).read(id).await
    }

    async fn commit_if_version(
        &self,
        id: &Uuid,
        version: u64,
        delta: &VoteDelta,
    ) -> Result<CommitOutcome, StoreError> {
        (**self).commit_if_version(id, version, delta).await
    }

    async fn insert(&self, review: &Review) -> Result<(), StoreError> {
        (**self).insert(review).await
    }

    async fn update_details(
        &self,
        id: &Uuid,
        draft: &ReviewDraft,
    ) -> Result<Option<Versioned<Review>>, StoreError> {
        (**self).update_details(id, draft).await
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, StoreError> {
        (**self).delete(id).await
    }

    async fn list(&self) -> Result<Vec<Review>, StoreError> {
        (**self).list().await
    }
}

/// Per-review comment threads. Deleting a review drops its comments.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Append a comment, returning `false` when its review does not exist
    async fn add_comment(&self, comment: &Comment) -> Result<bool, StoreError>;

    /// Comments on a review, newest first
    async fn list_comments(&self, review_id: &Uuid) -> Result<Vec<Comment>, StoreError>;
}

#[async_trait]
impl<S: CommentStore + ?Sized> CommentStore for Arc<S> {
    async fn add_comment(&self, comment: &Comment) -> Result<bool, StoreError> {
        (**self).add_comment(comment).await
    }

    async fn list_comments(&self, review_id: &Uuid) -> Result<Vec<Comment>, StoreError> {
        (**self).list_comments(review_id).await
    }
}

/// A backend holding both reviews and their comments
pub trait ReviewStore: DocumentStore + CommentStore {}

impl<T: DocumentStore + CommentStore + ?Sized> ReviewStore for T {}

/// Newest first; among equal timestamps the later insert wins
pub(crate) fn newest_first(comments: &[Comment]) -> Vec<Comment> {
    let mut ordered: Vec<Comment> = comments.iter().rev().cloned().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    ordered
}

/// Open the backend selected by configuration
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn ReviewStore>> {
    match config.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory store, data will not outlive this process");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Json => {
            let store = JsonStore::new(&config.path)?;
            Ok(Arc::new(store))
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .clone()
                .or_else(|| std::env::var("DATABASE_URL").ok())
                .context("postgres backend needs store.database_url or DATABASE_URL")?;
            let store = PostgresStore::new(&url).await?;
            store.migrate().await?;
            info!("Opened postgres store");
            Ok(Arc::new(store))
        }
    }
}
