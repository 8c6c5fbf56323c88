use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{newest_first, CommentStore, CommitOutcome, DocumentStore, Versioned};
use crate::error::StoreError;
use crate::models::{Category, Comment, Review, ReviewDraft};
use crate::votes::VoteDelta;

/// JSON file-based store, one document per review and one comment thread file per
/// commented review.
///
/// Writes go through a temp file and a rename so readers never observe a partial
/// document. Version checks are serialized by an in-process lock, so a directory
/// must not be shared by several processes writing at once.
pub struct JsonStore {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredReview {
    version: u64,
    review: Review,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ReviewIndex {
    reviews: Vec<ReviewIndexEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReviewIndexEntry {
    id: Uuid,
    category: Category,
    author_id: String,
}

impl JsonStore {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(base_path.join("comments"))
            .with_context(|| format!("Failed to create store directory: {}", base_path.display()))?;

        info!(path = %base_path.display(), "Initialized JSON store");

        Ok(Self {
            base_path,
            write_lock: Mutex::new(()),
        })
    }

    fn review_path(&self, id: &Uuid) -> PathBuf {
        self.base_path.join(format!("{}.json", id))
    }

    fn comments_path(&self, review_id: &Uuid) -> PathBuf {
        self.base_path
            .join("comments")
            .join(format!("{}.json", review_id))
    }

    fn index_path(&self) -> PathBuf {
        self.base_path.join("index.json")
    }

    fn load_index(&self) -> Result<ReviewIndex, StoreError> {
        match read_optional(&self.index_path())? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(ReviewIndex::default()),
        }
    }

    fn save_index(&self, index: &ReviewIndex) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(index)?;
        write_atomic(&self.index_path(), &content)
    }

    fn load_doc(&self, id: &Uuid) -> Result<Option<StoredReview>, StoreError> {
        let Some(content) = read_optional(&self.review_path(id))? else {
            return Ok(None);
        };

        let doc: StoredReview = serde_json::from_str(&content)?;
        if doc.review.id != *id {
            return Err(StoreError::Corrupt {
                id: *id,
                message: format!("file holds review {}", doc.review.id),
            });
        }

        Ok(Some(doc))
    }

    fn save_doc(&self, doc: &StoredReview) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(doc)?;
        write_atomic(&self.review_path(&doc.review.id), &content)
    }

    /// Comment thread in insertion order
    fn load_comments(&self, review_id: &Uuid) -> Result<Vec<Comment>, StoreError> {
        match read_optional(&self.comments_path(review_id))? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(Vec::new()),
        }
    }
}

/// A file removed between listing and reading counts as absent
fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_present(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl DocumentStore for JsonStore {
    async fn read(&self, id: &Uuid) -> Result<Option<Versioned<Review>>, StoreError> {
        Ok(self.load_doc(id)?.map(|doc| Versioned {
            version: doc.version,
            value: doc.review,
        }))
    }

    async fn commit_if_version(
        &self,
        id: &Uuid,
        version: u64,
        delta: &VoteDelta,
    ) -> Result<CommitOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;

        let Some(mut doc) = self.load_doc(id)? else {
            return Ok(CommitOutcome::NotFound);
        };

        if doc.version != version {
            debug!(id = %id, expected = version, actual = doc.version, "Version conflict");
            return Ok(CommitOutcome::VersionConflict);
        }

        delta.apply_to(&mut doc.review);
        doc.version += 1;
        self.save_doc(&doc)?;

        debug!(id = %id, version = doc.version, "Committed vote delta");

        Ok(CommitOutcome::Committed(Versioned {
            version: doc.version,
            value: doc.review,
        }))
    }

    async fn insert(&self, review: &Review) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        if self.review_path(&review.id).exists() {
            return Err(StoreError::AlreadyExists(review.id));
        }

        self.save_doc(&StoredReview {
            version: 1,
            review: review.clone(),
        })?;

        let mut index = self.load_index()?;
        index.reviews.retain(|r| r.id != review.id);
        index.reviews.push(ReviewIndexEntry {
            id: review.id,
            category: review.category,
            author_id: review.author_id.clone(),
        });
        self.save_index(&index)?;

        debug!(id = %review.id, "Saved review to store");

        Ok(())
    }

    async fn update_details(
        &self,
        id: &Uuid,
        draft: &ReviewDraft,
    ) -> Result<Option<Versioned<Review>>, StoreError> {
        let _guard = self.write_lock.lock().await;

        let Some(mut doc) = self.load_doc(id)? else {
            return Ok(None);
        };

        doc.review.apply_draft(draft);
        doc.version += 1;
        self.save_doc(&doc)?;

        let mut index = self.load_index()?;
        if let Some(entry) = index.reviews.iter_mut().find(|r| r.id == *id) {
            entry.category = doc.review.category;
            self.save_index(&index)?;
        }

        debug!(id = %id, version = doc.version, "Updated review details");

        Ok(Some(Versioned {
            version: doc.version,
            value: doc.review,
        }))
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;

        let existed = remove_if_present(&self.review_path(id))?;
        remove_if_present(&self.comments_path(id))?;

        let mut index = self.load_index()?;
        let before = index.reviews.len();
        index.reviews.retain(|r| r.id != *id);
        if index.reviews.len() != before {
            self.save_index(&index)?;
        }

        Ok(existed)
    }

    async fn list(&self) -> Result<Vec<Review>, StoreError> {
        let index = self.load_index()?;

        let mut reviews = Vec::new();
        for entry in &index.reviews {
            if let Some(doc) = self.load_doc(&entry.id)? {
                reviews.push(doc.review);
            }
        }

        Ok(reviews)
    }
}

#[async_trait]
impl CommentStore for JsonStore {
    async fn add_comment(&self, comment: &Comment) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;

        if self.load_doc(&comment.review_id)?.is_none() {
            return Ok(false);
        }

        let mut thread = self.load_comments(&comment.review_id)?;
        thread.push(comment.clone());
        let content = serde_json::to_string_pretty(&thread)?;
        write_atomic(&self.comments_path(&comment.review_id), &content)?;

        debug!(review = %comment.review_id, comment = %comment.id, "Saved comment");

        Ok(true)
    }

    async fn list_comments(&self, review_id: &Uuid) -> Result<Vec<Comment>, StoreError> {
        Ok(newest_first(&self.load_comments(review_id)?))
    }
}
