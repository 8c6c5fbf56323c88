use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{FieldError, ReviewError};
use crate::models::{Category, Review, ReviewDraft};
use crate::store::DocumentStore;

const MIN_TITLE_CHARS: usize = 5;
const MIN_CONTENT_CHARS: usize = 50;
const MIN_GENRE_CHARS: usize = 2;
const MIN_RATING: f64 = 0.5;
const MAX_RATING: f64 = 5.0;
const MIN_YEAR: i32 = 1800;

/// Trimmed identity of the signed-in user
pub(crate) fn signed_in(user_id: Option<&str>) -> Result<&str, ReviewError> {
    match user_id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(ReviewError::Unauthenticated),
    }
}

impl ReviewDraft {
    /// Check every field, collecting all failures
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut fail = |field: &'static str, message: String| {
            errors.push(FieldError { field, message });
        };

        if self.title.trim().chars().count() < MIN_TITLE_CHARS {
            fail("title", format!("must be at least {} characters", MIN_TITLE_CHARS));
        }
        if self.content.trim().chars().count() < MIN_CONTENT_CHARS {
            fail("content", format!("must be at least {} characters", MIN_CONTENT_CHARS));
        }
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            fail("rating", format!("must be between {} and {}", MIN_RATING, MAX_RATING));
        }

        let max_year = Utc::now().year() + 1;
        if !(MIN_YEAR..=max_year).contains(&self.year) {
            fail("year", format!("must be between {} and {}", MIN_YEAR, max_year));
        }
        if self.genre.trim().chars().count() < MIN_GENRE_CHARS {
            fail("genre", "is required".to_string());
        }
        match reqwest::Url::parse(&self.image_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => fail("image_url", "must be a valid http(s) URL".to_string()),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Filters applied when browsing reviews
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewFilter {
    pub category: Option<Category>,
    pub genre: Option<String>,
    pub min_rating: Option<f64>,
    pub year: Option<i32>,
    pub author_id: Option<String>,
    pub search: Option<String>,
}

impl ReviewFilter {
    pub fn matches(&self, review: &Review) -> bool {
        if self.category.is_some_and(|c| c != review.category) {
            return false;
        }
        if let Some(genre) = &self.genre {
            if !review.genre.eq_ignore_ascii_case(genre) {
                return false;
            }
        }
        if self.min_rating.is_some_and(|min| review.rating < min) {
            return false;
        }
        if self.year.is_some_and(|y| y != review.year) {
            return false;
        }
        if let Some(author) = &self.author_id {
            if &review.author_id != author {
                return false;
            }
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            if !review.title.to_lowercase().contains(&term)
                && !review.content.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        true
    }
}

/// Ordering for review listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSort {
    #[default]
    Newest,
    TopRated,
    MostUpvoted,
}

impl std::str::FromStr for ReviewSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(ReviewSort::Newest),
            "top_rated" | "top-rated" => Ok(ReviewSort::TopRated),
            "most_upvoted" | "most-upvoted" | "popular" => Ok(ReviewSort::MostUpvoted),
            other => Err(format!(
                "unknown sort '{}', expected newest|top_rated|most_upvoted",
                other
            )),
        }
    }
}

/// Review authoring and browsing on top of a document store
pub struct ReviewService<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> ReviewService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validate and publish a new review for the signed-in author
    pub async fn create(
        &self,
        draft: ReviewDraft,
        author_id: Option<&str>,
    ) -> Result<Review, ReviewError> {
        let author_id = signed_in(author_id)?;

        draft.validate().map_err(ReviewError::Invalid)?;

        let review = Review::from_draft(draft, author_id);
        self.store.insert(&review).await?;

        info!(id = %review.id, author = %author_id, category = %review.category, "Review created");

        Ok(review)
    }

    pub async fn get(&self, id: &Uuid) -> Result<Option<Review>, ReviewError> {
        Ok(self.store.read(id).await?.map(|doc| doc.value))
    }

    /// Save the author's edits. Votes are never touched by an edit.
    pub async fn update(
        &self,
        id: &Uuid,
        draft: ReviewDraft,
        editor_id: Option<&str>,
    ) -> Result<Review, ReviewError> {
        let editor_id = signed_in(editor_id)?;
        self.owned_by(id, editor_id)
            .await?
            .ok_or(ReviewError::NotFound(*id))?;

        draft.validate().map_err(ReviewError::Invalid)?;

        let updated = self
            .store
            .update_details(id, &draft)
            .await?
            .ok_or(ReviewError::NotFound(*id))?;

        info!(id = %id, version = updated.version, "Review updated");

        Ok(updated.value)
    }

    /// Remove a review on behalf of its author. Vote data and comments go with it.
    /// Returns `false` when there was nothing to delete.
    pub async fn delete(&self, id: &Uuid, requester_id: Option<&str>) -> Result<bool, ReviewError> {
        let requester_id = signed_in(requester_id)?;
        if self.owned_by(id, requester_id).await?.is_none() {
            return Ok(false);
        }

        let removed = self.store.delete(id).await?;
        if removed {
            info!(id = %id, "Review deleted");
        }
        Ok(removed)
    }

    /// The review, if it exists and `user_id` wrote it
    async fn owned_by(&self, id: &Uuid, user_id: &str) -> Result<Option<Review>, ReviewError> {
        let Some(doc) = self.store.read(id).await? else {
            return Ok(None);
        };
        if doc.value.author_id != user_id {
            warn!(id = %id, user = %user_id, "Rejected change by non-author");
            return Err(ReviewError::Forbidden(*id));
        }
        Ok(Some(doc.value))
    }

    pub async fn list(
        &self,
        filter: &ReviewFilter,
        sort: ReviewSort,
    ) -> Result<Vec<Review>, ReviewError> {
        let mut reviews: Vec<Review> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();

        match sort {
            ReviewSort::Newest => reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ReviewSort::TopRated => reviews.sort_by(|a, b| {
                b.rating
                    .total_cmp(&a.rating)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
            ReviewSort::MostUpvoted => reviews.sort_by(|a, b| {
                b.upvotes
                    .cmp(&a.upvotes)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
        }

        Ok(reviews)
    }

    /// Get the store for direct access
    pub fn store(&self) -> &S {
        &self.store
    }
}
