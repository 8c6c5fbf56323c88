use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of work a review is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Movie,
    Book,
    Game,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Movie, Category::Book, Category::Game];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Movie => "movie",
            Category::Book => "book",
            Category::Game => "game",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Ok(Category::Movie),
            "book" => Ok(Category::Book),
            "game" => Ok(Category::Game),
            other => Err(format!("unknown category '{}', expected movie|book|game", other)),
        }
    }
}

/// A vote intent submitted by one user against one review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Upvote,
    Downvote,
}

/// Where a user currently stands on a review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoteState {
    Upvote,
    Downvote,
    #[default]
    None,
}

impl From<Vote> for VoteState {
    fn from(vote: Vote) -> Self {
        match vote {
            Vote::Upvote => VoteState::Upvote,
            Vote::Downvote => VoteState::Downvote,
        }
    }
}

/// Result of a committed vote, as rendered by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub review_id: Uuid,
    pub upvotes: u64,
    pub downvotes: u64,
    pub state: VoteState,
}

/// Author-supplied fields of a new review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDraft {
    pub title: String,
    pub content: String,
    pub rating: f64,
    pub category: Category,
    pub image_url: String,
    pub year: i32,
    pub genre: String,
}

/// A review record, including its embedded vote data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub rating: f64,
    pub category: Category,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub upvotes: u64,
    pub downvotes: u64,
    #[serde(default)]
    pub upvoted_by: BTreeSet<String>,
    #[serde(default)]
    pub downvoted_by: BTreeSet<String>,
    pub image_url: String,
    pub image_hint: String,
    pub year: i32,
    pub genre: String,
}

impl Review {
    /// Build a fresh review with no votes
    pub fn from_draft(draft: ReviewDraft, author_id: impl Into<String>) -> Self {
        let image_hint = format!("{} {}", draft.category, draft.genre);
        Self {
            id: Uuid::new_v4(),
            title: draft.title,
            content: draft.content,
            rating: draft.rating,
            category: draft.category,
            author_id: author_id.into(),
            created_at: Utc::now(),
            upvotes: 0,
            downvotes: 0,
            upvoted_by: BTreeSet::new(),
            downvoted_by: BTreeSet::new(),
            image_url: draft.image_url,
            image_hint,
            year: draft.year,
            genre: draft.genre,
        }
    }

    /// Current vote standing of a user on this review
    pub fn vote_state(&self, user_id: &str) -> VoteState {
        if self.upvoted_by.contains(user_id) {
            VoteState::Upvote
        } else if self.downvoted_by.contains(user_id) {
            VoteState::Downvote
        } else {
            VoteState::None
        }
    }

    /// Counters match membership and no user sits on both sides
    pub fn tally_is_consistent(&self) -> bool {
        self.upvotes == self.upvoted_by.len() as u64
            && self.downvotes == self.downvoted_by.len() as u64
            && self.upvoted_by.is_disjoint(&self.downvoted_by)
    }

    pub fn net_score(&self) -> i64 {
        self.upvotes as i64 - self.downvotes as i64
    }

    /// Replace the author-editable fields. Identity, timestamps and votes are kept.
    pub fn apply_draft(&mut self, draft: &ReviewDraft) {
        self.title = draft.title.clone();
        self.content = draft.content.clone();
        self.rating = draft.rating;
        self.category = draft.category;
        self.image_url = draft.image_url.clone();
        self.image_hint = format!("{} {}", draft.category, draft.genre);
        self.year = draft.year;
        self.genre = draft.genre.clone();
    }

    /// The editable fields as a draft, for partial edits
    pub fn to_draft(&self) -> ReviewDraft {
        ReviewDraft {
            title: self.title.clone(),
            content: self.content.clone(),
            rating: self.rating,
            category: self.category,
            image_url: self.image_url.clone(),
            year: self.year,
            genre: self.genre.clone(),
        }
    }
}

/// A reader's comment on a review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub review_id: Uuid,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(review_id: Uuid, author_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            review_id,
            author_id: author_id.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_draft() -> ReviewDraft {
    ReviewDraft {
        title: "Dune Part Two".to_string(),
        content: "A towering sequel that improves on the first film in nearly every way.".to_string(),
        rating: 4.5,
        category: Category::Movie,
        image_url: "https://example.com/dune.jpg".to_string(),
        year: 2024,
        genre: "Sci-Fi".to_string(),
    }
}
