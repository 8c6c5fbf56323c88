pub mod adapters;
pub mod comments;
pub mod config;
pub mod error;
pub mod insights;
pub mod models;
pub mod reviews;
pub mod stats;
pub mod store;
pub mod votes;

pub use adapters::{ClaudeAdapter, PromptRunner};
pub use comments::CommentService;
pub use config::Config;
pub use error::{FieldError, ReviewError, StoreError, VoteError};
pub use insights::{Insights, ReviewSummary, Sentiment, SentimentAnalysis};
pub use models::*;
pub use reviews::{ReviewFilter, ReviewService, ReviewSort};
pub use stats::{AuthorStats, DashboardStats};
pub use store::{
    open_store, CommentStore, CommitOutcome, DocumentStore, JsonStore, MemoryStore,
    PostgresStore, ReviewStore, Versioned,
};
pub use votes::{transition, Membership, RetryPolicy, Transition, VoteDelta, VoteLedger};
