use thiserror::Error;
use uuid::Uuid;

/// Failure talking to a document store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("review '{0}' already exists")]
    AlreadyExists(Uuid),
    #[error("corrupt record for review '{id}': {message}")]
    Corrupt { id: Uuid, message: String },
}

/// Errors surfaced to callers of the vote ledger
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("review '{review_id}' not found")]
    NotFound { review_id: Uuid },
    #[error("voting requires a signed-in user")]
    Unauthenticated,
    #[error("vote could not be recorded, try again: {reason}")]
    Unavailable { reason: String },
}

impl From<StoreError> for VoteError {
    fn from(err: StoreError) -> Self {
        VoteError::Unavailable {
            reason: err.to_string(),
        }
    }
}

/// A single field that failed draft validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Errors from review authoring, editing, deletion and comments
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("invalid review: {}", format_fields(.0))]
    Invalid(Vec<FieldError>),
    #[error("writing a review requires a signed-in user")]
    Unauthenticated,
    #[error("review '{0}' not found")]
    NotFound(Uuid),
    #[error("only the author of review '{0}' can change it")]
    Forbidden(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}
