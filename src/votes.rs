use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::VotingConfig;
use crate::error::VoteError;
use crate::models::{Review, Vote, VoteOutcome, VoteState};
use crate::store::{CommitOutcome, DocumentStore};

/// Change to one side's membership set for a single user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Unchanged,
    Add,
    Remove,
}

impl Membership {
    /// Matching change to that side's counter
    pub fn counter_delta(&self) -> i64 {
        match self {
            Membership::Unchanged => 0,
            Membership::Add => 1,
            Membership::Remove => -1,
        }
    }
}

/// Outcome of applying a vote intent to a user's current standing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: VoteState,
    pub upvoted: Membership,
    pub downvoted: Membership,
}

impl Transition {
    pub fn delta(&self, user_id: &str) -> VoteDelta {
        VoteDelta {
            user_id: user_id.to_string(),
            upvoted: self.upvoted,
            downvoted: self.downvoted,
        }
    }
}

/// Toggle semantics: repeating the current vote retracts it, anything else moves
/// the user to the requested side.
pub fn transition(current: VoteState, intent: Vote) -> Transition {
    use Membership::*;

    let (next, upvoted, downvoted) = match (current, intent) {
        (VoteState::None, Vote::Upvote) => (VoteState::Upvote, Add, Unchanged),
        (VoteState::None, Vote::Downvote) => (VoteState::Downvote, Unchanged, Add),
        (VoteState::Upvote, Vote::Upvote) => (VoteState::None, Remove, Unchanged),
        (VoteState::Upvote, Vote::Downvote) => (VoteState::Downvote, Remove, Add),
        (VoteState::Downvote, Vote::Upvote) => (VoteState::Upvote, Add, Remove),
        (VoteState::Downvote, Vote::Downvote) => (VoteState::None, Unchanged, Remove),
    };

    Transition {
        next,
        upvoted,
        downvoted,
    }
}

/// Field changes for the four vote fields of one review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteDelta {
    pub user_id: String,
    pub upvoted: Membership,
    pub downvoted: Membership,
}

impl VoteDelta {
    /// Signed (upvotes, downvotes) change this delta makes
    pub fn counter_changes(&self) -> (i64, i64) {
        (self.upvoted.counter_delta(), self.downvoted.counter_delta())
    }

    /// Apply to an in-memory record. Counters only move when membership does.
    pub fn apply_to(&self, review: &mut Review) {
        apply_side(
            &mut review.upvotes,
            &mut review.upvoted_by,
            self.upvoted,
            &self.user_id,
        );
        apply_side(
            &mut review.downvotes,
            &mut review.downvoted_by,
            self.downvoted,
            &self.user_id,
        );
    }
}

fn apply_side(count: &mut u64, members: &mut BTreeSet<String>, change: Membership, user_id: &str) {
    match change {
        Membership::Unchanged => {}
        Membership::Add => {
            if members.insert(user_id.to_string()) {
                *count += 1;
            }
        }
        Membership::Remove => {
            if members.remove(user_id) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

/// Bounded retry with exponential backoff for conflicting commits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Pause before the given attempt (1-based). The first attempt runs immediately.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let shift = (attempt - 2).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

impl From<&VotingConfig> for RetryPolicy {
    fn from(config: &VotingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Maintains per-review vote counters and per-user membership
pub struct VoteLedger<S: DocumentStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: DocumentStore> VoteLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Toggle a user's vote on a review.
    ///
    /// Each attempt re-reads the review and derives the delta from that snapshot, so a
    /// conflicting commit is simply discarded and retried. Conflicts never reach the
    /// caller; running out of attempts surfaces as [`VoteError::Unavailable`].
    pub async fn cast_vote(
        &self,
        review_id: &Uuid,
        user_id: Option<&str>,
        intent: Vote,
    ) -> Result<VoteOutcome, VoteError> {
        let user_id = match user_id.map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => return Err(VoteError::Unauthenticated),
        };

        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            debug!(review = %review_id, user = %user_id, attempt, "Reading review for vote");

            let current = self
                .store
                .read(review_id)
                .await?
                .ok_or(VoteError::NotFound {
                    review_id: *review_id,
                })?;

            let step = transition(current.value.vote_state(user_id), intent);
            let delta = step.delta(user_id);
            let (up_change, down_change) = delta.counter_changes();

            debug!(
                review = %review_id,
                version = current.version,
                up_change,
                down_change,
                "Submitting vote delta"
            );

            match self
                .store
                .commit_if_version(review_id, current.version, &delta)
                .await?
            {
                CommitOutcome::Committed(updated) => {
                    info!(
                        review = %review_id,
                        user = %user_id,
                        intent = ?intent,
                        state = ?step.next,
                        upvotes = updated.value.upvotes,
                        downvotes = updated.value.downvotes,
                        "Vote recorded"
                    );
                    return Ok(VoteOutcome {
                        review_id: *review_id,
                        upvotes: updated.value.upvotes,
                        downvotes: updated.value.downvotes,
                        state: updated.value.vote_state(user_id),
                    });
                }
                CommitOutcome::VersionConflict => {
                    debug!(review = %review_id, attempt, "Concurrent vote detected, retrying");
                }
                CommitOutcome::NotFound => {
                    return Err(VoteError::NotFound {
                        review_id: *review_id,
                    });
                }
            }
        }

        warn!(review = %review_id, attempts = max_attempts, "Vote retry budget exhausted");

        Err(VoteError::Unavailable {
            reason: format!("review kept changing after {} attempts", max_attempts),
        })
    }

    /// Get the store for direct access
    pub fn store(&self) -> &S {
        &self.store
    }
}
