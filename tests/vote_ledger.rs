use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Barrier;
use uuid::Uuid;

use ratehub::{
    Category, CommitOutcome, DocumentStore, MemoryStore, RetryPolicy, Review, ReviewDraft,
    StoreError, Versioned, Vote, VoteDelta, VoteError, VoteLedger, VoteState,
};

fn draft() -> ReviewDraft {
    ReviewDraft {
        title: "Outer Wilds".to_string(),
        content: "A time loop mystery that rewards curiosity more than any game I have played."
            .to_string(),
        rating: 5.0,
        category: Category::Game,
        image_url: "https://example.com/outer-wilds.png".to_string(),
        year: 2019,
        genre: "Adventure".to_string(),
    }
}

async fn seeded(store: &MemoryStore) -> Review {
    let review = Review::from_draft(draft(), "author");
    store.insert(&review).await.unwrap();
    review
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// Yields between the read and the commit so concurrent voters interleave
struct InterleavingStore {
    inner: MemoryStore,
}

#[async_trait]
impl DocumentStore for InterleavingStore {
    async fn read(&self, id: &Uuid) -> Result<Option<Versioned<Review>>, StoreError> {
        let doc = self.inner.read(id).await;
        tokio::task::yield_now().await;
        doc
    }

    async fn commit_if_version(
        &self,
        id: &Uuid,
        version: u64,
        delta: &VoteDelta,
    ) -> Result<CommitOutcome, StoreError> {
        self.inner.commit_if_version(id, version, delta).await
    }

    async fn insert(&self, review: &Review) -> Result<(), StoreError> {
        self.inner.insert(review).await
    }

    async fn update_details(
        &self,
        id: &Uuid,
        draft: &ReviewDraft,
    ) -> Result<Option<Versioned<Review>>, StoreError> {
        self.inner.update_details(id, draft).await
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> Result<Vec<Review>, StoreError> {
        self.inner.list().await
    }
}

/// Holds the first `gated` reads until that many voters have read, so they all
/// commit against the same version
struct LockstepStore {
    inner: MemoryStore,
    barrier: Barrier,
    gated: AtomicU32,
    conflicts: AtomicU32,
}

impl LockstepStore {
    fn new(voters: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            barrier: Barrier::new(voters as usize),
            gated: AtomicU32::new(voters),
            conflicts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore for LockstepStore {
    async fn read(&self, id: &Uuid) -> Result<Option<Versioned<Review>>, StoreError> {
        let doc = self.inner.read(id).await;
        let gated = self
            .gated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if gated {
            self.barrier.wait().await;
        }
        doc
    }

    async fn commit_if_version(
        &self,
        id: &Uuid,
        version: u64,
        delta: &VoteDelta,
    ) -> Result<CommitOutcome, StoreError> {
        let outcome = self.inner.commit_if_version(id, version, delta).await?;
        if outcome == CommitOutcome::VersionConflict {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    async fn insert(&self, review: &Review) -> Result<(), StoreError> {
        self.inner.insert(review).await
    }

    async fn update_details(
        &self,
        id: &Uuid,
        draft: &ReviewDraft,
    ) -> Result<Option<Versioned<Review>>, StoreError> {
        self.inner.update_details(id, draft).await
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> Result<Vec<Review>, StoreError> {
        self.inner.list().await
    }
}

/// Reports a conflict for the first `conflicts` commits
struct ConflictingStore {
    inner: MemoryStore,
    conflicts: AtomicU32,
    commits_seen: AtomicU32,
}

impl ConflictingStore {
    fn new(conflicts: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            conflicts: AtomicU32::new(conflicts),
            commits_seen: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore for ConflictingStore {
    async fn read(&self, id: &Uuid) -> Result<Option<Versioned<Review>>, StoreError> {
        self.inner.read(id).await
    }

    async fn commit_if_version(
        &self,
        id: &Uuid,
        version: u64,
        delta: &VoteDelta,
    ) -> Result<CommitOutcome, StoreError> {
        self.commits_seen.fetch_add(1, Ordering::SeqCst);
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Ok(CommitOutcome::VersionConflict);
        }
        self.inner.commit_if_version(id, version, delta).await
    }

    async fn insert(&self, review: &Review) -> Result<(), StoreError> {
        self.inner.insert(review).await
    }

    async fn update_details(
        &self,
        id: &Uuid,
        draft: &ReviewDraft,
    ) -> Result<Option<Versioned<Review>>, StoreError> {
        self.inner.update_details(id, draft).await
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> Result<Vec<Review>, StoreError> {
        self.inner.list().await
    }
}

/// Store whose backend is down
struct BrokenStore;

#[async_trait]
impl DocumentStore for BrokenStore {
    async fn read(&self, _id: &Uuid) -> Result<Option<Versioned<Review>>, StoreError> {
        Err(StoreError::Io(std::io::Error::other("connection reset")))
    }

    async fn commit_if_version(
        &self,
        _id: &Uuid,
        _version: u64,
        _delta: &VoteDelta,
    ) -> Result<CommitOutcome, StoreError> {
        Err(StoreError::Io(std::io::Error::other("connection reset")))
    }

    async fn insert(&self, _review: &Review) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("connection reset")))
    }

    async fn update_details(
        &self,
        _id: &Uuid,
        _draft: &ReviewDraft,
    ) -> Result<Option<Versioned<Review>>, StoreError> {
        Err(StoreError::Io(std::io::Error::other("connection reset")))
    }

    async fn delete(&self, _id: &Uuid) -> Result<bool, StoreError> {
        Err(StoreError::Io(std::io::Error::other("connection reset")))
    }

    async fn list(&self) -> Result<Vec<Review>, StoreError> {
        Err(StoreError::Io(std::io::Error::other("connection reset")))
    }
}

#[tokio::test]
async fn fresh_upvote() {
    let store = MemoryStore::new();
    let review = seeded(&store).await;
    let ledger = VoteLedger::new(store);

    let outcome = ledger
        .cast_vote(&review.id, Some("u"), Vote::Upvote)
        .await
        .unwrap();

    assert_eq!(outcome.upvotes, 1);
    assert_eq!(outcome.downvotes, 0);
    assert_eq!(outcome.state, VoteState::Upvote);

    let stored = ledger.store().read(&review.id).await.unwrap().unwrap().value;
    assert_eq!(stored.upvoted_by.iter().collect::<Vec<_>>(), vec!["u"]);
    assert!(stored.downvoted_by.is_empty());
}

#[tokio::test]
async fn repeating_a_vote_retracts_it() {
    let store = MemoryStore::new();
    let review = seeded(&store).await;
    let ledger = VoteLedger::new(store);

    ledger
        .cast_vote(&review.id, Some("u"), Vote::Upvote)
        .await
        .unwrap();
    let outcome = ledger
        .cast_vote(&review.id, Some("u"), Vote::Upvote)
        .await
        .unwrap();

    assert_eq!(outcome.upvotes, 0);
    assert_eq!(outcome.state, VoteState::None);

    let stored = ledger.store().read(&review.id).await.unwrap().unwrap().value;
    assert!(stored.upvoted_by.is_empty());
    assert!(stored.tally_is_consistent());
}

#[tokio::test]
async fn switching_sides_moves_one_vote() {
    let store = MemoryStore::new();
    let mut review = Review::from_draft(draft(), "author");
    for user in ["u", "a", "b", "c", "d"] {
        review.upvoted_by.insert(user.to_string());
    }
    review.upvotes = 5;
    review.downvoted_by.insert("x".to_string());
    review.downvoted_by.insert("y".to_string());
    review.downvotes = 2;
    store.insert(&review).await.unwrap();
    let ledger = VoteLedger::new(store);

    let outcome = ledger
        .cast_vote(&review.id, Some("u"), Vote::Downvote)
        .await
        .unwrap();

    assert_eq!(outcome.upvotes, 4);
    assert_eq!(outcome.downvotes, 3);
    assert_eq!(outcome.state, VoteState::Downvote);

    let stored = ledger.store().read(&review.id).await.unwrap().unwrap().value;
    assert!(stored.downvoted_by.contains("u"));
    assert!(!stored.upvoted_by.contains("u"));
}

#[tokio::test]
async fn invariant_holds_after_every_vote() {
    let store = MemoryStore::new();
    let review = seeded(&store).await;
    let ledger = VoteLedger::new(store);

    let users = ["ann", "ben", "cat", "dan"];
    let intents = [Vote::Upvote, Vote::Downvote, Vote::Upvote, Vote::Upvote, Vote::Downvote];

    for step in 0..40 {
        let user = users[step % users.len()];
        let intent = intents[(step * 7 + step / 3) % intents.len()];
        ledger
            .cast_vote(&review.id, Some(user), intent)
            .await
            .unwrap();

        let stored = ledger.store().read(&review.id).await.unwrap().unwrap().value;
        assert!(stored.tally_is_consistent(), "step {}: {:?}", step, stored);
    }
}

#[tokio::test]
async fn votes_leave_other_fields_alone() {
    let store = MemoryStore::new();
    let review = seeded(&store).await;
    let ledger = VoteLedger::new(store);

    ledger
        .cast_vote(&review.id, Some("u"), Vote::Downvote)
        .await
        .unwrap();

    let mut stored = ledger.store().read(&review.id).await.unwrap().unwrap().value;
    stored.downvotes = 0;
    stored.downvoted_by.clear();
    assert_eq!(stored, review);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_voters_do_not_lose_updates() {
    let store = LockstepStore::new(2);
    let id = seeded(&store.inner).await.id;
    let ledger = Arc::new(VoteLedger::new(store));

    let first = {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move { ledger.cast_vote(&id, Some("u1"), Vote::Upvote).await })
    };
    let second = {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move { ledger.cast_vote(&id, Some("u2"), Vote::Upvote).await })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // Both voters read version 1, so exactly one commit was turned away and retried
    assert_eq!(ledger.store().conflicts.load(Ordering::SeqCst), 1);

    let stored = ledger.store().read(&id).await.unwrap().unwrap();
    assert_eq!(stored.version, 3);
    assert_eq!(stored.value.upvotes, 2);
    assert!(stored.value.upvoted_by.contains("u1"));
    assert!(stored.value.upvoted_by.contains("u2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_voters_settle_consistently() {
    let store = InterleavingStore {
        inner: MemoryStore::new(),
    };
    let id = seeded(&store.inner).await.id;
    let ledger = Arc::new(VoteLedger::new(store).with_retry(fast_retry(10_000)));

    let mut handles = Vec::new();
    for i in 0..24 {
        let ledger = Arc::clone(&ledger);
        let user = format!("user-{}", i);
        let intent = if i % 3 == 0 { Vote::Downvote } else { Vote::Upvote };
        handles.push(tokio::spawn(async move {
            ledger.cast_vote(&id, Some(user.as_str()), intent).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = ledger.store().read(&id).await.unwrap().unwrap().value;
    assert_eq!(stored.upvotes, 16);
    assert_eq!(stored.downvotes, 8);
    assert!(stored.tally_is_consistent());
}

#[tokio::test]
async fn conflicts_are_retried_internally() {
    let store = ConflictingStore::new(2);
    let review = Review::from_draft(draft(), "author");
    store.insert(&review).await.unwrap();
    let ledger = VoteLedger::new(store).with_retry(fast_retry(3));

    let outcome = ledger
        .cast_vote(&review.id, Some("u"), Vote::Upvote)
        .await
        .unwrap();

    assert_eq!(outcome.upvotes, 1);
    assert_eq!(ledger.store().commits_seen.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_retries_are_unavailable() {
    let store = ConflictingStore::new(5);
    let review = Review::from_draft(draft(), "author");
    store.insert(&review).await.unwrap();
    let ledger = VoteLedger::new(store).with_retry(fast_retry(3));

    let err = ledger
        .cast_vote(&review.id, Some("u"), Vote::Upvote)
        .await
        .unwrap_err();

    assert!(matches!(err, VoteError::Unavailable { .. }));
    let stored = ledger.store().read(&review.id).await.unwrap().unwrap().value;
    assert_eq!(stored.upvotes, 0);
    assert!(stored.upvoted_by.is_empty());
}

#[tokio::test]
async fn deleted_review_is_not_found() {
    let store = MemoryStore::new();
    let review = seeded(&store).await;
    let other = seeded(&store).await;
    store.delete(&review.id).await.unwrap();
    let ledger = VoteLedger::new(store);

    let err = ledger
        .cast_vote(&review.id, Some("u"), Vote::Upvote)
        .await
        .unwrap_err();

    assert!(matches!(err, VoteError::NotFound { review_id } if review_id == review.id));
    let untouched = ledger.store().read(&other.id).await.unwrap().unwrap();
    assert_eq!(untouched.version, 1);
    assert_eq!(untouched.value, other);
}

#[tokio::test]
async fn missing_identity_is_rejected() {
    let store = MemoryStore::new();
    let review = seeded(&store).await;
    let ledger = VoteLedger::new(store);

    for user in [None, Some(""), Some("   ")] {
        let err = ledger
            .cast_vote(&review.id, user, Vote::Upvote)
            .await
            .unwrap_err();
        assert!(matches!(err, VoteError::Unauthenticated));
    }

    let stored = ledger.store().read(&review.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn store_failure_is_unavailable() {
    let ledger = VoteLedger::new(BrokenStore);

    let err = ledger
        .cast_vote(&Uuid::new_v4(), Some("u"), Vote::Downvote)
        .await
        .unwrap_err();

    assert!(matches!(err, VoteError::Unavailable { .. }));
}
