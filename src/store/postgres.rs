use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{CommentStore, CommitOutcome, DocumentStore, Versioned};
use crate::error::StoreError;
use crate::models::{Category, Comment, Review, ReviewDraft};
use crate::votes::{Membership, VoteDelta};

const REVIEW_COLUMNS: &str = "id, title, content, rating, category, author_id, created_at, \
     upvotes, downvotes, upvoted_by, downvoted_by, image_url, image_hint, year, genre, version";

/// PostgreSQL-backed store for production persistence
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given connection string
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database migrations complete");

        Ok(())
    }

    async fn exists(&self, id: &Uuid) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM reviews WHERE id = $1) AS present")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<bool, _>("present"))
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn read(&self, id: &Uuid) -> Result<Option<Versioned<Review>>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM reviews WHERE id = $1",
            REVIEW_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(versioned_from_row).transpose()
    }

    async fn commit_if_version(
        &self,
        id: &Uuid,
        version: u64,
        delta: &VoteDelta,
    ) -> Result<CommitOutcome, StoreError> {
        // Counters are recomputed from the new arrays in the same statement
        let row = sqlx::query(
            r#"
            WITH next AS (
                SELECT
                    id,
                    CASE $3::text
                        WHEN 'add' THEN array_append(array_remove(upvoted_by, $5), $5)
                        WHEN 'remove' THEN array_remove(upvoted_by, $5)
                        ELSE upvoted_by
                    END AS upvoted_by,
                    CASE $4::text
                        WHEN 'add' THEN array_append(array_remove(downvoted_by, $5), $5)
                        WHEN 'remove' THEN array_remove(downvoted_by, $5)
                        ELSE downvoted_by
                    END AS downvoted_by
                FROM reviews
                WHERE id = $1 AND version = $2
            )
            UPDATE reviews r SET
                upvoted_by = next.upvoted_by,
                downvoted_by = next.downvoted_by,
                upvotes = cardinality(next.upvoted_by),
                downvotes = cardinality(next.downvoted_by),
                version = r.version + 1
            FROM next
            WHERE r.id = next.id AND r.version = $2
            RETURNING r.id, r.title, r.content, r.rating, r.category, r.author_id,
                r.created_at, r.upvotes, r.downvotes, r.upvoted_by, r.downvoted_by,
                r.image_url, r.image_hint, r.year, r.genre, r.version
            "#,
        )
        .bind(id)
        .bind(version as i64)
        .bind(membership_to_str(delta.upvoted))
        .bind(membership_to_str(delta.downvoted))
        .bind(&delta.user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let updated = versioned_from_row(&row)?;
                debug!(id = %id, version = updated.version, "Committed vote delta");
                Ok(CommitOutcome::Committed(updated))
            }
            None if self.exists(id).await? => {
                debug!(id = %id, expected = version, "Version conflict");
                Ok(CommitOutcome::VersionConflict)
            }
            None => Ok(CommitOutcome::NotFound),
        }
    }

    async fn insert(&self, review: &Review) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO reviews (
                id, title, content, rating, category, author_id, created_at,
                upvotes, downvotes, upvoted_by, downvoted_by,
                image_url, image_hint, year, genre, version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, 1
            )
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(review.id)
        .bind(&review.title)
        .bind(&review.content)
        .bind(review.rating)
        .bind(review.category.as_str())
        .bind(&review.author_id)
        .bind(review.created_at)
        .bind(review.upvotes as i64)
        .bind(review.downvotes as i64)
        .bind(review.upvoted_by.iter().cloned().collect::<Vec<_>>())
        .bind(review.downvoted_by.iter().cloned().collect::<Vec<_>>())
        .bind(&review.image_url)
        .bind(&review.image_hint)
        .bind(review.year)
        .bind(&review.genre)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(review.id));
        }

        debug!(id = %review.id, "Saved review to database");

        Ok(())
    }

    async fn update_details(
        &self,
        id: &Uuid,
        draft: &ReviewDraft,
    ) -> Result<Option<Versioned<Review>>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE reviews SET
                title = $2,
                content = $3,
                rating = $4,
                category = $5,
                image_url = $6,
                image_hint = $7,
                year = $8,
                genre = $9,
                version = version + 1
            WHERE id = $1
            RETURNING {}
            "#,
            REVIEW_COLUMNS
        ))
        .bind(id)
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(draft.rating)
        .bind(draft.category.as_str())
        .bind(&draft.image_url)
        .bind(format!("{} {}", draft.category, draft.genre))
        .bind(draft.year)
        .bind(&draft.genre)
        .fetch_optional(&self.pool)
        .await?;

        let updated = row.as_ref().map(versioned_from_row).transpose()?;
        if let Some(doc) = &updated {
            debug!(id = %id, version = doc.version, "Updated review details");
        }
        Ok(updated)
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<Review>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reviews ORDER BY created_at DESC",
            REVIEW_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| versioned_from_row(row).map(|doc| doc.value))
            .collect()
    }
}

#[async_trait]
impl CommentStore for PostgresStore {
    async fn add_comment(&self, comment: &Comment) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO comments (id, review_id, author_id, content, created_at)
            SELECT $1, $2, $3, $4, $5
            WHERE EXISTS (SELECT 1 FROM reviews WHERE id = $2)
            "#,
        )
        .bind(comment.id)
        .bind(comment.review_id)
        .bind(&comment.author_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_comments(&self, review_id: &Uuid) -> Result<Vec<Comment>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, review_id, author_id, content, created_at
            FROM comments
            WHERE review_id = $1
            ORDER BY created_at DESC, seq DESC
            "#,
        )
        .bind(review_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Comment, StoreError> {
                Ok(Comment {
                    id: row.try_get("id")?,
                    review_id: row.try_get("review_id")?,
                    author_id: row.try_get("author_id")?,
                    content: row.try_get("content")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

fn versioned_from_row(row: &sqlx::postgres::PgRow) -> Result<Versioned<Review>, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let category: String = row.try_get("category")?;
    let category = category
        .parse::<Category>()
        .map_err(|message| StoreError::Corrupt { id, message })?;

    let upvoted_by: Vec<String> = row.try_get("upvoted_by")?;
    let downvoted_by: Vec<String> = row.try_get("downvoted_by")?;

    let review = Review {
        id,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        rating: row.try_get("rating")?,
        category,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
        upvotes: row.try_get::<i64, _>("upvotes")?.max(0) as u64,
        downvotes: row.try_get::<i64, _>("downvotes")?.max(0) as u64,
        upvoted_by: upvoted_by.into_iter().collect(),
        downvoted_by: downvoted_by.into_iter().collect(),
        image_url: row.try_get("image_url")?,
        image_hint: row.try_get("image_hint")?,
        year: row.try_get("year")?,
        genre: row.try_get("genre")?,
    };

    Ok(Versioned {
        version: row.try_get::<i64, _>("version")?.max(0) as u64,
        value: review,
    })
}

// Conversion helpers
fn membership_to_str(change: Membership) -> &'static str {
    match change {
        Membership::Unchanged => "unchanged",
        Membership::Add => "add",
        Membership::Remove => "remove",
    }
}
