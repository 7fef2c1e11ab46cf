//! Revocation records for token invalidation.
//!
//! One row per subject holding the minimum issue time (Unix milliseconds) a
//! token must carry to be accepted. Records are looked up by subject, never listed.

use sqlx::sqlite::SqlitePool;

/// Store for per-subject revocation records.
pub struct RevocationStore {
    pool: SqlitePool,
}

impl RevocationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the invalidation timestamp (Unix milliseconds) for a subject, if any.
    pub async fn get(&self, subject: &str) -> Result<Option<u64>, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT invalidated_at FROM token_revocations WHERE subject = ?")
                .bind(subject)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(at,)| at.max(0) as u64))
    }

    /// Record that tokens issued before `at` are no longer valid for `subject`.
    /// An existing record is only ever moved forward.
    pub async fn invalidate(&self, subject: &str, at: u64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO token_revocations (subject, invalidated_at) VALUES (?, ?)
             ON CONFLICT(subject) DO UPDATE SET invalidated_at = MAX(invalidated_at, excluded.invalidated_at)",
        )
        .bind(subject)
        .bind(at as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete records older than `cutoff`. Returns the number removed.
    pub async fn delete_older_than(&self, cutoff: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM token_revocations WHERE invalidated_at < ?")
            .bind(cutoff as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
