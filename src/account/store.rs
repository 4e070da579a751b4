/// Revocable session token store
///
/// Rows are append-only: revocation flips a flag and only `purge_expired`
/// deletes, and only rows that are both revoked and past expiry.
use crate::error::ApiResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

/// Persisted session token
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionToken {
    pub id: i64,
    pub account_id: i64,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// Token store service
#[derive(Clone)]
pub struct TokenStore {
    db: SqlitePool,
}

impl TokenStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Persist an issued token inside the caller's unit of work
    pub async fn create(
        conn: &mut SqliteConnection,
        account_id: i64,
        token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> ApiResult<SessionToken> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO session_token (account_id, token, expires_at, revoked, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
        )
        .bind(account_id)
        .bind(token)
        .bind(expires_at)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(SessionToken {
            id: result.last_insert_rowid(),
            account_id,
            token: token.to_string(),
            expires_at,
            revoked: false,
            created_at: now,
        })
    }

    /// The token row if it is neither revoked nor expired
    pub async fn find_valid_by_token(&self, token: &str) -> ApiResult<Option<SessionToken>> {
        let row = sqlx::query_as::<_, SessionToken>(
            "SELECT id, account_id, token, expires_at, revoked, created_at FROM session_token
             WHERE token = ?1 AND revoked = 0 AND (expires_at IS NULL OR expires_at > ?2)
             LIMIT 1",
        )
        .bind(token)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    /// Revoke one token, returning how many live rows were flipped
    pub async fn revoke_by_token(&self, token: &str) -> ApiResult<u64> {
        let result = sqlx::query("UPDATE session_token SET revoked = 1 WHERE token = ?1 AND revoked = 0")
            .bind(token)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Revoke every live token of an account
    pub async fn revoke_all_for_account(&self, account_id: i64) -> ApiResult<u64> {
        let result =
            sqlx::query("UPDATE session_token SET revoked = 1 WHERE account_id = ?1 AND revoked = 0")
                .bind(account_id)
                .execute(&self.db)
                .await?;

        let count = result.rows_affected();
        tracing::info!(account_id, count, "Revoked all sessions for account");
        Ok(count)
    }

    /// Delete rows that are revoked and past expiry
    ///
    /// Called periodically from the job scheduler.
    pub async fn purge_expired(&self) -> ApiResult<u64> {
        let result = sqlx::query(
            "DELETE FROM session_token WHERE revoked = 1 AND expires_at IS NOT NULL AND expires_at < ?1",
        )
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            tracing::info!(purged, "Purged expired session tokens");
        } else {
            tracing::debug!("Token purge: nothing to delete");
        }

        Ok(purged)
    }
}
