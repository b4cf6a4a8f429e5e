//! Refresh token persistence.
//!
//! Rows are never deleted by the auth core; revocation only stamps
//! `revoked_at`. Each call is a single statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

use super::user::{map_unique, parse_uuid};
use crate::error::StorageError;
use crate::refresh::{RefreshToken, RefreshTokenRepository};

#[derive(Clone)]
pub struct TokenStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    token: String,
    user_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

impl TryFrom<TokenRow> for RefreshToken {
    type Error = StorageError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(Self {
            token: row.token,
            user_id: parse_uuid(&row.user_id)?,
            issued_at: row.created_at,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
        })
    }
}

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenRepository for TokenStore {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, created_at, expires_at, revoked_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&token.token)
        .bind(token.user_id.to_string())
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.revoked_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique)?;
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StorageError> {
        let row: Option<TokenRow> = sqlx::query_as(
            "SELECT token, user_id, created_at, expires_at, revoked_at FROM refresh_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RefreshToken::try_from).transpose()
    }

    async fn revoke_refresh_token(
        &self,
        token: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? WHERE token = ? AND revoked_at IS NULL",
        )
        .bind(revoked_at)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
