//! Refresh token issuance, validation and revocation.
//!
//! Refresh tokens are opaque random strings tracked in the database. A token
//! is usable while it is unrevoked and unexpired. Rows are never deleted:
//! revocation stamps `revoked_at` and expiry is checked lazily on use.
//! Tokens are not rotated on refresh; the same value keeps working until it
//! is revoked or expires.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AuthError, AuthFailure, StorageError};
use crate::jwt::TokenCodec;

/// Refresh token lifetime: 60 days
pub const REFRESH_TOKEN_LIFETIME_DAYS: i64 = 60;

/// Random bytes per token (256 bits).
const TOKEN_BYTES: usize = 32;

/// A stored refresh token.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub token: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshToken")
            .field("user_id", &self.user_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("revoked_at", &self.revoked_at)
            .finish_non_exhaustive()
    }
}

/// Persistence for refresh tokens. Every method touches exactly one row.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StorageError>;

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StorageError>;

    /// Stamp `revoked_at` if the row exists and is not already revoked.
    async fn revoke_refresh_token(
        &self,
        token: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

#[derive(Debug, Error)]
pub enum RefreshTokenError {
    #[error("refresh token not found")]
    NotFound,

    #[error("refresh token expired")]
    Expired,

    #[error("refresh token revoked")]
    Revoked,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Clone)]
pub struct RefreshTokenStore {
    repo: Arc<dyn RefreshTokenRepository>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

impl RefreshTokenStore {
    pub fn new(repo: Arc<dyn RefreshTokenRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            clock,
            lifetime: Duration::days(REFRESH_TOKEN_LIFETIME_DAYS),
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Create and persist a new token for `user_id`. The returned record is
    /// the only place the raw value is ever handed out.
    pub async fn issue(&self, user_id: Uuid) -> Result<RefreshToken, RefreshTokenError> {
        let now = self.clock.now();
        let token = RefreshToken {
            token: generate_token(),
            user_id,
            issued_at: now,
            expires_at: now + self.lifetime,
            revoked_at: None,
        };
        self.repo.insert_refresh_token(&token).await?;
        Ok(token)
    }

    /// Resolve a token to its owner if it is still usable.
    pub async fn validate(&self, token: &str) -> Result<Uuid, RefreshTokenError> {
        let record = self
            .repo
            .find_refresh_token(token)
            .await?
            .ok_or(RefreshTokenError::NotFound)?;

        if record.revoked_at.is_some() {
            return Err(RefreshTokenError::Revoked);
        }
        if self.clock.now() >= record.expires_at {
            return Err(RefreshTokenError::Expired);
        }

        Ok(record.user_id)
    }

    /// Revoke a token. Unknown and already-revoked tokens succeed the same
    /// way a live token does.
    pub async fn revoke(&self, token: &str) -> Result<(), RefreshTokenError> {
        self.repo
            .revoke_refresh_token(token, self.clock.now())
            .await?;
        Ok(())
    }

    /// Exchange a refresh token for a new access token. Which check failed
    /// is logged but not returned.
    pub async fn refresh_access_token(
        &self,
        token: &str,
        codec: &dyn TokenCodec,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let user_id = match self.validate(token).await {
            Ok(user_id) => user_id,
            Err(RefreshTokenError::Storage(e)) => {
                error!(error = %e, "Failed to look up refresh token");
                return Err(e.into());
            }
            Err(e) => {
                debug!(reason = %e, "Refresh token rejected");
                return Err(AuthFailure::RefreshToken.into());
            }
        };

        Ok(codec.issue_access_token_at(user_id, ttl, self.clock.now())?)
    }
}

/// 256 random bits from the thread-local CSPRNG, base64url without padding.
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
