//! Error taxonomy shared by every auth operation.
//!
//! Component errors (`HashError`, `TokenError`, `RefreshTokenError`,
//! `CredentialError`) keep their detail for logs and tests. Callers see one
//! of the five `AuthError` kinds. No message ever carries a password, a raw
//! token or a secret.

use thiserror::Error;

use crate::auth::CredentialError;
use crate::jwt::TokenError;
use crate::password::HashError;

/// Failure of the persistence collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A unique constraint rejected the write.
    #[error("duplicate entry")]
    Conflict,

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Why an authentication attempt was rejected.
///
/// Only used for diagnostics. Every variant surfaces as
/// [`AuthError::Authentication`] with the same message.
#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("principal no longer exists")]
    UnknownUser,

    #[error("email or password mismatch")]
    InvalidCredentials,

    #[error("refresh token rejected")]
    RefreshToken,

    #[error("service key mismatch")]
    ServiceKey,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed input that never reached credential checking.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("authentication failed")]
    Authentication(#[source] AuthFailure),

    /// Authenticated, but not allowed to touch the resource.
    #[error("not permitted")]
    Authorization,

    /// Raised by resource lookups in calling code, never by the auth core.
    #[error("{0} not found")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

impl From<AuthFailure> for AuthError {
    fn from(reason: AuthFailure) -> Self {
        Self::Authentication(reason)
    }
}

impl From<CredentialError> for AuthError {
    fn from(e: CredentialError) -> Self {
        Self::Authentication(AuthFailure::Credential(e))
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Encoding(e) => Self::Internal(format!("failed to sign token: {}", e)),
            e @ TokenError::Lifetime(_) => Self::Internal(e.to_string()),
            other => Self::Authentication(AuthFailure::Token(other)),
        }
    }
}

impl From<HashError> for AuthError {
    fn from(e: HashError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        Self::Internal(e.to_string())
    }
}
