//! Session lifecycle: registration, login, refresh, revocation and the
//! request-level checks handlers call before mutating anything.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::auth::{
    AuthorizationGuard, Owned, api_key_from_headers, bearer_from_headers, require_ownership,
    verify_service_key,
};
use crate::clock::{Clock, SystemClock};
use crate::db::Database;
use crate::error::{AuthError, AuthFailure, StorageError};
use crate::jwt::{DEFAULT_ACCESS_TOKEN_TTL_SECS, JwtConfig, TokenCodec};
use crate::password::{Argon2Hasher, HashingPool, PasswordHasher};
use crate::refresh::{REFRESH_TOKEN_LIFETIME_DAYS, RefreshTokenRepository, RefreshTokenStore};
use crate::user::{NewUser, User, UserRepository, UserResponse};

/// Default number of concurrent password hashes.
pub const DEFAULT_HASH_WORKERS: usize = 4;

/// Lifetimes and limits handed to the core at startup.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_token_ttl: Duration,
    pub refresh_token_lifetime: Duration,
    pub hash_workers: usize,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_lifetime: Duration::days(REFRESH_TOKEN_LIFETIME_DAYS),
            hash_workers: DEFAULT_HASH_WORKERS,
        }
    }
}

/// Login response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    #[serde(flatten)]
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
}

/// Refresh response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub token: String,
}

#[derive(Clone)]
pub struct SessionService {
    users: Arc<dyn UserRepository>,
    refresh_tokens: RefreshTokenStore,
    codec: Arc<dyn TokenCodec>,
    hashing: HashingPool,
    guard: AuthorizationGuard,
    clock: Arc<dyn Clock>,
    service_key: Option<String>,
    access_token_ttl: Duration,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn RefreshTokenRepository>,
        codec: Arc<dyn TokenCodec>,
        hasher: Arc<dyn PasswordHasher>,
        clock: Arc<dyn Clock>,
        settings: &AuthSettings,
    ) -> Self {
        let refresh_tokens = RefreshTokenStore::new(tokens, clock.clone())
            .with_lifetime(settings.refresh_token_lifetime);
        let guard = AuthorizationGuard::new(codec.clone(), users.clone(), clock.clone());

        Self {
            users,
            refresh_tokens,
            codec,
            hashing: HashingPool::new(hasher, settings.hash_workers),
            guard,
            clock,
            service_key: None,
            access_token_ttl: settings.access_token_ttl,
        }
    }

    /// Production wiring: SQLite stores, HS256 tokens, Argon2id, wall clock.
    pub fn from_database(db: &Database, jwt_secret: &[u8], settings: &AuthSettings) -> Self {
        Self::new(
            Arc::new(db.users()),
            Arc::new(db.tokens()),
            Arc::new(JwtConfig::new(jwt_secret)),
            Arc::new(Argon2Hasher::default()),
            Arc::new(SystemClock),
            settings,
        )
    }

    /// Key expected from `ApiKey` service callers.
    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    pub fn guard(&self) -> &AuthorizationGuard {
        &self.guard
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenStore {
        &self.refresh_tokens
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<UserResponse, AuthError> {
        let email = validate_input(email, password)?;

        let password_hash = self.hashing.hash(password).await?;
        let new_user = NewUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash,
            created_at: self.clock.now(),
        };

        match self.users.create_user(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, "User registered");
                Ok(UserResponse::from(&user))
            }
            Err(StorageError::Conflict) => {
                debug!("Registration with taken email");
                Err(AuthError::validation("email already registered"))
            }
            Err(e) => {
                error!(error = %e, "Failed to create user");
                Err(e.into())
            }
        }
    }

    /// Check email and password and open a session. Unknown email and wrong
    /// password fail identically.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionTokens, AuthError> {
        let email = validate_input(email, password)?;

        let user = self
            .users
            .get_user_by_email(email)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to look up user for login"))?;
        let Some(user) = user else {
            self.hashing.verify_decoy(password).await?;
            debug!("Login for unknown email");
            return Err(AuthFailure::InvalidCredentials.into());
        };

        if !self.hashing.verify(password, &user.password_hash).await? {
            debug!(user_id = %user.id, "Login with wrong password");
            return Err(AuthFailure::InvalidCredentials.into());
        }

        let access_token = self.codec.issue_access_token_at(
            user.id,
            self.access_token_ttl,
            self.clock.now(),
        )?;
        let refresh = self.refresh_tokens.issue(user.id).await.map_err(|e| {
            error!(user_id = %user.id, error = %e, "Failed to store refresh token");
            AuthError::internal(e.to_string())
        })?;

        info!(user_id = %user.id, "User logged in");
        Ok(SessionTokens {
            user: UserResponse::from(&user),
            access_token,
            refresh_token: refresh.token,
        })
    }

    /// Mint a new access token from a refresh token. The refresh token is
    /// not rotated.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessTokenResponse, AuthError> {
        let token = self
            .refresh_tokens
            .refresh_access_token(refresh_token, self.codec.as_ref(), self.access_token_ttl)
            .await?;
        info!("Access token refreshed");
        Ok(AccessTokenResponse { token })
    }

    /// [`refresh`](Self::refresh) with the refresh token sent as a bearer
    /// credential.
    pub async fn refresh_from_headers(
        &self,
        headers: &HeaderMap,
    ) -> Result<AccessTokenResponse, AuthError> {
        let token = bearer_from_headers(headers)?;
        self.refresh(token).await
    }

    /// Revoke a refresh token. Unknown or already revoked tokens succeed.
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.refresh_tokens.revoke(refresh_token).await.map_err(|e| {
            error!(error = %e, "Failed to revoke refresh token");
            AuthError::internal(e.to_string())
        })?;
        info!("Refresh token revoked");
        Ok(())
    }

    pub async fn revoke_from_headers(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let token = bearer_from_headers(headers)?;
        self.revoke(token).await
    }

    pub async fn resolve_principal(&self, headers: &HeaderMap) -> Result<User, AuthError> {
        self.guard.resolve_principal(headers).await
    }

    /// Authenticate the caller, then check they own `resource`.
    ///
    /// `resource` is the caller's lookup result: `None` is reported as
    /// `NotFound` named by `what`, before ownership is compared.
    pub async fn authorize_owner<R: Owned>(
        &self,
        headers: &HeaderMap,
        resource: Option<&R>,
        what: &str,
    ) -> Result<User, AuthError> {
        let principal = self.guard.resolve_principal(headers).await?;
        let resource = resource.ok_or_else(|| AuthError::not_found(what))?;
        require_ownership(&principal, resource)?;
        Ok(principal)
    }

    /// Replace the caller's email and password.
    pub async fn update_credentials(
        &self,
        headers: &HeaderMap,
        email: &str,
        password: &str,
    ) -> Result<UserResponse, AuthError> {
        let principal = self.guard.resolve_principal(headers).await?;
        let email = validate_input(email, password)?;

        let password_hash = self.hashing.hash(password).await?;
        let updated = self
            .users
            .update_credentials(principal.id, email, &password_hash, self.clock.now())
            .await;

        match updated {
            Ok(Some(user)) => {
                info!(user_id = %user.id, "Credentials updated");
                Ok(UserResponse::from(&user))
            }
            Ok(None) => {
                debug!(user_id = %principal.id, "User vanished during credential update");
                Err(AuthFailure::UnknownUser.into())
            }
            Err(StorageError::Conflict) => Err(AuthError::validation("email already registered")),
            Err(e) => {
                error!(user_id = %principal.id, error = %e, "Failed to update credentials");
                Err(e.into())
            }
        }
    }

    /// Check an `ApiKey` credential against the configured service key.
    pub fn authorize_service(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let Some(expected) = self.service_key.as_deref() else {
            error!("Service key requested but none is configured");
            return Err(AuthError::internal("service key not configured"));
        };

        let provided = api_key_from_headers(headers)?;
        if verify_service_key(provided, expected) {
            Ok(())
        } else {
            debug!("Service key mismatch");
            Err(AuthFailure::ServiceKey.into())
        }
    }
}

/// Trimmed email, or `Validation` if either field is blank.
fn validate_input<'a>(email: &'a str, password: &str) -> Result<&'a str, AuthError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::validation("email is required"));
    }
    if password.is_empty() {
        return Err(AuthError::validation("password is required"));
    }
    Ok(email)
}
