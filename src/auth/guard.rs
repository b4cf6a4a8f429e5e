//! Turning a request's credentials into a principal, and checking that the
//! principal may act on a resource.

use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::{debug, error};
use uuid::Uuid;

use super::credentials::bearer_from_headers;
use crate::clock::Clock;
use crate::error::{AuthError, AuthFailure};
use crate::jwt::TokenCodec;
use crate::user::{User, UserRepository};

/// A resource with a single owning user.
pub trait Owned {
    fn owner_id(&self) -> Uuid;
}

#[derive(Clone)]
pub struct AuthorizationGuard {
    codec: Arc<dyn TokenCodec>,
    users: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
}

impl AuthorizationGuard {
    pub fn new(
        codec: Arc<dyn TokenCodec>,
        users: Arc<dyn UserRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec,
            users,
            clock,
        }
    }

    /// Authenticate the bearer token in `headers` and load its user.
    ///
    /// Missing header, bad token and vanished user are all
    /// `AuthError::Authentication`. Only a failing lookup is `Internal`.
    pub async fn resolve_principal(&self, headers: &HeaderMap) -> Result<User, AuthError> {
        let token = bearer_from_headers(headers).inspect_err(|e| {
            debug!(reason = %e, "No usable bearer credential");
        })?;

        let user_id = self
            .codec
            .validate_access_token_at(token, self.clock.now())
            .inspect_err(|e| debug!(reason = %e, "Access token rejected"))?;

        match self.users.get_user_by_id(user_id).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                debug!(user_id = %user_id, "Access token for unknown user");
                Err(AuthFailure::UnknownUser.into())
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to load principal");
                Err(e.into())
            }
        }
    }
}

/// Fails with `AuthError::Authorization` unless `principal` owns `resource`.
///
/// Callers look the resource up first, so a missing resource is reported
/// as `NotFound` before ownership is ever compared.
pub fn require_ownership<R: Owned + ?Sized>(principal: &User, resource: &R) -> Result<(), AuthError> {
    if resource.owner_id() == principal.id {
        Ok(())
    } else {
        debug!(user_id = %principal.id, owner_id = %resource.owner_id(), "Ownership check failed");
        Err(AuthError::Authorization)
    }
}

/// Compare a presented service key against the configured one without
/// short-circuiting on the first differing byte.
pub fn verify_service_key(provided: &str, configured: &str) -> bool {
    constant_time_eq(provided.as_bytes(), configured.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StorageError;
    use crate::jwt::{JwtConfig, TokenError};
    use crate::user::NewUser;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use axum::http::header::AUTHORIZATION;
    use chrono::{DateTime, Duration, Utc};

    struct OneUser(Option<User>);

    #[async_trait]
    impl UserRepository for OneUser {
        async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, StorageError> {
            Ok(self.0.clone().filter(|u| u.id == id))
        }

        async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
            Ok(self.0.clone().filter(|u| u.email == email))
        }

        async fn create_user(&self, _user: NewUser) -> Result<User, StorageError> {
            Err(StorageError::Conflict)
        }

        async fn update_credentials(
            &self,
            _id: Uuid,
            _email: &str,
            _password_hash: &str,
            _updated_at: DateTime<Utc>,
        ) -> Result<Option<User>, StorageError> {
            Ok(None)
        }
    }

    struct Note {
        owner: Uuid,
    }

    impl Owned for Note {
        fn owner_id(&self) -> Uuid {
            self.owner
        }
    }

    fn user() -> User {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        User {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn setup(stored: Option<User>) -> (AuthorizationGuard, Arc<JwtConfig>, Arc<ManualClock>) {
        let codec = Arc::new(JwtConfig::new(b"guard-test-secret"));
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let guard = AuthorizationGuard::new(codec.clone(), Arc::new(OneUser(stored)), clock.clone());
        (guard, codec, clock)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_resolve_principal() {
        let alice = user();
        let (guard, codec, clock) = setup(Some(alice.clone()));
        let token = codec
            .issue_access_token_at(alice.id, Duration::hours(1), clock.now())
            .unwrap();

        let principal = guard.resolve_principal(&bearer(&token)).await.unwrap();
        assert_eq!(principal.id, alice.id);
    }

    #[tokio::test]
    async fn test_missing_header_is_authentication() {
        let (guard, _, _) = setup(None);
        let err = guard.resolve_principal(&HeaderMap::new()).await.unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn test_expired_token_is_authentication() {
        let alice = user();
        let (guard, codec, clock) = setup(Some(alice.clone()));
        let token = codec
            .issue_access_token_at(alice.id, Duration::hours(1), clock.now())
            .unwrap();

        clock.advance(Duration::hours(1));
        let err = guard.resolve_principal(&bearer(&token)).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Authentication(AuthFailure::Token(TokenError::Expired))
        ));
    }

    #[tokio::test]
    async fn test_deleted_user_is_authentication() {
        let (guard, codec, clock) = setup(None);
        let token = codec
            .issue_access_token_at(Uuid::new_v4(), Duration::hours(1), clock.now())
            .unwrap();

        let err = guard.resolve_principal(&bearer(&token)).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Authentication(AuthFailure::UnknownUser)
        ));
    }

    #[test]
    fn test_require_ownership() {
        let alice = user();
        let mine = Note { owner: alice.id };
        let theirs = Note {
            owner: Uuid::new_v4(),
        };

        assert!(require_ownership(&alice, &mine).is_ok());
        assert!(matches!(
            require_ownership(&alice, &theirs),
            Err(AuthError::Authorization)
        ));
    }

    #[test]
    fn test_verify_service_key() {
        assert!(verify_service_key("f271c81ff7084ee5b99a5091b42d486e", "f271c81ff7084ee5b99a5091b42d486e"));
        assert!(!verify_service_key("f271c81ff7084ee5b99a5091b42d486f", "f271c81ff7084ee5b99a5091b42d486e"));
        assert!(!verify_service_key("short", "f271c81ff7084ee5b99a5091b42d486e"));
        assert!(!verify_service_key("", "key"));
    }
}
