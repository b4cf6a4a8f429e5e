#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};
use chirpy::{
    Argon2Hasher, AuthSettings, Database, JwtConfig, ManualClock, NewUser, Owned, RefreshToken,
    RefreshTokenRepository, SessionService, StorageError, User, UserRepository,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const JWT_SECRET: &[u8] = b"test-jwt-secret-that-is-32-bytes!";
pub const SERVICE_KEY: &str = "f271c81ff7084ee5b99a5091b42d486e";
pub const START: i64 = 1_700_000_000;

/// In-memory user table with the same uniqueness rule as the real one.
#[derive(Default)]
pub struct MemoryUsers {
    rows: Mutex<HashMap<Uuid, User>>,
}

#[async_trait]
impl UserRepository for MemoryUsers {
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.values().any(|u| u.email == user.email) {
            return Err(StorageError::Conflict);
        }
        let user = User {
            id: user.id,
            email: user.email,
            password_hash: user.password_hash,
            created_at: user.created_at,
            updated_at: user.created_at,
        };
        rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_credentials(
        &self,
        id: Uuid,
        email: &str,
        password_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<User>, StorageError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.values().any(|u| u.email == email && u.id != id) {
            return Err(StorageError::Conflict);
        }
        Ok(rows.get_mut(&id).map(|user| {
            user.email = email.to_string();
            user.password_hash = password_hash.to_string();
            user.updated_at = updated_at;
            user.clone()
        }))
    }
}

#[derive(Default)]
pub struct MemoryTokens {
    rows: Mutex<HashMap<String, RefreshToken>>,
}

#[async_trait]
impl RefreshTokenRepository for MemoryTokens {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&token.token) {
            return Err(StorageError::Conflict);
        }
        rows.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StorageError> {
        Ok(self.rows.lock().unwrap().get(token).cloned())
    }

    async fn revoke_refresh_token(
        &self,
        token: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if let Some(row) = self.rows.lock().unwrap().get_mut(token) {
            row.revoked_at.get_or_insert(revoked_at);
        }
        Ok(())
    }
}

/// A post as stored by calling code.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub body: String,
}

impl Owned for Post {
    fn owner_id(&self) -> Uuid {
        self.author_id
    }
}

pub fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(START, 0).unwrap()
}

/// Cheap Argon2 parameters so the tests stay fast.
pub fn test_hasher() -> Arc<Argon2Hasher> {
    Arc::new(Argon2Hasher::with_params(1024, 1, 1).unwrap())
}

pub struct TestContext {
    pub service: SessionService,
    pub clock: Arc<ManualClock>,
    pub users: Arc<MemoryUsers>,
    pub tokens: Arc<MemoryTokens>,
}

/// Service over in-memory repositories and a manual clock.
pub fn memory_service() -> TestContext {
    let clock = Arc::new(ManualClock::new(start()));
    let users = Arc::new(MemoryUsers::default());
    let tokens = Arc::new(MemoryTokens::default());
    let service = SessionService::new(
        users.clone(),
        tokens.clone(),
        Arc::new(JwtConfig::new(JWT_SECRET)),
        test_hasher(),
        clock.clone(),
        &AuthSettings::default(),
    )
    .with_service_key(SERVICE_KEY);

    TestContext {
        service,
        clock,
        users,
        tokens,
    }
}

/// Service over an in-memory SQLite database and a manual clock.
pub async fn sqlite_service() -> (SessionService, Database, Arc<ManualClock>) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let clock = Arc::new(ManualClock::new(start()));
    let service = SessionService::new(
        Arc::new(db.users()),
        Arc::new(db.tokens()),
        Arc::new(JwtConfig::new(JWT_SECRET)),
        test_hasher(),
        clock.clone(),
        &AuthSettings::default(),
    );
    (service, db, clock)
}

pub fn bearer(token: &str) -> HeaderMap {
    authorization(&format!("Bearer {}", token))
}

pub fn api_key(key: &str) -> HeaderMap {
    authorization(&format!("ApiKey {}", key))
}

pub fn authorization(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
}
