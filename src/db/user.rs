use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::error::StorageError;
use crate::user::{NewUser, User, UserRepository};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    hashed_password: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StorageError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            email: row.email,
            password_hash: row.hashed_password,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(super) fn parse_uuid(s: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(s).map_err(|_| StorageError::Corrupt(format!("bad uuid {:?}", s)))
}

/// Map a unique constraint violation to `Conflict`, anything else passes
/// through.
pub(super) fn map_unique(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Database(e),
    }
}

const USER_COLUMNS: &str = "id, email, hashed_password, created_at, updated_at";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete a user by ID. Their refresh tokens go with them.
    pub async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_one_where(
        &self,
        column: &str,
        value: String,
    ) -> Result<Option<User>, StorageError> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }
}

#[async_trait]
impl UserRepository for UserStore {
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        self.fetch_one_where("id", id.to_string()).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        self.fetch_one_where("email", email.to_string()).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        sqlx::query(
            "INSERT INTO users (id, email, hashed_password, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique)?;

        Ok(User {
            id: user.id,
            email: user.email,
            password_hash: user.password_hash,
            created_at: user.created_at,
            updated_at: user.created_at,
        })
    }

    async fn update_credentials(
        &self,
        id: Uuid,
        email: &str,
        password_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<User>, StorageError> {
        let sql = format!(
            "UPDATE users SET email = ?, hashed_password = ?, updated_at = ? WHERE id = ? RETURNING {}",
            USER_COLUMNS
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(email)
            .bind(password_hash)
            .bind(updated_at)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_unique)?;
        row.map(User::try_from).transpose()
    }
}
