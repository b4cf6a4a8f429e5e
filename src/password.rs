//! Password hashing with Argon2id.
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=..,t=..,p=..$salt$digest`), so
//! verification reads the cost parameters back out of the stored hash and
//! older hashes keep verifying after the defaults change.

use std::sync::Arc;

use argon2::password_hash::{
    self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;
use tokio::sync::{OnceCell, Semaphore};

/// Memory cost in KiB (64 MiB).
pub const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
pub const DEFAULT_ITERATIONS: u32 = 1;
pub const DEFAULT_PARALLELISM: u32 = 2;
pub const DEFAULT_OUTPUT_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("malformed password hash: {0}")]
    MalformedHash(password_hash::Error),

    #[error("password hashing failed: {0}")]
    Hashing(password_hash::Error),

    #[error("invalid argon2 parameters: {0}")]
    Params(argon2::Error),

    #[error("hashing worker failed: {0}")]
    Worker(String),
}

/// One-way credential hashing.
pub trait PasswordHasher: Send + Sync {
    /// Hash `password` with a fresh random salt.
    fn hash(&self, password: &str) -> Result<String, HashError>;

    /// Check `password` against an encoded hash. A mismatch is `Ok(false)`;
    /// only an unreadable hash is an error.
    fn verify(&self, password: &str, encoded_hash: &str) -> Result<bool, HashError>;
}

#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    /// Build a hasher with custom cost parameters.
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, HashError> {
        let params = Params::new(
            memory_kib,
            iterations,
            parallelism,
            Some(DEFAULT_OUTPUT_LEN),
        )
        .map_err(HashError::Params)?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::with_params(DEFAULT_MEMORY_KIB, DEFAULT_ITERATIONS, DEFAULT_PARALLELISM)
            .expect("default argon2 parameters are valid")
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(HashError::Hashing)?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, encoded_hash: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(encoded_hash).map_err(HashError::MalformedHash)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HashError::Hashing(e)),
        }
    }
}

/// Runs hashing on tokio's blocking pool, at most `workers` at a time, so a
/// burst of logins cannot starve the async workers.
#[derive(Clone)]
pub struct HashingPool {
    hasher: Arc<dyn PasswordHasher>,
    permits: Arc<Semaphore>,
    decoy: Arc<OnceCell<String>>,
}

impl HashingPool {
    pub fn new(hasher: Arc<dyn PasswordHasher>, workers: usize) -> Self {
        Self {
            hasher,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            decoy: Arc::new(OnceCell::new()),
        }
    }

    pub async fn hash(&self, password: &str) -> Result<String, HashError> {
        let password = password.to_owned();
        self.run(move |hasher| hasher.hash(&password)).await
    }

    pub async fn verify(&self, password: &str, encoded_hash: &str) -> Result<bool, HashError> {
        let password = password.to_owned();
        let encoded_hash = encoded_hash.to_owned();
        self.run(move |hasher| hasher.verify(&password, &encoded_hash))
            .await
    }

    /// Spend the same work as [`verify`](Self::verify) when there is no
    /// stored hash to check, so a missing account takes as long to reject as
    /// a wrong password. Always `false`.
    ///
    /// The decoy hash is made once with this pool's hasher, so it carries the
    /// same cost parameters as real ones.
    pub async fn verify_decoy(&self, password: &str) -> Result<bool, HashError> {
        let decoy = self
            .decoy
            .get_or_try_init(|| self.hash("chirpy-decoy-password"))
            .await?;
        self.verify(password, decoy).await?;
        Ok(false)
    }

    async fn run<T, F>(&self, job: F) -> Result<T, HashError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PasswordHasher) -> Result<T, HashError> + Send + 'static,
    {
        // The permit travels with the blocking job, so a caller that goes
        // away mid-hash does not free a slot while the hash still runs.
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| HashError::Worker(e.to_string()))?;
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(hasher.as_ref())
        })
        .await
        .map_err(|e| HashError::Worker(e.to_string()))?
    }
}
