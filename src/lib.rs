pub mod auth;
pub mod cli;
pub mod clock;
pub mod db;
pub mod error;
pub mod hits;
pub mod jwt;
pub mod password;
pub mod refresh;
pub mod session;
pub mod user;

pub use auth::{AuthorizationGuard, CredentialError, Owned};
pub use clock::{Clock, ManualClock, SystemClock};
pub use db::Database;
pub use error::{AuthError, AuthFailure, StorageError};
pub use hits::HitCounter;
pub use jwt::{JwtConfig, TokenCodec, TokenError};
pub use password::{Argon2Hasher, HashError, HashingPool, PasswordHasher};
pub use refresh::{RefreshToken, RefreshTokenError, RefreshTokenRepository, RefreshTokenStore};
pub use session::{AccessTokenResponse, AuthSettings, SessionService, SessionTokens};
pub use user::{NewUser, User, UserRepository, UserResponse};
