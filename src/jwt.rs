//! Access token generation and validation.
//!
//! Access tokens are short-lived HMAC-signed JWTs carrying only
//! `{iss, sub, iat, exp}`. They are stateless: nothing is stored, so the
//! only ways to invalidate one are waiting for `exp` or rotating the secret.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Issuer stamped into and required from every access token.
pub const ISSUER: &str = "chirpy";

/// Access token lifetime: 1 hour
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;

/// Longest access token lifetime the codec will issue: 1 day
pub const MAX_ACCESS_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Header algorithms accepted on validation. Anything else is rejected
/// before the signature is looked at.
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// JWT claims for access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer
    pub iss: String,
    /// Subject (user UUID)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),

    #[error("malformed token")]
    Malformed,

    #[error("unexpected signing algorithm {0:?}")]
    UnexpectedAlgorithm(Algorithm),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid claims")]
    InvalidClaims,

    #[error("token expired")]
    Expired,

    #[error("token subject is not a user id")]
    MalformedSubject,

    #[error("access token lifetime of {0}s is out of range")]
    Lifetime(i64),
}

/// Mints and checks access tokens.
pub trait TokenCodec: Send + Sync {
    fn issue_access_token_at(
        &self,
        user_id: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError>;

    fn validate_access_token_at(&self, token: &str, now: DateTime<Utc>)
    -> Result<Uuid, TokenError>;

    fn issue_access_token(&self, user_id: Uuid, ttl: Duration) -> Result<String, TokenError> {
        self.issue_access_token_at(user_id, ttl, Utc::now())
    }

    fn validate_access_token(&self, token: &str) -> Result<Uuid, TokenError> {
        self.validate_access_token_at(token, Utc::now())
    }
}

/// HMAC keys for signing and verifying access tokens.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Decode and verify without the expiry check, which is done against the
    /// caller's clock instead of the library's.
    fn decode(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| TokenError::Malformed)?;
        if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
            return Err(TokenError::UnexpectedAlgorithm(header.alg));
        }

        let mut validation = Validation::new(header.alg);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => TokenError::UnexpectedAlgorithm(header.alg),
                ErrorKind::InvalidIssuer | ErrorKind::MissingRequiredClaim(_) => {
                    TokenError::InvalidClaims
                }
                _ => TokenError::Malformed,
            })
    }
}

impl TokenCodec for JwtConfig {
    fn issue_access_token_at(
        &self,
        user_id: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let ttl_secs = ttl.num_seconds();
        if !(1..=MAX_ACCESS_TOKEN_TTL_SECS).contains(&ttl_secs) {
            return Err(TokenError::Lifetime(ttl_secs));
        }

        let iat = now.timestamp();
        let exp = iat
            .checked_add(ttl_secs)
            .ok_or(TokenError::Lifetime(ttl_secs))?;
        let claims = AccessClaims {
            iss: ISSUER.to_string(),
            sub: user_id.to_string(),
            iat,
            exp,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    fn validate_access_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid, TokenError> {
        let claims = self.decode(token)?;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Uuid::parse_str(&claims.sub).map_err(|_| TokenError::MalformedSubject)
    }
}
