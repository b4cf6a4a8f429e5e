//! Pulling credentials out of the `Authorization` header.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use thiserror::Error;

/// Scheme for user access tokens.
pub const BEARER_SCHEME: &str = "Bearer";

/// Scheme for service callers presenting a shared API key.
pub const API_KEY_SCHEME: &str = "ApiKey";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("no credential presented")]
    Missing,

    #[error("malformed authorization header")]
    Malformed,
}

/// Token from a `Bearer <token>` header value.
pub fn extract_bearer(header_value: Option<&str>) -> Result<&str, CredentialError> {
    extract_scheme(header_value, BEARER_SCHEME)
}

/// Key from an `ApiKey <key>` header value.
pub fn extract_api_key(header_value: Option<&str>) -> Result<&str, CredentialError> {
    extract_scheme(header_value, API_KEY_SCHEME)
}

fn extract_scheme<'a>(
    header_value: Option<&'a str>,
    scheme: &str,
) -> Result<&'a str, CredentialError> {
    let value = header_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(CredentialError::Missing)?;

    let (presented, credential) = value
        .split_once(char::is_whitespace)
        .ok_or(CredentialError::Malformed)?;
    if !presented.eq_ignore_ascii_case(scheme) {
        return Err(CredentialError::Malformed);
    }

    let credential = credential.trim();
    if credential.is_empty() || credential.contains(char::is_whitespace) {
        return Err(CredentialError::Malformed);
    }
    Ok(credential)
}

/// Raw `Authorization` header value, if present. Non-UTF-8 bytes are
/// `Malformed` rather than treated as absent.
pub fn authorization_header(headers: &HeaderMap) -> Result<Option<&str>, CredentialError> {
    headers
        .get(AUTHORIZATION)
        .map(|v| v.to_str().map_err(|_| CredentialError::Malformed))
        .transpose()
}

pub fn bearer_from_headers(headers: &HeaderMap) -> Result<&str, CredentialError> {
    extract_bearer(authorization_header(headers)?)
}

pub fn api_key_from_headers(headers: &HeaderMap) -> Result<&str, CredentialError> {
    extract_api_key(authorization_header(headers)?)
}
