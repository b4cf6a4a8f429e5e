//! Request authentication and resource authorization.
//!
//! Credentials arrive in the `Authorization` header: `Bearer <jwt>` for
//! users, `ApiKey <key>` for service callers. The guard turns a bearer
//! token into a [`User`](crate::user::User) and checks ownership of the
//! resources that user touches.

mod credentials;
mod guard;

pub use credentials::{
    API_KEY_SCHEME, BEARER_SCHEME, CredentialError, api_key_from_headers, authorization_header,
    bearer_from_headers, extract_api_key, extract_bearer,
};
pub use guard::{AuthorizationGuard, Owned, require_ownership, verify_service_key};
