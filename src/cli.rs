//! CLI argument parsing, validation, and startup helpers.

use std::io::BufRead;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};
use chrono::Duration;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::auth::API_KEY_SCHEME;
use crate::db::Database;
use crate::error::AuthError;
use crate::jwt::{DEFAULT_ACCESS_TOKEN_TTL_SECS, MAX_ACCESS_TOKEN_TTL_SECS};
use crate::session::{AuthSettings, DEFAULT_HASH_WORKERS, SessionService};

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Environment variable read by `create-user` before falling back to stdin.
pub const PASSWORD_ENV: &str = "CHIRPY_PASSWORD";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "chirpy", about = "Chirpy account and session administration")]
pub struct Args {
    /// Path to SQLite database file
    #[arg(short, long, default_value = "chirpy.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path to file containing the service API key. Prefer using POLKA_KEY env var instead
    #[arg(long)]
    pub service_key_file: Option<String>,

    /// Access token lifetime in seconds (at most one day)
    #[arg(long, env = "ACCESS_TOKEN_TTL_SECS", default_value_t = DEFAULT_ACCESS_TOKEN_TTL_SECS,
        value_parser = clap::value_parser!(i64).range(1..=MAX_ACCESS_TOKEN_TTL_SECS))]
    pub access_token_ttl_secs: i64,

    /// Maximum number of password hashes computed at once
    #[arg(long, env = "HASH_WORKERS", default_value_t = DEFAULT_HASH_WORKERS)]
    pub hash_workers: usize,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register a user. The password is read from CHIRPY_PASSWORD or the first line of stdin
    CreateUser {
        #[arg(long)]
        email: String,
    },
    /// Log in and print a new access and refresh token. Password as for create-user
    Login {
        #[arg(long)]
        email: String,
    },
    /// Exchange a refresh token for a new access token
    Refresh {
        #[arg(long)]
        token: String,
    },
    /// Revoke a refresh token
    Revoke {
        #[arg(long)]
        token: String,
    },
    /// Check a key against the configured service key
    VerifyServiceKey {
        #[arg(long)]
        key: String,
    },
}

impl Command {
    /// Whether the command reads a password before it runs.
    pub fn needs_password(&self) -> bool {
        matches!(self, Command::CreateUser { .. } | Command::Login { .. })
    }
}

/// Initialize logging based on the specified format. Logs go to stderr so
/// stdout stays clean for command output.
pub fn init_logging(format: &LogFormat) {
    let builder = tracing_subscriber::fmt().with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Some(secret) = take_env("JWT_SECRET") {
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load the service API key from POLKA_KEY or a file.
///
/// `Ok(None)` when neither is given; service checks then fail as
/// misconfigured.
pub fn load_service_key(service_key_file: Option<&str>) -> std::io::Result<Option<String>> {
    if let Some(key) = take_env("POLKA_KEY") {
        return Ok(Some(key));
    }
    let Some(path) = service_key_file else {
        return Ok(None);
    };
    let content = std::fs::read_to_string(path).inspect_err(|e| {
        error!(path = %path, error = %e, "Failed to read service key file");
    })?;
    Ok(Some(content.trim().to_string()))
}

/// Read and clear an environment variable.
///
/// Only call this from `main` before the async runtime is built.
fn take_env(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    // SAFETY: main reads every secret before it builds the runtime, so no
    // other thread exists yet that could touch the environment.
    unsafe { std::env::remove_var(name) };
    Some(value)
}

/// Password from CHIRPY_PASSWORD, else the first line of stdin. Reads the
/// environment through `take_env`, so call it before the runtime starts.
pub fn read_password() -> Option<String> {
    if let Some(password) = take_env(PASSWORD_ENV) {
        return Some(password);
    }

    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) => {
            error!("No password given. Set {} or pipe it on stdin", PASSWORD_ENV);
            None
        }
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        Err(e) => {
            error!(error = %e, "Failed to read password from stdin");
            None
        }
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

/// Build AuthSettings from validated arguments.
pub fn build_settings(args: &Args) -> AuthSettings {
    AuthSettings {
        access_token_ttl: Duration::seconds(args.access_token_ttl_secs),
        hash_workers: args.hash_workers,
        ..AuthSettings::default()
    }
}

/// Run one subcommand and return its JSON output. `password` is only read
/// for commands that need it.
pub async fn run_command(
    service: &SessionService,
    command: &Command,
    password: impl FnOnce() -> Option<String>,
) -> Result<Value, AuthError> {
    match command {
        Command::CreateUser { email } => {
            let password = password().ok_or_else(|| AuthError::validation("password is required"))?;
            let user = service.register(email, &password).await?;
            Ok(json!(user))
        }
        Command::Login { email } => {
            let password = password().ok_or_else(|| AuthError::validation("password is required"))?;
            let session = service.login(email, &password).await?;
            Ok(json!(session))
        }
        Command::Refresh { token } => Ok(json!(service.refresh(token).await?)),
        Command::Revoke { token } => {
            service.revoke(token).await?;
            Ok(json!({ "revoked": true }))
        }
        Command::VerifyServiceKey { key } => {
            let mut headers = HeaderMap::new();
            let value = HeaderValue::from_str(&format!("{} {}", API_KEY_SCHEME, key))
                .map_err(|_| AuthError::validation("key contains invalid characters"))?;
            headers.insert(AUTHORIZATION, value);
            service.authorize_service(&headers)?;
            Ok(json!({ "valid": true }))
        }
    }
}
