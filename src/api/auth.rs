//! Console authentication
//!
//! Either a pre-issued JSON web token from the settings, or a username and
//! password exchanged for a token at `api/v1/authenticate`.

use super::http::ApiHttpClient;
use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;

/// Login endpoint, relative to the base URL
pub const AUTHENTICATE_PATH: &str = "api/v1/authenticate";

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Console tokens are issued for 30 minutes
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
pub enum Credentials {
    Token(String),
    Password { username: String, password: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Token(..)"),
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

impl Credentials {
    /// Pick credentials from settings; a token wins over a password
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        if let Some(token) = config.token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(Credentials::Token(token.clone()));
        }
        match (&config.username, &config.password) {
            (Some(username), Some(password)) => Ok(Credentials::Password {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => Err(ProviderError::config(
                "provider",
                "either token or username and password must be set",
            )),
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Credentials holder with token caching
#[derive(Clone, Debug)]
pub struct ConsoleCredentials {
    credentials: Credentials,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl ConsoleCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get a bearer token for API calls, logging in when the cached one is stale
    pub async fn get_token(&self, http: &ApiHttpClient, base: &Url) -> Result<String> {
        let (username, password) = match &self.credentials {
            Credentials::Token(token) => return Ok(token.clone()),
            Credentials::Password { username, password } => (username, password),
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, logging in again");
            }
        }

        let url = base
            .join(AUTHENTICATE_PATH)
            .map_err(|e| ProviderError::config("provider.console_url", e.to_string()))?;
        let body = serde_json::to_value(LoginRequest { username, password })
            .map_err(|e| ProviderError::Auth(e.to_string()))?;

        let response = http.post(&url, None, Some(&body)).await.map_err(|e| match e {
            ProviderError::Api { status, .. } => {
                ProviderError::Auth(format!("console rejected login with {}", status))
            }
            other => other.context("authenticate"),
        })?;

        let login: LoginResponse = serde_json::from_value(response)
            .map_err(|e| ProviderError::decode(AUTHENTICATE_PATH, e.to_string()))?;

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: login.token.clone(),
                expires_at: Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(login.token)
    }

    /// Drop the cached token so the next call logs in again
    pub async fn invalidate(&self) {
        let mut cache = self.token_cache.write().await;
        *cache = None;
    }
}
