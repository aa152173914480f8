//! Provider errors
//!
//! Nothing here is retried. Every failure is wrapped with one line of context
//! naming the operation and resource, then handed back to the caller.

use crate::schema::MapError;
use reqwest::StatusCode;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// A declared value does not fit its field specification
    #[error("invalid configuration at {path}: {message}")]
    Configuration { path: String, message: String },

    #[error("not found: {endpoint}")]
    NotFound { endpoint: String },

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("API request to {endpoint} failed: {status}")]
    Api { endpoint: String, status: StatusCode },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unknown resource type: {0}")]
    UnknownResource(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    pub fn config(path: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn decode(endpoint: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    /// Wrap with one line of context, e.g. `update collection "web"`
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The error with any context wrappers peeled off
    pub fn root(&self) -> &ProviderError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    /// HTTP status behind the error, when there is one
    pub fn status(&self) -> Option<StatusCode> {
        match self.root() {
            Self::Api { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            Self::Transport { source, .. } => source.status(),
            _ => None,
        }
    }
}

impl From<MapError> for ProviderError {
    fn from(err: MapError) -> Self {
        let path = err.path().to_string();
        Self::Configuration {
            path,
            message: err.to_string(),
        }
    }
}

/// Extension for attaching context to provider results
pub trait ResultExt<T> {
    fn context_with<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context_with<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}

/// Format a provider error for display
/// Security: maps statuses to fixed messages so console error bodies are not echoed
pub fn describe_error(error: &ProviderError) -> String {
    match error.root() {
        ProviderError::Configuration { .. }
        | ProviderError::UnknownResource(_)
        | ProviderError::Decode { .. } => return error.to_string(),
        ProviderError::Auth(_) => {
            return "Authentication failed. Check username/password or token.".to_string()
        }
        _ => {}
    }

    match error.status().map(|s| s.as_u16()) {
        Some(401) => "Authentication failed. Check username/password or token.".to_string(),
        Some(403) => "Permission denied. Check the role assigned to this user.".to_string(),
        Some(404) => "Resource not found.".to_string(),
        Some(409) => "Resource conflict. The resource may already exist.".to_string(),
        Some(429) => "Rate limit exceeded. Please try again later.".to_string(),
        Some(400) => "Invalid request. Check the declared values.".to_string(),
        Some(500) | Some(503) => "Console temporarily unavailable. Please try again.".to_string(),
        _ => {
            let text = error.to_string();
            let sanitized: String = text
                .chars()
                .filter(|c| c.is_ascii_graphic() || *c == ' ')
                .take(160)
                .collect();
            if sanitized.len() < text.len() {
                format!("{}...", sanitized)
            } else {
                sanitized
            }
        }
    }
}
