//! HTTP utilities for console REST API calls

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use reqwest::{Client, Method};
use serde_json::Value;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for console API calls
#[derive(Clone, Debug)]
pub struct ApiHttpClient {
    client: Client,
}

impl ApiHttpClient {
    /// Create a new HTTP client from provider settings
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        if config.skip_cert_verification {
            tracing::warn!("TLS certificate verification is disabled");
        }

        let client = Client::builder()
            .user_agent(concat!("pccprov/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.skip_cert_verification)
            .build()
            .map_err(|e| ProviderError::Transport {
                endpoint: "client".to_string(),
                source: e,
            })?;

        Ok(Self { client })
    }

    pub async fn post(&self, url: &Url, token: Option<&str>, body: Option<&Value>) -> Result<Value> {
        self.send(Method::POST, url, token, body).await
    }

    /// Send one request. 404 becomes `NotFound`, any other non-2xx `Api`.
    /// An empty success body decodes as `null`.
    pub async fn send(
        &self,
        method: Method,
        url: &Url,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let endpoint = url.path().to_string();
        tracing::debug!("{} {}", method, endpoint);

        let mut request = self.client.request(method, url.clone());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ProviderError::Transport {
            endpoint: endpoint.clone(),
            source: e,
        })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| ProviderError::Transport {
            endpoint: endpoint.clone(),
            source: e,
        })?;

        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!("{} reported not found", endpoint);
            return Err(ProviderError::NotFound { endpoint });
        }

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(ProviderError::Api { endpoint, status });
        }

        if response_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response_body)
            .map_err(|e| ProviderError::decode(&endpoint, format!("invalid JSON: {}", e)))
    }
}
