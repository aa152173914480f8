//! Console client
//!
//! Main client for the console REST API, combining authentication and HTTP
//! functionality.

use super::auth::{ConsoleCredentials, Credentials};
use super::http::ApiHttpClient;
use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::Url;

/// Main console client
#[derive(Clone, Debug)]
pub struct ConsoleClient {
    pub credentials: ConsoleCredentials,
    http: ApiHttpClient,
    base_url: Url,
}

impl ConsoleClient {
    /// Create a client from provider settings. No request is made yet.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .map_err(|e| ProviderError::config("provider.console_url", e.to_string()))?;
        let credentials = ConsoleCredentials::new(Credentials::from_config(config)?);
        let http = ApiHttpClient::new(config)?;

        tracing::info!("Console API at {}", base_url);

        Ok(Self {
            credentials,
            http,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an API URL from a path relative to the base, e.g. `api/v1/collections`
    pub fn api_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ProviderError::config("provider.console_url", format!("{}: {}", path, e)))
    }

    /// Get the current bearer token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.get_token(&self.http, &self.base_url).await
    }

    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.api_url(path)?;
        let token = self.get_token().await?;
        let result = self.http.send(method, &url, Some(&token), body).await;

        // A rejected token is dropped so the next call logs in again
        if let Err(ProviderError::Api { status, .. }) = &result {
            if *status == StatusCode::UNAUTHORIZED {
                tracing::warn!("Console rejected the token for {}", path);
                self.credentials.invalidate().await;
            }
        }
        result
    }

    /// Make a GET request to the console API
    pub async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, None).await
    }

    /// Make a POST request to the console API
    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        self.request(Method::POST, path, body).await
    }

    /// Make a DELETE request to the console API
    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.request(Method::DELETE, path, None).await
    }
}

/// Substitute `{id}` in an endpoint template, percent-encoding the id
pub fn endpoint_path(template: &str, id: &str) -> String {
    template.replace("{id}", &urlencoding::encode(id))
}
