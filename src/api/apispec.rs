//! OpenAPI spec resolution
//!
//! The console parses an OpenAPI document into the endpoint list a WAAS
//! application rule uses. Nothing is stored by this call.

use super::client::ConsoleClient;
use crate::error::{ProviderError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const APISPEC_PATH: &str = "api/v1/policies/firewall/app/apispec";

/// One endpoint resolved from an OpenAPI document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedEndpoint {
    pub host: String,
    pub base_path: String,
    pub exposed_port: i64,
    pub internal_port: i64,
    pub tls: bool,
    pub http2: bool,
}

/// Resolve an OpenAPI document (already parsed as JSON)
pub async fn resolve_api_spec(client: &ConsoleClient, document: &Value) -> Result<Vec<ResolvedEndpoint>> {
    if !document.is_object() {
        return Err(ProviderError::config("apispec", "document must be a JSON or YAML object"));
    }

    let response = client
        .post(APISPEC_PATH, Some(document))
        .await
        .context_with(|| "resolve api spec".to_string())?;

    let endpoints = match response {
        Value::Null => Value::Array(Vec::new()),
        Value::Object(mut map) => map.remove("endpoints").unwrap_or(Value::Array(Vec::new())),
        other => other,
    };

    serde_json::from_value(endpoints).map_err(|e| ProviderError::decode(APISPEC_PATH, e.to_string()))
}
