//! Collection lookup
//!
//! Collections are small in number, so lookups fetch the full list every
//! time instead of caching.

use super::client::ConsoleClient;
use crate::error::{ProviderError, Result, ResultExt};
use serde::{Deserialize, Serialize};

pub const COLLECTIONS_PATH: &str = "api/v1/collections";

/// Collection as returned by the console
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Collection {
    pub name: String,
    pub description: String,
    pub color: String,
    pub owner: String,
    #[serde(rename = "accountIDs")]
    pub account_ids: Vec<String>,
    #[serde(rename = "appIDs")]
    pub app_ids: Vec<String>,
    pub clusters: Vec<String>,
    pub code_repos: Vec<String>,
    pub containers: Vec<String>,
    pub functions: Vec<String>,
    pub hosts: Vec<String>,
    pub images: Vec<String>,
    pub labels: Vec<String>,
    pub namespaces: Vec<String>,
    pub modified: String,
    pub system: bool,
}

/// Fetch every collection defined on the console
pub async fn list_collections(client: &ConsoleClient) -> Result<Vec<Collection>> {
    let response = client
        .get(COLLECTIONS_PATH)
        .await
        .context_with(|| "list collections".to_string())?;

    if response.is_null() {
        return Ok(Vec::new());
    }

    serde_json::from_value(response)
        .map_err(|e| ProviderError::decode(COLLECTIONS_PATH, e.to_string()))
        .context_with(|| "list collections".to_string())
}

/// Find a collection by exact, case-sensitive name
pub async fn get_collection_by_name(client: &ConsoleClient, name: &str) -> Result<Collection> {
    let collections = list_collections(client).await?;
    tracing::debug!("Scanning {} collections for {:?}", collections.len(), name);

    collections
        .into_iter()
        .find(|c| c.name == name)
        .ok_or_else(|| ProviderError::NotFound {
            endpoint: format!("{}/{}", COLLECTIONS_PATH, name),
        })
}
