//! Console API interaction module
//!
//! This module provides the transport layer for the console REST API:
//! authentication, the HTTP client, and the lookups that are not tied to a
//! single resource type.
//!
//! # Module Structure
//!
//! - [`auth`] - token or username/password authentication with token caching
//! - [`client`] - Main console client for making API requests
//! - [`http`] - HTTP utilities for REST API calls
//! - [`collections`] - Collection listing and lookup by name
//! - [`apispec`] - OpenAPI document resolution for WAAS rules
//!
//! # Example
//!
//! ```ignore
//! use pcc_provider::api::client::ConsoleClient;
//!
//! async fn example(config: &ProviderConfig) -> pcc_provider::error::Result<()> {
//!     let client = ConsoleClient::new(config)?;
//!     let policy = client.get("api/v1/policies/runtime/container").await?;
//!     Ok(())
//! }
//! ```

pub mod apispec;
pub mod auth;
pub mod client;
pub mod collections;
pub mod http;
