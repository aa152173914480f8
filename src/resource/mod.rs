//! Resource abstraction layer
//!
//! Resource types are data, not code. Each one is declared in a JSON file
//! under `src/resources/` and driven by one generic controller.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches resource definitions from embedded JSON
//! - [`controller`] - Create / read / update / delete / import against the console
//!
//! # Resource Definitions
//!
//! - `collections.json` - collections
//! - `access.json` - credentials, users, groups, RBAC roles
//! - `custom_rules.json` - custom runtime rules and custom compliance checks
//! - `compliance.json` / `runtime.json` / `admission.json` - policy singletons
//! - `settings.json` - registry scan settings
//!
//! # Example
//!
//! ```ignore
//! use pcc_provider::resource::ResourceController;
//!
//! async fn read_collection(client: &ConsoleClient) -> Result<()> {
//!     let controller = ResourceController::new(client, "collection")?;
//!     let state = controller.read("web").await?;
//!     Ok(())
//! }
//! ```

pub mod controller;
pub mod registry;

pub use controller::{ResourceController, ResourceState};
pub use registry::*;
