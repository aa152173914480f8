//! Infrastructure-as-code provider core for a cloud-security console.
//!
//! Declared configuration is lowered into the console's JSON wire format,
//! written over its REST API, and lifted back into configuration on read.

pub mod api;
pub mod config;
pub mod error;
pub mod resource;
pub mod schema;
