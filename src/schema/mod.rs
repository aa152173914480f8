//! Configuration schema and the mapper between it and the wire format
//!
//! # Module Structure
//!
//! - [`value`] - dynamic `Value` / `Record` tree handled by the host runtime
//! - [`field`] - `FieldSpec` trees describing a resource's shape
//! - [`mapper`] - `lower` (configuration to wire) and `lift` (wire to configuration)

pub mod field;
pub mod mapper;
pub mod value;

pub use field::{find_field, FieldKind, FieldSpec, Presence};
pub use mapper::{apply_defaults, carry_secrets, drift, lift, lower, validate_unique, MapError};
pub use value::{Record, Value};
