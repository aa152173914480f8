//! Resource Registry - Load resource definitions from JSON
//!
//! Every resource type the provider manages is declared as data: its field
//! tree, how it is identified, and which endpoints read and write it. This
//! module loads those declarations from embedded JSON files and provides
//! lookup functions for the rest of the crate.

use crate::schema::FieldSpec;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/collections.json"),
    include_str!("../resources/access.json"),
    include_str!("../resources/custom_rules.json"),
    include_str!("../resources/compliance.json"),
    include_str!("../resources/runtime.json"),
    include_str!("../resources/admission.json"),
    include_str!("../resources/settings.json"),
];

/// Policy singletons the console holds, one per type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyType {
    #[serde(rename = "admission")]
    Admission,
    #[serde(rename = "containerCompliance")]
    ContainerCompliance,
    #[serde(rename = "hostCompliance")]
    HostCompliance,
    #[serde(rename = "ciImagesCompliance")]
    CiImagesCompliance,
    #[serde(rename = "containerRuntime")]
    ContainerRuntime,
    #[serde(rename = "hostRuntime")]
    HostRuntime,
}

impl PolicyType {
    pub const ALL: [PolicyType; 6] = [
        PolicyType::Admission,
        PolicyType::ContainerCompliance,
        PolicyType::HostCompliance,
        PolicyType::CiImagesCompliance,
        PolicyType::ContainerRuntime,
        PolicyType::HostRuntime,
    ];

    /// Tag the console uses in `policyType` and as the policy `_id`
    pub fn tag(&self) -> &'static str {
        match self {
            PolicyType::Admission => "admission",
            PolicyType::ContainerCompliance => "containerCompliance",
            PolicyType::HostCompliance => "hostCompliance",
            PolicyType::CiImagesCompliance => "ciImagesCompliance",
            PolicyType::ContainerRuntime => "containerRuntime",
            PolicyType::HostRuntime => "hostRuntime",
        }
    }

    pub fn from_tag(tag: &str) -> Option<PolicyType> {
        Self::ALL.into_iter().find(|p| p.tag() == tag)
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// HTTP verb for a write endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_method(&self) -> Method {
        match self {
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
        }
    }
}

/// A write endpoint; `{id}` in the path is replaced by the resource id
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointDef {
    pub method: HttpMethod,
    pub path: String,
}

/// How a resource is identified and addressed
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    /// One object per console, read and replaced whole
    Singleton {
        #[serde(default)]
        policy_type: Option<PolicyType>,
        /// Fixed id for singletons that are not policies
        #[serde(default)]
        id: Option<String>,
        read: String,
        write: EndpointDef,
        /// Body written on delete, since singletons cannot be removed
        reset: Value,
    },
    /// One of many objects, found by scanning the list endpoint
    Listed {
        /// Configuration field holding the id
        key: String,
        list: String,
        create: EndpointDef,
        update: EndpointDef,
        delete: String,
        /// The console expects the caller to pick the next integer id
        #[serde(default)]
        assign_id: bool,
    },
}

/// Uniqueness constraint over the records of a list field
#[derive(Debug, Clone, Deserialize)]
pub struct UniqueDef {
    pub list: String,
    pub key: String,
}

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub identity: Identity,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Reuse the field tree of another resource
    #[serde(default)]
    pub fields_from: Option<String>,
    #[serde(default)]
    pub unique: Vec<UniqueDef>,
}

impl ResourceDef {
    pub fn policy_type(&self) -> Option<PolicyType> {
        match &self.identity {
            Identity::Singleton { policy_type, .. } => *policy_type,
            Identity::Listed { .. } => None,
        }
    }

    /// Fixed id of a singleton resource
    pub fn singleton_id(&self) -> Option<String> {
        match &self.identity {
            Identity::Singleton { policy_type, id, .. } => id
                .clone()
                .or_else(|| policy_type.map(|p| p.tag().to_string())),
            Identity::Listed { .. } => None,
        }
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Parse and merge resource files, resolving `fields_from` references
pub fn load_registry(files: &[&str]) -> Result<ResourceConfig, String> {
    let mut config = ResourceConfig::default();

    for content in files {
        let partial: ResourceConfig =
            serde_json::from_str(content).map_err(|e| format!("Failed to parse resource JSON: {}", e))?;
        for (key, def) in partial.resources {
            if config.resources.contains_key(&key) {
                return Err(format!("Resource {} defined twice", key));
            }
            config.resources.insert(key, def);
        }
    }

    let borrowed: Vec<(String, String)> = config
        .resources
        .iter()
        .filter_map(|(key, def)| def.fields_from.clone().map(|from| (key.clone(), from)))
        .collect();

    for (key, from) in borrowed {
        let source = config
            .resources
            .get(&from)
            .ok_or_else(|| format!("Resource {} takes fields from unknown {}", key, from))?;
        if source.fields_from.is_some() {
            return Err(format!("Resource {} takes fields from {}, which borrows too", key, from));
        }
        let (fields, unique) = (source.fields.clone(), source.unique.clone());
        if let Some(def) = config.resources.get_mut(&key) {
            def.fields = fields;
            if def.unique.is_empty() {
                def.unique = unique;
            }
        }
    }

    Ok(config)
}

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        load_registry(RESOURCE_FILES)
            .unwrap_or_else(|e| panic!("Embedded resource definitions are invalid: {}", e))
    })
}

/// Get a resource definition by key
pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(key)
}

/// Get all resource keys, sorted
pub fn get_all_resource_keys() -> Vec<&'static str> {
    get_registry().resources.keys().map(|s| s.as_str()).collect()
}

/// Find the singleton resource managing a policy type
pub fn get_policy_resource(policy_type: PolicyType) -> Option<(&'static str, &'static ResourceDef)> {
    get_registry()
        .resources
        .iter()
        .find(|(_, def)| def.policy_type() == Some(policy_type))
        .map(|(k, def)| (k.as_str(), def))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{find_field, FieldKind};

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert!(
            !registry.resources.is_empty(),
            "Registry should have resources"
        );
    }

    #[test]
    fn test_expected_resource_types_exist() {
        let keys = get_all_resource_keys();
        for key in [
            "collection",
            "credential",
            "custom_rule",
            "custom_compliance",
            "user",
            "group",
            "rbac_role",
            "admission_policy",
            "compliance_container_policy",
            "compliance_host_policy",
            "compliance_ci_image_policy",
            "runtime_container_policy",
            "runtime_host_policy",
            "registry_settings",
        ] {
            assert!(keys.contains(&key), "missing resource type {}", key);
        }
    }

    #[test]
    fn test_every_policy_type_has_a_resource() {
        for policy_type in PolicyType::ALL {
            let (_, def) = get_policy_resource(policy_type)
                .unwrap_or_else(|| panic!("no resource for {}", policy_type));
            assert_eq!(def.singleton_id().as_deref(), Some(policy_type.tag()));
        }
    }

    #[test]
    fn test_borrowed_fields_resolved() {
        let host = get_resource("compliance_host_policy").unwrap();
        let container = get_resource("compliance_container_policy").unwrap();
        assert!(!host.fields.is_empty());
        assert_eq!(host.fields, container.fields);
        assert_eq!(host.unique.len(), 1);
    }

    #[test]
    fn test_collection_categories_default_to_wildcard() {
        let collection = get_resource("collection").unwrap();
        for name in ["hosts", "images", "labels", "containers", "account_ids", "app_ids"] {
            let field = find_field(&collection.fields, name).unwrap();
            assert_eq!(field.default, Some(serde_json::json!(["*"])), "{}", name);
        }
    }

    #[test]
    fn test_credential_secret_kind() {
        let credential = get_resource("credential").unwrap();
        let secret = find_field(&credential.fields, "secret").unwrap();
        assert_eq!(secret.kind, FieldKind::Secret);
    }

    #[test]
    fn test_policy_tag_round_trip() {
        for policy_type in PolicyType::ALL {
            assert_eq!(PolicyType::from_tag(policy_type.tag()), Some(policy_type));
        }
        assert_eq!(PolicyType::from_tag("nope"), None);
    }

    #[test]
    fn test_duplicate_definitions_rejected() {
        let file = r#"{"resources": {"x": {"display_name": "X", "identity": {"kind": "singleton", "id": "x", "read": "r", "write": {"method": "PUT", "path": "r"}, "reset": {}}}}}"#;
        assert!(load_registry(&[file, file]).is_err());
    }
}
