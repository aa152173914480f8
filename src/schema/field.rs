//! Field specifications
//!
//! A resource's configuration shape is a tree of [`FieldSpec`]s. The tree is
//! declared as data in `src/resources/*.json` and drives both directions of
//! the mapper.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Whether the operator must, may, or cannot set a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Required,
    #[default]
    Optional,
    /// Assigned by the console; read back but never written
    Computed,
}

/// Shape of a field's value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Bool,
    Int,
    /// Credential material. Written as `{"plain": ..}`, never read back
    Secret,
    /// Plain string that is written but never returned, e.g. a user password
    WriteOnly,
    List {
        element: Box<FieldKind>,
    },
    Record {
        fields: Vec<FieldSpec>,
    },
    /// Nested singleton block, held in configuration as a one-element list
    Block {
        fields: Vec<FieldSpec>,
    },
    /// List of names, written as `[{"<key>": name}, ..]`
    Refs {
        #[serde(default = "default_ref_key")]
        key: String,
    },
}

fn default_ref_key() -> String {
    "name".to_string()
}

fn default_true() -> bool {
    true
}

impl FieldKind {
    /// Short human-readable form, e.g. `list(string)`
    pub fn describe(&self) -> String {
        match self {
            FieldKind::String => "string".to_string(),
            FieldKind::Bool => "bool".to_string(),
            FieldKind::Int => "int".to_string(),
            FieldKind::Secret => "secret".to_string(),
            FieldKind::WriteOnly => "string (write-only)".to_string(),
            FieldKind::List { element } => format!("list({})", element.describe()),
            FieldKind::Record { .. } => "record".to_string(),
            FieldKind::Block { .. } => "block".to_string(),
            FieldKind::Refs { .. } => "list(string)".to_string(),
        }
    }

    /// Values the console accepts but never hands back
    pub fn is_sensitive(&self) -> bool {
        matches!(self, FieldKind::Secret | FieldKind::WriteOnly)
    }

    /// Nested field specs for record-like kinds
    pub fn nested(&self) -> Option<&[FieldSpec]> {
        match self {
            FieldKind::Record { fields } | FieldKind::Block { fields } => Some(fields),
            FieldKind::List { element } => element.nested(),
            _ => None,
        }
    }
}

/// One field of a resource schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Configuration-side name (snake_case)
    pub name: String,
    /// Wire-side name; derived from `name` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wire: Option<String>,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub presence: Presence,
    /// Drop the field from request bodies when its value is empty
    #[serde(default = "default_true")]
    pub omit_empty: bool,
    /// Filled in by [`apply_defaults`](super::mapper::apply_defaults) when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Json>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl FieldSpec {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            wire: None,
            kind,
            presence: Presence::Optional,
            omit_empty: true,
            default: None,
            description: String::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.presence = Presence::Required;
        self
    }

    pub fn computed(mut self) -> Self {
        self.presence = Presence::Computed;
        self
    }

    pub fn wire(mut self, wire: &str) -> Self {
        self.wire = Some(wire.to_string());
        self
    }

    pub fn keep_empty(mut self) -> Self {
        self.omit_empty = false;
        self
    }

    pub fn default_value(mut self, default: Json) -> Self {
        self.default = Some(default);
        self
    }

    /// Name used in JSON request and response bodies
    pub fn wire_name(&self) -> String {
        match &self.wire {
            Some(wire) => wire.clone(),
            None => snake_to_camel(&self.name),
        }
    }
}

/// Find a field by configuration name
pub fn find_field<'a>(fields: &'a [FieldSpec], name: &str) -> Option<&'a FieldSpec> {
    fields.iter().find(|f| f.name == name)
}

/// `learning_disabled` -> `learningDisabled`
pub fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
