//! Bidirectional mapper
//!
//! `lower` turns a configuration record into a JSON request body; `lift`
//! turns a JSON response body into a configuration record. The two are
//! deliberately not inverses:
//!
//! - `lower` only writes what the operator set. An absent field is never
//!   sent, so the console keeps whatever it holds for it.
//! - `lift` writes every declared field, zero values included, so the host
//!   can see drift back to a default.

use super::field::{FieldKind, FieldSpec, Presence};
use super::value::{json_kind, Record, Value};
use serde_json::{Map, Value as Json};
use std::borrow::Cow;

/// Failure to map a value onto its field specification
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: &'static str,
    },

    #[error("{path}: required field is not set")]
    MissingRequired { path: String },

    #[error("{path}: block accepts at most one element, found {count}")]
    TooManyBlocks { path: String, count: usize },

    #[error("{path}: duplicate {key} {value:?}")]
    Duplicate {
        path: String,
        key: String,
        value: String,
    },

    #[error("{path}: invalid default: {message}")]
    InvalidDefault { path: String, message: String },
}

impl MapError {
    /// Path of the offending field, e.g. `rule[2].collections`
    pub fn path(&self) -> &str {
        match self {
            MapError::TypeMismatch { path, .. }
            | MapError::MissingRequired { path }
            | MapError::TooManyBlocks { path, .. }
            | MapError::Duplicate { path, .. }
            | MapError::InvalidDefault { path, .. } => path,
        }
    }
}

fn child(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn index(path: &str, i: usize) -> String {
    format!("{}[{}]", path, i)
}

fn mismatch(path: &str, kind: &FieldKind, found: &'static str) -> MapError {
    MapError::TypeMismatch {
        path: path.to_string(),
        expected: kind.describe(),
        found,
    }
}

// =============================================================================
// Lower: configuration -> wire
// =============================================================================

/// Lower a configuration record into a JSON object body
pub fn lower(record: &Record, fields: &[FieldSpec]) -> Result<Map<String, Json>, MapError> {
    lower_record(record, fields, "")
}

fn lower_record(
    record: &Record,
    fields: &[FieldSpec],
    path: &str,
) -> Result<Map<String, Json>, MapError> {
    let mut out = Map::new();

    for field in fields {
        let field_path = child(path, &field.name);

        if field.presence == Presence::Computed {
            continue;
        }

        let Some(value) = record.get(&field.name) else {
            if field.presence == Presence::Required {
                return Err(MapError::MissingRequired { path: field_path });
            }
            continue;
        };

        // `false` is a real answer for a required bool
        if field.presence == Presence::Required && value.is_zero() && !matches!(value, Value::Bool(_)) {
            return Err(MapError::MissingRequired { path: field_path });
        }

        if field.omit_empty && value.is_zero() {
            continue;
        }

        let Some(json) = lower_value(value, &field.kind, &field_path)? else {
            continue;
        };
        // A nested block whose own fields were all left unset
        if field.omit_empty && json.as_object().is_some_and(Map::is_empty) {
            continue;
        }
        out.insert(field.wire_name(), json);
    }

    Ok(out)
}

/// `None` means "do not send"
fn lower_value(value: &Value, kind: &FieldKind, path: &str) -> Result<Option<Json>, MapError> {
    let json = match (kind, value) {
        (FieldKind::String, Value::String(s)) => Json::String(s.clone()),
        (FieldKind::Bool, Value::Bool(b)) => Json::Bool(*b),
        (FieldKind::Int, Value::Int(i)) => Json::from(*i),

        // Only the plain side is ever sent; an empty value is not a new secret
        (FieldKind::Secret, Value::String(s)) => {
            if s.is_empty() {
                return Ok(None);
            }
            let mut secret = Map::new();
            secret.insert("plain".to_string(), Json::String(s.clone()));
            Json::Object(secret)
        }

        (FieldKind::WriteOnly, Value::String(s)) => {
            if s.is_empty() {
                return Ok(None);
            }
            Json::String(s.clone())
        }

        (FieldKind::List { element }, Value::List(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                if let Some(json) = lower_value(item, element, &index(path, i))? {
                    out.push(json);
                }
            }
            Json::Array(out)
        }

        (FieldKind::Record { fields }, Value::Record(record)) => {
            Json::Object(lower_record(record, fields, path)?)
        }

        (FieldKind::Block { fields }, Value::Record(record)) => {
            Json::Object(lower_record(record, fields, path)?)
        }
        (FieldKind::Block { fields }, Value::List(items)) => match items.as_slice() {
            [] => return Ok(None),
            [Value::Record(record)] => Json::Object(lower_record(record, fields, &index(path, 0))?),
            [other] => return Err(mismatch(&index(path, 0), kind, other.kind_name())),
            _ => {
                return Err(MapError::TooManyBlocks {
                    path: path.to_string(),
                    count: items.len(),
                })
            }
        },

        (FieldKind::Refs { key }, Value::List(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let Value::String(name) = item else {
                    return Err(MapError::TypeMismatch {
                        path: index(path, i),
                        expected: "string".to_string(),
                        found: item.kind_name(),
                    });
                };
                let mut reference = Map::new();
                reference.insert(key.clone(), Json::String(name.clone()));
                out.push(Json::Object(reference));
            }
            Json::Array(out)
        }

        (_, other) => return Err(mismatch(path, kind, other.kind_name())),
    };

    Ok(Some(json))
}

// =============================================================================
// Lift: wire -> configuration
// =============================================================================

/// Lift a JSON response object into a configuration record.
///
/// Every declared field is present in the result. Wire fields without a
/// declaration are dropped.
pub fn lift(wire: &Json, fields: &[FieldSpec]) -> Result<Record, MapError> {
    lift_record(wire, fields, "")
}

fn lift_record(wire: &Json, fields: &[FieldSpec], path: &str) -> Result<Record, MapError> {
    let empty = Map::new();
    let object = match wire {
        Json::Object(map) => map,
        Json::Null => &empty,
        other => {
            return Err(MapError::TypeMismatch {
                path: path.to_string(),
                expected: "record".to_string(),
                found: json_kind(other),
            })
        }
    };

    let mut record = Record::new();
    for field in fields {
        let field_path = child(path, &field.name);
        let json = object.get(&field.wire_name()).unwrap_or(&Json::Null);
        record.insert(field.name.clone(), lift_value(json, &field.kind, &field_path)?);
    }
    Ok(record)
}

fn lift_value(json: &Json, kind: &FieldKind, path: &str) -> Result<Value, MapError> {
    if json.is_null() {
        return Ok(zero_value(kind));
    }

    let value = match (kind, json) {
        (FieldKind::String, Json::String(s)) => Value::String(s.clone()),
        (FieldKind::Bool, Json::Bool(b)) => Value::Bool(*b),
        (FieldKind::Int, Json::Number(n)) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => return Err(mismatch(path, kind, "number")),
        },

        // The console only ever returns the encrypted side, if anything
        (FieldKind::Secret | FieldKind::WriteOnly, _) => Value::String(String::new()),

        (FieldKind::List { element }, Json::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(lift_value(item, element, &index(path, i))?);
            }
            Value::List(out)
        }

        (FieldKind::Record { fields }, Json::Object(_)) => {
            Value::Record(lift_record(json, fields, path)?)
        }

        (FieldKind::Block { fields }, Json::Object(_)) => {
            Value::List(vec![Value::Record(lift_record(json, fields, &index(path, 0))?)])
        }

        (FieldKind::Refs { key }, Json::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let name = match item {
                    Json::String(s) => s.clone(),
                    Json::Object(map) => match map.get(key) {
                        Some(Json::String(s)) => s.clone(),
                        other => {
                            return Err(MapError::TypeMismatch {
                                path: index(path, i),
                                expected: format!("reference with string {:?}", key),
                                found: other.map_or("nothing", json_kind),
                            })
                        }
                    },
                    other => {
                        return Err(MapError::TypeMismatch {
                            path: index(path, i),
                            expected: "reference".to_string(),
                            found: json_kind(other),
                        })
                    }
                };
                out.push(Value::String(name));
            }
            Value::List(out)
        }

        (_, other) => return Err(mismatch(path, kind, json_kind(other))),
    };

    Ok(value)
}

/// Value a field takes when the console leaves it out.
///
/// Blocks always hold exactly one element so `block[0]` never fails.
pub fn zero_value(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::String | FieldKind::Secret | FieldKind::WriteOnly => {
            Value::String(String::new())
        }
        FieldKind::Bool => Value::Bool(false),
        FieldKind::Int => Value::Int(0),
        FieldKind::List { .. } | FieldKind::Refs { .. } => Value::List(Vec::new()),
        FieldKind::Record { fields } => Value::Record(zero_record(fields)),
        FieldKind::Block { fields } => Value::List(vec![Value::Record(zero_record(fields))]),
    }
}

fn zero_record(fields: &[FieldSpec]) -> Record {
    fields
        .iter()
        .map(|f| (f.name.clone(), zero_value(&f.kind)))
        .collect()
}

// =============================================================================
// Schema-path helpers
// =============================================================================

/// Fill unset fields that declare a default.
///
/// This is the normalisation a declared record goes through before it ever
/// reaches `lower`; `lower` itself never invents values.
pub fn apply_defaults(record: &mut Record, fields: &[FieldSpec]) -> Result<(), MapError> {
    apply_defaults_at(record, fields, "")
}

fn apply_defaults_at(record: &mut Record, fields: &[FieldSpec], path: &str) -> Result<(), MapError> {
    for field in fields {
        let field_path = child(path, &field.name);

        if !record.contains_key(&field.name) {
            if let Some(default) = &field.default {
                let value = Value::from_json(default).map_err(|message| MapError::InvalidDefault {
                    path: field_path.clone(),
                    message,
                })?;
                if let Some(value) = value {
                    record.insert(field.name.clone(), value);
                }
            }
        }

        let Some(nested) = field.kind.nested() else {
            continue;
        };
        if let Some(value) = record.get_mut(&field.name) {
            defaults_in_value(value, nested, &field_path)?;
        }
    }
    Ok(())
}

fn defaults_in_value(value: &mut Value, fields: &[FieldSpec], path: &str) -> Result<(), MapError> {
    match value {
        Value::Record(record) => apply_defaults_at(record, fields, path),
        Value::List(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                defaults_in_value(item, fields, &index(path, i))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Restore secret values the operator holds but the console never returns.
///
/// `lifted` is a fresh snapshot from the console; `prior` is the record the
/// host held before the read.
pub fn carry_secrets(prior: &Record, lifted: &mut Record, fields: &[FieldSpec]) {
    for field in fields {
        match &field.kind {
            FieldKind::Secret | FieldKind::WriteOnly => {
                let held = prior.get(&field.name).filter(|v| !v.is_zero());
                let missing = lifted.get(&field.name).map_or(true, Value::is_zero);
                if let (Some(held), true) = (held, missing) {
                    lifted.insert(field.name.clone(), held.clone());
                }
            }
            FieldKind::Record { fields: nested } => {
                if let (Some(Value::Record(p)), Some(Value::Record(l))) =
                    (prior.get(&field.name), lifted.get_mut(&field.name))
                {
                    carry_secrets(p, l, nested);
                }
            }
            FieldKind::Block { .. } | FieldKind::List { .. } => {
                let Some(nested) = field.kind.nested() else {
                    continue;
                };
                let held = prior.get(&field.name).map(|v| block_as_list(&field.kind, v));
                if let (Some(Value::List(p)), Some(Value::List(l))) =
                    (held.as_deref(), lifted.get_mut(&field.name))
                {
                    for (p, l) in p.iter().zip(l.iter_mut()) {
                        if let (Value::Record(p), Value::Record(l)) = (p, l) {
                            carry_secrets(p, l, nested);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// Paths where a value the operator set differs from the console snapshot.
///
/// Fields the operator left out, computed fields and secrets are not
/// compared.
pub fn drift(desired: &Record, actual: &Record, fields: &[FieldSpec]) -> Vec<String> {
    let mut out = Vec::new();
    drift_at(desired, actual, fields, "", &mut out);
    out
}

fn drift_at(desired: &Record, actual: &Record, fields: &[FieldSpec], path: &str, out: &mut Vec<String>) {
    for field in fields {
        if field.presence == Presence::Computed || field.kind.is_sensitive() {
            continue;
        }
        let Some(want) = desired.get(&field.name) else {
            continue;
        };
        let want = block_as_list(&field.kind, want);
        let field_path = child(path, &field.name);
        let have = actual.get(&field.name);

        match (field.kind.nested(), want.as_ref(), have) {
            (Some(nested), Value::Record(w), Some(Value::Record(h))) => {
                drift_at(w, h, nested, &field_path, out);
            }
            (Some(nested), Value::List(w), Some(Value::List(h))) if w.len() == h.len() => {
                for (i, (w, h)) in w.iter().zip(h).enumerate() {
                    match (w, h) {
                        (Value::Record(w), Value::Record(h)) => {
                            drift_at(w, h, nested, &index(&field_path, i), out)
                        }
                        (w, h) if w != h => out.push(index(&field_path, i)),
                        _ => {}
                    }
                }
            }
            (_, want, _) => {
                if have != Some(want) {
                    out.push(field_path);
                }
            }
        }
    }
}

/// A block declared as a bare record, seen the way `lift` returns it
fn block_as_list<'a>(kind: &FieldKind, value: &'a Value) -> Cow<'a, Value> {
    match (kind, value) {
        (FieldKind::Block { .. }, Value::Record(_)) => Cow::Owned(Value::List(vec![value.clone()])),
        _ => Cow::Borrowed(value),
    }
}

/// Reject duplicate `key` values among the records of list field `list`
pub fn validate_unique(record: &Record, list: &str, key: &str) -> Result<(), MapError> {
    let Some(Value::List(items)) = record.get(list) else {
        return Ok(());
    };

    let mut seen: Vec<&str> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(name) = item.as_record().and_then(|r| r.get(key)).and_then(Value::as_str) else {
            continue;
        };
        if seen.contains(&name) {
            return Err(MapError::Duplicate {
                path: child(&index(list, i), key),
                key: key.to_string(),
                value: name.to_string(),
            });
        }
        seen.push(name);
    }
    Ok(())
}
