//! Schema values
//!
//! The dynamic value tree the host runtime hands us for a declared resource,
//! and the shape we hand back after reading a resource from the console.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value as Json;
use std::fmt;

/// A single configuration value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    Int(i64),
    List(Vec<Value>),
    Record(Record),
}

impl Value {
    /// Kind name used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    /// True for "", false, 0, [] and a record with no fields
    pub fn is_zero(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Bool(b) => !b,
            Value::Int(i) => *i == 0,
            Value::List(items) => items.is_empty(),
            Value::Record(record) => record.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Convert untyped JSON (or YAML decoded as JSON) into a value.
    ///
    /// `null` has no schema counterpart and yields `None`; callers drop the
    /// field, which is the same as the operator not setting it. Fractional
    /// numbers are rejected since no schema kind can hold them.
    pub fn from_json(json: &Json) -> Result<Option<Value>, String> {
        let value = match json {
            Json::Null => return Ok(None),
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => return Err(format!("number {} is not an integer", n)),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(v) = Value::from_json(item)? {
                        out.push(v);
                    }
                }
                Value::List(out)
            }
            Json::Object(_) => Value::Record(Record::from_json(json)?),
        };
        Ok(Some(value))
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::String(s) => Json::String(s.clone()),
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(record) => record.to_json(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Record(record) => record.serialize(serializer),
        }
    }
}

/// Field name to value mapping, kept in insertion order.
///
/// Equality ignores order: two records are equal when they hold the same
/// fields with equal values.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.iter_mut().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace a field; a replaced field keeps its position
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((name, value));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(k, _)| k == name)?;
        Some(self.fields.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Builder-style insert, handy for fixtures
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Build a record from a JSON object. Fields holding `null` are dropped.
    pub fn from_json(json: &Json) -> Result<Record, String> {
        let Json::Object(map) = json else {
            return Err(format!("expected an object, found {}", json_kind(json)));
        };

        let mut record = Record::new();
        for (key, value) in map {
            let converted = Value::from_json(value).map_err(|e| format!("{}: {}", key, e))?;
            if let Some(v) = converted {
                record.insert(key.clone(), v);
            }
        }
        Ok(record)
    }

    pub fn to_json(&self) -> Json {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.to_json());
        }
        Json::Object(map)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Kind name for untyped JSON, used in error messages
pub fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(n) if n.is_i64() || n.is_u64() => "int",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "list",
        Json::Object(_) => "record",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut record = Record::new().with("a", 1i64).with("b", "two");
        record.insert("a", 3i64);

        let keys: Vec<&str> = record.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_equality_ignores_order() {
        let left = Record::new().with("a", true).with("b", "x");
        let right = Record::new().with("b", "x").with("a", true);
        assert_eq!(left, right);
        assert_ne!(left, Record::new().with("a", true));
    }

    #[test]
    fn test_from_json_drops_nulls() {
        let record = Record::from_json(&json!({"name": "r1", "gone": null, "n": 4})).unwrap();
        assert_eq!(record.len(), 2);
        assert!(!record.contains_key("gone"));
        assert_eq!(record.get("n"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_from_json_rejects_fractions() {
        let err = Record::from_json(&json!({"ratio": 0.5})).unwrap_err();
        assert!(err.contains("ratio"));
    }

    #[test]
    fn test_serializes_as_plain_json() {
        let record = Record::new()
            .with("name", "r1")
            .with("tags", vec!["a", "b"])
            .with("nested", Record::new().with("on", false));
        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(
            out,
            json!({"name": "r1", "tags": ["a", "b"], "nested": {"on": false}})
        );
        assert_eq!(out, record.to_json());
    }

    #[test]
    fn test_zero_values() {
        assert!(Value::from("").is_zero());
        assert!(Value::from(false).is_zero());
        assert!(Value::from(0i64).is_zero());
        assert!(Value::List(vec![]).is_zero());
        assert!(!Value::from("x").is_zero());
    }
}
