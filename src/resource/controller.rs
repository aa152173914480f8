//! Resource lifecycle controller
//!
//! One generic controller drives every resource type through
//! create / read / update / delete / import, using the type's registry
//! definition for its field tree and endpoints.
//!
//! Each call is a straight sequence of requests with no retries. Writes are
//! always whole-object replacements, and every write is followed by a read
//! so the returned state is what the console holds, not what was sent.
//! Singleton policies are last-write-wins: two writers racing on the same
//! policy type are not detected.

use super::registry::{get_policy_resource, get_resource, EndpointDef, Identity, PolicyType, ResourceDef};
use crate::api::client::{endpoint_path, ConsoleClient};
use crate::error::{ProviderError, Result, ResultExt};
use crate::schema::{
    carry_secrets, find_field, lift, lower, validate_unique, FieldKind, Record, Value,
};
use serde::Serialize;
use serde_json::{Map, Value as Json};

/// A resource as the console holds it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceState {
    pub id: String,
    pub record: Record,
}

pub struct ResourceController<'a> {
    client: &'a ConsoleClient,
    key: &'a str,
    def: &'a ResourceDef,
}

impl<'a> ResourceController<'a> {
    /// Controller for a registered resource type, or for a policy by its tag
    pub fn new(client: &'a ConsoleClient, key: &'a str) -> Result<Self> {
        if let Some(def) = get_resource(key) {
            return Ok(Self::with_def(client, key, def));
        }
        match PolicyType::from_tag(key) {
            Some(policy_type) => Self::for_policy(client, policy_type),
            None => Err(ProviderError::UnknownResource(key.to_string())),
        }
    }

    /// Controller for the singleton holding a policy type
    pub fn for_policy(client: &'a ConsoleClient, policy_type: PolicyType) -> Result<Self> {
        let (key, def) = get_policy_resource(policy_type)
            .ok_or_else(|| ProviderError::UnknownResource(policy_type.to_string()))?;
        Ok(Self::with_def(client, key, def))
    }

    pub fn with_def(client: &'a ConsoleClient, key: &'a str, def: &'a ResourceDef) -> Self {
        Self { client, key, def }
    }

    pub fn def(&self) -> &ResourceDef {
        self.def
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Write a new resource, then read it back
    pub async fn create(&self, desired: &Record) -> Result<ResourceState> {
        let mut body = self.body(desired)?;

        let id = match &self.def.identity {
            Identity::Singleton { write, .. } => {
                let id = self.singleton_id();
                self.write(write, &id, &body).await.context_with(|| self.op("create", &id))?;
                id
            }
            Identity::Listed {
                key,
                create,
                assign_id,
                ..
            } => {
                let id = match key_of(desired, key) {
                    Some(id) => id,
                    None if *assign_id => {
                        let next = self.next_id().await.context_with(|| self.op("create", "<new>"))?;
                        self.set_key(&mut body, key, &next)?;
                        next
                    }
                    None => {
                        return Err(ProviderError::config(key, "required to create this resource")
                            .context(self.op("create", "<new>")))
                    }
                };
                self.write(create, &id, &body).await.context_with(|| self.op("create", &id))?;
                id
            }
        };

        tracing::info!("Created {} {:?}", self.key, id);
        self.read_back("create", &id, desired).await
    }

    /// Read the resource; `None` when the console no longer has it
    pub async fn read(&self, id: &str) -> Result<Option<ResourceState>> {
        let found = match &self.def.identity {
            Identity::Singleton { read, .. } => {
                self.check_singleton_id("read", id)?;
                match self.client.get(read).await {
                    Ok(json) => {
                        self.check_policy_type(read, &json).context_with(|| self.op("read", id))?;
                        Some((json, read.as_str()))
                    }
                    Err(e) if e.is_not_found() => None,
                    Err(e) => return Err(e.context(self.op("read", id))),
                }
            }
            Identity::Listed { key, list, .. } => {
                let items = match self.list(list).await {
                    Ok(items) => items,
                    Err(e) if e.is_not_found() => Vec::new(),
                    Err(e) => return Err(e.context(self.op("read", id))),
                };
                let wire_key = self.wire_key(key);
                items
                    .into_iter()
                    .find(|item| item.get(&wire_key).and_then(json_id).as_deref() == Some(id))
                    .map(|item| (item, list.as_str()))
            }
        };

        let Some((json, endpoint)) = found else {
            tracing::warn!("{} {:?} not found; clearing identity", self.key, id);
            return Ok(None);
        };

        let record = lift(&json, &self.def.fields)
            .map_err(|e| ProviderError::decode(endpoint, e.to_string()))
            .context_with(|| self.op("read", id))?;

        Ok(Some(ResourceState {
            id: id.to_string(),
            record,
        }))
    }

    /// Read the resource again, keeping secrets the console does not return
    pub async fn refresh(&self, prior: &ResourceState) -> Result<Option<ResourceState>> {
        let mut state = self.read(&prior.id).await?;
        if let Some(state) = state.as_mut() {
            carry_secrets(&prior.record, &mut state.record, &self.def.fields);
        }
        Ok(state)
    }

    /// Replace the resource with `desired`. Fails if it no longer exists.
    pub async fn update(&self, id: &str, desired: &Record) -> Result<ResourceState> {
        let mut body = self.body(desired)?;

        match &self.def.identity {
            Identity::Singleton { write, .. } => {
                self.check_singleton_id("update", id)?;
                self.write(write, id, &body).await.context_with(|| self.op("update", id))?;
            }
            Identity::Listed { key, update, .. } => {
                if let Some(new_id) = key_of(desired, key) {
                    if new_id != id {
                        return Err(ProviderError::config(
                            key,
                            format!("cannot change from {:?} to {:?}; recreate the resource", id, new_id),
                        )
                        .context(self.op("update", id)));
                    }
                }

                if self.read(id).await?.is_none() {
                    return Err(ProviderError::NotFound {
                        endpoint: endpoint_path(&update.path, id),
                    }
                    .context(self.op("update", id)));
                }

                self.set_key(&mut body, key, id)?;
                self.write(update, id, &body).await.context_with(|| self.op("update", id))?;
            }
        }

        tracing::info!("Updated {} {:?}", self.key, id);
        self.read_back("update", id, desired).await
    }

    /// Remove the resource. Already gone counts as success.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = match &self.def.identity {
            Identity::Singleton {
                write, reset, ..
            } => {
                self.check_singleton_id("delete", id)?;
                let mut body = reset.as_object().cloned().unwrap_or_default();
                self.stamp_policy_type(&mut body);
                self.write(write, id, &body).await
            }
            Identity::Listed { delete, .. } => self.client.delete(&endpoint_path(delete, id)).await.map(|_| ()),
        };

        match result {
            Ok(()) => {
                tracing::info!("Deleted {} {:?}", self.key, id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!("{} {:?} already deleted", self.key, id);
                Ok(())
            }
            Err(e) => Err(e.context(self.op("delete", id))),
        }
    }

    /// Adopt an existing resource by id
    pub async fn import(&self, id: &str) -> Result<ResourceState> {
        match self.read(id).await? {
            Some(state) => {
                tracing::info!("Imported {} {:?}", self.key, id);
                Ok(state)
            }
            None => Err(ProviderError::NotFound {
                endpoint: format!("{} {}", self.key, id),
            }
            .context(self.op("import", id))),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn op(&self, op: &str, id: &str) -> String {
        format!("{} {} {:?}", op, self.key, id)
    }

    /// Validate and lower a declared record. No request is made on failure.
    fn body(&self, desired: &Record) -> Result<Map<String, Json>> {
        for unique in &self.def.unique {
            validate_unique(desired, &unique.list, &unique.key)
                .map_err(|e| ProviderError::from(e).context(format!("validate {}", self.key)))?;
        }

        let mut body =
            lower(desired, &self.def.fields).map_err(|e| ProviderError::from(e).context(format!("validate {}", self.key)))?;
        self.stamp_policy_type(&mut body);
        Ok(body)
    }

    fn stamp_policy_type(&self, body: &mut Map<String, Json>) {
        if let Some(policy_type) = self.def.policy_type() {
            body.insert("_id".to_string(), Json::String(policy_type.tag().to_string()));
            body.insert("policyType".to_string(), Json::String(policy_type.tag().to_string()));
        }
    }

    fn singleton_id(&self) -> String {
        self.def.singleton_id().unwrap_or_else(|| self.key.to_string())
    }

    fn check_singleton_id(&self, op: &str, id: &str) -> Result<()> {
        let expected = self.singleton_id();
        if id == expected {
            Ok(())
        } else {
            Err(ProviderError::config(
                "id",
                format!("{} is a singleton with id {:?}, got {:?}", self.key, expected, id),
            )
            .context(self.op(op, id)))
        }
    }

    /// A policy read must hold the policy type it was asked for
    fn check_policy_type(&self, endpoint: &str, json: &Json) -> Result<()> {
        let (Some(expected), Some(tag)) = (
            self.def.policy_type(),
            json.get("policyType").and_then(Json::as_str),
        ) else {
            return Ok(());
        };
        if PolicyType::from_tag(tag) == Some(expected) {
            Ok(())
        } else {
            Err(ProviderError::decode(
                endpoint,
                format!("holds policy type {:?}, expected {}", tag, expected),
            ))
        }
    }

    fn wire_key(&self, key: &str) -> String {
        find_field(&self.def.fields, key)
            .map(|f| f.wire_name())
            .unwrap_or_else(|| key.to_string())
    }

    /// Put the id into the body under the key's wire name, typed per its field
    fn set_key(&self, body: &mut Map<String, Json>, key: &str, id: &str) -> Result<()> {
        let json = match find_field(&self.def.fields, key).map(|f| &f.kind) {
            Some(FieldKind::Int) => {
                let n: i64 = id
                    .parse()
                    .map_err(|_| ProviderError::config(key, format!("id {:?} is not an integer", id)))?;
                Json::from(n)
            }
            _ => Json::String(id.to_string()),
        };
        body.insert(self.wire_key(key), json);
        Ok(())
    }

    async fn write(&self, endpoint: &EndpointDef, id: &str, body: &Map<String, Json>) -> Result<()> {
        let path = endpoint_path(&endpoint.path, id);
        let body = Json::Object(body.clone());
        self.client
            .request(endpoint.method.as_method(), &path, Some(&body))
            .await
            .map(|_| ())
    }

    async fn list(&self, path: &str) -> Result<Vec<Json>> {
        match self.client.get(path).await? {
            Json::Null => Ok(Vec::new()),
            Json::Array(items) => Ok(items),
            other => Err(ProviderError::decode(
                path,
                format!("expected a list, found {}", crate::schema::value::json_kind(&other)),
            )),
        }
    }

    /// Next free integer id for types whose ids the caller assigns
    async fn next_id(&self) -> Result<String> {
        let Identity::Listed { key, list, .. } = &self.def.identity else {
            return Ok(self.singleton_id());
        };
        let wire_key = self.wire_key(key);
        let max = self
            .list(list)
            .await?
            .iter()
            .filter_map(|item| item.get(&wire_key).and_then(Json::as_i64))
            .max()
            .unwrap_or(0);
        let next = max
            .checked_add(1)
            .ok_or_else(|| ProviderError::decode(list, format!("no id left after {}", max)))?;
        Ok(next.to_string())
    }

    async fn read_back(&self, op: &str, id: &str, desired: &Record) -> Result<ResourceState> {
        let Some(mut state) = self.read(id).await? else {
            return Err(ProviderError::NotFound {
                endpoint: format!("{} {}", self.key, id),
            }
            .context(format!("{} did not persist", self.op(op, id))));
        };
        carry_secrets(desired, &mut state.record, &self.def.fields);
        Ok(state)
    }
}

/// Id string held by a declared record's key field
fn key_of(record: &Record, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Int(i) if *i != 0 => Some(i.to_string()),
        _ => None,
    }
}

/// Id string of a wire key value
fn json_id(json: &Json) -> Option<String> {
    match json {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
