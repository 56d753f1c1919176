//! The plain data a container holds: one [`SliceState`] per domain.
//!
//! Values are shared behind `Arc`s. A reduction that leaves a field untouched
//! carries the very same `Arc` into the next state, so identity comparisons
//! are a reliable "nothing changed" signal for selectors and subscribers.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{SliceError, SliceResult};

/// The state of one slice: field name to value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SliceState(BTreeMap<String, Arc<Value>>);

impl SliceState {
    /// Constructor
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object. Anything but an object is rejected.
    pub fn from_json(value: Value) -> SliceResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(
                map.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
            )),
            other => Err(SliceError::invalid_option(format!(
                "slice state must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Read a field.
    pub fn get(&self, field: &str) -> Option<&Arc<Value>> {
        self.0.get(field)
    }

    /// Set a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Arc<Value>) -> Option<Arc<Value>> {
        self.0.insert(field.into(), value)
    }

    /// Whether the field is present.
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Shallow merge: a copy of `self` with every write applied on top.
    pub fn merged(&self, writes: WriteSet) -> Self {
        let mut next = self.0.clone();
        next.extend(writes.0);
        Self(next)
    }

    /// Iterate over fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<Value>)> {
        self.0.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::clone(v)))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for SliceState {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k, Arc::new(v))).collect())
    }
}

/// Pending mutations of a single reduction call.
///
/// Created empty when a reduction starts, consumed when the next state is
/// produced. Never outlives the call.
#[derive(Debug, Default)]
pub struct WriteSet(BTreeMap<String, Arc<Value>>);

impl WriteSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, field: &str) -> Option<&Arc<Value>> {
        self.0.get(field)
    }

    pub(crate) fn insert(&mut self, field: String, value: Value) {
        self.0.insert(field, Arc::new(value));
    }

    /// True if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of the fields written so far.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// The whole container state: domain to slice state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerState(BTreeMap<String, Arc<SliceState>>);

impl ContainerState {
    /// Constructor
    pub fn new() -> Self {
        Self::default()
    }

    /// The substate stored under `domain`, if any.
    pub fn get(&self, domain: &str) -> Option<&Arc<SliceState>> {
        self.0.get(domain)
    }

    /// The substate stored under `domain`, or a lookup error naming it.
    pub fn domain(&self, domain: &str) -> SliceResult<&Arc<SliceState>> {
        self.0
            .get(domain)
            .ok_or_else(|| SliceError::MissingDomain(domain.to_string()))
    }

    /// Replace the substate of a domain.
    pub fn insert(&mut self, domain: impl Into<String>, state: Arc<SliceState>) {
        self.0.insert(domain.into(), state);
    }

    /// Remove a domain.
    pub fn remove(&mut self, domain: &str) -> Option<Arc<SliceState>> {
        self.0.remove(domain)
    }

    /// The domains present.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate over domains and their substates.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<SliceState>)> {
        self.0.iter()
    }

    /// Build from a JSON object of JSON objects.
    pub fn from_json(value: Value) -> SliceResult<Self> {
        match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| Ok((k, Arc::new(SliceState::from_json(v)?))))
                .collect::<SliceResult<BTreeMap<_, _>>>()
                .map(Self),
            other => Err(SliceError::invalid_option(format!(
                "container state must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Render as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_keeps_untouched_values_by_identity() {
        let state = SliceState::from_json(json!({ "a": [1, 2], "b": 1 })).unwrap();
        let mut writes = WriteSet::new();
        writes.insert("b".into(), json!(2));

        let next = state.merged(writes);

        assert!(Arc::ptr_eq(state.get("a").unwrap(), next.get("a").unwrap()));
        assert_eq!(**next.get("b").unwrap(), json!(2));
        assert_eq!(**state.get("b").unwrap(), json!(1));
    }

    #[test]
    fn container_state_json_roundtrip() {
        let json = json!({ "auth": { "user": null }, "counter": { "count": 3 } });
        let state = ContainerState::from_json(json.clone()).unwrap();
        assert_eq!(state.to_json(), json);
        assert_eq!(serde_json::to_value(&state).unwrap(), json);
    }

    #[test]
    fn missing_domain_is_named() {
        let state = ContainerState::new();
        let err = state.domain("auth").unwrap_err();
        assert!(err.to_string().contains("\"auth\""));
    }
}
