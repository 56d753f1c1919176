//! The access gate between slice state and the code that reads or writes it.
//!
//! Every read and write of a slice field goes through an [`Access`]. What a
//! read yields depends on the mode the access was opened in:
//!
//! - **Reducing**: opened by the reducer for one call. Reads see the writes
//!   made so far in this call layered over the incoming state. Writes go to
//!   a fresh write-set; the incoming state is never touched.
//! - **Deriving**: opened by a derived-field selector over one snapshot.
//!   Derived fields that read other derived fields evaluate against that same
//!   snapshot.
//! - **Immutable**: handed to everything else. Reads yield the field's
//!   [`Selector`] instead of a value, and writes are refused.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{Payload, Selector, SliceError, SliceResult, SliceState, WriteSet};

/// Body of a derived field.
pub type DeriveFn = Arc<dyn Fn(&Access<'_>) -> SliceResult<Value> + Send + Sync + 'static>;

/// Body of a mutation handler.
pub type ReduceFn =
    Arc<dyn Fn(&mut Access<'_>, &Payload) -> SliceResult<()> + Send + Sync + 'static>;

pub(crate) enum FieldDef {
    Stored,
    Derived(DeriveFn),
}

/// The fields of one slice, in declaration order.
pub(crate) struct FieldDefs {
    domain: String,
    order: Vec<String>,
    defs: HashMap<String, FieldDef>,
}

impl FieldDefs {
    pub(crate) fn new(domain: String) -> Self {
        Self {
            domain,
            order: Vec::new(),
            defs: HashMap::new(),
        }
    }

    pub(crate) fn push(&mut self, name: String, def: FieldDef) {
        self.order.push(name.clone());
        self.defs.insert(name, def);
    }

    pub(crate) fn domain(&self) -> &str {
        &self.domain
    }

    pub(crate) fn order(&self) -> &[String] {
        &self.order
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &FieldDef)> {
        self.order.iter().filter_map(|n| self.defs.get(n).map(|d| (n, d)))
    }

    fn get(&self, field: &str) -> SliceResult<&FieldDef> {
        self.defs.get(field).ok_or_else(|| SliceError::UnknownField {
            domain: self.domain.clone(),
            field: field.to_string(),
        })
    }
}

/// Which of the three modes an [`Access`] was opened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum AccessMode {
    /// Outside any reduction or derivation.
    Immutable,
    /// Inside one reduction call.
    Reducing,
    /// Inside the evaluation of a derived field.
    Deriving,
}

enum Mode<'s> {
    Immutable(&'s HashMap<String, Selector>),
    Reducing {
        state: &'s SliceState,
        writes: WriteSet,
    },
    Deriving {
        snapshot: &'s SliceState,
    },
}

/// What reading a field yields.
#[derive(Clone, Debug)]
pub enum Read {
    /// The field's current value.
    Value(Arc<Value>),
    /// A projection to apply to the container state.
    Selector(Selector),
}

/// A view of one slice's fields, in one of three modes.
pub struct Access<'s> {
    fields: &'s FieldDefs,
    mode: Mode<'s>,
    evaluating: RefCell<Vec<String>>,
}

impl<'s> Access<'s> {
    pub(crate) fn immutable(
        fields: &'s FieldDefs,
        selectors: &'s HashMap<String, Selector>,
    ) -> Self {
        Self::open(fields, Mode::Immutable(selectors))
    }

    pub(crate) fn reducing(fields: &'s FieldDefs, state: &'s SliceState) -> Self {
        Self::open(
            fields,
            Mode::Reducing {
                state,
                writes: WriteSet::new(),
            },
        )
    }

    pub(crate) fn deriving(fields: &'s FieldDefs, snapshot: &'s SliceState) -> Self {
        Self::open(fields, Mode::Deriving { snapshot })
    }

    fn open(fields: &'s FieldDefs, mode: Mode<'s>) -> Self {
        Self {
            fields,
            mode,
            evaluating: RefCell::new(Vec::new()),
        }
    }

    /// The mode this access was opened in.
    pub fn mode(&self) -> AccessMode {
        match self.mode {
            Mode::Immutable(_) => AccessMode::Immutable,
            Mode::Reducing { .. } => AccessMode::Reducing,
            Mode::Deriving { .. } => AccessMode::Deriving,
        }
    }

    /// The domain of the slice being accessed.
    pub fn domain(&self) -> &str {
        self.fields.domain()
    }

    /// Read a field according to the current mode.
    pub fn read(&self, field: &str) -> SliceResult<Read> {
        let def = self.fields.get(field)?;
        match (&self.mode, def) {
            (Mode::Immutable(selectors), _) => selectors
                .get(field)
                .cloned()
                .map(Read::Selector)
                .ok_or_else(|| self.unknown(field)),
            (_, FieldDef::Derived(derive)) => self.derive(field, derive).map(Read::Value),
            (Mode::Reducing { state, writes }, FieldDef::Stored) => Ok(Read::Value(
                writes
                    .get(field)
                    .or_else(|| state.get(field))
                    .cloned()
                    .unwrap_or_else(null),
            )),
            (Mode::Deriving { snapshot }, FieldDef::Stored) => Ok(Read::Value(
                snapshot.get(field).cloned().unwrap_or_else(null),
            )),
        }
    }

    /// Read a field's value. Fails in immutable mode, where only a selector
    /// is available.
    pub fn get(&self, field: &str) -> SliceResult<Arc<Value>> {
        match self.read(field)? {
            Read::Value(value) => Ok(value),
            Read::Selector(_) => Err(SliceError::SelectorNotValue {
                domain: self.domain().to_string(),
                field: field.to_string(),
            }),
        }
    }

    /// Read and deserialize a field's value.
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> SliceResult<T> {
        let value = self.get(field)?;
        Ok(T::deserialize(value.as_ref())?)
    }

    /// Write a field. Only allowed while reducing, and only on stored fields.
    pub fn set(&mut self, field: &str, value: impl Serialize) -> SliceResult<()> {
        let def = self.fields.get(field)?;
        let domain = self.fields.domain();
        match &mut self.mode {
            Mode::Reducing { writes, .. } => match def {
                FieldDef::Stored => {
                    writes.insert(field.to_string(), serde_json::to_value(value)?);
                    Ok(())
                }
                FieldDef::Derived(_) => Err(SliceError::ReadOnlyField {
                    domain: domain.to_string(),
                    field: field.to_string(),
                }),
            },
            _ => Err(SliceError::AccessDenied {
                domain: domain.to_string(),
                field: field.to_string(),
            }),
        }
    }

    /// Read, transform and write back a stored field.
    pub fn update<T, F>(&mut self, field: &str, f: F) -> SliceResult<()>
    where
        T: DeserializeOwned + Serialize,
        F: FnOnce(T) -> T,
    {
        let current = self.get_as::<T>(field)?;
        self.set(field, f(current))
    }

    /// The fields written so far in this reduction.
    pub fn written(&self) -> Option<&WriteSet> {
        match &self.mode {
            Mode::Reducing { writes, .. } => Some(writes),
            _ => None,
        }
    }

    pub(crate) fn into_writes(self) -> WriteSet {
        match self.mode {
            Mode::Reducing { writes, .. } => writes,
            _ => WriteSet::new(),
        }
    }

    fn derive(&self, field: &str, derive: &DeriveFn) -> SliceResult<Arc<Value>> {
        if self.evaluating.borrow().iter().any(|f| f == field) {
            return Err(SliceError::DerivedCycle {
                domain: self.domain().to_string(),
                field: field.to_string(),
            });
        }
        self.evaluating.borrow_mut().push(field.to_string());
        let result = derive(self);
        self.evaluating.borrow_mut().pop();
        result.map(Arc::new)
    }

    fn unknown(&self, field: &str) -> SliceError {
        SliceError::UnknownField {
            domain: self.domain().to_string(),
            field: field.to_string(),
        }
    }
}

impl std::fmt::Debug for Access<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Access")
            .field("domain", &self.domain())
            .field("mode", &self.mode())
            .finish()
    }
}

fn null() -> Arc<Value> {
    Arc::new(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counter_fields() -> FieldDefs {
        let mut fields = FieldDefs::new("counter".into());
        fields.push("count".into(), FieldDef::Stored);
        fields.push(
            "double".into(),
            FieldDef::Derived(Arc::new(|a: &Access<'_>| {
                Ok(json!(a.get_as::<i64>("count")? * 2))
            })),
        );
        fields.push(
            "quadruple".into(),
            FieldDef::Derived(Arc::new(|a: &Access<'_>| {
                Ok(json!(a.get_as::<i64>("double")? * 2))
            })),
        );
        fields
    }

    #[test]
    fn get_after_set_sees_the_write() {
        let fields = counter_fields();
        let state = SliceState::from_json(json!({ "count": 1 })).unwrap();
        let mut access = Access::reducing(&fields, &state);

        assert_eq!(*access.get("count").unwrap(), json!(1));
        access.set("count", 5).unwrap();
        assert_eq!(*access.get("count").unwrap(), json!(5));
        assert_eq!(*access.get("quadruple").unwrap(), json!(20));

        // the incoming state is untouched
        assert_eq!(**state.get("count").unwrap(), json!(1));
    }

    #[test]
    fn derived_fields_compose_over_one_snapshot() {
        let fields = counter_fields();
        let snapshot = SliceState::from_json(json!({ "count": 3 })).unwrap();
        let access = Access::deriving(&fields, &snapshot);
        assert_eq!(*access.get("quadruple").unwrap(), json!(12));
        assert_eq!(*access.get("double").unwrap(), json!(6));
    }

    #[test]
    fn writes_outside_reduction_are_denied() {
        let fields = counter_fields();
        let snapshot = SliceState::new();
        let mut access = Access::deriving(&fields, &snapshot);
        assert!(matches!(
            access.set("count", 1),
            Err(SliceError::AccessDenied { .. })
        ));

        let selectors = HashMap::new();
        let mut access = Access::immutable(&fields, &selectors);
        assert!(matches!(
            access.set("count", 1),
            Err(SliceError::AccessDenied { .. })
        ));
    }

    #[test]
    fn derived_fields_are_read_only() {
        let fields = counter_fields();
        let state = SliceState::new();
        let mut access = Access::reducing(&fields, &state);
        assert!(matches!(
            access.set("double", 1),
            Err(SliceError::ReadOnlyField { .. })
        ));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut fields = FieldDefs::new("loop".into());
        fields.push(
            "a".into(),
            FieldDef::Derived(Arc::new(|a: &Access<'_>| Ok(Value::clone(&*a.get("b")?)))),
        );
        fields.push(
            "b".into(),
            FieldDef::Derived(Arc::new(|a: &Access<'_>| Ok(Value::clone(&*a.get("a")?)))),
        );
        let snapshot = SliceState::new();
        let access = Access::deriving(&fields, &snapshot);
        assert!(matches!(
            access.get("a"),
            Err(SliceError::DerivedCycle { field, .. }) if field == "a"
        ));
    }

    #[test]
    fn unknown_fields_are_reported() {
        let fields = counter_fields();
        let state = SliceState::new();
        let access = Access::reducing(&fields, &state);
        assert!(matches!(
            access.get("nope"),
            Err(SliceError::UnknownField { .. })
        ));
    }
}
