//! Memoized projections from the container state to one field of one slice.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::gate::FieldDefs;
use crate::{Access, Container, ContainerState, SliceResult, SliceState};

/// A pure function from the container state to one field's value.
///
/// The last result is remembered together with the slice substate it was
/// computed from. Applying the selector again to a state whose substate is
/// the same `Arc` returns the remembered value without recomputing.
#[derive(Clone)]
pub struct Selector(Arc<Inner>);

struct Inner {
    fields: Arc<FieldDefs>,
    field: String,
    memo: Mutex<Option<(Arc<SliceState>, Arc<Value>)>>,
    recomputations: AtomicUsize,
}

impl Selector {
    pub(crate) fn new(fields: Arc<FieldDefs>, field: String) -> Self {
        Self(Arc::new(Inner {
            fields,
            field,
            memo: Mutex::new(None),
            recomputations: AtomicUsize::new(0),
        }))
    }

    /// Project the field out of the whole container state.
    pub fn select(&self, state: &ContainerState) -> SliceResult<Arc<Value>> {
        let substate = state.domain(self.domain())?;

        if let Some((last, value)) = &*self.0.memo.lock() {
            if Arc::ptr_eq(last, substate) {
                return Ok(value.clone());
            }
        }

        let value = Access::deriving(&self.0.fields, substate).get(&self.0.field)?;
        self.0.recomputations.fetch_add(1, Ordering::Relaxed);
        *self.0.memo.lock() = Some((substate.clone(), value.clone()));
        Ok(value)
    }

    /// Project and deserialize.
    pub fn select_as<T: DeserializeOwned>(&self, state: &ContainerState) -> SliceResult<T> {
        let value = self.select(state)?;
        Ok(T::deserialize(value.as_ref())?)
    }

    /// Apply to a container's current state.
    pub fn apply(&self, container: &dyn Container) -> SliceResult<Arc<Value>> {
        self.select(&container.state())
    }

    /// How many times the projection actually ran.
    pub fn recomputations(&self) -> usize {
        self.0.recomputations.load(Ordering::Relaxed)
    }

    /// The domain of the slice this selector reads from.
    pub fn domain(&self) -> &str {
        self.0.fields.domain()
    }

    /// The projected field.
    pub fn field(&self) -> &str {
        &self.0.field
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("domain", &self.domain())
            .field("field", &self.field())
            .field("recomputations", &self.recomputations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::FieldDef;
    use crate::SliceError;
    use serde_json::json;

    fn fields() -> Arc<FieldDefs> {
        let mut fields = FieldDefs::new("todos".into());
        fields.push("items".into(), FieldDef::Stored);
        fields.push(
            "count".into(),
            FieldDef::Derived(Arc::new(|a: &Access<'_>| {
                Ok(json!(a.get("items")?.as_array().map_or(0, Vec::len)))
            })),
        );
        Arc::new(fields)
    }

    fn container(items: Value) -> ContainerState {
        let mut state = ContainerState::new();
        state.insert(
            "todos",
            Arc::new(SliceState::from_json(json!({ "items": items })).unwrap()),
        );
        state
    }

    #[test]
    fn same_substate_is_not_recomputed() {
        let selector = Selector::new(fields(), "count".into());
        let state = container(json!(["a", "b"]));

        let first = selector.select(&state).unwrap();
        let second = selector.select(&state).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, json!(2));
        assert_eq!(selector.recomputations(), 1);

        let other = container(json!(["a"]));
        assert_eq!(*selector.select(&other).unwrap(), json!(1));
        assert_eq!(selector.recomputations(), 2);
    }

    #[test]
    fn stored_selector_yields_the_stored_value() {
        let selector = Selector::new(fields(), "items".into());
        let state = container(json!([{ "id": 1 }]));
        let stored = state.get("todos").unwrap().get("items").unwrap().clone();
        assert!(Arc::ptr_eq(&selector.select(&state).unwrap(), &stored));
    }

    #[test]
    fn missing_substate_names_the_domain() {
        let selector = Selector::new(fields(), "items".into());
        match selector.select(&ContainerState::new()) {
            Err(SliceError::MissingDomain(domain)) => assert_eq!(domain, "todos"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
