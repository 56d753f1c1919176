use std::collections::HashMap;
use std::sync::Arc;

use crate::gate::FieldDefs;
use crate::{Access, Action, ActionType, ReduceFn, SliceError, SliceResult, SliceState};

pub(crate) struct Listener {
    pub member: String,
    pub body: ReduceFn,
}

/// Action type to the handlers listening to it, in registration order.
pub(crate) type ListenerMap = HashMap<ActionType, Vec<Listener>>;

struct ReducerCore {
    fields: Arc<FieldDefs>,
    listeners: ListenerMap,
    initial: Arc<SliceState>,
}

/// The reduction function of one slice, tagged with the slice's domain.
///
/// Cheap to clone. Two clones of the same reducer compare equal with
/// [`SliceReducer::same_as`]; reducers built separately never do.
#[derive(Clone)]
pub struct SliceReducer(Arc<ReducerCore>);

impl SliceReducer {
    pub(crate) fn new(
        fields: Arc<FieldDefs>,
        listeners: ListenerMap,
        initial: Arc<SliceState>,
    ) -> Self {
        Self(Arc::new(ReducerCore {
            fields,
            listeners,
            initial,
        }))
    }

    /// The domain this reducer's state lives under.
    pub fn domain(&self) -> &str {
        self.0.fields.domain()
    }

    /// The state before any action has been reduced.
    pub fn initial_state(&self) -> Arc<SliceState> {
        self.0.initial.clone()
    }

    /// Whether any handler listens to this type.
    pub fn listens_to(&self, action_type: &ActionType) -> bool {
        self.0.listeners.contains_key(action_type)
    }

    /// Whether both handles point to the same reducer.
    pub fn same_as(&self, other: &SliceReducer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Apply an action.
    ///
    /// Returns `state` itself when no handler listens to the action or when
    /// the handlers wrote nothing. Otherwise returns a shallow copy of `state`
    /// with the written fields replaced. `state` is never modified.
    pub fn reduce(&self, state: &Arc<SliceState>, action: &Action) -> SliceResult<Arc<SliceState>> {
        let Some(listeners) = self.0.listeners.get(action.action_type()) else {
            return Ok(state.clone());
        };

        let mut access = Access::reducing(&self.0.fields, state);
        for listener in listeners {
            (listener.body)(&mut access, action.payload()).map_err(|e| SliceError::Handler {
                member: listener.member.clone(),
                action_type: action.action_type().clone(),
                source: Box::new(e),
            })?;
        }

        let writes = access.into_writes();
        if writes.is_empty() {
            return Ok(state.clone());
        }

        tracing::debug!(
            domain = %self.domain(),
            action = %action.action_type(),
            fields = ?writes.fields().collect::<Vec<_>>(),
            "reduced"
        );
        Ok(Arc::new(state.merged(writes)))
    }
}

impl std::fmt::Debug for SliceReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceReducer")
            .field("domain", &self.domain())
            .field("action_types", &self.0.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}
