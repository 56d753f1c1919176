//! Per-handler metadata: which action types a handler listens to, how an
//! effect handler is scheduled for each of them, and whether its running
//! status is tracked.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::{ActionCreator, ActionType, SliceError, SliceResult};

/// Where a handler's action type comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenTo {
    /// The type derived from the slice domain and the member name.
    /// Only handlers listening to this get an action creator.
    Dynamic,
    /// A type given verbatim, or the resolved type of another slice's creator.
    Type(ActionType),
    /// The dynamic type of another member of the same slice.
    Member(String),
}

impl ListenTo {
    /// Listen to another member of the same slice.
    pub fn member(name: impl Into<String>) -> Self {
        Self::Member(name.into())
    }
}

impl From<&str> for ListenTo {
    fn from(s: &str) -> Self {
        Self::Type(ActionType::new(s))
    }
}

impl From<String> for ListenTo {
    fn from(s: String) -> Self {
        Self::Type(ActionType::new(s))
    }
}

impl From<ActionType> for ListenTo {
    fn from(t: ActionType) -> Self {
        Self::Type(t)
    }
}

impl From<&ActionCreator> for ListenTo {
    fn from(creator: &ActionCreator) -> Self {
        Self::Type(creator.action_type().clone())
    }
}

/// How dispatches of one action type are turned into effect executions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Strategy {
    /// A new dispatch cancels the execution still in flight for the same type.
    #[default]
    Latest,
    /// Every dispatch starts its own execution, concurrently with the others.
    Every,
    /// Dispatches arriving while an execution is in flight are dropped.
    Leading,
    /// Run, then for the given window keep only the most recent dispatch and
    /// run it when the window closes.
    Throttle(Duration),
}

/// Metadata attached to a handler member.
#[derive(Clone, Debug, Default)]
pub struct HandlerMeta {
    listened: Vec<ListenTo>,
    strategies: BTreeMap<usize, Strategy>,
    track_status: bool,
}

impl HandlerMeta {
    /// Add a listened type. Listening twice to the same thing is a no-op.
    pub fn listen(&mut self, to: ListenTo) {
        if !self.listened.contains(&to) {
            self.listened.push(to);
        }
    }

    /// Listened types in registration order. With nothing declared, a handler
    /// listens to its dynamic type.
    pub fn listened(&self) -> Vec<ListenTo> {
        if self.listened.is_empty() {
            vec![ListenTo::Dynamic]
        } else {
            self.listened.clone()
        }
    }

    /// Whether the handler gets an action creator.
    pub fn has_dynamic_type(&self) -> bool {
        self.listened.is_empty() || self.listened.contains(&ListenTo::Dynamic)
    }

    /// Register a strategy for listened types from `index` on, until the next
    /// registered index.
    pub fn set_strategy(&mut self, index: usize, strategy: Strategy) {
        self.strategies.insert(index, strategy);
    }

    /// The strategy used for the listened type at `index`.
    pub fn strategy_for(&self, index: usize) -> Strategy {
        let keys: Vec<usize> = self.strategies.keys().copied().collect();
        ordered_clamp_up(&keys, index)
            .and_then(|k| self.strategies.get(&k).copied())
            .unwrap_or_default()
    }

    /// Whether the running status is tracked.
    pub fn track_status(&self) -> bool {
        self.track_status
    }

    pub(crate) fn set_track_status(&mut self, track: bool) {
        self.track_status = track;
    }

    pub(crate) fn validate(&self, member: &str) -> SliceResult<()> {
        for strategy in self.strategies.values() {
            if let Strategy::Throttle(window) = strategy {
                if window.is_zero() {
                    return Err(SliceError::invalid_option(format!(
                        "{}: a throttle window must be longer than zero",
                        member
                    )));
                }
            }
        }
        if self
            .listened
            .iter()
            .any(|l| matches!(l, ListenTo::Member(n) if n.is_empty()))
        {
            return Err(SliceError::invalid_option(format!(
                "{}: cannot listen to a member with an empty name",
                member
            )));
        }
        Ok(())
    }
}

/// Pick the smallest key strictly greater than `i`, or the last key when
/// none is. `keys` must be sorted.
pub fn ordered_clamp_up(keys: &[usize], i: usize) -> Option<usize> {
    keys.iter()
        .copied()
        .find(|k| *k > i)
        .or_else(|| keys.last().copied())
}

/// Options of a mutation handler.
#[derive(Clone, Debug, Default)]
pub struct ReducerOptions {
    pub(crate) meta: HandlerMeta,
}

impl ReducerOptions {
    /// Listen to the dynamic type only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listened type. Once any is added the dynamic type is dropped
    /// unless [`ListenTo::Dynamic`] is added too.
    pub fn listen(mut self, to: impl Into<ListenTo>) -> Self {
        self.meta.listen(to.into());
        self
    }
}

/// Options of an effect handler.
#[derive(Clone, Debug, Default)]
pub struct EffectOptions {
    pub(crate) meta: HandlerMeta,
}

impl EffectOptions {
    /// Listen to the dynamic type only, superseding in-flight executions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listened type.
    pub fn listen(mut self, to: impl Into<ListenTo>) -> Self {
        self.meta.listen(to.into());
        self
    }

    /// Use `strategy` for listened types up to (and clamped at) `index`.
    pub fn strategy(mut self, index: usize, strategy: Strategy) -> Self {
        self.meta.set_strategy(index, strategy);
        self
    }

    /// Use `strategy` for every listened type.
    pub fn with_strategy(self, strategy: Strategy) -> Self {
        self.strategy(usize::MAX, strategy)
    }

    /// Track the running status in a `<member>.running` field.
    pub fn track_status(mut self) -> Self {
        self.meta.set_track_status(true);
        self
    }
}
