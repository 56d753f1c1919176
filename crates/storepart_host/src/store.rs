//! The container slices are installed into.
//!
//! A [`Store`] combines slice reducers by domain, holds the current
//! [`ContainerState`], and republishes every dispatched action to the effect
//! routines it runs. Dispatches are serialized: an action is reduced by every
//! installed reducer and published before the next dispatch starts.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use storepart::{
    Action, Container, ContainerState, DomainRegistry, EffectResult, EffectRoutine, MustBoxFuture,
    Selector, Slice, SliceError, SliceReducer, SliceResult, SliceState,
};
use tokio::sync::broadcast;

use crate::current::StoreScoped;
use crate::{
    discover, load_all, EffectRunner, HostConfig, HostError, HostResult, OutcomeReceiver,
    SliceLoader,
};

struct StoreInner {
    config: HostConfig,
    /// Held for the whole of a dispatch, so reductions never interleave.
    reducers: Mutex<BTreeMap<String, SliceReducer>>,
    state: RwLock<Arc<ContainerState>>,
    actions: broadcast::Sender<Action>,
    runner: EffectRunner,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.runner.shutdown();
    }
}

/// A running state container. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct Store(Arc<StoreInner>);

/// Collects what a [`Store`] starts out with.
#[derive(Debug)]
pub struct StoreBuilder {
    config: HostConfig,
    reducers: Vec<SliceReducer>,
    effects: Vec<EffectRoutine>,
    preloaded: Option<Value>,
}

impl StoreBuilder {
    /// Install a slice: its reducer, and its effects once the store is built.
    pub fn slice(mut self, slice: &Slice) -> Self {
        self.reducers.push(slice.reducer());
        self.effects.extend(slice.effects().iter().cloned());
        self
    }

    /// Install every slice found in the configured `global_stores_dir`,
    /// each loaded by the first of `loaders` that accepts it. Their domains
    /// are claimed in `registry`. Does nothing when no directory is set.
    pub fn global_stores(
        self,
        loaders: &[&dyn SliceLoader],
        registry: &DomainRegistry,
    ) -> HostResult<Self> {
        let paths = discover(self.config.global_stores_dir.as_deref())?;
        let slices = load_all(&paths, loaders, registry)?;
        tracing::debug!(count = slices.len(), "loaded global slices");
        Ok(slices.iter().fold(self, |builder, slice| builder.slice(slice)))
    }

    /// Install a bare reducer.
    pub fn reducer(mut self, reducer: SliceReducer) -> Self {
        self.reducers.push(reducer);
        self
    }

    /// Run an effect routine once the store is built.
    pub fn effect(mut self, routine: EffectRoutine) -> Self {
        self.effects.push(routine);
        self
    }

    /// Start from a previously rendered state instead of the slices' initial
    /// state. Must be a JSON object of JSON objects, keyed by domain.
    pub fn preloaded_state(mut self, state: Value) -> Self {
        self.preloaded = Some(state);
        self
    }

    /// Create the store and start its effect routines.
    ///
    /// Starting effects needs a tokio runtime; a store without effects can
    /// be built anywhere.
    pub fn build(self) -> HostResult<Store> {
        self.config.validate()?;
        let (actions, _) = broadcast::channel(self.config.action_channel_capacity);
        let store = Store(Arc::new(StoreInner {
            config: self.config,
            reducers: Mutex::new(BTreeMap::new()),
            state: RwLock::new(Arc::new(ContainerState::new())),
            actions,
            runner: EffectRunner::new(),
        }));

        let preloaded = self
            .preloaded
            .map(ContainerState::from_json)
            .transpose()?
            .unwrap_or_default();
        store.install(self.reducers, &preloaded)?;
        for domain in preloaded.domains() {
            if !store.0.reducers.lock().contains_key(domain) {
                tracing::warn!(%domain, "preloaded state has no reducer, dropping it");
            }
        }

        for routine in &self.effects {
            store.run_effect(routine)?;
        }
        tracing::debug!(
            domains = ?store.state().domains().collect::<Vec<_>>(),
            effects = self.effects.len(),
            "store created"
        );
        Ok(store)
    }
}

impl Store {
    /// Start building a store.
    pub fn builder(config: HostConfig) -> StoreBuilder {
        StoreBuilder {
            config,
            reducers: Vec::new(),
            effects: Vec::new(),
            preloaded: None,
        }
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &HostConfig {
        &self.0.config
    }

    /// Reduce an action, then publish it to the effect routines.
    pub fn dispatch(&self, action: Action) -> HostResult<()> {
        Ok(self.0.dispatch(action)?)
    }

    /// Dispatch several actions in order, stopping at the first failure.
    pub fn dispatch_all(&self, actions: impl IntoIterator<Item = Action>) -> HostResult<()> {
        actions.into_iter().try_for_each(|action| self.dispatch(action))
    }

    /// The current state.
    pub fn state(&self) -> Arc<ContainerState> {
        self.0.state.read().clone()
    }

    /// Run a selector against the current state.
    pub fn select(&self, selector: &Selector) -> HostResult<Arc<Value>> {
        Ok(selector.select(&self.state())?)
    }

    /// Run a selector against the current state and deserialize the result.
    pub fn select_as<T: DeserializeOwned>(&self, selector: &Selector) -> HostResult<T> {
        Ok(selector.select_as(&self.state())?)
    }

    /// The current state as JSON, e.g. to hand it to a client that will
    /// preload it.
    pub fn snapshot_json(&self) -> Value {
        self.state().to_json()
    }

    /// Receive every action dispatched from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Action> {
        self.0.actions.subscribe()
    }

    /// Add reducers to a running store.
    ///
    /// Installing a reducer that is already installed does nothing. Nothing
    /// is installed if any of them clashes with a different reducer of the
    /// same domain.
    pub fn install_reducers(&self, reducers: impl IntoIterator<Item = SliceReducer>) -> HostResult<()> {
        self.install(reducers, &ContainerState::new())
    }

    /// Install a slice's reducer and start its effects.
    pub fn install_slice(&self, slice: &Slice) -> HostResult<()> {
        self.install_reducers([slice.reducer()])?;
        for routine in slice.effects() {
            self.run_effect(routine)?;
        }
        Ok(())
    }

    /// Start an effect routine against this store. Returns false if it was
    /// already running.
    pub fn run_effect(&self, routine: &EffectRoutine) -> HostResult<bool> {
        self.0.runner.run(routine, Arc::new(self.handle()))
    }

    /// The effect runner's outcome channel. Can only be taken once.
    pub fn take_outcomes(&self) -> Option<OutcomeReceiver> {
        self.0.runner.take_outcomes()
    }

    /// Ids of the effect routines still running.
    pub fn running_effects(&self) -> Vec<String> {
        self.0.runner.running()
    }

    /// Stop every effect routine.
    pub fn shutdown(&self) {
        self.0.runner.shutdown();
    }

    fn handle(&self) -> StoreHandle {
        StoreHandle(Arc::downgrade(&self.0))
    }

    fn install(
        &self,
        reducers: impl IntoIterator<Item = SliceReducer>,
        preloaded: &ContainerState,
    ) -> HostResult<()> {
        let mut installed = self.0.reducers.lock();
        let mut added: BTreeMap<String, SliceReducer> = BTreeMap::new();
        for reducer in reducers {
            let domain = reducer.domain().to_string();
            match installed.get(&domain).or_else(|| added.get(&domain)) {
                Some(existing) if existing.same_as(&reducer) => continue,
                Some(_) => return Err(HostError::DuplicateReducer(domain)),
                None => {
                    added.insert(domain, reducer);
                }
            }
        }
        if added.is_empty() {
            return Ok(());
        }

        let mut state = self.0.state.write();
        let mut next = ContainerState::clone(&state);
        for (domain, reducer) in &added {
            next.insert(domain.clone(), seed(reducer, preloaded.get(domain)));
        }
        *state = Arc::new(next);
        tracing::debug!(domains = ?added.keys().collect::<Vec<_>>(), "reducers installed");
        installed.extend(added);
        Ok(())
    }
}

/// The reducer's initial state, with preloaded fields laid over it.
fn seed(reducer: &SliceReducer, preloaded: Option<&Arc<SliceState>>) -> Arc<SliceState> {
    let initial = reducer.initial_state();
    let Some(preloaded) = preloaded else {
        return initial;
    };
    let mut state = SliceState::clone(&initial);
    for (field, value) in preloaded.iter() {
        if initial.contains(field) {
            state.insert(field.clone(), value.clone());
        } else {
            tracing::warn!(domain = %reducer.domain(), %field, "preloaded field is not declared, dropping it");
        }
    }
    Arc::new(state)
}

impl StoreInner {
    fn dispatch(&self, action: Action) -> SliceResult<()> {
        let reducers = self.reducers.lock();
        let current = self.state.read().clone();
        let mut next = ContainerState::clone(&current);
        let mut changed = false;
        for (domain, reducer) in reducers.iter() {
            let substate = current.domain(domain)?;
            let reduced = reducer.reduce(substate, &action)?;
            if !Arc::ptr_eq(substate, &reduced) {
                next.insert(domain.clone(), reduced);
                changed = true;
            }
        }
        if changed {
            *self.state.write() = Arc::new(next);
        }
        tracing::debug!(action = %action.action_type(), changed, "dispatched");

        // no subscribers is fine
        let _ = self.actions.send(action);
        Ok(())
    }
}

impl Container for Store {
    fn dispatch(&self, action: Action) -> SliceResult<()> {
        self.0.dispatch(action)
    }

    fn state(&self) -> Arc<ContainerState> {
        Store::state(self)
    }

    fn subscribe(&self) -> broadcast::Receiver<Action> {
        Store::subscribe(self)
    }

    fn scope_effect(
        &self,
        work: MustBoxFuture<'static, EffectResult<()>>,
    ) -> MustBoxFuture<'static, EffectResult<()>> {
        self.handle().scope_effect(work)
    }
}

/// What effect routines see of the store. Doesn't keep it alive: once the
/// store is gone, dispatches fail and subscriptions are closed.
#[derive(Clone)]
pub(crate) struct StoreHandle(Weak<StoreInner>);

impl StoreHandle {
    pub(crate) fn upgrade(&self) -> Option<Store> {
        self.0.upgrade().map(Store)
    }
}

impl Container for StoreHandle {
    fn dispatch(&self, action: Action) -> SliceResult<()> {
        match self.0.upgrade() {
            Some(inner) => inner.dispatch(action),
            None => Err(SliceError::Other(anyhow::anyhow!(
                "cannot dispatch {}: the store has been dropped",
                action.action_type()
            ))),
        }
    }

    fn state(&self) -> Arc<ContainerState> {
        self.0
            .upgrade()
            .map(|inner| inner.state.read().clone())
            .unwrap_or_default()
    }

    fn subscribe(&self) -> broadcast::Receiver<Action> {
        match self.0.upgrade() {
            Some(inner) => inner.actions.subscribe(),
            // the sender is dropped right away, so this is already closed
            None => broadcast::channel(1).1,
        }
    }

    /// Effect work sees this store as its current store.
    fn scope_effect(
        &self,
        work: MustBoxFuture<'static, EffectResult<()>>,
    ) -> MustBoxFuture<'static, EffectResult<()>> {
        StoreScoped::new(self.clone(), work).boxed().into()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("domains", &self.0.reducers.lock().keys().collect::<Vec<_>>())
            .field("runner", &self.0.runner)
            .finish()
    }
}
