//! Effect handlers and the watcher routines that run them.
//!
//! An effect handler is an async body reacting to dispatched actions. For
//! every effect a slice declares, one [`EffectRoutine`] is published. Running
//! the routine against a [`Container`] subscribes one watcher per listened
//! action type and turns matching dispatches into executions of the body,
//! scheduled according to the [`Strategy`](crate::Strategy) chosen for that
//! type.

mod watch;

pub(crate) use watch::Call;
pub use watch::InvocationEnd;

use std::sync::Arc;

use futures::FutureExt;
use must_future::MustBoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Instrument;

use crate::{
    Action, ActionType, Container, ContainerState, EffectError, EffectResult, Payload, Selector,
    Strategy,
};

/// Body of an effect handler.
pub type EffectFn = Arc<
    dyn Fn(EffectContext, Payload) -> MustBoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
>;

type RunFn =
    Arc<dyn Fn(Arc<dyn Container>) -> MustBoxFuture<'static, EffectResult<()>> + Send + Sync>;

/// What an effect body can do with the container it runs against.
#[derive(Clone)]
pub struct EffectContext {
    container: Arc<dyn Container>,
    routine: Arc<str>,
}

impl EffectContext {
    /// Constructor
    pub fn new(container: Arc<dyn Container>, routine: impl Into<Arc<str>>) -> Self {
        Self {
            container,
            routine: routine.into(),
        }
    }

    /// Name of the routine this context was handed out by.
    pub fn routine(&self) -> &str {
        &self.routine
    }

    /// Dispatch an action.
    pub fn put(&self, action: Action) -> EffectResult<()> {
        Ok(self.container.dispatch(action)?)
    }

    /// Hand effect work to the container to be scoped.
    pub(crate) fn scope(
        &self,
        work: MustBoxFuture<'static, EffectResult<()>>,
    ) -> MustBoxFuture<'static, EffectResult<()>> {
        self.container.scope_effect(work)
    }

    /// The container's current state.
    pub fn state(&self) -> Arc<ContainerState> {
        self.container.state()
    }

    /// Apply a selector to the current state.
    pub fn select(&self, selector: &Selector) -> EffectResult<Arc<Value>> {
        Ok(selector.apply(self.container.as_ref())?)
    }

    /// Apply a selector to the current state and deserialize the result.
    pub fn select_as<T: DeserializeOwned>(&self, selector: &Selector) -> EffectResult<T> {
        Ok(selector.select_as(&self.container.state())?)
    }

    /// Wait for the next dispatch of `action_type`.
    pub async fn take(&self, action_type: impl Into<ActionType>) -> EffectResult<Action> {
        let action_type = action_type.into();
        let mut rx = self.container.subscribe();
        watch::next_matching(&mut rx, &action_type)
            .await
            .ok_or(EffectError::ChannelClosed)
    }

    /// Dispatch `action`, then wait for the next dispatch of `until`.
    ///
    /// The subscription is taken before dispatching, so an answer dispatched
    /// synchronously by a reducer or another watcher is not missed.
    pub async fn put_and_wait(
        &self,
        action: Action,
        until: impl Into<ActionType>,
    ) -> EffectResult<Action> {
        let until = until.into();
        let mut rx = self.container.subscribe();
        self.put(action)?;
        watch::next_matching(&mut rx, &until)
            .await
            .ok_or(EffectError::ChannelClosed)
    }
}

impl std::fmt::Debug for EffectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectContext")
            .field("routine", &self.routine)
            .finish()
    }
}

pub(crate) struct Watch {
    pub action_type: ActionType,
    pub strategy: Strategy,
}

/// A long-running routine to be started once per container.
///
/// Routines are identified by their [`id`](EffectRoutine::id); a runner
/// starts at most one instance per id.
#[derive(Clone)]
pub struct EffectRoutine {
    id: String,
    name: String,
    run: RunFn,
}

impl EffectRoutine {
    /// A routine from an arbitrary async function of the container.
    pub fn new<F>(id: impl Into<String>, run: F) -> Self
    where
        F: Fn(Arc<dyn Container>) -> MustBoxFuture<'static, EffectResult<()>>
            + Send
            + Sync
            + 'static,
    {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            run: Arc::new(run),
        }
    }

    /// The composite watcher of one effect handler: one watcher per
    /// listened type, all running concurrently.
    pub(crate) fn watcher(domain: &str, member: &str, call: Call, watches: Vec<Watch>) -> Self {
        let name = format!("{}.{}", domain, member);
        let routine_name = name.clone();
        let run = move |container: Arc<dyn Container>| -> MustBoxFuture<'static, EffectResult<()>> {
            let ctx = EffectContext::new(container.clone(), routine_name.as_str());
            // subscribe now, not on first poll, so no dispatch made between
            // starting the routine and its first poll is missed
            let watchers: Vec<_> = watches
                .iter()
                .map(|w| {
                    watch::watch(
                        container.subscribe(),
                        w.action_type.clone(),
                        w.strategy,
                        call.clone(),
                        ctx.clone(),
                    )
                })
                .collect();
            let span = tracing::info_span!("effect", routine = %routine_name);
            async move {
                futures::future::try_join_all(watchers).await?;
                Ok(())
            }
            .instrument(span)
            .boxed()
            .into()
        };
        Self {
            id: format!("{}/{}", domain, member),
            name,
            run: Arc::new(run),
        }
    }

    /// Unique id, `<domain>/<member>` for routines generated from a slice.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable name, `<domain>.<member>` for generated routines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start watching. Subscriptions are taken before this returns.
    pub fn run(&self, container: Arc<dyn Container>) -> MustBoxFuture<'static, EffectResult<()>> {
        (self.run)(container)
    }
}

impl std::fmt::Debug for EffectRoutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRoutine").field("id", &self.id).finish()
    }
}
