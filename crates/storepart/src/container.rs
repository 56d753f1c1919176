use std::sync::Arc;

use must_future::MustBoxFuture;
use tokio::sync::broadcast;

use crate::{Action, ContainerState, EffectResult, SliceResult};

/// The state container slices are installed into.
///
/// Implementations serialize dispatches: each action is reduced to
/// completion before the next one starts, and subscribers see actions in
/// dispatch order, after their reduction.
pub trait Container: Send + Sync {
    /// Reduce an action, then publish it to subscribers.
    fn dispatch(&self, action: Action) -> SliceResult<()>;

    /// The current state.
    fn state(&self) -> Arc<ContainerState>;

    /// Receive every action dispatched from now on.
    fn subscribe(&self) -> broadcast::Receiver<Action>;

    /// Wrap effect work (a routine, or one execution of an effect body)
    /// before it is polled, so it runs with whatever ambient context this
    /// container provides. Does nothing by default.
    fn scope_effect(
        &self,
        work: MustBoxFuture<'static, EffectResult<()>>,
    ) -> MustBoxFuture<'static, EffectResult<()>> {
        work
    }
}
