use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::{AbortHandle, Abortable, Aborted};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::Sleep;

use super::{EffectContext, EffectFn};
use crate::{Action, ActionType, EffectError, EffectResult, Strategy};

/// How one execution of an effect body ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationEnd {
    /// The body ran to completion.
    Completed,
    /// The body was cancelled, e.g. superseded by a newer dispatch.
    Cancelled,
}

/// An effect body, optionally wrapped in status tracking.
#[derive(Clone)]
pub(crate) struct Call {
    body: EffectFn,
    tracking: Option<ActionType>,
}

impl Call {
    pub(crate) fn new(body: EffectFn, tracking: Option<ActionType>) -> Self {
        Self { body, tracking }
    }

    /// Start one execution on its own task.
    ///
    /// With tracking, `true` is dispatched before the body starts and `false`
    /// after it ends, whether it completed, failed, panicked or was aborted.
    fn spawn(&self, ctx: EffectContext, action: Action) -> Invocation {
        let (abort, registration) = AbortHandle::new_pair();
        let routine: Arc<str> = ctx.routine().into();
        let (_, payload) = action.into_parts();
        let handler = routine.clone();
        let body = (self.body)(ctx.clone(), payload).map(move |result| {
            result.map_err(|source| EffectError::Handler {
                routine: handler.to_string(),
                source,
            })
        });
        let body = Abortable::new(ctx.scope(body.boxed().into()), registration);
        let tracking = self.tracking.clone();

        let task = tokio::spawn(async move {
            if let Some(t) = &tracking {
                ctx.put(Action::new(t.clone(), true))?;
            }

            let result = AssertUnwindSafe(body).catch_unwind().await;

            let cleanup = match &tracking {
                Some(t) => ctx.put(Action::new(t.clone(), false)),
                None => Ok(()),
            };

            let end = match result {
                Ok(Ok(Ok(()))) => InvocationEnd::Completed,
                Ok(Ok(Err(error))) => return Err(error),
                Ok(Err(Aborted)) => InvocationEnd::Cancelled,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            cleanup?;
            Ok(end)
        });

        Invocation {
            abort,
            task,
            routine,
        }
    }
}

/// One in-flight execution. Dropping it aborts the body; its cleanup still
/// runs on the execution's own task.
struct Invocation {
    abort: AbortHandle,
    task: JoinHandle<EffectResult<InvocationEnd>>,
    routine: Arc<str>,
}

impl Invocation {
    /// Abort the body and wait until its cleanup has run.
    async fn cancel(mut self) -> EffectResult<InvocationEnd> {
        self.abort.abort();
        (&mut self).await
    }
}

impl Future for Invocation {
    type Output = EffectResult<InvocationEnd>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(end)) => Poll::Ready(end),
            Poll::Ready(Err(e)) if e.is_panic() => {
                Poll::Ready(Err(EffectError::Panicked(self.routine.to_string())))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Ok(InvocationEnd::Cancelled)),
        }
    }
}

impl Drop for Invocation {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

/// Wait for the next action of the given type. `None` once the channel has
/// closed.
pub(super) async fn next_matching(
    rx: &mut broadcast::Receiver<Action>,
    action_type: &ActionType,
) -> Option<Action> {
    loop {
        match rx.recv().await {
            Ok(action) if action.action_type() == action_type => return Some(action),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(%action_type, skipped, "effect watcher fell behind dispatched actions")
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Watch one action type until the container's channel closes, or until an
/// execution fails.
pub(super) async fn watch(
    rx: broadcast::Receiver<Action>,
    action_type: ActionType,
    strategy: Strategy,
    call: Call,
    ctx: EffectContext,
) -> EffectResult<()> {
    tracing::debug!(%action_type, ?strategy, routine = ctx.routine(), "watching");
    match strategy {
        Strategy::Latest => latest(rx, action_type, call, ctx).await,
        Strategy::Every => every(rx, action_type, call, ctx).await,
        Strategy::Leading => leading(rx, action_type, call, ctx).await,
        Strategy::Throttle(window) => throttle(rx, action_type, window, call, ctx).await,
    }
}

async fn settle(slot: &mut Option<Invocation>) -> EffectResult<InvocationEnd> {
    match slot {
        Some(invocation) => invocation.await,
        None => futures::future::pending().await,
    }
}

async fn window_closed(window: &mut Option<Pin<Box<Sleep>>>) {
    match window {
        Some(sleep) => sleep.as_mut().await,
        None => futures::future::pending().await,
    }
}

async fn latest(
    mut rx: broadcast::Receiver<Action>,
    action_type: ActionType,
    call: Call,
    ctx: EffectContext,
) -> EffectResult<()> {
    let mut current: Option<Invocation> = None;
    loop {
        tokio::select! {
            action = next_matching(&mut rx, &action_type) => {
                let Some(action) = action else { return Ok(()) };
                if let Some(previous) = current.take() {
                    tracing::debug!(%action_type, "superseding in-flight execution");
                    previous.cancel().await?;
                }
                current = Some(call.spawn(ctx.clone(), action));
            }
            end = settle(&mut current) => {
                current = None;
                end?;
            }
        }
    }
}

async fn leading(
    mut rx: broadcast::Receiver<Action>,
    action_type: ActionType,
    call: Call,
    ctx: EffectContext,
) -> EffectResult<()> {
    let mut current: Option<Invocation> = None;
    loop {
        tokio::select! {
            action = next_matching(&mut rx, &action_type) => {
                let Some(action) = action else { return Ok(()) };
                if current.is_none() {
                    current = Some(call.spawn(ctx.clone(), action));
                } else {
                    tracing::debug!(%action_type, "ignoring dispatch while an execution is in flight");
                }
            }
            end = settle(&mut current) => {
                current = None;
                end?;
            }
        }
    }
}

async fn every(
    mut rx: broadcast::Receiver<Action>,
    action_type: ActionType,
    call: Call,
    ctx: EffectContext,
) -> EffectResult<()> {
    let mut running = FuturesUnordered::new();
    loop {
        tokio::select! {
            action = next_matching(&mut rx, &action_type) => {
                let Some(action) = action else { return Ok(()) };
                running.push(call.spawn(ctx.clone(), action));
            }
            Some(end) = running.next(), if !running.is_empty() => {
                end?;
            }
        }
    }
}

async fn throttle(
    mut rx: broadcast::Receiver<Action>,
    action_type: ActionType,
    period: Duration,
    call: Call,
    ctx: EffectContext,
) -> EffectResult<()> {
    let mut running = FuturesUnordered::new();
    let mut window: Option<Pin<Box<Sleep>>> = None;
    let mut trailing: Option<Action> = None;
    loop {
        tokio::select! {
            action = next_matching(&mut rx, &action_type) => {
                let Some(action) = action else { return Ok(()) };
                if window.is_some() {
                    trailing = Some(action);
                } else {
                    running.push(call.spawn(ctx.clone(), action));
                    window = Some(Box::pin(tokio::time::sleep(period)));
                }
            }
            _ = window_closed(&mut window) => {
                window = None;
                if let Some(action) = trailing.take() {
                    running.push(call.spawn(ctx.clone(), action));
                    window = Some(Box::pin(tokio::time::sleep(period)));
                }
            }
            Some(end) = running.next(), if !running.is_empty() => {
                end?;
            }
        }
    }
}
