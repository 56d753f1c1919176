//! Finding the store the registration functions act on.
//!
//! There are two places a store can be made current: the process-wide
//! [`GlobalContainer`], for applications that only ever run one store, and
//! the [`TaskContainer`], a tokio task-local scope for hosts that run one
//! store per request. The task-local scope wins when both are set.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::store::StoreHandle;
use crate::{HostError, HostResult, Store};

/// A place the current store can be looked up from.
pub trait CurrentContainer {
    /// The current store, if this place has one.
    fn current(&self) -> Option<Store>;
}

static GLOBAL_STORE: RwLock<Option<Store>> = parking_lot::const_rwlock(None);

tokio::task_local! {
    static TASK_STORE: Store;
}

/// The process-wide store.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalContainer;

impl GlobalContainer {
    /// Make `store` the process-wide store, returning the one it replaces.
    pub fn install(store: Store) -> Option<Store> {
        tracing::debug!("installing the global store");
        GLOBAL_STORE.write().replace(store)
    }

    /// Unset the process-wide store.
    pub fn clear() -> Option<Store> {
        GLOBAL_STORE.write().take()
    }
}

impl CurrentContainer for GlobalContainer {
    fn current(&self) -> Option<Store> {
        GLOBAL_STORE.read().clone()
    }
}

/// The store scoped to the current tokio task.
///
/// The scope is tied to the future it wraps: when that future completes,
/// fails or is dropped, the store stops being current.
#[derive(Clone, Copy, Debug, Default)]
pub struct TaskContainer;

impl TaskContainer {
    /// Run `f` with `store` as the current store.
    pub async fn scope<F: Future>(store: Store, f: F) -> F::Output {
        TASK_STORE.scope(store, f).await
    }

    /// Spawn a task that sees the same current store as the caller, if the
    /// caller has one.
    pub fn spawn_inherit<F>(f: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match TaskContainer.current() {
            Some(store) => tokio::spawn(TASK_STORE.scope(store, f)),
            None => tokio::spawn(f),
        }
    }
}

impl CurrentContainer for TaskContainer {
    fn current(&self) -> Option<Store> {
        TASK_STORE.try_with(Store::clone).ok()
    }
}

/// Polls a future with a store as the task's current store.
///
/// The store is only held while the future is being polled, so work that
/// outlives the store doesn't keep it alive. Once the store is gone the
/// future is polled without one.
pub(crate) struct StoreScoped<F> {
    store: StoreHandle,
    work: Pin<Box<F>>,
}

impl<F: Future> StoreScoped<F> {
    pub(crate) fn new(store: StoreHandle, work: F) -> Self {
        Self {
            store,
            work: Box::pin(work),
        }
    }
}

impl<F: Future> Future for StoreScoped<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.store.upgrade() {
            Some(store) => TASK_STORE.sync_scope(store, || this.work.as_mut().poll(cx)),
            None => this.work.as_mut().poll(cx),
        }
    }
}

/// The current store: the task's if there is one, else the process-wide one.
pub fn current_store() -> HostResult<Store> {
    TaskContainer
        .current()
        .or_else(|| GlobalContainer.current())
        .ok_or(HostError::NoCurrentContainer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostConfig;

    fn store() -> Store {
        Store::builder(HostConfig::default()).build().unwrap()
    }

    #[tokio::test]
    async fn task_scope_ends_with_the_future() {
        assert!(TaskContainer.current().is_none());
        TaskContainer::scope(store(), async {
            assert!(TaskContainer.current().is_some());
        })
        .await;
        assert!(TaskContainer.current().is_none());
    }

    #[tokio::test]
    async fn task_scope_ends_when_the_future_fails() {
        let result: Result<(), &str> =
            TaskContainer::scope(store(), async { Err("nope") }).await;
        assert!(result.is_err());
        assert!(TaskContainer.current().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn children_inherit_the_task_store() {
        let inherited = TaskContainer::scope(store(), async {
            TaskContainer::spawn_inherit(async { TaskContainer.current().is_some() })
                .await
                .unwrap()
        })
        .await;
        assert!(inherited);

        let plain = TaskContainer::scope(store(), async {
            tokio::spawn(async { TaskContainer.current().is_some() })
                .await
                .unwrap()
        })
        .await;
        assert!(!plain);
    }
}
