#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use must_future::MustBoxFuture;
use parking_lot::Mutex;
use storepart::*;
use tokio::sync::broadcast;

/// A bare-bones container: combines slice reducers by domain and
/// broadcasts every dispatched action after reducing it.
pub struct TestContainer {
    reducers: Vec<SliceReducer>,
    state: Mutex<Arc<ContainerState>>,
    tx: broadcast::Sender<Action>,
    scoped: AtomicUsize,
}

impl TestContainer {
    pub fn new(slices: &[&Slice]) -> Arc<Self> {
        let mut state = ContainerState::new();
        for slice in slices {
            state.insert(slice.domain(), slice.initial_state());
        }
        let (tx, _) = broadcast::channel(256);
        Arc::new(Self {
            reducers: slices.iter().map(|s| s.reducer()).collect(),
            state: Mutex::new(Arc::new(state)),
            tx,
            scoped: AtomicUsize::new(0),
        })
    }

    /// How many pieces of effect work were handed to `scope_effect`.
    pub fn scoped(&self) -> usize {
        self.scoped.load(Ordering::SeqCst)
    }
}

impl Container for TestContainer {
    fn dispatch(&self, action: Action) -> SliceResult<()> {
        let mut current = self.state.lock();
        let mut next = ContainerState::clone(&current);
        let mut changed = false;
        for reducer in &self.reducers {
            let substate = current.domain(reducer.domain())?.clone();
            let reduced = reducer.reduce(&substate, &action)?;
            if !Arc::ptr_eq(&substate, &reduced) {
                next.insert(reducer.domain(), reduced);
                changed = true;
            }
        }
        if changed {
            *current = Arc::new(next);
        }
        let _ = self.tx.send(action);
        Ok(())
    }

    fn state(&self) -> Arc<ContainerState> {
        self.state.lock().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<Action> {
        self.tx.subscribe()
    }

    fn scope_effect(
        &self,
        work: MustBoxFuture<'static, EffectResult<()>>,
    ) -> MustBoxFuture<'static, EffectResult<()>> {
        self.scoped.fetch_add(1, Ordering::SeqCst);
        work
    }
}

/// Everything received so far, without waiting.
pub fn drain(rx: &mut broadcast::Receiver<Action>) -> Vec<Action> {
    let mut out = Vec::new();
    while let Ok(action) = rx.try_recv() {
        out.push(action);
    }
    out
}
