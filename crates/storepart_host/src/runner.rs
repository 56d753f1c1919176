//! Runs effect routines and reports how they end.
//!
//! Each routine runs on its own tokio task. A routine id can only have one
//! live task: asking to run a routine whose previous run is still going is a
//! no-op. When a routine ends, for whatever reason other than being shut
//! down, an [`EffectOutcome`] is sent on the outcome channel.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::channel::mpsc;
use futures::FutureExt;
use parking_lot::Mutex;
use storepart::{Container, EffectError, EffectRoutine};
use tokio::task::JoinHandle;

use crate::{HostError, HostResult};

/// Receives the outcome of every routine as it ends.
pub type OutcomeReceiver = mpsc::UnboundedReceiver<EffectOutcome>;
type OutcomeSender = mpsc::UnboundedSender<EffectOutcome>;

/// How a routine ended.
#[derive(Debug)]
pub enum EffectOutcome {
    /// The routine returned, e.g. because the action channel closed.
    Completed(String),
    /// The routine, or one of the executions it started, returned an error.
    Failed(String, EffectError),
    /// The routine itself panicked.
    Panicked(String),
}

impl EffectOutcome {
    /// Id of the routine this is the outcome of.
    pub fn routine(&self) -> &str {
        match self {
            EffectOutcome::Completed(id)
            | EffectOutcome::Failed(id, _)
            | EffectOutcome::Panicked(id) => id,
        }
    }

    fn log(&self) {
        match self {
            EffectOutcome::Completed(id) => tracing::debug!(routine = %id, "effect routine completed"),
            EffectOutcome::Failed(id, error) => {
                tracing::error!(routine = %id, ?error, "effect routine failed")
            }
            EffectOutcome::Panicked(id) => tracing::error!(routine = %id, "effect routine panicked"),
        }
    }
}

/// Keeps track of running effect routines.
pub struct EffectRunner {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    outcomes: OutcomeSender,
    receiver: Mutex<Option<OutcomeReceiver>>,
}

impl Default for EffectRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectRunner {
    /// Constructor
    pub fn new() -> Self {
        let (outcomes, receiver) = mpsc::unbounded();
        Self {
            tasks: Mutex::new(HashMap::new()),
            outcomes,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Start a routine against a container, unless a run of the same routine
    /// is still live. Returns whether a new run was started.
    pub fn run(&self, routine: &EffectRoutine, container: Arc<dyn Container>) -> HostResult<bool> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| HostError::NoRuntime)?;

        let mut tasks = self.tasks.lock();
        if tasks
            .get(routine.id())
            .map_or(false, |task| !task.is_finished())
        {
            tracing::debug!(routine = %routine.id(), "effect routine already running");
            return Ok(false);
        }

        let id = routine.id().to_string();
        let run = container.scope_effect(routine.run(container.clone()));
        let outcomes = self.outcomes.clone();
        let task = runtime.spawn({
            let id = id.clone();
            async move {
                let outcome = match AssertUnwindSafe(run).catch_unwind().await {
                    Ok(Ok(())) => EffectOutcome::Completed(id),
                    Ok(Err(error)) => EffectOutcome::Failed(id, error),
                    Err(_) => EffectOutcome::Panicked(id),
                };
                outcome.log();
                // nobody listening is fine
                let _ = outcomes.unbounded_send(outcome);
            }
        });

        tracing::debug!(routine = %id, "effect routine started");
        tasks.insert(id, task);
        Ok(true)
    }

    /// Whether a run of this routine is live.
    pub fn is_running(&self, id: &str) -> bool {
        self.tasks
            .lock()
            .get(id)
            .map_or(false, |task| !task.is_finished())
    }

    /// Ids of the live routines, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .tasks
            .lock()
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// The outcome channel. Can only be taken once.
    pub fn take_outcomes(&self) -> Option<OutcomeReceiver> {
        self.receiver.lock().take()
    }

    /// Abort every routine. Aborted routines report no outcome.
    pub fn shutdown(&self) {
        for (id, task) in self.tasks.lock().drain() {
            tracing::debug!(routine = %id, "stopping effect routine");
            task.abort();
        }
    }
}

impl std::fmt::Debug for EffectRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRunner")
            .field("running", &self.running())
            .finish()
    }
}
