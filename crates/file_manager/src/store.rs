//! Single-task event loop owning the registry.
//!
//! Every state change goes through the loop, one action at a time. Views and
//! the upload coordinator hold a [`Dispatcher`] to queue actions and read the
//! latest published snapshot.

use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::debug;

use crate::{
    error::FileManagerError,
    form::{self, FormSink},
    registry::{Action, Epoch, RegistryState},
};

enum Command {
    Apply {
        epoch: Option<Epoch>,
        action: Action,
        ack: Option<oneshot::Sender<Applied>>,
    },
    Barrier(oneshot::Sender<()>),
}

/// Reply to [`Dispatcher::apply`], sent once the loop has handled the action.
#[derive(Debug, Clone)]
pub struct Applied {
    /// `false` when the action was dropped as a stale upload result.
    pub applied: bool,
    /// Registry state right before the action.
    pub previous: Arc<RegistryState>,
}

#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Arc<RegistryState>>,
}

impl Dispatcher {
    /// Queues an action that is not tied to a registry generation.
    pub fn dispatch(&self, action: Action) -> bool {
        self.send(None, action)
    }

    /// Queues an action produced under `epoch`.
    pub fn dispatch_at(&self, epoch: Epoch, action: Action) -> bool {
        self.send(Some(epoch), action)
    }

    fn send(&self, epoch: Option<Epoch>, action: Action) -> bool {
        let name = action.name();
        match self.tx.send(Command::Apply {
            epoch,
            action,
            ack: None,
        }) {
            Ok(()) => true,
            Err(_) => {
                debug!(action = name, "registry closed; dropping action");
                false
            }
        }
    }

    /// Queues an action and waits for the loop to handle it. Everything
    /// queued earlier is applied first, so `previous` reflects it.
    pub async fn apply(
        &self,
        epoch: Option<Epoch>,
        action: Action,
    ) -> Result<Applied, FileManagerError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Apply {
                epoch,
                action,
                ack: Some(ack_tx),
            })
            .map_err(|_| FileManagerError::StoreClosed)?;
        ack_rx.await.map_err(|_| FileManagerError::StoreClosed)
    }

    pub fn epoch(&self) -> Epoch {
        self.snapshots.borrow().epoch()
    }

    pub fn snapshot(&self) -> Arc<RegistryState> {
        self.snapshots.borrow().clone()
    }

    /// Resolves once every action queued before this call has been applied.
    pub async fn settle(&self) -> Result<Arc<RegistryState>, FileManagerError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Barrier(done_tx))
            .map_err(|_| FileManagerError::StoreClosed)?;
        done_rx.await.map_err(|_| FileManagerError::StoreClosed)?;
        Ok(self.snapshot())
    }

    pub async fn wait_until(
        &self,
        mut predicate: impl FnMut(&RegistryState) -> bool,
    ) -> Result<Arc<RegistryState>, FileManagerError> {
        let mut snapshots = self.snapshots.clone();
        let state = snapshots
            .wait_for(|state| predicate(&**state))
            .await
            .map_err(|_| FileManagerError::StoreClosed)?;
        Ok(state.clone())
    }
}

pub struct Store {
    dispatcher: Dispatcher,
    task: JoinHandle<()>,
}

impl Store {
    /// Spawns the loop on the current tokio runtime.
    pub fn spawn(initial: RegistryState, sink: Arc<dyn FormSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(initial.clone()));
        let task = tokio::spawn(run(initial, rx, snapshot_tx, sink));
        Self {
            dispatcher: Dispatcher {
                tx,
                snapshots: snapshot_rx,
            },
            task,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut state: RegistryState,
    mut rx: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<Arc<RegistryState>>,
    sink: Arc<dyn FormSink>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Apply { epoch, action, ack } => {
                debug!(action = action.name(), ?epoch, "applying registry action");
                let previous = snapshots.borrow().clone();
                let applied = state.apply_tagged(epoch, action);
                snapshots.send_replace(Arc::new(state.clone()));

                if form::propagate(&state, sink.as_ref()) {
                    state.apply(Action::ClearDirty);
                    snapshots.send_replace(Arc::new(state.clone()));
                }
                if let Some(ack) = ack {
                    let _ = ack.send(Applied { applied, previous });
                }
            }
            Command::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
