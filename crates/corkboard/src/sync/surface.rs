use corkboard_api::CoreError;
use corkboard_core::{Resolution, SyncMachine, SyncNotice, SyncOutcome, SyncPhase};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// What a gesture does to a surface, computed from its current state.
pub enum Plan<S, C> {
    /// Nothing changes.
    NoOp,
    /// Replace the state without writing anything.
    Local(S),
    /// Apply `next` optimistically and persist `change`.
    Remote { next: S, change: C },
}

/// Local state of one UI surface plus its optimistic mutation machinery.
///
/// Cloning yields another handle to the same surface.
pub struct SyncSurface<S> {
    name: Arc<str>,
    machine: Arc<Mutex<SyncMachine<S>>>,
    notices: broadcast::Sender<SyncNotice>,
}

impl<S> Clone for SyncSurface<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            machine: self.machine.clone(),
            notices: self.notices.clone(),
        }
    }
}

impl<S: Clone + Send> SyncSurface<S> {
    pub fn new(name: &str, state: S, notice_capacity: usize) -> Self {
        let (notices, _) = broadcast::channel(notice_capacity.max(1));
        Self {
            name: Arc::from(name),
            machine: Arc::new(Mutex::new(SyncMachine::new(name, state))),
            notices,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> S {
        self.machine.lock().await.state().clone()
    }

    pub async fn phase(&self) -> SyncPhase {
        self.machine.lock().await.phase()
    }

    pub async fn is_pending(&self) -> bool {
        self.machine.lock().await.is_pending()
    }

    /// Notices raised when a gesture is rolled back.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    /// Stop accepting gestures. A write still in flight resolves to
    /// `SyncOutcome::Discarded` and its result is not applied.
    pub async fn close(&self) {
        tracing::debug!("[Sync:{}] Closed", self.name);
        self.machine.lock().await.close();
    }

    /// Run a gesture that never writes remotely. `plan` returns the next state, or
    /// `None` when nothing changes.
    pub async fn run_local<P>(&self, plan: P) -> Result<SyncOutcome, CoreError>
    where
        P: FnOnce(&S) -> Result<Option<S>, CoreError>,
    {
        self.run(
            |state| {
                Ok(match plan(state)? {
                    Some(next) => Plan::Local(next),
                    None => Plan::NoOp,
                })
            },
            |_: ()| async { Ok(None) },
        )
        .await
    }

    /// Run one gesture.
    ///
    /// `plan` sees the current state and decides what the gesture does. For a remote
    /// change the optimistic state is applied before `write` runs; `write` may return
    /// a confirmed state that replaces it. A failed write restores the exact state
    /// from before the gesture, broadcasts a [`SyncNotice`] and returns the error.
    pub async fn run<C, P, W, Fut>(&self, plan: P, write: W) -> Result<SyncOutcome, CoreError>
    where
        P: FnOnce(&S) -> Result<Plan<S, C>, CoreError>,
        W: FnOnce(C) -> Fut,
        Fut: Future<Output = Result<Option<S>, CoreError>>,
    {
        let (generation, change) = {
            let mut machine = self.machine.lock().await;
            machine.ensure_accepting()?;
            match plan(machine.state())? {
                Plan::NoOp => {
                    tracing::debug!("[Sync:{}] No-op gesture", self.name);
                    return Ok(SyncOutcome::NoOp);
                }
                Plan::Local(next) => {
                    machine.apply_local(next)?;
                    return Ok(SyncOutcome::LocalOnly);
                }
                Plan::Remote { next, change } => (machine.begin(next)?, change),
            }
        };
        tracing::debug!("[Sync:{}] -> pending (generation {})", self.name, generation);

        let result = write(change).await;

        let mut machine = self.machine.lock().await;
        match result {
            Ok(confirmed) => match machine.commit(generation, confirmed) {
                Resolution::Applied => {
                    tracing::info!("[Sync:{}] pending -> committed", self.name);
                    Ok(SyncOutcome::Committed)
                }
                Resolution::Stale | Resolution::Discarded => {
                    tracing::debug!("[Sync:{}] Discarding late confirmation", self.name);
                    Ok(SyncOutcome::Discarded)
                }
            },
            Err(error) => match machine.roll_back(generation) {
                Resolution::Applied => {
                    tracing::warn!("[Sync:{}] pending -> rolled_back: {}", self.name, error);
                    // No receivers is fine: nobody is showing notices.
                    let _ = self.notices.send(SyncNotice {
                        surface: self.name.to_string(),
                        kind: error.kind(),
                        message: error.to_string(),
                    });
                    Err(error)
                }
                Resolution::Stale | Resolution::Discarded => {
                    tracing::debug!("[Sync:{}] Discarding late failure: {}", self.name, error);
                    Ok(SyncOutcome::Discarded)
                }
            },
        }
    }
}
