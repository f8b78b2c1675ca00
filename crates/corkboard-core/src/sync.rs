//! Optimistic mutation state machine
//!
//! A `SyncMachine` holds the local state of one surface (a board, a field list, a
//! form canvas) and at most one pending mutation. Starting a mutation snapshots the
//! current state and applies the optimistic one; resolving it either keeps the
//! optimistic state (or the confirmed state the remote returned) or restores the
//! snapshot exactly.
//!
//! Nothing here performs I/O. The async engine drives the machine around the actual
//! remote write.

use corkboard_api::{CoreError, ErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    Idle,
    Pending,
    Committed,
    RolledBack,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Pending => "pending",
            SyncPhase::Committed => "committed",
            SyncPhase::RolledBack => "rolled_back",
        }
    }
}

/// What a gesture ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Dropped in place; nothing changed and nothing was written.
    NoOp,
    /// Local state changed but nothing needed persisting.
    LocalOnly,
    /// The remote write succeeded.
    Committed,
    /// The surface was closed before the write resolved; the result was dropped.
    Discarded,
}

/// User-visible notification raised when a surface rolls back.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncNotice {
    pub surface: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// How a resolution was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    /// The result belongs to a mutation that is no longer pending.
    Stale,
    /// The surface is closed.
    Discarded,
}

#[derive(Debug, Clone)]
struct PendingMutation<S> {
    generation: u64,
    snapshot: S,
}

#[derive(Debug, Clone)]
pub struct SyncMachine<S> {
    surface: String,
    state: S,
    phase: SyncPhase,
    pending: Option<PendingMutation<S>>,
    last_generation: u64,
    closed: bool,
}

impl<S: Clone> SyncMachine<S> {
    pub fn new(surface: impl Into<String>, state: S) -> Self {
        Self {
            surface: surface.into(),
            state,
            phase: SyncPhase::Idle,
            pending: None,
            last_generation: 0,
            closed: false,
        }
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Fails while a mutation is pending or after the surface was closed.
    pub fn ensure_accepting(&self) -> Result<(), CoreError> {
        if self.closed {
            return Err(CoreError::SurfaceClosed {
                surface: self.surface.clone(),
            });
        }
        if self.pending.is_some() {
            return Err(CoreError::MutationInFlight {
                surface: self.surface.clone(),
            });
        }
        Ok(())
    }

    /// Snapshot the current state, apply `next` and enter `Pending`.
    ///
    /// Fails without touching state while another mutation is pending or after the
    /// surface was closed. Returns the generation the result must be resolved with.
    pub fn begin(&mut self, next: S) -> Result<u64, CoreError> {
        self.ensure_accepting()?;
        self.last_generation += 1;
        let snapshot = std::mem::replace(&mut self.state, next);
        self.pending = Some(PendingMutation {
            generation: self.last_generation,
            snapshot,
        });
        self.phase = SyncPhase::Pending;
        Ok(self.last_generation)
    }

    /// Replace the state without a remote write. Subject to the same rules as `begin`.
    pub fn apply_local(&mut self, next: S) -> Result<(), CoreError> {
        self.ensure_accepting()?;
        self.state = next;
        Ok(())
    }

    fn take_pending(&mut self, generation: u64) -> Result<PendingMutation<S>, Resolution> {
        if self.closed {
            self.pending = None;
            return Err(Resolution::Discarded);
        }
        match self.pending.take() {
            Some(pending) if pending.generation == generation => Ok(pending),
            other => {
                self.pending = other;
                Err(Resolution::Stale)
            }
        }
    }

    /// Confirm mutation `generation`. A `confirmed` state returned by the remote
    /// replaces the optimistic one.
    pub fn commit(&mut self, generation: u64, confirmed: Option<S>) -> Resolution {
        match self.take_pending(generation) {
            Ok(_) => {
                if let Some(state) = confirmed {
                    self.state = state;
                }
                self.phase = SyncPhase::Committed;
                Resolution::Applied
            }
            Err(resolution) => resolution,
        }
    }

    /// Restore the snapshot taken when mutation `generation` began.
    pub fn roll_back(&mut self, generation: u64) -> Resolution {
        match self.take_pending(generation) {
            Ok(pending) => {
                self.state = pending.snapshot;
                self.phase = SyncPhase::RolledBack;
                Resolution::Applied
            }
            Err(resolution) => resolution,
        }
    }

    /// Stop accepting gestures. A pending result that arrives later is discarded.
    pub fn close(&mut self) {
        self.closed = true;
    }
}
