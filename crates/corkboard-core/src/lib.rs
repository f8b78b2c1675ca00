//! Pure building blocks of corkboard.
//!
//! - `traits`: collaborator interfaces (persistence, file storage, identity)
//! - `storage`: query and error types exchanged with the persistence collaborator
//! - `registry`: parse/serialize/display/validate rules per field type
//! - `reconciler`: drag-and-drop reordering with dense order recomputation
//! - `sync`: the per-surface optimistic mutation state machine

pub mod reconciler;
pub mod registry;
pub mod storage;
pub mod sync;
pub mod traits;

pub use reconciler::{
    apply_sequence, densify, is_dense, move_between_groups, reorder, reorder_ordered,
    DragGesture, DropLocation, Group, GroupedMove, Grouped, Identified, MembershipChange,
    OrderChange, Ordered, Reordered,
};
pub use registry::TypedValue;
pub use storage::types::{
    Filter, Join, JoinKind, OrderBy, Query, Result, RowTarget, StorageError, Table,
};
pub use sync::{Resolution, SyncMachine, SyncNotice, SyncOutcome, SyncPhase};
pub use traits::{FileStorage, IdentityProvider, PersistenceBackend};
