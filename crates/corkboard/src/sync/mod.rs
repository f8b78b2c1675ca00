//! Optimistic sync engine
//!
//! - `surface`: the generic optimistic surface driving a
//!   [`SyncMachine`](corkboard_core::SyncMachine)
//! - `board`: entry moves between board columns
//! - `order`: field and status reordering
//! - `form`: the form-builder canvas
//!
//! A surface accepts one gesture at a time. A gesture arriving while an earlier one
//! is still being written fails with `CoreError::MutationInFlight` and leaves the
//! surface untouched.

pub mod board;
pub mod form;
pub mod order;
pub mod surface;

pub use board::{BoardState, BoardSurface};
pub use form::FormCanvasSurface;
pub use order::{FieldOrderSurface, OrderSurface, StatusOrderSurface};
pub use surface::{Plan, SyncSurface};
