//! In-memory collaborators
//!
//! Reference implementations of the persistence and file-storage interfaces, used by
//! the test suite and for running without a remote service.

pub mod files;
pub mod memory;

pub use files::MemoryFileStorage;
pub use memory::{MemoryBackend, Operation};
