//! Checkpoint store for enumeration progress
//!
//! Holds the resource log and the pagination state on local disk, with atomic
//! state writes and an advisory lock so only one process drives a store.

pub mod lock;
pub mod state;
pub mod store;

pub use lock::StoreLock;
pub use state::ResumeError;
pub use store::CheckpointStore;
