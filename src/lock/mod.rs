//! Single-instance locking for release synchronization runs.
//!
//! At most one run may operate on a repository identity at a time. The lock
//! is scoped: [`LockHandle`] releases on drop, so every exit path (errors and
//! interrupts included) frees it.

mod manager;

pub use manager::{lock_file_name, LockHandle, LockManager, LockRecord};
