//! Test utilities: an in-memory remote system.
//!
//! [`MemoryInventory`] behaves like a small inventory service (containers
//! plus named resources) and implements both [`Probe`](crate::Probe) and
//! [`Action`](crate::Action). Failure hooks reproduce the situations the
//! reconciler has to cope with: missing containers, duplicate names, delete
//! races and slow asynchronous tasks.

pub mod inventory;
pub mod task;

pub use inventory::{Call, MemoryInventory, Op};
pub use task::CountdownTask;
