//! Working memory for Millrace.
//!
//! This crate provides:
//! - [`PersistentMemory`] / [`TransientMemory`] - The immutable snapshot
//!   and its exclusive mutable form
//! - [`ActivationQueue`], [`Activation`] - The priority-grouped scheduler
//!   queue
//! - [`SessionListener`] / [`EventListener`] - The observation interface,
//!   with [`NoopListener`] and [`TraceListener`] implementations

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod listener;
pub mod memory;
pub mod queue;

pub use listener::{EventListener, NoopListener, SessionListener, TraceEvent, TraceListener};
pub use memory::{MemKey, PersistentMemory, TransientMemory};
pub use queue::{Activation, ActivationQueue, GroupCmp};
