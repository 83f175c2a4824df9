//! Millrace - forward-chaining production rule engine
//!
//! This crate re-exports all layers of the Millrace system for convenient
//! access. For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: millrace_engine     — node behaviors, truth maintenance, sessions
//! Layer 2: millrace_memory     — working memory, activation queue, listeners
//! Layer 1: millrace_network    — conditions, DNF, node arena, network builder
//! Layer 0: millrace_foundation — core types (Value, Fact, Bindings, Error)
//! ```

pub use millrace_engine as engine;
pub use millrace_foundation as foundation;
pub use millrace_memory as memory;
pub use millrace_network as network;
