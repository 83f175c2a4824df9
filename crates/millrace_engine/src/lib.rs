//! The Millrace engine: node behaviors, truth maintenance, scheduling,
//! and the session API.
//!
//! This crate provides:
//! - [`Session`] - The immutable session handle (`insert`, `retract`,
//!   `fire_rules`, `query`, `components`)
//! - [`SessionOptions`] - Construction options (fact typing, ancestors,
//!   activation grouping, listeners, caching)
//! - [`Routing`] - Type-based fact routing into the alpha network

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::result_large_err)]
#![allow(clippy::missing_errors_doc)]

mod nodes;
pub mod routing;
pub mod session;

pub use routing::{AncestorsFn, FactTypeFn, Routing};
pub use session::{
    ActivationGroupFn, ActivationGroupSortFn, QueryRef, Session, SessionComponents,
    SessionOptions,
};
