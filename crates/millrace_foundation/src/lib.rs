//! Core types for Millrace.
//!
//! This crate provides:
//! - [`Value`] - The dynamic value type flowing through the engine
//! - [`Fact`] - A typed, value-equal datum asserted into a session
//! - [`Bindings`] - Persistent variable-binding maps
//! - [`Element`], [`Token`], [`NodeId`] - Units of network propagation
//! - [`SymbolId`], [`KeywordId`], [`Interner`] - String interning
//! - [`Error`] - Engine error types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bindings;
pub mod error;
pub mod intern;
pub mod token;
pub mod value;

pub use bindings::Bindings;
pub use error::{Error, ErrorKind};
pub use intern::{Interner, KeywordId, SymbolId, GENERATED_PREFIX};
pub use token::{Element, Match, NodeId, Token};
pub use value::{Fact, Value};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
