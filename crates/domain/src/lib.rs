//! Shared domain types for the Fathom research engine.
//!
//! Everything other crates agree on lives here: the error taxonomy, the
//! configuration tree, conversation messages, streaming events, cost
//! accounting, research state types, and the event-sourcing envelope.

pub mod config;
pub mod cost;
pub mod error;
pub mod event;
pub mod message;
pub mod research;
pub mod stream;

pub use error::{Error, Result};
