//! Durable, append-only event storage.
//!
//! The event store is the single point of durable truth; everything
//! else in the engine is derived from it.

mod store;

pub use store::{FileEventStore, Snapshot};
