//! The Fathom research engine.
//!
//! Binds the aggregate, event store, event bus, and agent loops into an
//! orchestrated pipeline: plan → search (sub-researchers, optionally
//! driven by the supervisor) → analyze → synthesize → report.

pub mod aggregate;
pub mod analysis;
pub mod bus;
pub mod cancel;
pub mod cli;
pub mod orchestrator;
pub mod prompts;
pub mod report;
pub mod researcher;
pub mod supervisor;

pub use aggregate::{Command, ResearchAggregate, ResearchState};
pub use bus::{BusEvent, BusReceiver, EventBus};
pub use cancel::CancelToken;
pub use orchestrator::{Capabilities, Orchestrator};
