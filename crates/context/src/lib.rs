//! Hierarchical context management.
//!
//! Each agent owns one [`ContextManager`]: a FIFO working memory plus N
//! summary levels. When the token budget fills past the fold threshold,
//! recent history is folded into level 0, and lower levels are
//! periodically consolidated upward so the broadest context survives
//! the longest.

mod folding;
mod manager;

pub use folding::{FoldDirective, DECISION_SYSTEM_PROMPT};
pub use manager::{ContextManager, Interaction, SummaryLevel};
