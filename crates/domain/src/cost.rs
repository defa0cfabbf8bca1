//! Cost accounting for LLM usage.
//!
//! Every LLM call produces a [`CostBreakdown`] that is added into the
//! nearest owning container (worker cost, supervisor cost, folding cost)
//! and bubbles into the aggregate through the corresponding event payload.

use std::collections::HashMap;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::stream::Usage;

/// Token and USD breakdown for one or more LLM calls. Additive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub total_cost_usd: f64,
}

impl Add for CostBreakdown {
    type Output = CostBreakdown;

    fn add(self, rhs: CostBreakdown) -> CostBreakdown {
        CostBreakdown {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
            input_cost_usd: self.input_cost_usd + rhs.input_cost_usd,
            output_cost_usd: self.output_cost_usd + rhs.output_cost_usd,
            total_cost_usd: self.total_cost_usd + rhs.total_cost_usd,
        }
    }
}

impl AddAssign for CostBreakdown {
    fn add_assign(&mut self, rhs: CostBreakdown) {
        *self = *self + rhs;
    }
}

/// Pricing per million tokens for a specific model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Dollars per 1 million input (prompt) tokens.
    pub input_per_1m: f64,
    /// Dollars per 1 million output (completion) tokens.
    pub output_per_1m: f64,
}

impl ModelPricing {
    pub fn breakdown(&self, usage: Usage) -> CostBreakdown {
        let input_cost_usd = usage.input_tokens as f64 * self.input_per_1m / 1_000_000.0;
        let output_cost_usd = usage.output_tokens as f64 * self.output_per_1m / 1_000_000.0;
        CostBreakdown {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
            input_cost_usd,
            output_cost_usd,
            total_cost_usd: input_cost_usd + output_cost_usd,
        }
    }
}

/// Per-model pricing table with a fallback for unknown models.
///
/// Loaded once from config and read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTable {
    #[serde(default)]
    pub models: HashMap<String, ModelPricing>,
    #[serde(default = "fallback_pricing")]
    pub fallback: ModelPricing,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            models: HashMap::new(),
            fallback: fallback_pricing(),
        }
    }
}

fn fallback_pricing() -> ModelPricing {
    ModelPricing {
        input_per_1m: 1.00,
        output_per_1m: 2.00,
    }
}

impl PricingTable {
    /// Compute the cost of one call against the table, falling back to
    /// the default pricing for unknown model ids.
    pub fn cost_for(&self, model: &str, usage: Usage) -> CostBreakdown {
        self.models
            .get(model)
            .unwrap_or(&self.fallback)
            .breakdown(usage)
    }
}
