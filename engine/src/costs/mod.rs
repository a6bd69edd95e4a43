//! Cost accounting
//!
//! Maps (model id, input tokens, output tokens) to a cost in cents and keeps
//! per-interaction totals. The pricing table is plain configuration injected
//! into the agent; there is no global price list.

use crate::llm::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Price of one model, in USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_cost_per_million_tokens: f64,
    pub output_cost_per_million_tokens: f64,
}

impl ModelPricing {
    pub const fn new(input_cost_per_million_tokens: f64, output_cost_per_million_tokens: f64) -> Self {
        Self {
            input_cost_per_million_tokens,
            output_cost_per_million_tokens,
        }
    }

    /// Cost of one call in cents
    pub fn cost_cents(&self, usage: TokenUsage) -> f64 {
        let input = usage.input_tokens as f64 / 1_000_000.0 * self.input_cost_per_million_tokens;
        let output =
            usage.output_tokens as f64 / 1_000_000.0 * self.output_cost_per_million_tokens;
        (input + output) * 100.0
    }
}

/// Model id to price mapping with a fallback entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    /// Used for any model id with no entry in `models`
    #[serde(default = "default_model_pricing")]
    pub default: ModelPricing,

    #[serde(default = "default_models")]
    pub models: BTreeMap<String, ModelPricing>,
}

fn default_model_pricing() -> ModelPricing {
    ModelPricing::new(2.5, 10.0)
}

fn default_models() -> BTreeMap<String, ModelPricing> {
    [
        ("gpt-4o", ModelPricing::new(2.5, 10.0)),
        ("gpt-4o-mini", ModelPricing::new(0.15, 0.6)),
        ("claude-3-5-sonnet", ModelPricing::new(3.0, 15.0)),
        ("claude-3-5-haiku", ModelPricing::new(0.8, 4.0)),
        ("gemini-1.5-pro", ModelPricing::new(1.25, 5.0)),
    ]
    .into_iter()
    .map(|(id, pricing)| (id.to_string(), pricing))
    .collect()
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            default: default_model_pricing(),
            models: default_models(),
        }
    }
}

impl PricingTable {
    /// A table with only a fallback entry
    pub fn flat(default: ModelPricing) -> Self {
        Self {
            default,
            models: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>, pricing: ModelPricing) -> Self {
        self.models.insert(model_id.into(), pricing);
        self
    }

    /// Pricing for a model id.
    ///
    /// Exact match first, then the longest entry the id starts with (so dated
    /// snapshots like `gpt-4o-2024-08-06` price as `gpt-4o`), then the
    /// default entry.
    pub fn pricing_for(&self, model_id: &str) -> &ModelPricing {
        if let Some(pricing) = self.models.get(model_id) {
            return pricing;
        }
        self.models
            .iter()
            .filter(|(id, _)| model_id.starts_with(id.as_str()))
            .max_by_key(|(id, _)| id.len())
            .map(|(_, pricing)| pricing)
            .unwrap_or(&self.default)
    }

    pub fn cost_cents(&self, model_id: &str, usage: TokenUsage) -> f64 {
        self.pricing_for(model_id).cost_cents(usage)
    }
}

/// Aggregate usage of one interaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostTotals {
    pub total_cost_cents: f64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub model_calls: u32,
}

/// Accumulates the cost of every model call in one interaction.
///
/// Totals only ever grow: negative or non-finite call costs count as zero.
#[derive(Debug, Clone)]
pub struct CostAccountant {
    pricing: Arc<PricingTable>,
    totals: CostTotals,
}

impl CostAccountant {
    pub fn new(pricing: Arc<PricingTable>) -> Self {
        Self {
            pricing,
            totals: CostTotals::default(),
        }
    }

    /// Record one model call and return its cost in cents.
    ///
    /// A cost reported by the provider takes precedence over the table.
    pub fn record(&mut self, model_id: &str, usage: TokenUsage, reported_cents: Option<f64>) -> f64 {
        let raw = reported_cents.unwrap_or_else(|| self.pricing.cost_cents(model_id, usage));
        let cost = if raw.is_finite() { raw.max(0.0) } else { 0.0 };

        self.totals.total_cost_cents += cost;
        self.totals.total_prompt_tokens += usage.input_tokens;
        self.totals.total_completion_tokens += usage.output_tokens;
        self.totals.model_calls += 1;

        debug!(
            "Model call on {}: {} in / {} out tokens, {:.4} cents (total {:.4})",
            model_id, usage.input_tokens, usage.output_tokens, cost, self.totals.total_cost_cents
        );
        cost
    }

    pub fn totals(&self) -> CostTotals {
        self.totals
    }

    pub fn total_cost_cents(&self) -> f64 {
        self.totals.total_cost_cents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_formula() {
        let pricing = ModelPricing::new(3.0, 15.0);
        // 1M in at $3 + 0.5M out at $15 = $10.50
        let cents = pricing.cost_cents(TokenUsage::new(1_000_000, 500_000));
        assert!((cents - 1050.0).abs() < 1e-9);
    }

    #[test]
    fn test_lookup_exact_prefix_and_default() {
        let table = PricingTable::default();
        assert_eq!(table.pricing_for("gpt-4o-mini"), &ModelPricing::new(0.15, 0.6));
        assert_eq!(
            table.pricing_for("gpt-4o-2024-08-06"),
            &ModelPricing::new(2.5, 10.0)
        );
        assert_eq!(
            table.pricing_for("gpt-4o-mini-2024-07-18"),
            &ModelPricing::new(0.15, 0.6)
        );
        assert_eq!(table.pricing_for("some-local-model"), &table.default);
    }

    #[test]
    fn test_flat_table() {
        let table = PricingTable::flat(ModelPricing::new(1.0, 1.0)).with_model("x", ModelPricing::new(2.0, 2.0));
        assert_eq!(table.pricing_for("x").input_cost_per_million_tokens, 2.0);
        assert_eq!(table.pricing_for("y").input_cost_per_million_tokens, 1.0);
    }

    #[test]
    fn test_accountant_accumulates() {
        let mut accountant = CostAccountant::new(Arc::new(PricingTable::flat(ModelPricing::new(
            1.0, 2.0,
        ))));
        let first = accountant.record("m", TokenUsage::new(1_000_000, 0), None);
        assert!((first - 100.0).abs() < 1e-9);
        accountant.record("m", TokenUsage::new(0, 1_000_000), None);

        let totals = accountant.totals();
        assert!((totals.total_cost_cents - 300.0).abs() < 1e-9);
        assert_eq!(totals.total_prompt_tokens, 1_000_000);
        assert_eq!(totals.total_completion_tokens, 1_000_000);
        assert_eq!(totals.model_calls, 2);
    }

    #[test]
    fn test_reported_cost_wins() {
        let mut accountant = CostAccountant::new(Arc::new(PricingTable::default()));
        let cost = accountant.record("gpt-4o", TokenUsage::new(10, 10), Some(0.42));
        assert_eq!(cost, 0.42);
    }

    #[test]
    fn test_negative_and_nan_costs_clamped() {
        let mut accountant = CostAccountant::new(Arc::new(PricingTable::default()));
        accountant.record("gpt-4o", TokenUsage::default(), Some(-5.0));
        accountant.record("gpt-4o", TokenUsage::default(), Some(f64::NAN));
        assert_eq!(accountant.total_cost_cents(), 0.0);
    }

    #[test]
    fn test_pricing_table_from_toml() {
        let table: PricingTable = toml::from_str(
            r#"
            [default]
            input_cost_per_million_tokens = 1.0
            output_cost_per_million_tokens = 2.0

            [models."my-model"]
            input_cost_per_million_tokens = 5.0
            output_cost_per_million_tokens = 6.0
            "#,
        )
        .unwrap();
        assert_eq!(table.pricing_for("my-model"), &ModelPricing::new(5.0, 6.0));
        assert_eq!(table.pricing_for("other"), &ModelPricing::new(1.0, 2.0));
    }
}
