//! Post-call cost accounting with a hard per-job ceiling.
//!
//! Cost is computed from reported token usage against a per-model price
//! table and accumulated in the job's ledger. The ceiling check runs before
//! every call and again after every recording, and is never retried.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::upstream::Usage;

/// Ceiling breach. Fatal for the job; any checkpointed partial results
/// remain queryable.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
#[error("cost ceiling exceeded: spent ${spent:.4} of ${ceiling:.4}")]
pub struct CostExceeded {
    pub spent: f64,
    pub ceiling: f64,
}

/// USD per million tokens for one model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

/// Per-model prices with a fallback row for unknown models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTable {
    #[serde(default)]
    pub models: HashMap<String, ModelPrice>,
    #[serde(default = "default_price")]
    pub fallback: ModelPrice,
}

fn default_price() -> ModelPrice {
    ModelPrice {
        input_per_mtok: 3.0,
        output_per_mtok: 15.0,
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "claude-haiku-4-5-20251001".to_string(),
            ModelPrice {
                input_per_mtok: 1.0,
                output_per_mtok: 5.0,
            },
        );
        models.insert(
            "claude-sonnet-4-5-20250929".to_string(),
            ModelPrice {
                input_per_mtok: 3.0,
                output_per_mtok: 15.0,
            },
        );
        Self {
            models,
            fallback: default_price(),
        }
    }
}

impl PriceTable {
    pub fn cost_of(&self, model: &str, usage: Usage) -> f64 {
        let price = self.models.get(model).copied().unwrap_or(self.fallback);
        let input = usage.input_tokens as f64 / 1_000_000.0 * price.input_per_mtok;
        let output = usage.output_tokens as f64 / 1_000_000.0 * price.output_per_mtok;
        input + output
    }
}

/// Cumulative spend for one job, persisted with it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostLedger {
    pub input_usd: f64,
    pub output_usd: f64,
    pub calls: u32,
}

impl CostLedger {
    pub fn total(&self) -> f64 {
        self.input_usd + self.output_usd
    }
}

/// Guards one job's ledger against the configured ceiling.
pub struct CostGuard {
    prices: PriceTable,
    ceiling_usd: f64,
    ledger: Mutex<CostLedger>,
}

impl CostGuard {
    pub fn new(prices: PriceTable, ceiling_usd: f64) -> Self {
        Self::with_ledger(prices, ceiling_usd, CostLedger::default())
    }

    /// Resume accounting from a persisted ledger (worker restart).
    pub fn with_ledger(prices: PriceTable, ceiling_usd: f64, ledger: CostLedger) -> Self {
        Self {
            prices,
            ceiling_usd,
            ledger: Mutex::new(ledger),
        }
    }

    /// Pre-call gate: rejects once the ledger has reached the ceiling.
    pub fn check(&self) -> Result<(), CostExceeded> {
        let ledger = self.ledger.lock().expect("cost ledger lock poisoned");
        if ledger.total() >= self.ceiling_usd {
            Err(CostExceeded {
                spent: ledger.total(),
                ceiling: self.ceiling_usd,
            })
        } else {
            Ok(())
        }
    }

    /// Record a successful call's usage, then re-check the ceiling so a
    /// breach aborts before the next call is ever attempted.
    pub fn record(&self, model: &str, usage: Usage) -> Result<(), CostExceeded> {
        let price = self.prices.models.get(model).copied().unwrap_or(self.prices.fallback);
        let mut ledger = self.ledger.lock().expect("cost ledger lock poisoned");
        ledger.input_usd += usage.input_tokens as f64 / 1_000_000.0 * price.input_per_mtok;
        ledger.output_usd += usage.output_tokens as f64 / 1_000_000.0 * price.output_per_mtok;
        ledger.calls += 1;
        if ledger.total() >= self.ceiling_usd {
            Err(CostExceeded {
                spent: ledger.total(),
                ceiling: self.ceiling_usd,
            })
        } else {
            Ok(())
        }
    }

    pub fn ledger(&self) -> CostLedger {
        *self.ledger.lock().expect("cost ledger lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u32, output: u32) -> Usage {
        Usage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[test]
    fn price_table_costs_by_model() {
        let table = PriceTable::default();
        let cost = table.cost_of("claude-sonnet-4-5-20250929", usage(1_000_000, 1_000_000));
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_uses_fallback() {
        let table = PriceTable::default();
        let cost = table.cost_of("some-future-model", usage(1_000_000, 0));
        assert!((cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn guard_accumulates_and_trips() {
        let guard = CostGuard::new(PriceTable::default(), 0.05);
        assert!(guard.check().is_ok());

        // ~$0.018 per call at sonnet prices.
        let u = usage(1_000, 1_000);
        assert!(guard.record("claude-sonnet-4-5-20250929", u).is_ok());
        assert!(guard.record("claude-sonnet-4-5-20250929", u).is_ok());
        assert!(guard.check().is_ok());

        // Third call crosses $0.05: recording reports the breach...
        let err = guard.record("claude-sonnet-4-5-20250929", u).unwrap_err();
        assert!(err.spent >= 0.05);
        // ...and the pre-call gate rejects everything afterwards.
        assert!(guard.check().is_err());
        assert_eq!(guard.ledger().calls, 3);
    }

    #[test]
    fn resumed_ledger_keeps_accrued_cost() {
        let prior = CostLedger {
            input_usd: 1.0,
            output_usd: 3.5,
            calls: 7,
        };
        let guard = CostGuard::with_ledger(PriceTable::default(), 5.0, prior);
        assert!(guard.check().is_ok());
        assert!((guard.ledger().total() - 4.5).abs() < 1e-9);
    }
}
