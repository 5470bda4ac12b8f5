//! Token/cost accounting for LLM calls.

use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;

/// Token counts and derived cost for one call or an aggregate of calls.
///
/// All counters are non-negative; `cost_usd` is either reported by the
/// provider or derived from the profile's per-MTok rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    pub cost_usd: f64,
}

impl UsageStats {
    /// Element-wise accumulation; optional counters stay `None` until a
    /// call actually reports them.
    pub fn add(&mut self, other: &UsageStats) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        if let Some(v) = other.cache_read_input_tokens {
            *self.cache_read_input_tokens.get_or_insert(0) += v;
        }
        if let Some(v) = other.cache_creation_input_tokens {
            *self.cache_creation_input_tokens.get_or_insert(0) += v;
        }
        self.cost_usd += other.cost_usd;
    }

    /// Derives `cost_usd` from the profile's per-MTok rates when the
    /// provider did not supply a cost. No rates configured ⇒ cost stays 0.
    pub fn derive_cost(&mut self, cfg: &ModelConfig) {
        if self.cost_usd != 0.0 {
            return;
        }
        let input = cfg.input_usd_per_mtok.unwrap_or(0.0) * (self.input_tokens as f64) / 1e6;
        let output = cfg.output_usd_per_mtok.unwrap_or(0.0) * (self.output_tokens as f64) / 1e6;
        self.cost_usd = input + output;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;

    fn cfg(input_rate: Option<f64>, output_rate: Option<f64>) -> ModelConfig {
        ModelConfig {
            provider: Provider::OpenAi,
            model: "m".into(),
            endpoint: "http://x".into(),
            api_key: Some("k".into()),
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: None,
            input_usd_per_mtok: input_rate,
            output_usd_per_mtok: output_rate,
        }
    }

    #[test]
    fn add_accumulates_element_wise() {
        let mut a = UsageStats {
            input_tokens: 10,
            output_tokens: 5,
            cache_read_input_tokens: Some(2),
            cache_creation_input_tokens: None,
            cost_usd: 0.1,
        };
        let b = UsageStats {
            input_tokens: 1,
            output_tokens: 1,
            cache_read_input_tokens: Some(3),
            cache_creation_input_tokens: Some(7),
            cost_usd: 0.2,
        };
        a.add(&b);
        assert_eq!(a.input_tokens, 11);
        assert_eq!(a.output_tokens, 6);
        assert_eq!(a.cache_read_input_tokens, Some(5));
        assert_eq!(a.cache_creation_input_tokens, Some(7));
        assert!((a.cost_usd - 0.3).abs() < 1e-9);
    }

    #[test]
    fn cost_derivation_uses_per_mtok_rates() {
        let mut u = UsageStats {
            input_tokens: 1_000_000,
            output_tokens: 500_000,
            ..Default::default()
        };
        u.derive_cost(&cfg(Some(2.0), Some(8.0)));
        assert!((u.cost_usd - 6.0).abs() < 1e-9);
    }

    #[test]
    fn provider_reported_cost_is_not_overwritten() {
        let mut u = UsageStats {
            input_tokens: 1_000_000,
            cost_usd: 1.25,
            ..Default::default()
        };
        u.derive_cost(&cfg(Some(2.0), None));
        assert!((u.cost_usd - 1.25).abs() < 1e-9);
    }
}
