use super::{require_nonempty, NoopLease, Selection, Strategy};
use async_trait::async_trait;
use common::{GatewayError, ProviderSpec};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const EMA_ALPHA: f64 = 0.2;
const PENALTY_LO: f64 = 0.1;
const PENALTY_HI: f64 = 1.0;
const FAILURE_THRESHOLD: u32 = 3;
const FAILURE_PENALTY_FACTOR: f64 = 0.1;
const FAILURE_PENALTY_DURATION: Duration = Duration::from_secs(60);

#[derive(Default)]
struct ProviderStats {
    ema_latency_ms: Option<f64>,
    consecutive_failures: u32,
    failure_penalty_until: Option<Instant>,
}

/// Same debt-accumulator scaffolding as [`super::Weighted`], but the
/// effective weight is the configured weight times a latency penalty fed by
/// [`Strategy::report_outcome`].
#[derive(Default)]
pub struct DynamicWeighted {
    debts: Mutex<HashMap<String, HashMap<String, f64>>>,
    stats: Mutex<HashMap<(String, String), ProviderStats>>,
}

impl DynamicWeighted {
    pub fn new() -> Self {
        Self::default()
    }

    fn effective_weight(&self, model: &str, provider: &ProviderSpec, now: Instant) -> f64 {
        let stats = self.stats.lock().unwrap();
        let key = (model.to_string(), provider.id.clone());
        let Some(stat) = stats.get(&key) else {
            return provider.weight;
        };

        let latency_penalty = match stat.ema_latency_ms {
            Some(ema) if ema > 0.0 => (1.0 / ema).clamp(PENALTY_LO, PENALTY_HI),
            _ => 1.0,
        };

        let failure_penalty = match stat.failure_penalty_until {
            Some(until) if until > now => FAILURE_PENALTY_FACTOR,
            _ => 1.0,
        };

        provider.weight * latency_penalty * failure_penalty
    }
}

#[async_trait]
impl Strategy for DynamicWeighted {
    async fn choose(
        &self,
        model: &str,
        providers: &[ProviderSpec],
    ) -> Result<Selection, GatewayError> {
        require_nonempty(model, providers)?;

        let now = Instant::now();
        let weights: Vec<f64> = providers
            .iter()
            .map(|p| self.effective_weight(model, p, now))
            .collect();
        let total_weight: f64 = weights.iter().sum();
        if total_weight <= 0.0 {
            return Err(GatewayError::NoProviderAvailable {
                model: model.to_string(),
            });
        }

        let mut debts = self.debts.lock().unwrap();
        let model_debts = debts.entry(model.to_string()).or_default();

        for (provider, weight) in providers.iter().zip(weights.iter()) {
            *model_debts.entry(provider.id.clone()).or_insert(0.0) += weight / total_weight;
        }

        // Ties keep the *first* max, not the last: `max_by` returns the last
        // equal-maximum element, which skews the pick order away from the
        // intended weight ratio.
        let mut best_idx = 0;
        let mut best_debt = f64::NEG_INFINITY;
        for (i, provider) in providers.iter().enumerate() {
            let debt = model_debts.get(&provider.id).copied().unwrap_or(0.0);
            if debt > best_debt {
                best_idx = i;
                best_debt = debt;
            }
        }

        let chosen = &providers[best_idx];
        *model_debts.entry(chosen.id.clone()).or_insert(0.0) -= 1.0;

        Ok(Selection {
            provider: chosen.clone(),
            lease: Box::new(NoopLease),
        })
    }

    fn name(&self) -> &'static str {
        "dynamic_weighted"
    }

    async fn report_outcome(&self, model: &str, provider_id: &str, latency_ms: f64, success: bool) {
        let mut stats = self.stats.lock().unwrap();
        let entry = stats
            .entry((model.to_string(), provider_id.to_string()))
            .or_default();

        entry.ema_latency_ms = Some(match entry.ema_latency_ms {
            Some(prev) => EMA_ALPHA * latency_ms + (1.0 - EMA_ALPHA) * prev,
            None => latency_ms,
        });

        if success {
            entry.consecutive_failures = 0;
            entry.failure_penalty_until = None;
        } else {
            entry.consecutive_failures += 1;
            if entry.consecutive_failures >= FAILURE_THRESHOLD {
                entry.failure_penalty_until = Some(Instant::now() + FAILURE_PENALTY_DURATION);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(id: &str, weight: f64) -> ProviderSpec {
        serde_json::from_value(serde_json::json!({
            "id": id, "api_host": "http://h", "api_type": "vllm", "input_size": 4096, "weight": weight
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn behaves_like_weighted_with_no_feedback() {
        let strategy = DynamicWeighted::new();
        let providers = vec![provider("A", 3.0), provider("B", 1.0)];
        let mut picks = Vec::new();
        for _ in 0..8 {
            let sel = strategy.choose("m", &providers).await.unwrap();
            picks.push(sel.provider.id);
        }
        assert_eq!(picks, vec!["A", "A", "A", "B", "A", "A", "A", "B"]);
    }

    #[tokio::test]
    async fn repeated_failures_suppress_a_provider() {
        let strategy = DynamicWeighted::new();
        let providers = vec![provider("A", 1.0), provider("B", 1.0)];

        for _ in 0..3 {
            strategy.report_outcome("m", "A", 50.0, false).await;
        }

        let mut picks = Vec::new();
        for _ in 0..6 {
            let sel = strategy.choose("m", &providers).await.unwrap();
            picks.push(sel.provider.id);
        }
        let a_count = picks.iter().filter(|p| *p == "A").count();
        assert!(a_count <= 1, "expected A to be heavily suppressed, got {picks:?}");
    }
}
