use super::{require_nonempty, NoopLease, Selection, Strategy};
use async_trait::async_trait;
use common::{GatewayError, ProviderSpec};
use std::collections::HashMap;
use std::sync::Mutex;

/// Smooth weighted round-robin: each call adds `weight_i / Σweight` to every
/// provider's debt, then picks the largest debt and subtracts 1 from it. The
/// long-run pick frequency converges to the weight ratios.
#[derive(Default)]
pub struct Weighted {
    debts: Mutex<HashMap<String, HashMap<String, f64>>>,
}

impl Weighted {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Strategy for Weighted {
    async fn choose(
        &self,
        model: &str,
        providers: &[ProviderSpec],
    ) -> Result<Selection, GatewayError> {
        require_nonempty(model, providers)?;

        let total_weight: f64 = providers.iter().map(|p| p.weight).sum();
        if total_weight <= 0.0 {
            return Err(GatewayError::NoProviderAvailable {
                model: model.to_string(),
            });
        }

        let mut debts = self.debts.lock().unwrap();
        let model_debts = debts.entry(model.to_string()).or_default();

        for provider in providers {
            *model_debts.entry(provider.id.clone()).or_insert(0.0) +=
                provider.weight / total_weight;
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
        "weighted"
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
    async fn three_to_one_weight_ratio_yields_six_to_two_over_eight_calls() {
        let strategy = Weighted::new();
        let providers = vec![provider("A", 3.0), provider("B", 1.0)];
        let mut picks = Vec::new();
        for _ in 0..8 {
            let sel = strategy.choose("m", &providers).await.unwrap();
            picks.push(sel.provider.id);
        }
        assert_eq!(picks, vec!["A", "A", "A", "B", "A", "A", "A", "B"]);
    }

    #[tokio::test]
    async fn equal_weights_behave_like_round_robin() {
        let strategy = Weighted::new();
        let providers = vec![provider("A", 1.0), provider("B", 1.0)];
        let mut picks = Vec::new();
        for _ in 0..4 {
            let sel = strategy.choose("m", &providers).await.unwrap();
            picks.push(sel.provider.id);
        }
        assert_eq!(picks, vec!["A", "B", "A", "B"]);
    }
}
