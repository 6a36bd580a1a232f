use super::{require_nonempty, NoopLease, Selection, Strategy};
use async_trait::async_trait;
use common::{GatewayError, ProviderSpec};
use std::collections::HashMap;
use std::sync::Mutex;

/// Round-robin by least usage: per-model counters, smallest counter wins,
/// ties broken by first-in-list order.
#[derive(Default)]
pub struct Balanced {
    counters: Mutex<HashMap<String, HashMap<String, u64>>>,
}

impl Balanced {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Strategy for Balanced {
    async fn choose(
        &self,
        model: &str,
        providers: &[ProviderSpec],
    ) -> Result<Selection, GatewayError> {
        require_nonempty(model, providers)?;

        let mut counters = self.counters.lock().unwrap();
        let model_counters = counters.entry(model.to_string()).or_default();

        let (idx, _) = providers
            .iter()
            .enumerate()
            .map(|(i, p)| (i, *model_counters.get(&p.id).unwrap_or(&0)))
            .min_by_key(|(_, count)| *count)
            .expect("non-empty providers checked above");

        let chosen = &providers[idx];
        *model_counters.entry(chosen.id.clone()).or_insert(0) += 1;

        Ok(Selection {
            provider: chosen.clone(),
            lease: Box::new(NoopLease),
        })
    }

    fn name(&self) -> &'static str {
        "balanced"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(id: &str) -> ProviderSpec {
        serde_json::from_value(serde_json::json!({
            "id": id, "api_host": "http://h", "api_type": "vllm", "input_size": 4096
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn alternates_between_two_equal_providers() {
        let strategy = Balanced::new();
        let providers = vec![provider("A"), provider("B")];
        let mut picks = Vec::new();
        for _ in 0..4 {
            let sel = strategy.choose("m", &providers).await.unwrap();
            picks.push(sel.provider.id);
        }
        assert_eq!(picks, vec!["A", "B", "A", "B"]);
    }

    #[tokio::test]
    async fn empty_providers_is_no_provider_available() {
        let strategy = Balanced::new();
        let err = strategy.choose("m", &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoProviderAvailable { .. }));
    }

    #[tokio::test]
    async fn counts_differ_by_at_most_one_across_many_calls() {
        let strategy = Balanced::new();
        let providers = vec![provider("A"), provider("B"), provider("C")];
        let mut counts: HashMap<String, u64> = HashMap::new();
        for _ in 0..97 {
            let sel = strategy.choose("m", &providers).await.unwrap();
            *counts.entry(sel.provider.id).or_insert(0) += 1;
        }
        let min = *counts.values().min().unwrap();
        let max = *counts.values().max().unwrap();
        assert!(max - min <= 1);
    }
}
