use super::{require_nonempty, Lease, Selection, Strategy};
use crate::store::CoordinationStore;
use async_trait::async_trait;
use common::{GatewayError, ProviderSpec};
use std::sync::Arc;
use std::time::Duration;

pub struct ProviderLease {
    store: Arc<dyn CoordinationStore>,
    model: String,
    provider_id: String,
}

#[async_trait]
impl Lease for ProviderLease {
    async fn release(&self) {
        if let Err(err) = self
            .store
            .release_provider(&self.model, &self.provider_id, None)
            .await
        {
            tracing::warn!(model = %self.model, provider = %self.provider_id, "failed to release provider lock: {err}");
        }
    }
}

/// Picks the first provider in list order whose `(model, provider_id)` lock
/// can be atomically acquired. One full pass with no success ⇒
/// `NoProviderAvailable`.
pub struct FirstAvailable {
    store: Arc<dyn CoordinationStore>,
    lock_ttl: Duration,
}

impl FirstAvailable {
    pub fn new(store: Arc<dyn CoordinationStore>, lock_ttl: Duration) -> Self {
        Self { store, lock_ttl }
    }
}

#[async_trait]
impl Strategy for FirstAvailable {
    async fn choose(
        &self,
        model: &str,
        providers: &[ProviderSpec],
    ) -> Result<Selection, GatewayError> {
        require_nonempty(model, providers)?;

        for provider in providers {
            let outcome = self
                .store
                .acquire_provider(model, &provider.id, None, self.lock_ttl)
                .await?;
            if outcome.acquired {
                return Ok(Selection {
                    provider: provider.clone(),
                    lease: Box::new(ProviderLease {
                        store: self.store.clone(),
                        model: model.to_string(),
                        provider_id: provider.id.clone(),
                    }),
                });
            }
        }

        Err(GatewayError::NoProviderAvailable {
            model: model.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "first_available"
    }
}
