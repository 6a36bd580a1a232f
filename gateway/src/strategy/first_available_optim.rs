use super::first_available::FirstAvailable;
use super::{require_nonempty, Lease, Selection, Strategy};
use crate::store::CoordinationStore;
use async_trait::async_trait;
use common::{GatewayError, ProviderSpec};
use std::sync::Arc;
use std::time::Duration;

pub struct HostAwareLease {
    store: Arc<dyn CoordinationStore>,
    model: String,
    provider_id: String,
    host: String,
}

#[async_trait]
impl Lease for HostAwareLease {
    async fn release(&self) {
        if let Err(err) = self
            .store
            .release_provider(&self.model, &self.provider_id, Some(&self.host))
            .await
        {
            tracing::warn!(model = %self.model, provider = %self.provider_id, host = %self.host, "failed to release provider lock: {err}");
        }
    }
}

/// Host-spreading variant of [`FirstAvailable`] (§4.3.5): prefers reusing a
/// host this model already warmed up before spreading to an idle one,
/// falling back to plain first-available if nothing host-aware succeeds.
pub struct FirstAvailableOptim {
    store: Arc<dyn CoordinationStore>,
    lock_ttl: Duration,
    fallback: FirstAvailable,
}

impl FirstAvailableOptim {
    pub fn new(store: Arc<dyn CoordinationStore>, lock_ttl: Duration) -> Self {
        Self {
            store: store.clone(),
            lock_ttl,
            fallback: FirstAvailable::new(store, lock_ttl),
        }
    }

    async fn try_acquire(
        &self,
        model: &str,
        provider: &ProviderSpec,
    ) -> Result<Option<Selection>, GatewayError> {
        let host = provider.host();
        let outcome = self
            .store
            .acquire_provider(model, &provider.id, Some(&host), self.lock_ttl)
            .await?;
        if !outcome.acquired {
            return Ok(None);
        }
        Ok(Some(Selection {
            provider: provider.clone(),
            lease: Box::new(HostAwareLease {
                store: self.store.clone(),
                model: model.to_string(),
                provider_id: provider.id.clone(),
                host,
            }),
        }))
    }
}

#[async_trait]
impl Strategy for FirstAvailableOptim {
    async fn choose(
        &self,
        model: &str,
        providers: &[ProviderSpec],
    ) -> Result<Selection, GatewayError> {
        require_nonempty(model, providers)?;

        let last_host_key = format!("model:{model}:last_host");
        let hosts_set_key = format!("model:{model}:hosts");

        // Step 1: reuse the last host this model used, if any provider still
        // lives there. A last_host absent from the catalog is treated as a
        // cache miss rather than an error (open question in the design notes).
        if let Some(last_host) = self.store.get(&last_host_key).await? {
            for provider in providers.iter().filter(|p| p.host() == last_host) {
                if let Some(selection) = self.try_acquire(model, provider).await? {
                    return Ok(selection);
                }
            }
            if !providers.iter().any(|p| p.host() == last_host) {
                let _ = self.store.del(&last_host_key).await;
            }
        }

        // Step 2: reuse any host already known to be serving this model.
        let known_hosts = self.store.smembers(&hosts_set_key).await?;
        if !known_hosts.is_empty() {
            for provider in providers
                .iter()
                .filter(|p| known_hosts.contains(&p.host()))
            {
                if let Some(selection) = self.try_acquire(model, provider).await? {
                    return Ok(selection);
                }
            }
        }

        // Step 3: spread to a host not yet serving this model.
        for provider in providers
            .iter()
            .filter(|p| !known_hosts.contains(&p.host()))
        {
            if let Some(selection) = self.try_acquire(model, provider).await? {
                return Ok(selection);
            }
        }

        // Step 4: fall back to plain first-available (no host bookkeeping).
        self.fallback.choose(model, providers).await
    }

    fn name(&self) -> &'static str {
        "first_available_optim"
    }
}

