//! Pluggable provider-selection algorithms. Every strategy implements
//! [`Strategy::choose`] and must be safe under concurrent calls from many
//! request handlers; callers never touch per-strategy state directly.

mod balanced;
mod dynamic_weighted;
mod first_available;
mod first_available_optim;
mod weighted;

pub use balanced::Balanced;
pub use dynamic_weighted::DynamicWeighted;
pub use first_available::FirstAvailable;
pub use first_available_optim::FirstAvailableOptim;
pub use weighted::Weighted;

use async_trait::async_trait;
use common::{GatewayError, ProviderSpec};

/// A guard representing a provider lock held by a locking strategy. Dropping
/// it without calling [`Lease::release`] leaves the lock to expire by TTL —
/// the endpoint must always call `release` on the way out, success or error.
#[async_trait]
pub trait Lease: Send + Sync {
    async fn release(&self);
}

/// A no-op lease used by strategies that don't hold any external lock
/// (balanced, weighted, dynamic_weighted).
pub struct NoopLease;

#[async_trait]
impl Lease for NoopLease {
    async fn release(&self) {}
}

pub struct Selection {
    pub provider: ProviderSpec,
    pub lease: Box<dyn Lease>,
}

/// Owns a [`Lease`] and guarantees it gets released exactly once, even if
/// the future holding it is dropped mid-flight (e.g. a request-level
/// deadline cancelling dispatch while a provider is held). Call [`release`]
/// on every normal exit path; the `Drop` impl is the fallback for
/// cancellation, not the primary release mechanism, since a spawned release
/// task runs after, not before, the lock would otherwise expire by TTL.
pub struct LeaseGuard(Option<Box<dyn Lease>>);

impl LeaseGuard {
    pub fn new(lease: Box<dyn Lease>) -> Self {
        Self(Some(lease))
    }

    /// Releases the lease now. A no-op if already released (including by a
    /// prior call or by `Drop`).
    pub async fn release(&mut self) {
        if let Some(lease) = self.0.take() {
            lease.release().await;
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Some(lease) = self.0.take() {
            tokio::spawn(async move { lease.release().await });
        }
    }
}

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Picks one provider for `model` out of `providers` (the model's primary
    /// list; `providers_sleep` is never passed in — see the open question in
    /// the design notes about that pool).
    async fn choose(
        &self,
        model: &str,
        providers: &[ProviderSpec],
    ) -> Result<Selection, GatewayError>;

    /// Human-readable strategy name, used as a low-cardinality metric label
    /// and in startup logs.
    fn name(&self) -> &'static str;

    /// Feedback hook called by the endpoint layer after the upstream call
    /// completes. Only `dynamic_weighted` acts on this; other strategies
    /// accept the default no-op.
    async fn report_outcome(&self, _model: &str, _provider_id: &str, _latency_ms: f64, _success: bool) {}
}

pub(crate) fn require_nonempty<'a>(
    model: &str,
    providers: &'a [ProviderSpec],
) -> Result<(), GatewayError> {
    if providers.is_empty() {
        return Err(GatewayError::NoProviderAvailable {
            model: model.to_string(),
        });
    }
    Ok(())
}
