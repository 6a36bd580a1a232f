//! Coordination store adapter (§4.4): a thin typed facade over a fast shared
//! K/V store, used by the `first_available*` strategies and the keep-alive
//! monitor. The only concrete implementation is [`redis_store::RedisStore`];
//! the trait exists so strategies and the monitor never depend on the redis
//! crate directly.

mod redis_store;

pub use redis_store::RedisStore;

use async_trait::async_trait;
use common::GatewayError;
use std::time::Duration;

/// Result of a multi-key atomic acquisition used by `first_available_optim`
/// (§4.3.5): marks the provider occupied, updates the model's last-used host
/// and host set, and bumps the per-host usage counter, all in one script.
pub struct AcquireOutcome {
    pub acquired: bool,
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Atomically sets `key` to `value` iff absent, with a TTL. Returns
    /// whether *this* call acquired it.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, GatewayError>;

    async fn del(&self, key: &str) -> Result<(), GatewayError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), GatewayError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), GatewayError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, GatewayError>;
    async fn hdel(&self, key: &str, field: &str) -> Result<(), GatewayError>;
    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64, GatewayError>;
    async fn hkeys(&self, key: &str) -> Result<Vec<String>, GatewayError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<(), GatewayError>;
    async fn srem(&self, key: &str, member: &str) -> Result<(), GatewayError>;
    async fn sismember(&self, key: &str, member: &str) -> Result<bool, GatewayError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, GatewayError>;

    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), GatewayError>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), GatewayError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<(), GatewayError>;
    /// Members with score in `[0, max_score]`, ascending.
    async fn zrange_by_score(&self, key: &str, max_score: f64) -> Result<Vec<String>, GatewayError>;

    /// Acquires the `(model, provider_id)` lock and, if `host` is `Some`,
    /// atomically performs the `first_available_optim` bookkeeping
    /// (§4.3.5): set `model:{m}:last_host`, `sadd model:{m}:hosts`, `hincr
    /// host:{host} m`. Must run as a single server-side script or
    /// transaction; a partial application is an invariant violation.
    async fn acquire_provider(
        &self,
        model: &str,
        provider_id: &str,
        host: Option<&str>,
        ttl: Duration,
    ) -> Result<AcquireOutcome, GatewayError>;

    /// Releases the `(model, provider_id)` lock and, if `host` is `Some`,
    /// decrements `host:{host}` field `model` and removes `model` from the
    /// host's set once the count reaches zero.
    async fn release_provider(
        &self,
        model: &str,
        provider_id: &str,
        host: Option<&str>,
    ) -> Result<(), GatewayError>;
}
