use super::{AcquireOutcome, CoordinationStore};
use async_trait::async_trait;
use common::GatewayError;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;

fn store_err(reason: impl std::fmt::Display) -> GatewayError {
    GatewayError::StoreUnavailable {
        reason: reason.to_string(),
    }
}

/// The `first_available_optim` atomic acquisition (§4.3.5, §9): a single
/// scripted block so the multi-key update can never be observed partially
/// applied. `KEYS = [occ_key, last_host_key, hosts_set_key, host_hash_key]`,
/// `ARGV = [provider_id, ttl_secs, host_or_empty, model_name]`.
const ACQUIRE_SCRIPT: &str = r#"
local occ_key = KEYS[1]
local last_host_key = KEYS[2]
local hosts_set_key = KEYS[3]
local host_hash_key = KEYS[4]
local provider_id = ARGV[1]
local ttl = tonumber(ARGV[2])
local host = ARGV[3]
local model = ARGV[4]

if redis.call('HSETNX', occ_key, provider_id, '1') == 0 then
    return 0
end
redis.call('EXPIRE', occ_key, ttl)

if host ~= '' then
    redis.call('SET', last_host_key, host, 'EX', ttl)
    redis.call('SADD', hosts_set_key, host)
    redis.call('HINCRBY', host_hash_key, model, 1)
end
return 1
"#;

/// The matching release script: clears the occupancy field and, if the host
/// count reaches zero, drops the model from the host's set.
const RELEASE_SCRIPT: &str = r#"
local occ_key = KEYS[1]
local hosts_set_key = KEYS[2]
local host_hash_key = KEYS[3]
local provider_id = ARGV[1]
local host = ARGV[2]
local model = ARGV[3]

redis.call('HDEL', occ_key, provider_id)

if host ~= '' then
    local count = redis.call('HINCRBY', host_hash_key, model, -1)
    if count <= 0 then
        redis.call('HDEL', host_hash_key, model)
        redis.call('SREM', hosts_set_key, host)
    end
end
return 1
"#;

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, GatewayError> {
        let client = redis::Client::open(url).map_err(store_err)?;
        let conn = ConnectionManager::new(client).await.map_err(store_err)?;
        Ok(Self { conn })
    }

    fn occ_key(model: &str) -> String {
        format!("occ:model:{model}")
    }

    fn last_host_key(model: &str) -> String {
        format!("model:{model}:last_host")
    }

    fn hosts_set_key(model: &str) -> String {
        format!("model:{model}:hosts")
    }

    fn host_hash_key(host: &str) -> String {
        format!("host:{host}")
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, GatewayError> {
        let mut conn = self.conn.clone();
        let acquired: bool = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(store_err)?
            .is_some();
        Ok(acquired)
    }

    async fn del(&self, key: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(store_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, ttl.as_secs() as i64)
            .await
            .map_err(store_err)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(store_err)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, GatewayError> {
        let mut conn = self.conn.clone();
        conn.hget(key, field).await.map_err(store_err)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(key, field).await.map_err(store_err)
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64, GatewayError> {
        let mut conn = self.conn.clone();
        conn.hincr(key, field, delta).await.map_err(store_err)
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>, GatewayError> {
        let mut conn = self.conn.clone();
        conn.hkeys(key).await.map_err(store_err)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member).await.map_err(store_err)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, member).await.map_err(store_err)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, GatewayError> {
        let mut conn = self.conn.clone();
        conn.sismember(key, member).await.map_err(store_err)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, GatewayError> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await.map_err(store_err)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(store_err)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await.map_err(store_err)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(store_err)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        conn.zrem::<_, _, ()>(key, member).await.map_err(store_err)
    }

    async fn zrange_by_score(&self, key: &str, max_score: f64) -> Result<Vec<String>, GatewayError> {
        let mut conn = self.conn.clone();
        conn.zrangebyscore(key, 0.0, max_score)
            .await
            .map_err(store_err)
    }

    async fn acquire_provider(
        &self,
        model: &str,
        provider_id: &str,
        host: Option<&str>,
        ttl: Duration,
    ) -> Result<AcquireOutcome, GatewayError> {
        let mut conn = self.conn.clone();
        let result: i64 = Script::new(ACQUIRE_SCRIPT)
            .key(Self::occ_key(model))
            .key(Self::last_host_key(model))
            .key(Self::hosts_set_key(model))
            .key(host.map(Self::host_hash_key).unwrap_or_default())
            .arg(provider_id)
            .arg(ttl.as_secs().max(1))
            .arg(host.unwrap_or(""))
            .arg(model)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;

        Ok(AcquireOutcome {
            acquired: result == 1,
        })
    }

    async fn release_provider(
        &self,
        model: &str,
        provider_id: &str,
        host: Option<&str>,
    ) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        let _: i64 = Script::new(RELEASE_SCRIPT)
            .key(Self::occ_key(model))
            .key(Self::hosts_set_key(model))
            .key(host.map(Self::host_hash_key).unwrap_or_default())
            .arg(provider_id)
            .arg(host.unwrap_or(""))
            .arg(model)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
