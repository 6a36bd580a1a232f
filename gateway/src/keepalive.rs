//! Keep-alive monitor (§4.7): one background loop per process that pings
//! idle providers so their model weights stay resident on GPUs.

use crate::store::CoordinationStore;
use common::{ApiType, Catalog, Operation};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NEXT_WAKEUP_KEY: &str = "keepalive:providers:next_wakeup";
const KEEPALIVE_PROMPT: &str = "Send an empty message.";
const FAILURE_BACKOFF_FLOOR: Duration = Duration::from_secs(30);
const PING_TIMEOUT: Duration = Duration::from_secs(30);

fn hash_key(model: &str, host: &str) -> String {
    format!("keepalive:provider:{model}:{host}")
}

fn member_key(model: &str, host: &str) -> String {
    format!("{model}\u{1}{host}")
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Called by the locking strategies the first time they acquire a provider
/// that opted in to `keep_alive` (§4.7 step 5). Re-registration updates the
/// stored interval.
pub async fn record_usage(
    store: &dyn CoordinationStore,
    model: &str,
    host: &str,
    keep_alive_seconds: u64,
) -> Result<(), common::GatewayError> {
    store
        .hset(
            &hash_key(model, host),
            "keep_alive_seconds",
            &keep_alive_seconds.to_string(),
        )
        .await?;
    store
        .zadd(
            NEXT_WAKEUP_KEY,
            &member_key(model, host),
            now_unix() + keep_alive_seconds as f64,
        )
        .await
}

/// Runs the keep-alive loop forever. Intended to be spawned once at
/// startup; `clear_buffers` purges prior schedule state on start (§4.7).
pub async fn run(
    store: Arc<dyn CoordinationStore>,
    catalog: Arc<Catalog>,
    client: reqwest::Client,
    check_interval: Duration,
    clear_buffers: bool,
) {
    if clear_buffers {
        for (model, provider) in catalog.keep_alive_providers() {
            let _ = store.del(&hash_key(model, &provider.host())).await;
        }
        // The sorted set itself is a single key; clearing each member would
        // require a SMEMBERS-style scan the store trait doesn't expose, so a
        // fresh deploy instead lets stale scores age out naturally via the
        // is_host_free check below returning no matching provider.
    }

    let mut ticker = tokio::time::interval(check_interval);
    loop {
        ticker.tick().await;
        if let Err(err) = tick_once(&store, &catalog, &client).await {
            tracing::warn!("keep-alive tick failed: {err}");
        }
    }
}

async fn tick_once(
    store: &Arc<dyn CoordinationStore>,
    catalog: &Arc<Catalog>,
    client: &reqwest::Client,
) -> Result<(), common::GatewayError> {
    let due = store.zrange_by_score(NEXT_WAKEUP_KEY, now_unix()).await?;

    for member in due {
        let Some((model, host)) = member.split_once('\u{1}') else {
            store.zrem(NEXT_WAKEUP_KEY, &member).await?;
            continue;
        };

        let keep_alive_seconds: u64 = store
            .hget(&hash_key(model, host), "keep_alive_seconds")
            .await?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(60);

        if !is_host_free(store, model, host).await? {
            store
                .zadd(NEXT_WAKEUP_KEY, &member, now_unix() + keep_alive_seconds as f64)
                .await?;
            continue;
        }

        let Some(provider) = catalog.find_provider_on_host(model, host) else {
            store.zrem(NEXT_WAKEUP_KEY, &member).await?;
            store.del(&hash_key(model, host)).await?;
            continue;
        };

        let api_type: ApiType = match provider.api_type() {
            Ok(t) => t,
            Err(_) => continue,
        };
        let Some((path, _method)) = api_type.path_for(Operation::Chat) else {
            continue;
        };
        let url = format!("{}{}", provider.api_host.trim_end_matches('/'), path);

        let payload = serde_json::json!({
            "model": provider.model_path,
            "messages": [{"role": "user", "content": KEEPALIVE_PROMPT}],
            "options": {},
        });

        let mut request = client.post(&url).timeout(PING_TIMEOUT).json(&payload);
        if let Some(token) = provider.api_token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let next_score = match request.send().await {
            Ok(response) if response.status().is_success() => now_unix() + keep_alive_seconds as f64,
            Ok(response) => {
                tracing::warn!(model, host, status = %response.status(), "keep-alive ping failed");
                now_unix() + keep_alive_seconds.max(FAILURE_BACKOFF_FLOOR.as_secs()) as f64
            }
            Err(err) => {
                tracing::warn!(model, host, "keep-alive ping errored: {err}");
                now_unix() + keep_alive_seconds.max(FAILURE_BACKOFF_FLOOR.as_secs()) as f64
            }
        };

        store.zadd(NEXT_WAKEUP_KEY, &member, next_score).await?;
    }

    Ok(())
}

/// Consults the §4.3.5 occupancy hash: a host is idle for keep-alive
/// purposes if no model currently has an active acquisition on it.
async fn is_host_free(
    store: &Arc<dyn CoordinationStore>,
    _model: &str,
    host: &str,
) -> Result<bool, common::GatewayError> {
    let occupants = store.hkeys(&format!("host:{host}")).await?;
    Ok(occupants.is_empty())
}
