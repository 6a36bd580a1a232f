//! Process-wide configuration, read from the environment once at startup
//! (§9: `LLM_ROUTER_*` is canonical; `LLM_PROXY_API_*` is accepted as a
//! historical alias for the same variable names).

use std::env;
use std::time::Duration;

const CANONICAL_PREFIX: &str = "LLM_ROUTER_";
const ALIAS_PREFIX: &str = "LLM_PROXY_API_";

fn env_var(suffix: &str) -> Option<String> {
    env::var(format!("{CANONICAL_PREFIX}{suffix}"))
        .or_else(|_| env::var(format!("{ALIAS_PREFIX}{suffix}")))
        .ok()
}

fn env_var_or(suffix: &str, default: &str) -> String {
    env_var(suffix).unwrap_or_else(|| default.to_string())
}

fn env_duration_secs(suffix: &str, default_secs: u64) -> Duration {
    match env_var(suffix).and_then(|raw| common::parse_duration_secs(&raw).ok()) {
        Some(secs) => Duration::from_secs(secs),
        None => Duration::from_secs(default_secs),
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub catalog_path: String,
    pub url_prefix: String,
    pub default_language: String,
    pub request_timeout: Duration,
    pub external_timeout: Duration,
    pub strategy_name: String,
    pub store_url: String,
    pub bind_addr: String,
    pub masking_enabled: bool,
    pub guardrail_enabled: bool,
    pub prometheus_enabled: bool,
    pub keepalive_interval: Duration,
    pub provider_monitor_interval: Duration,
    pub prompts_root: String,
    pub otel_endpoint: Option<String>,
}

impl AppConfig {
    /// Builds configuration from the process environment. Per §6, a catalog
    /// load failure or a store required by the configured strategy being
    /// unreachable must cause the process to exit non-zero before serving
    /// traffic; this function itself never fails — those checks happen once
    /// the dependent components (catalog, store) are actually constructed.
    pub fn from_env() -> Self {
        Self {
            catalog_path: env_var_or("CATALOG_PATH", "resources/configs/models-config.json"),
            url_prefix: env_var_or("PREFIX", "/api"),
            default_language: env_var_or("DEFAULT_LANGUAGE", "en"),
            request_timeout: env_duration_secs("REQUEST_TIMEOUT", 300),
            external_timeout: env_duration_secs("EXTERNAL_TIMEOUT", 60),
            strategy_name: env_var_or("STRATEGY", "balanced"),
            store_url: env_var_or("STORE_URL", "redis://127.0.0.1:6379"),
            bind_addr: env_var_or("BIND_ADDR", "0.0.0.0:9091"),
            masking_enabled: env_bool("MASKING_ENABLED", false),
            guardrail_enabled: env_bool("GUARDRAIL_ENABLED", false),
            prometheus_enabled: env_bool("PROMETHEUS_ENABLED", true),
            keepalive_interval: env_duration_secs("KEEPALIVE_INTERVAL", 1),
            provider_monitor_interval: env_duration_secs("PROVIDER_MONITOR_INTERVAL", 1),
            prompts_root: env_var_or("PROMPTS_ROOT", "resources/prompts"),
            otel_endpoint: env_var("OTEL_ENDPOINT"),
        }
    }

    /// Whether the configured strategy needs the coordination store to
    /// function (§4.4): `first_available*` and the keep-alive monitor do,
    /// `balanced`/`weighted`/`dynamic_weighted` don't.
    pub fn strategy_requires_store(&self) -> bool {
        matches!(
            self.strategy_name.as_str(),
            "first_available" | "first_available_optim"
        )
    }
}

fn env_bool(suffix: &str, default: bool) -> bool {
    match env_var(suffix) {
        Some(raw) => matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn alias_prefix_is_honored_when_canonical_is_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("LLM_ROUTER_PREFIX");
        env::set_var("LLM_PROXY_API_PREFIX", "/legacy");
        assert_eq!(env_var_or("PREFIX", "/api"), "/legacy");
        env::remove_var("LLM_PROXY_API_PREFIX");
    }

    #[test]
    fn canonical_prefix_wins_over_alias() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("LLM_ROUTER_PREFIX", "/canonical");
        env::set_var("LLM_PROXY_API_PREFIX", "/legacy");
        assert_eq!(env_var_or("PREFIX", "/api"), "/canonical");
        env::remove_var("LLM_ROUTER_PREFIX");
        env::remove_var("LLM_PROXY_API_PREFIX");
    }

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("LLM_ROUTER_PREFIX");
        env::remove_var("LLM_PROXY_API_PREFIX");
        assert_eq!(env_var_or("PREFIX", "/api"), "/api");
    }
}
