pub mod api_model;
pub mod config;
pub mod endpoint;
pub mod hooks;
pub mod http_error;
pub mod keepalive;
pub mod metrics;
pub mod prompt_repo;
pub mod relay;
pub mod store;
pub mod strategy;
pub mod tracing_init;

use crate::config::AppConfig;
use crate::endpoint::{DispatchContext, EndpointRegistry};
use crate::hooks::{Auditor, Guardrail, Masker, NullAuditor};
use crate::metrics::Metrics;
use crate::prompt_repo::{FilesystemPromptRepository, PromptRepository};
use crate::store::{CoordinationStore, RedisStore};
use crate::strategy::{Balanced, DynamicWeighted, FirstAvailable, FirstAvailableOptim, Strategy, Weighted};
use common::{Catalog, GatewayError};
use std::sync::Arc;
use std::time::Duration;

const PROVIDER_LOCK_TTL: Duration = Duration::from_secs(300);

/// Everything the server needs, constructed once at startup (§4.8).
pub struct AppState {
    pub config: AppConfig,
    pub registry: EndpointRegistry,
    pub dispatch_ctx: DispatchContext,
}

/// Builds the strategy named by `AppConfig::strategy_name`, wiring in the
/// coordination store for the strategies that need one. Unknown names fall
/// back to `balanced` and log a warning, rather than refusing to start over
/// a typo in an env var.
pub fn build_strategy(config: &AppConfig, store: Option<Arc<dyn CoordinationStore>>) -> Arc<dyn Strategy> {
    match config.strategy_name.as_str() {
        "balanced" => Arc::new(Balanced::new()),
        "weighted" => Arc::new(Weighted::new()),
        "dynamic_weighted" => Arc::new(DynamicWeighted::new()),
        "first_available" => {
            let store = store.expect("first_available strategy requires a coordination store");
            Arc::new(FirstAvailable::new(store, PROVIDER_LOCK_TTL))
        }
        "first_available_optim" => {
            let store = store.expect("first_available_optim strategy requires a coordination store");
            Arc::new(FirstAvailableOptim::new(store, PROVIDER_LOCK_TTL))
        }
        other => {
            tracing::warn!("unknown strategy '{other}', falling back to 'balanced'");
            Arc::new(Balanced::new())
        }
    }
}

/// Loads the catalog from `config.catalog_path`. A load failure is fatal
/// (§6): the caller is expected to log and exit non-zero.
pub async fn load_catalog(config: &AppConfig) -> Result<Catalog, GatewayError> {
    let contents = tokio::fs::read_to_string(&config.catalog_path)
        .await
        .map_err(|err| GatewayError::BadCatalog {
            reason: format!("failed reading catalog at '{}': {err}", config.catalog_path),
        })?;
    Catalog::load_from_str(&contents)
}

/// Connects the coordination store if the configured strategy needs one.
/// An unreachable store when one is required is fatal (§6).
pub async fn connect_store_if_needed(config: &AppConfig) -> Result<Option<Arc<dyn CoordinationStore>>, GatewayError> {
    if !config.strategy_requires_store() {
        return Ok(None);
    }
    let store = RedisStore::connect(&config.store_url).await?;
    Ok(Some(Arc::new(store) as Arc<dyn CoordinationStore>))
}

/// Assembles [`AppState`] from a loaded config, catalog, and optional store.
/// Masking/guardrail/audit collaborators are left empty here; a deployment
/// that enables them wires concrete rule engines in before calling this.
pub fn build_app_state(
    config: AppConfig,
    catalog: Catalog,
    store: Option<Arc<dyn CoordinationStore>>,
    maskers: Vec<Box<dyn Masker>>,
    guardrails: Vec<Box<dyn Guardrail>>,
    auditor: Arc<dyn Auditor>,
) -> AppState {
    let strategy = build_strategy(&config, store.clone());
    let prompts: Arc<dyn PromptRepository> =
        Arc::new(FilesystemPromptRepository::new(config.prompts_root.clone(), config.default_language.clone()));
    let metrics = Arc::new(Metrics::new());
    let http_client = reqwest::Client::new();
    let catalog = Arc::new(catalog);

    let dispatch_ctx = DispatchContext::new(
        Arc::clone(&catalog),
        strategy,
        maskers,
        guardrails,
        auditor,
        prompts,
        metrics,
        http_client,
        config.default_language.clone(),
        config.external_timeout,
        config.masking_enabled,
        config.guardrail_enabled,
        store,
    );

    let registry = EndpointRegistry::with_builtin_endpoints(catalog, &config.url_prefix);

    AppState {
        config,
        registry,
        dispatch_ctx,
    }
}

pub fn default_auditor() -> Arc<dyn Auditor> {
    Arc::new(NullAuditor)
}
