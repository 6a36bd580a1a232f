/// OTEL semantic-convention constants, kept in one place to avoid typo'd
/// attribute keys scattered across call sites.
pub mod resource {
    pub const SERVICE_NAME: &str = "service.name";
    pub const SERVICE_VERSION: &str = "service.version";
}

pub mod scope {
    pub const DEFAULT_NAME: &str = "llm-router.tracing";
    pub const DEFAULT_VERSION: &str = "1.0.0";
}

pub mod http {
    pub const METHOD: &str = "http.method";
    pub const STATUS_CODE: &str = "http.status_code";
    pub const TARGET: &str = "http.target";
    pub const UPSTREAM_TARGET: &str = "http.upstream_target";
}

pub mod llm {
    pub const MODEL_NAME: &str = "llm.model_name";
    pub const PROVIDER_ID: &str = "llm.provider_id";
    pub const IS_STREAMING: &str = "llm.is_streaming";
    pub const STRATEGY: &str = "llm.strategy";
    pub const RESPONSE_BYTES: &str = "llm.response_bytes";
    pub const DURATION_MS: &str = "llm.duration_ms";
    pub const TIME_TO_FIRST_TOKEN_MS: &str = "llm.time_to_first_token_ms";
}
