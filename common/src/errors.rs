//! The error taxonomy shared by every layer of the gateway (catalog loading,
//! strategy selection, endpoint dispatch, upstream relay). Kept free of any HTTP
//! framework dependency so it can be reused by the coordination store adapter and
//! the strategies crate-internally; `gateway::http_error` maps each variant to a
//! status code and a JSON body.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum GatewayError {
    #[error("malformed request body")]
    BadRequest,

    #[error("missing required parameter '{name}'")]
    MissingParam { name: String },

    #[error("validation failed for '{field}': {reason}")]
    ValidationError { field: String, reason: String },

    #[error("request blocked by guardrail: {reason}")]
    GuardrailBlocked { reason: String },

    #[error("no provider available for model '{model}'")]
    NoProviderAvailable { model: String },

    #[error("coordination store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("upstream rejected the request as unauthenticated")]
    AuthRequired,

    #[error("upstream rejected the request as forbidden")]
    Forbidden,

    #[error("upstream returned an error: {status}")]
    UpstreamError { status: u16, body: String },

    #[error("endpoint cannot target provider api_type '{api_type}'")]
    ApiTypeMismatch { api_type: String },

    #[error("endpoint misconfigured: {reason}")]
    MisconfiguredEndpoint { reason: String },

    #[error("unknown api_type '{0}'")]
    UnknownApiType(String),

    #[error("catalog is invalid: {reason}")]
    BadCatalog { reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The HTTP status code this error maps to, per the taxonomy in the design
    /// doc's error-handling section. `gateway::http_error` is the only place that
    /// turns this into an actual `hyper::Response`.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::BadRequest => 400,
            GatewayError::MissingParam { .. } => 400,
            GatewayError::ValidationError { .. } => 400,
            GatewayError::GuardrailBlocked { .. } => 451,
            GatewayError::NoProviderAvailable { .. } => 503,
            GatewayError::StoreUnavailable { .. } => 503,
            GatewayError::UpstreamTimeout => 504,
            GatewayError::AuthRequired => 401,
            GatewayError::Forbidden => 403,
            GatewayError::UpstreamError { .. } => 502,
            GatewayError::ApiTypeMismatch { .. } => 502,
            GatewayError::MisconfiguredEndpoint { .. } => 500,
            GatewayError::UnknownApiType(_) => 502,
            GatewayError::BadCatalog { .. } => 500,
            GatewayError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code, used as the `code` field of the JSON error
    /// envelope and as a low-cardinality metric label.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::BadRequest => "BadRequest",
            GatewayError::MissingParam { .. } => "MissingParam",
            GatewayError::ValidationError { .. } => "ValidationError",
            GatewayError::GuardrailBlocked { .. } => "GuardrailBlocked",
            GatewayError::NoProviderAvailable { .. } => "NoProviderAvailable",
            GatewayError::StoreUnavailable { .. } => "StoreUnavailable",
            GatewayError::UpstreamTimeout => "UpstreamTimeout",
            GatewayError::AuthRequired => "AuthRequired",
            GatewayError::Forbidden => "Forbidden",
            GatewayError::UpstreamError { .. } => "UpstreamError",
            GatewayError::ApiTypeMismatch { .. } => "ApiTypeMismatch",
            GatewayError::MisconfiguredEndpoint { .. } => "MisconfiguredEndpoint",
            GatewayError::UnknownApiType(_) => "UnknownApiType",
            GatewayError::BadCatalog { .. } => "BadCatalog",
            GatewayError::Internal(_) => "Internal",
        }
    }
}
