//! Endpoint base & dispatch (§4.5), the heart of the core: a small interface
//! plus a generic dispatcher that knows the request lifecycle, rather than a
//! base-class-and-subclasses hierarchy (§9 design note on polymorphism).

mod builtin;
pub mod descriptor;
mod dispatch;
mod registry;

pub use descriptor::{EndpointDescriptor, Method};
pub use dispatch::{dispatch, DispatchContext, DispatchOutcome};
pub use registry::{EndpointRegistry, RegistryError};

use async_trait::async_trait;
use common::{Envelope, GatewayError};

/// What `prepare_payload` hands back: either the rewritten envelope ready to
/// go upstream, or a verbatim short-circuit body (§4.5 step 5: `{"status":
/// false, ...}` envelopes bypass the upstream call entirely).
pub enum PreparedPayload {
    ForUpstream(Envelope),
    ShortCircuit(Envelope),
}

#[async_trait]
pub trait Endpoint: Send + Sync {
    fn descriptor(&self) -> &EndpointDescriptor;

    /// The endpoint's own transformation (§4.5 step 5). Simple-proxy
    /// endpoints (`required_args` empty) should return the envelope
    /// unchanged.
    async fn prepare_payload(&self, envelope: Envelope) -> Result<PreparedPayload, GatewayError>;

    /// Builds the `{##TOKEN## -> value}` substitution table used when
    /// resolving the system prompt (§4.5 step 7c). Default: no
    /// substitutions.
    fn map_prompt(&self, _envelope: &Envelope) -> Vec<(String, String)> {
        Vec::new()
    }

    /// A literal system-prompt string that, if present, is used verbatim
    /// instead of the named template (`_prompt_str_force`).
    fn forced_prompt(&self, _envelope: &Envelope) -> Option<String> {
        None
    }

    /// Appended after template substitution, if non-empty
    /// (`_prompt_str_postfix`).
    fn prompt_postfix(&self, _envelope: &Envelope) -> String {
        String::new()
    }

    /// Required for `call_for_each_user_msg` endpoints: aggregates the
    /// per-message upstream responses into the final client body. Absence
    /// on a multi-shot endpoint is a `MisconfiguredEndpoint` (§4.5 step
    /// "Multi-shot mode").
    fn aggregate_responses(
        &self,
        _responses: Vec<serde_json::Value>,
        _contents: Vec<String>,
    ) -> Result<serde_json::Value, GatewayError> {
        Err(GatewayError::MisconfiguredEndpoint {
            reason: "call_for_each_user_msg endpoint has no aggregate_responses".to_string(),
        })
    }
}
