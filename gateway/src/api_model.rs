//! `ApiModel` (§3): the resolved, per-request view handed to the HTTP layer
//! once a provider has been chosen — the provider spec, any request-level
//! overrides, and the upstream path/method for the operation being served.

use common::{GatewayError, HttpMethod, Operation, ProviderSpec};

#[derive(Debug, Clone)]
pub struct ApiModel {
    pub provider: ProviderSpec,
    pub operation: Operation,
    pub upstream_url: String,
    pub upstream_method: HttpMethod,
    /// `model_path` from the provider, or the request's own `model` value if
    /// the provider leaves it empty (upstream infers).
    pub model_field: String,
}

impl ApiModel {
    pub fn resolve(
        provider: ProviderSpec,
        operation: Operation,
        requested_model: &str,
    ) -> Result<Self, GatewayError> {
        let (upstream_url, upstream_method) = crate::relay::upstream_url(&provider, operation)?;
        let model_field = if provider.model_path.is_empty() {
            requested_model.to_string()
        } else {
            provider.model_path.clone()
        };

        Ok(Self {
            provider,
            operation,
            upstream_url,
            upstream_method,
            model_field,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderSpec {
        serde_json::from_value(serde_json::json!({
            "id": "a", "api_host": "http://h:7000", "api_type": "vllm", "input_size": 4096
        }))
        .unwrap()
    }

    #[test]
    fn empty_model_path_falls_back_to_requested_model() {
        let resolved = ApiModel::resolve(provider(), Operation::Chat, "gpt-x").unwrap();
        assert_eq!(resolved.model_field, "gpt-x");
    }

    #[test]
    fn nonempty_model_path_wins() {
        let mut p = provider();
        p.model_path = "internal-name".to_string();
        let resolved = ApiModel::resolve(p, Operation::Chat, "gpt-x").unwrap();
        assert_eq!(resolved.model_field, "internal-name");
    }
}
