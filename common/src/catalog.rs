//! The model/provider catalog (§3, §4.1): a loaded, queryable view of which
//! models are active and which concrete upstream providers serve each. Loading
//! is a pure function of the input bytes (§8 round-trip law) — no I/O happens
//! anywhere except the single `fs::read` the caller performs before calling
//! [`Catalog::load_from_str`].

use crate::api_types::ApiType;
use crate::duration::parse_duration_secs;
use crate::errors::GatewayError;
use serde::Deserialize;
use std::collections::HashMap;

/// One concrete upstream, as described in §3.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSpec {
    pub id: String,
    pub api_host: String,
    #[serde(default)]
    pub api_token: Option<String>,
    pub api_type: String,
    #[serde(default)]
    pub model_path: String,
    #[serde(deserialize_with = "deserialize_input_size")]
    pub input_size: u64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub keep_alive: Option<String>,
    #[serde(default)]
    pub tool_calling: bool,
}

fn default_weight() -> f64 {
    1.0
}

/// `input_size` may arrive as a JSON integer or as a numeric string; anything
/// else is a fatal catalog error (§4.1).
fn deserialize_input_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(u64),
        Str(String),
    }
    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(n) => Ok(n),
        IntOrString::Str(s) => s
            .parse()
            .map_err(|_| D::Error::custom(format!("input_size '{s}' is not numeric"))),
    }
}

impl ProviderSpec {
    pub fn api_type(&self) -> Result<ApiType, GatewayError> {
        self.api_type.parse()
    }

    /// Seconds between keep-alive pings, or `None` if this provider doesn't
    /// opt in to keep-alive.
    pub fn keep_alive_seconds(&self) -> Result<Option<u64>, GatewayError> {
        match &self.keep_alive {
            None => Ok(None),
            Some(raw) => parse_duration_secs(raw)
                .map(Some)
                .map_err(|e| GatewayError::BadCatalog {
                    reason: format!("invalid keep_alive '{raw}' on provider '{}': {e}", self.id),
                }),
        }
    }

    /// The `host:port` component of `api_host`, used as the coarser "physical
    /// box" coordination key by `first_available_optim` (§3).
    pub fn host(&self) -> String {
        host_of(&self.api_host)
    }
}

pub fn host_of(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    without_scheme
        .split(['/', '?'])
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ModelEntry {
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
    #[serde(default)]
    pub providers_sleep: Vec<ProviderSpec>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(flatten)]
    groups: HashMap<String, HashMap<String, ModelEntry>>,
}

/// `{active-model-name -> {providers[], providers_sleep[]}}` plus the set of
/// group names that were mentioned in `active_models`.
#[derive(Debug, Default)]
pub struct Catalog {
    models: HashMap<String, ModelEntry>,
}

impl Catalog {
    pub fn load_from_str(contents: &str) -> Result<Self, GatewayError> {
        let raw: serde_json::Value =
            serde_json::from_str(contents).map_err(|e| GatewayError::BadCatalog {
                reason: format!("catalog is not valid JSON: {e}"),
            })?;

        let active_models = raw
            .get("active_models")
            .and_then(|v| v.as_object())
            .ok_or_else(|| GatewayError::BadCatalog {
                reason: "missing mandatory top-level 'active_models' object".to_string(),
            })?;

        let mut models = HashMap::new();
        let mut seen_provider_ids: HashMap<&str, u32> = HashMap::new();

        for (group_name, group_active) in active_models {
            let group_active = group_active.as_object().ok_or_else(|| GatewayError::BadCatalog {
                reason: format!("active_models.{group_name} must be an object of model names"),
            })?;

            let group = raw
                .get(group_name)
                .and_then(|v| v.as_object())
                .ok_or_else(|| GatewayError::BadCatalog {
                    reason: format!(
                        "active_models references group '{group_name}' which has no entries"
                    ),
                })?;

            for model_name in group_active.keys() {
                let entry_value = group.get(model_name).ok_or_else(|| GatewayError::BadCatalog {
                    reason: format!(
                        "active model '{model_name}' is absent from group '{group_name}'"
                    ),
                })?;

                let entry: ModelEntry = serde_json::from_value(entry_value.clone()).map_err(|e| {
                    GatewayError::BadCatalog {
                        reason: format!("model '{model_name}': {e}"),
                    }
                })?;

                for provider in entry.providers.iter().chain(entry.providers_sleep.iter()) {
                    *seen_provider_ids.entry(provider.id.as_str()).or_insert(0) += 1;
                }

                models.insert(model_name.clone(), entry);
            }
        }

        for (id, count) in seen_provider_ids {
            if count > 1 {
                log::warn!("provider id '{id}' is duplicated across the catalog; (model, id) pairs remain unique");
            }
        }

        Ok(Catalog { models })
    }

    pub fn model(&self, name: &str) -> Option<&ModelEntry> {
        self.models.get(name)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn active_model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelEntry)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every provider registered for `keep_alive`, paired with its model name.
    pub fn keep_alive_providers(&self) -> Vec<(&str, &ProviderSpec)> {
        self.models
            .iter()
            .flat_map(|(model_name, entry)| {
                entry
                    .providers
                    .iter()
                    .filter(|p| p.keep_alive.is_some())
                    .map(move |p| (model_name.as_str(), p))
            })
            .collect()
    }

    /// Find the provider for `model` whose host matches `host`, preferring the
    /// `providers` list over `providers_sleep` (§4.7 step 3).
    pub fn find_provider_on_host(&self, model: &str, host: &str) -> Option<&ProviderSpec> {
        let entry = self.models.get(model)?;
        entry
            .providers
            .iter()
            .chain(entry.providers_sleep.iter())
            .find(|p| p.host() == host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "active_models": { "chat": { "m": {} } },
        "chat": {
            "m": {
                "providers": [
                    {"id": "a", "api_host": "http://h1:7000/", "api_type": "vllm", "input_size": "4096"},
                    {"id": "b", "api_host": "http://h2:7000/", "api_type": "openai", "input_size": 4096, "weight": 3.0}
                ]
            }
        }
    }"#;

    #[test]
    fn loads_active_model_with_providers() {
        let catalog = Catalog::load_from_str(SAMPLE).unwrap();
        assert!(catalog.is_active("m"));
        let entry = catalog.model("m").unwrap();
        assert_eq!(entry.providers.len(), 2);
        assert_eq!(entry.providers[0].input_size, 4096);
        assert_eq!(entry.providers[1].weight, 3.0);
    }

    #[test]
    fn missing_active_models_is_fatal() {
        let err = Catalog::load_from_str(r#"{"chat": {}}"#).unwrap_err();
        assert!(matches!(err, GatewayError::BadCatalog { .. }));
    }

    #[test]
    fn active_model_absent_from_group_is_fatal() {
        let bad = r#"{"active_models": {"chat": {"missing": {}}}, "chat": {}}"#;
        let err = Catalog::load_from_str(bad).unwrap_err();
        assert!(matches!(err, GatewayError::BadCatalog { .. }));
    }

    #[test]
    fn groups_outside_active_models_are_ignored() {
        let input = r#"{
            "active_models": {"chat": {"m": {}}},
            "chat": {"m": {"providers": []}},
            "embeddings": {"e": {"providers": []}}
        }"#;
        let catalog = Catalog::load_from_str(input).unwrap();
        assert!(catalog.is_active("m"));
        assert!(!catalog.is_active("e"));
    }

    #[test]
    fn non_numeric_input_size_is_fatal() {
        let bad = r#"{
            "active_models": {"chat": {"m": {}}},
            "chat": {"m": {"providers": [{"id":"a","api_host":"http://h","api_type":"openai","input_size":"lots"}]}}
        }"#;
        assert!(Catalog::load_from_str(bad).is_err());
    }

    #[test]
    fn empty_providers_loads_but_has_nothing_to_select() {
        let input = r#"{"active_models": {"chat": {"m": {}}}, "chat": {"m": {"providers": []}}}"#;
        let catalog = Catalog::load_from_str(input).unwrap();
        assert!(catalog.model("m").unwrap().providers.is_empty());
    }

    #[test]
    fn host_of_strips_scheme_and_path() {
        assert_eq!(host_of("http://h1:7000/v1"), "h1:7000");
        assert_eq!(host_of("https://h2/"), "h2");
    }
}
