use super::{Endpoint, Method};
use common::Catalog;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("endpoint descriptor invalid: {0}")]
    InvalidDescriptor(String),
    #[error("duplicate route for {0:?} {1}")]
    DuplicateRoute(Method, String),
}

/// Discovers and holds all concrete endpoints (§"Endpoint auto-registration"),
/// keyed by `(method, path)`.
#[derive(Default)]
pub struct EndpointRegistry {
    routes: HashMap<(Method, String), Arc<dyn Endpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `endpoint` under `prefix` composed with its descriptor's
    /// path, unless the descriptor opts out via `dont_add_api_prefix` (the
    /// fixed wire-format aliases and health routes, which are never under
    /// the configurable prefix).
    pub fn register(&mut self, endpoint: Arc<dyn Endpoint>, prefix: &str) -> Result<(), RegistryError> {
        let descriptor = endpoint.descriptor();
        descriptor
            .validate()
            .map_err(RegistryError::InvalidDescriptor)?;

        let path = if descriptor.dont_add_api_prefix {
            descriptor.path.to_string()
        } else {
            format!("{prefix}{}", descriptor.path)
        };

        let key = (descriptor.method, path);
        if self.routes.contains_key(&key) {
            return Err(RegistryError::DuplicateRoute(key.0, key.1));
        }
        self.routes.insert(key, endpoint);
        Ok(())
    }

    pub fn find(&self, method: Method, path: &str) -> Option<Arc<dyn Endpoint>> {
        self.routes.get(&(method, path.to_string())).cloned()
    }

    /// Builds the registry with every concrete endpoint from
    /// [`super::builtin`] registered, composing each endpoint's route with
    /// `prefix` (the configurable `PREFIX`/`LLM_ROUTER_PREFIX` value).
    /// Called once at startup.
    pub fn with_builtin_endpoints(catalog: Arc<Catalog>, prefix: &str) -> Self {
        let mut registry = Self::new();
        for endpoint in super::builtin::all(catalog) {
            registry
                .register(endpoint, prefix)
                .expect("builtin endpoint descriptors must be valid and non-conflicting");
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_catalog() -> Arc<Catalog> {
        Arc::new(Catalog::load_from_str(r#"{"active_models": {}}"#).unwrap())
    }

    #[test]
    fn builtin_endpoints_register_without_conflicts() {
        let registry = EndpointRegistry::with_builtin_endpoints(empty_catalog(), "/api");
        assert!(registry.find(Method::Post, "/chat/completions").is_some());
        assert!(registry.find(Method::Get, "/ping").is_some());
    }

    #[test]
    fn prefix_is_composed_for_non_opted_out_routes() {
        let registry = EndpointRegistry::with_builtin_endpoints(empty_catalog(), "/api");
        assert!(registry.find(Method::Post, "/api/translate").is_some());
        assert!(registry.find(Method::Post, "/translate").is_none());
    }

    #[test]
    fn custom_prefix_moves_the_composed_routes() {
        let registry = EndpointRegistry::with_builtin_endpoints(empty_catalog(), "/custom");
        assert!(registry.find(Method::Post, "/custom/translate").is_some());
        // Fixed aliases never move: they opted out of prefixing entirely.
        assert!(registry.find(Method::Post, "/chat/completions").is_some());
        assert!(registry.find(Method::Get, "/tags").is_some());
    }
}
