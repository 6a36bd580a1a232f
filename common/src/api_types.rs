//! The API-type dispatcher (§4.2): the single place that knows which URL path
//! and HTTP method a given upstream wire dialect expects for chat, completions
//! and embeddings. Adding a new upstream dialect means adding one match arm
//! here, nowhere else.

use crate::errors::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    OpenAi,
    Vllm,
    Ollama,
    Lmstudio,
    Builtin,
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApiType::OpenAi => "openai",
            ApiType::Vllm => "vllm",
            ApiType::Ollama => "ollama",
            ApiType::Lmstudio => "lmstudio",
            ApiType::Builtin => "builtin",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ApiType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(ApiType::OpenAi),
            "vllm" => Ok(ApiType::Vllm),
            "ollama" => Ok(ApiType::Ollama),
            "lmstudio" => Ok(ApiType::Lmstudio),
            "builtin" => Ok(ApiType::Builtin),
            other => Err(GatewayError::UnknownApiType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Chat,
    Completions,
    Embeddings,
}

/// The four upstream-facing operation/path pairs this api_type supports.
/// `builtin` has none: it's served entirely by local post-processing.
pub struct ApiTypeRoutes {
    pub chat_path: &'static str,
    pub chat_method: HttpMethod,
    pub completions_path: &'static str,
    pub completions_method: HttpMethod,
    pub embeddings_path: &'static str,
    pub embeddings_method: HttpMethod,
}

impl ApiType {
    /// Returns `None` for `Builtin`, which never dials out.
    pub fn routes(&self) -> Option<ApiTypeRoutes> {
        match self {
            ApiType::OpenAi | ApiType::Vllm => Some(ApiTypeRoutes {
                chat_path: "/v1/chat/completions",
                chat_method: HttpMethod::Post,
                completions_path: "/v1/completions",
                completions_method: HttpMethod::Post,
                embeddings_path: "/v1/embeddings",
                embeddings_method: HttpMethod::Post,
            }),
            ApiType::Ollama => Some(ApiTypeRoutes {
                chat_path: "/api/chat",
                chat_method: HttpMethod::Post,
                completions_path: "/api/generate",
                completions_method: HttpMethod::Post,
                embeddings_path: "/api/embed",
                embeddings_method: HttpMethod::Post,
            }),
            ApiType::Lmstudio => Some(ApiTypeRoutes {
                chat_path: "/api/v0/chat/completions",
                chat_method: HttpMethod::Post,
                completions_path: "/api/v0/completions",
                completions_method: HttpMethod::Post,
                embeddings_path: "/api/v0/embeddings",
                embeddings_method: HttpMethod::Post,
            }),
            ApiType::Builtin => None,
        }
    }

    pub fn path_for(&self, op: Operation) -> Option<(&'static str, HttpMethod)> {
        let routes = self.routes()?;
        Some(match op {
            Operation::Chat => (routes.chat_path, routes.chat_method),
            Operation::Completions => (routes.completions_path, routes.completions_method),
            Operation::Embeddings => (routes.embeddings_path, routes.embeddings_method),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn known_tags_resolve() {
        assert_eq!(ApiType::from_str("ollama").unwrap(), ApiType::Ollama);
        assert_eq!(
            ApiType::Ollama.path_for(Operation::Chat),
            Some(("/api/chat", HttpMethod::Post))
        );
        assert_eq!(
            ApiType::OpenAi.path_for(Operation::Embeddings),
            Some(("/v1/embeddings", HttpMethod::Post))
        );
    }

    #[test]
    fn unknown_tag_is_an_error() {
        assert!(ApiType::from_str("carrier-pigeon").is_err());
    }

    #[test]
    fn builtin_has_no_routes() {
        assert!(ApiType::Builtin.routes().is_none());
    }
}
