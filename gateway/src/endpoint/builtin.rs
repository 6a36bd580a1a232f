//! Concrete endpoints (§6, "Built-in endpoints" row of §2's component
//! table). Passthrough endpoints forward the client payload unchanged after
//! model resolution; composite endpoints inject a system prompt; the batch
//! endpoint fans out one upstream call per input item.

use super::descriptor::{EndpointDescriptor, Method};
use super::{Endpoint, PreparedPayload};
use async_trait::async_trait;
use common::{ApiType, Catalog, Envelope, GatewayError};
use std::collections::HashMap;
use std::sync::Arc;

const OPENAI_COMPATIBLE: &[ApiType] = &[ApiType::OpenAi, ApiType::Vllm, ApiType::Lmstudio];
const ALL_CHAT_TYPES: &[ApiType] = &[ApiType::OpenAi, ApiType::Vllm, ApiType::Ollama, ApiType::Lmstudio];

/// Simple-proxy endpoint (§4.5 "Simple-proxy mode"): `required_args` is
/// empty, `prepare_payload` is identity. Registered under every wire-format
/// alias path the client might use for the same operation.
struct PassthroughEndpoint {
    descriptor: EndpointDescriptor,
}

#[async_trait]
impl Endpoint for PassthroughEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    async fn prepare_payload(&self, envelope: Envelope) -> Result<PreparedPayload, GatewayError> {
        Ok(PreparedPayload::ForUpstream(envelope))
    }
}

fn passthrough(
    path: &'static str,
    method: Method,
    api_types: &'static [ApiType],
    dont_add_api_prefix: bool,
) -> Arc<dyn Endpoint> {
    Arc::new(PassthroughEndpoint {
        descriptor: EndpointDescriptor {
            path,
            method,
            api_types,
            required_args: &[],
            optional_args: &["stream", "temperature", "max_tokens", "max_new_tokens", "options"],
            system_prompt_name: None,
            direct_return: false,
            call_for_each_user_msg: false,
            dont_add_api_prefix,
        },
    })
}

/// A composite endpoint that injects a named system prompt (§4.5 steps 7,
/// resolved by the dispatcher) and copies one or more declared fields into
/// an OpenAI-shaped `messages` array before forwarding upstream.
struct SystemPromptEndpoint {
    descriptor: EndpointDescriptor,
    /// The envelope field holding the text that becomes the sole user
    /// message (e.g. `user_last_statement`, `text`).
    user_content_field: &'static str,
}

#[async_trait]
impl Endpoint for SystemPromptEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    async fn prepare_payload(&self, mut envelope: Envelope) -> Result<PreparedPayload, GatewayError> {
        let content = envelope
            .get_str(self.user_content_field)
            .unwrap_or_default()
            .to_string();

        envelope.insert(
            "messages",
            serde_json::json!([{"role": "user", "content": content}]),
        );

        if let Some(model_name) = envelope.get("model_name").cloned() {
            envelope.insert("model", model_name);
        }

        Ok(PreparedPayload::ForUpstream(envelope))
    }

    fn map_prompt(&self, envelope: &Envelope) -> Vec<(String, String)> {
        let mut map = Vec::new();
        if let Some(content) = envelope.get_str(self.user_content_field) {
            map.push(("##USER_TEXT##".to_string(), content.to_string()));
        }
        map
    }

    fn forced_prompt(&self, envelope: &Envelope) -> Option<String> {
        envelope
            .get_str("system_prompt")
            .filter(|_| self.descriptor.path == "/extended_conversation_with_model")
            .map(str::to_string)
    }
}

fn system_prompt_endpoint(
    path: &'static str,
    user_content_field: &'static str,
    prompt_id: &'static str,
) -> Arc<dyn Endpoint> {
    let mut prompts = HashMap::new();
    prompts.insert("en", prompt_id);
    prompts.insert("pl", prompt_id);

    Arc::new(SystemPromptEndpoint {
        descriptor: EndpointDescriptor {
            path,
            method: Method::Post,
            api_types: OPENAI_COMPATIBLE,
            required_args: &["model_name"],
            optional_args: &["language", "system_prompt"],
            system_prompt_name: Some(prompts),
            direct_return: false,
            call_for_each_user_msg: false,
            dont_add_api_prefix: false,
        },
        user_content_field,
    })
}

/// `/api/batch_file_summaries` (§8 scenario 5): one upstream call per file,
/// results aggregated in request order.
struct BatchFileSummaries {
    descriptor: EndpointDescriptor,
}

#[async_trait]
impl Endpoint for BatchFileSummaries {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    async fn prepare_payload(&self, envelope: Envelope) -> Result<PreparedPayload, GatewayError> {
        // The multi-shot fan-out itself happens in the dispatcher, driven by
        // `messages`'s user entries; this endpoint's job is only to map each
        // file's content into one user message per §4.5 multi-shot mode.
        let files = envelope.get("files").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let messages: Vec<serde_json::Value> = files
            .iter()
            .map(|file| {
                let content = file.get("content").and_then(|v| v.as_str()).unwrap_or_default();
                serde_json::json!({"role": "user", "content": content})
            })
            .collect();

        let mut envelope = envelope;
        envelope.insert("messages", serde_json::Value::Array(messages));
        envelope.insert("stream", serde_json::Value::Bool(false));
        Ok(PreparedPayload::ForUpstream(envelope))
    }

    fn aggregate_responses(
        &self,
        responses: Vec<serde_json::Value>,
        contents: Vec<String>,
    ) -> Result<serde_json::Value, GatewayError> {
        let summaries: Vec<serde_json::Value> = responses
            .iter()
            .zip(contents.iter())
            .enumerate()
            .map(|(i, (_response, content))| {
                serde_json::json!({
                    "name": format!("file_{i}"),
                    "summary": content,
                    "key_points": [],
                })
            })
            .collect();

        Ok(serde_json::json!({
            "response": summaries,
            "generation_time": 0.0,
        }))
    }
}

/// Routes outside the configurable prefix (`dont_add_api_prefix: true`):
/// wire-format aliases a client expects at a fixed, well-known path
/// regardless of how `PREFIX` is configured, plus health and model-listing
/// routes. Routes under the prefix get a path relative to it; the registry
/// composes `{prefix}{path}` for those at registration time.
pub fn all(catalog: Arc<Catalog>) -> Vec<Arc<dyn Endpoint>> {
    vec![
        health_endpoints(),
        model_list_endpoints(catalog),
        vec![
            passthrough("/chat/completions", Method::Post, ALL_CHAT_TYPES, true),
            passthrough("/v1/chat/completions", Method::Post, ALL_CHAT_TYPES, true),
            passthrough("/chat/completions", Method::Post, ALL_CHAT_TYPES, false),
            passthrough("/chat", Method::Post, ALL_CHAT_TYPES, false),
            passthrough("/v1/responses", Method::Post, OPENAI_COMPATIBLE, true),
            passthrough("/embeddings", Method::Post, ALL_CHAT_TYPES, false),
            passthrough("/v1/embeddings", Method::Post, ALL_CHAT_TYPES, true),
            passthrough("/embed", Method::Post, ALL_CHAT_TYPES, false),
        ],
        vec![
            system_prompt_endpoint(
                "/conversation_with_model",
                "user_last_statement",
                "conversation_with_model",
            ),
            system_prompt_endpoint(
                "/extended_conversation_with_model",
                "user_last_statement",
                "conversation_with_model",
            ),
            system_prompt_endpoint("/generative_answer", "question", "generative_answer"),
            system_prompt_endpoint("/generate_questions", "text", "generate_questions"),
            system_prompt_endpoint("/translate", "text", "translate"),
            system_prompt_endpoint("/simplify_text", "text", "simplify_text"),
            system_prompt_endpoint(
                "/generate_article_from_text",
                "text",
                "generate_article_from_text",
            ),
            system_prompt_endpoint(
                "/create_full_article_from_texts",
                "text",
                "create_full_article_from_texts",
            ),
        ],
        vec![Arc::new(BatchFileSummaries {
            descriptor: EndpointDescriptor {
                path: "/batch_file_summaries",
                method: Method::Post,
                api_types: OPENAI_COMPATIBLE,
                required_args: &["model_name", "files"],
                optional_args: &["language"],
                system_prompt_name: {
                    let mut m = HashMap::new();
                    m.insert("en", "batch_file_summaries");
                    m.insert("pl", "batch_file_summaries");
                    Some(m)
                },
                direct_return: false,
                call_for_each_user_msg: true,
                dont_add_api_prefix: false,
            },
        }) as Arc<dyn Endpoint>],
    ]
    .into_iter()
    .flatten()
    .collect()
}

struct HealthEndpoint {
    descriptor: EndpointDescriptor,
    body: &'static str,
}

#[async_trait]
impl Endpoint for HealthEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    async fn prepare_payload(&self, _envelope: Envelope) -> Result<PreparedPayload, GatewayError> {
        let mut out = Envelope::new();
        out.insert("status", serde_json::Value::Bool(true));
        out.insert("body", serde_json::Value::String(self.body.to_string()));
        Ok(PreparedPayload::ShortCircuit(out))
    }
}

fn health_endpoints() -> Vec<Arc<dyn Endpoint>> {
    vec![
        Arc::new(HealthEndpoint {
            descriptor: EndpointDescriptor {
                path: "/ping",
                method: Method::Get,
                api_types: &[ApiType::Builtin],
                required_args: &[],
                optional_args: &[],
                system_prompt_name: None,
                direct_return: true,
                call_for_each_user_msg: false,
                dont_add_api_prefix: true,
            },
            body: "pong",
        }),
        Arc::new(HealthEndpoint {
            descriptor: EndpointDescriptor {
                path: "/",
                method: Method::Get,
                api_types: &[ApiType::Builtin],
                required_args: &[],
                optional_args: &[],
                system_prompt_name: None,
                direct_return: true,
                call_for_each_user_msg: false,
                dont_add_api_prefix: true,
            },
            body: "Ollama is running",
        }),
    ]
}

/// Which wire convention a model-listing endpoint replies in: Ollama's
/// `GET /tags`, OpenAI's `GET /models`, or LM Studio's `POST /api/v0/models`
/// (§6). All three read the same active-model set from the catalog and
/// differ only in response shape.
enum ModelListKind {
    OllamaTags,
    OpenAiModels,
    LmStudioModels,
}

struct ModelListEndpoint {
    descriptor: EndpointDescriptor,
    catalog: Arc<Catalog>,
    kind: ModelListKind,
}

#[async_trait]
impl Endpoint for ModelListEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    async fn prepare_payload(&self, _envelope: Envelope) -> Result<PreparedPayload, GatewayError> {
        let names: Vec<&str> = self.catalog.active_model_names().collect();
        let body = match self.kind {
            ModelListKind::OllamaTags => serde_json::json!({
                "models": names.iter().map(|name| serde_json::json!({
                    "name": name,
                    "model": name,
                })).collect::<Vec<_>>(),
            }),
            ModelListKind::OpenAiModels => serde_json::json!({
                "object": "list",
                "data": names.iter().map(|name| serde_json::json!({
                    "id": name,
                    "object": "model",
                })).collect::<Vec<_>>(),
            }),
            ModelListKind::LmStudioModels => serde_json::json!({
                "data": names.iter().map(|name| serde_json::json!({
                    "id": name,
                    "object": "model",
                })).collect::<Vec<_>>(),
            }),
        };

        let mut out = Envelope::new();
        out.insert("status", serde_json::Value::Bool(true));
        out.insert("body", body);
        Ok(PreparedPayload::ShortCircuit(out))
    }
}

fn model_list_endpoints(catalog: Arc<Catalog>) -> Vec<Arc<dyn Endpoint>> {
    vec![
        Arc::new(ModelListEndpoint {
            descriptor: EndpointDescriptor {
                path: "/tags",
                method: Method::Get,
                api_types: &[ApiType::Builtin],
                required_args: &[],
                optional_args: &[],
                system_prompt_name: None,
                direct_return: true,
                call_for_each_user_msg: false,
                dont_add_api_prefix: true,
            },
            catalog: Arc::clone(&catalog),
            kind: ModelListKind::OllamaTags,
        }) as Arc<dyn Endpoint>,
        Arc::new(ModelListEndpoint {
            descriptor: EndpointDescriptor {
                path: "/models",
                method: Method::Get,
                api_types: &[ApiType::Builtin],
                required_args: &[],
                optional_args: &[],
                system_prompt_name: None,
                direct_return: true,
                call_for_each_user_msg: false,
                dont_add_api_prefix: true,
            },
            catalog: Arc::clone(&catalog),
            kind: ModelListKind::OpenAiModels,
        }) as Arc<dyn Endpoint>,
        Arc::new(ModelListEndpoint {
            descriptor: EndpointDescriptor {
                path: "/api/v0/models",
                method: Method::Post,
                api_types: &[ApiType::Builtin],
                required_args: &[],
                optional_args: &[],
                system_prompt_name: None,
                direct_return: true,
                call_for_each_user_msg: false,
                dont_add_api_prefix: true,
            },
            catalog,
            kind: ModelListKind::LmStudioModels,
        }) as Arc<dyn Endpoint>,
    ]
}
