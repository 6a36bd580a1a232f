//! The generic dispatcher (§4.5): one function drives every concrete
//! endpoint through the same 14-step request lifecycle. Endpoints only ever
//! supply the pieces named in [`super::Endpoint`]; everything else — masking,
//! guardrails, provider selection, the upstream call, metrics, lock release —
//! lives here exactly once.

use super::{Endpoint, PreparedPayload};
use crate::hooks::{run_guardrails, run_maskers, Auditor, Guardrail, GuardrailVerdict, Masker};
use crate::keepalive;
use crate::metrics::Metrics;
use crate::prompt_repo::PromptRepository;
use crate::relay;
use crate::store::CoordinationStore;
use crate::strategy::Strategy;
use bytes::Bytes;
use common::{Catalog, Envelope, GatewayError, Operation};
use http_body_util::combinators::BoxBody;
use hyper::Response;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Everything the dispatcher needs that isn't specific to one request;
/// built once at startup and shared behind an `Arc` (§4.8 `AppState`).
pub struct DispatchContext {
    pub catalog: Arc<Catalog>,
    pub strategy: Arc<dyn Strategy>,
    pub maskers: Vec<Box<dyn Masker>>,
    pub guardrails: Vec<Box<dyn Guardrail>>,
    pub auditor: Arc<dyn Auditor>,
    pub prompts: Arc<dyn PromptRepository>,
    pub metrics: Arc<Metrics>,
    pub http_client: reqwest::Client,
    pub default_language: String,
    pub external_timeout: Duration,
    pub masking_enabled: bool,
    pub guardrail_enabled: bool,
    /// Present only when the configured strategy needs cross-process
    /// coordination; used to register keep-alive-eligible providers the
    /// first time a request acquires them (§4.7 step 5).
    pub store: Option<Arc<dyn CoordinationStore>>,
    /// `(model, provider_id)` pairs already registered with the keep-alive
    /// monitor this process, so `record_usage` runs once per pair rather
    /// than on every request.
    registered_keepalive: Mutex<HashSet<(String, String)>>,
}

impl DispatchContext {
    pub fn new(
        catalog: Arc<Catalog>,
        strategy: Arc<dyn Strategy>,
        maskers: Vec<Box<dyn Masker>>,
        guardrails: Vec<Box<dyn Guardrail>>,
        auditor: Arc<dyn Auditor>,
        prompts: Arc<dyn PromptRepository>,
        metrics: Arc<Metrics>,
        http_client: reqwest::Client,
        default_language: String,
        external_timeout: Duration,
        masking_enabled: bool,
        guardrail_enabled: bool,
        store: Option<Arc<dyn CoordinationStore>>,
    ) -> Self {
        Self {
            catalog,
            strategy,
            maskers,
            guardrails,
            auditor,
            prompts,
            metrics,
            http_client,
            default_language,
            external_timeout,
            masking_enabled,
            guardrail_enabled,
            store,
            registered_keepalive: Mutex::new(HashSet::new()),
        }
    }
}

pub enum DispatchOutcome {
    Json(serde_json::Value),
    Stream(Response<BoxBody<Bytes, hyper::Error>>),
}

/// Runs the full lifecycle for one request against one resolved endpoint,
/// recording request metrics on every exit path (§4.10).
pub async fn dispatch(
    ctx: &DispatchContext,
    endpoint: &dyn Endpoint,
    endpoint_path: &str,
    envelope: Envelope,
) -> Result<DispatchOutcome, GatewayError> {
    let started = Instant::now();
    let result = run(ctx, endpoint, envelope).await;

    let status = match &result {
        Ok(_) => 200,
        Err(err) => err.status_code(),
    };
    ctx.metrics.record_request(endpoint_path, status, started.elapsed());
    result
}

async fn run(
    ctx: &DispatchContext,
    endpoint: &dyn Endpoint,
    envelope: Envelope,
) -> Result<DispatchOutcome, GatewayError> {
    let descriptor = endpoint.descriptor();

    // 2. Validate.
    if let Some(missing) = envelope.missing_required(descriptor.required_args) {
        return Err(GatewayError::MissingParam { name: missing });
    }

    // 3. Masking pre-hook.
    let mask_requested = envelope.get_bool("mask_payload").unwrap_or(false);
    let envelope = if ctx.masking_enabled || mask_requested {
        run_maskers(&ctx.maskers, ctx.auditor.as_ref(), envelope).await
    } else {
        envelope
    };

    // 4. Guardrail request hook.
    if ctx.guardrail_enabled {
        if let GuardrailVerdict::Block { reason } =
            run_guardrails(&ctx.guardrails, ctx.auditor.as_ref(), &envelope).await
        {
            return Err(GatewayError::GuardrailBlocked { reason });
        }
    }

    // 5. prepare_payload.
    let prepared = endpoint.prepare_payload(envelope).await?;
    let mut envelope = match prepared {
        PreparedPayload::ShortCircuit(body) => return Ok(DispatchOutcome::Json(body.into_value())),
        PreparedPayload::ForUpstream(body) => body,
    };

    // 6. direct_return path.
    if descriptor.direct_return {
        return Ok(DispatchOutcome::Json(serde_json::json!({
            "status": true,
            "body": envelope.into_value(),
        })));
    }

    // 7. System prompt resolution.
    apply_system_prompt(ctx, endpoint, &mut envelope).await?;

    // _set_model (simple-proxy mode, §4.5): the model name is read from
    // either key regardless of which one the endpoint's REQUIRED_ARGS named.
    let requested_model = envelope
        .get_str("model")
        .or_else(|| envelope.get_str("model_name"))
        .ok_or(GatewayError::MissingParam {
            name: "model".to_string(),
        })?
        .to_string();

    // 8. Provider selection.
    let model_entry = ctx
        .catalog
        .model(&requested_model)
        .ok_or_else(|| GatewayError::NoProviderAvailable {
            model: requested_model.clone(),
        })?;
    let selection = ctx.strategy.choose(&requested_model, &model_entry.providers).await?;
    ctx.metrics
        .record_selection(ctx.strategy.name(), &requested_model, &selection.provider.id);
    register_keepalive_if_needed(ctx, &requested_model, &selection.provider).await;

    // From here on every exit path must release the lease (step 14). For a
    // streaming response the body is still being forwarded by a detached
    // task after this function returns, so `serve` hands the lease to that
    // task instead of releasing it here; every other path releases before
    // returning. `LeaseGuard` also covers the case where this whole future
    // is cancelled out from under us (the request-level deadline in
    // `main.rs`): its `Drop` spawns the release if nothing released first.
    let lease = crate::strategy::LeaseGuard::new(selection.lease);
    serve(
        ctx,
        endpoint,
        descriptor,
        &mut envelope,
        &requested_model,
        &selection.provider,
        lease,
    )
    .await
}

/// Registers a provider with the keep-alive monitor the first time a
/// request in this process acquires it (§4.7 step 5). A no-op when the
/// provider opted out of keep-alive or no coordination store is configured.
async fn register_keepalive_if_needed(ctx: &DispatchContext, model: &str, provider: &common::ProviderSpec) {
    let Some(store) = &ctx.store else { return };
    let Ok(Some(keep_alive_seconds)) = provider.keep_alive_seconds() else {
        return;
    };

    let key = (model.to_string(), provider.id.clone());
    {
        let mut seen = ctx.registered_keepalive.lock().unwrap();
        if !seen.insert(key) {
            return;
        }
    }

    if let Err(err) = keepalive::record_usage(store.as_ref(), model, &provider.host(), keep_alive_seconds).await {
        tracing::warn!(model, provider = %provider.id, "failed to register keep-alive usage: {err}");
    }
}

async fn serve(
    ctx: &DispatchContext,
    endpoint: &dyn Endpoint,
    descriptor: &super::EndpointDescriptor,
    envelope: &mut Envelope,
    requested_model: &str,
    provider: &common::ProviderSpec,
    mut lease: crate::strategy::LeaseGuard,
) -> Result<DispatchOutcome, GatewayError> {
    // 9. Api-type check.
    let provider_api_type = match provider.api_type() {
        Ok(api_type) => api_type,
        Err(err) => {
            lease.release().await;
            return Err(err);
        }
    };
    if !descriptor.accepts_api_type(provider_api_type) {
        lease.release().await;
        return Err(GatewayError::ApiTypeMismatch {
            api_type: provider.api_type.clone(),
        });
    }

    let operation = infer_operation(descriptor.path);

    if descriptor.call_for_each_user_msg {
        let outcome = serve_multi_shot(ctx, endpoint, envelope, requested_model, provider, operation).await;
        lease.release().await;
        return outcome;
    }

    serve_single_shot(ctx, envelope, requested_model, provider, operation, lease).await
}

async fn serve_single_shot(
    ctx: &DispatchContext,
    envelope: &mut Envelope,
    requested_model: &str,
    provider: &common::ProviderSpec,
    operation: Operation,
    mut lease: crate::strategy::LeaseGuard,
) -> Result<DispatchOutcome, GatewayError> {
    let api_model = match crate::api_model::ApiModel::resolve(provider.clone(), operation, requested_model) {
        Ok(api_model) => api_model,
        Err(err) => {
            lease.release().await;
            return Err(err);
        }
    };
    envelope.insert("model", serde_json::Value::String(api_model.model_field.clone()));

    let body = envelope.to_bytes();
    let streaming = envelope.get_bool("stream").unwrap_or(false);

    if streaming {
        // 11. Upstream call (streaming path). Guardrail response hook (12) is
        // skipped for streaming per §4.5/§4.6. The lease outlives this
        // function: the client is still receiving bytes from the spawned
        // forwarding task after we return, so `call_streaming` releases it
        // once that task finishes instead of us releasing it here.
        let response = relay::call_streaming(
            &ctx.http_client,
            &api_model.provider,
            api_model.upstream_method,
            &api_model.upstream_url,
            &body,
            ctx.external_timeout,
            lease,
        )
        .await?;
        return Ok(DispatchOutcome::Stream(response));
    }

    // 11. Upstream call (buffered path).
    let result = relay::call_buffered(
        &ctx.http_client,
        &api_model.provider,
        api_model.upstream_method,
        &api_model.upstream_url,
        &body,
        ctx.external_timeout,
    )
    .await;
    lease.release().await;
    let (status, response_value) = result?;

    // An auth failure relayed from upstream is reported to the client as
    // such, not silently wrapped as a 200 (§5).
    match status {
        401 => return Err(GatewayError::AuthRequired),
        403 => return Err(GatewayError::Forbidden),
        _ => {}
    }

    // 12. Guardrail response hook (non-streaming only).
    let response_value = apply_response_guardrail(ctx, response_value).await?;

    // 13. Respond.
    Ok(DispatchOutcome::Json(serde_json::json!({
        "status": true,
        "body": response_value,
    })))
}

async fn serve_multi_shot(
    ctx: &DispatchContext,
    endpoint: &dyn Endpoint,
    envelope: &mut Envelope,
    requested_model: &str,
    provider: &common::ProviderSpec,
    operation: Operation,
) -> Result<DispatchOutcome, GatewayError> {
    if envelope.get_bool("stream").unwrap_or(false) {
        tracing::info!("stream=true coerced to false for a call_for_each_user_msg endpoint");
        envelope.insert("stream", serde_json::Value::Bool(false));
    }

    let messages = envelope
        .get("messages")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let system_message = messages.iter().find(|m| m.get("role").and_then(|r| r.as_str()) == Some("system")).cloned();
    let user_messages: Vec<serde_json::Value> = messages
        .into_iter()
        .filter(|m| m.get("role").and_then(|r| r.as_str()) == Some("user"))
        .collect();

    if user_messages.is_empty() {
        return Err(GatewayError::ValidationError {
            field: "messages".to_string(),
            reason: "call_for_each_user_msg endpoint requires at least one user message".to_string(),
        });
    }

    let api_model = crate::api_model::ApiModel::resolve(provider.clone(), operation, requested_model)?;

    let mut responses = Vec::with_capacity(user_messages.len());
    let mut contents = Vec::with_capacity(user_messages.len());

    for user_message in &user_messages {
        let mut sub_envelope = envelope.clone();
        let mut sub_messages = Vec::with_capacity(2);
        if let Some(system) = &system_message {
            sub_messages.push(system.clone());
        }
        sub_messages.push(user_message.clone());
        sub_envelope.insert("messages", serde_json::Value::Array(sub_messages));
        sub_envelope.insert("model", serde_json::Value::String(api_model.model_field.clone()));

        let body = sub_envelope.to_bytes();
        let (status, response_value) = relay::call_buffered(
            &ctx.http_client,
            &api_model.provider,
            api_model.upstream_method,
            &api_model.upstream_url,
            &body,
            ctx.external_timeout,
        )
        .await?;

        match status {
            401 => return Err(GatewayError::AuthRequired),
            403 => return Err(GatewayError::Forbidden),
            _ => {}
        }

        contents.push(extract_assistant_content(&response_value));
        responses.push(response_value);
    }

    let aggregated = endpoint.aggregate_responses(responses, contents)?;
    Ok(DispatchOutcome::Json(serde_json::json!({
        "status": true,
        "body": aggregated,
    })))
}

async fn apply_system_prompt(
    ctx: &DispatchContext,
    endpoint: &dyn Endpoint,
    envelope: &mut Envelope,
) -> Result<(), GatewayError> {
    let descriptor = endpoint.descriptor();
    let Some(prompt_map) = &descriptor.system_prompt_name else {
        return Ok(());
    };

    if let Some(forced) = endpoint.forced_prompt(envelope) {
        envelope.prepend_system_message(forced);
        return Ok(());
    }

    let language = envelope
        .get_str("language")
        .unwrap_or(&ctx.default_language)
        .to_string();

    let prompt_id = prompt_map
        .get(language.as_str())
        .copied()
        .or_else(|| prompt_map.get(ctx.default_language.as_str()).copied())
        .or_else(|| prompt_map.values().next().copied())
        .ok_or_else(|| GatewayError::MisconfiguredEndpoint {
            reason: format!("endpoint '{}' declares no prompt for any language", descriptor.path),
        })?;

    let template = ctx
        .prompts
        .get(prompt_id, &language)
        .await
        .map_err(|err| GatewayError::Internal(err.to_string()))?;

    let map_prompt = endpoint.map_prompt(envelope);
    let mut rendered = common::envelope::substitute_placeholders(&template, &map_prompt);
    let postfix = endpoint.prompt_postfix(envelope);
    if !postfix.is_empty() {
        rendered.push_str(&postfix);
    }

    envelope.prepend_system_message(rendered);
    Ok(())
}

async fn apply_response_guardrail(
    ctx: &DispatchContext,
    response_value: serde_json::Value,
) -> Result<serde_json::Value, GatewayError> {
    if !ctx.guardrail_enabled {
        return Ok(response_value);
    }

    let wrapped = match &response_value {
        serde_json::Value::Object(map) => Envelope::from(map.clone()),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other.clone());
            Envelope::from(map)
        }
    };

    if let GuardrailVerdict::Block { reason } =
        run_guardrails(&ctx.guardrails, ctx.auditor.as_ref(), &wrapped).await
    {
        return Err(GatewayError::GuardrailBlocked { reason });
    }

    Ok(response_value)
}

/// Chat/completions endpoints all resolve to `Operation::Chat`; anything
/// whose path mentions `embed` resolves to `Operation::Embeddings`. The
/// gateway has no endpoint that targets the legacy `completions` route.
fn infer_operation(path: &str) -> Operation {
    if path.contains("embed") {
        Operation::Embeddings
    } else {
        Operation::Chat
    }
}

/// Best-effort extraction of the assistant's text from an upstream response,
/// for `aggregate_responses`' `contents[]` argument. Understands the
/// OpenAI/vLLM `choices[0].message.content` shape and the Ollama
/// `message.content` shape; falls back to an empty string.
fn extract_assistant_content(response: &serde_json::Value) -> String {
    response
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .or_else(|| {
            response
                .get("message")
                .and_then(|message| message.get("content"))
                .and_then(|content| content.as_str())
        })
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_embeddings_from_path() {
        assert!(matches!(infer_operation("/api/embed"), Operation::Embeddings));
        assert!(matches!(infer_operation("/v1/chat/completions"), Operation::Chat));
    }

    #[test]
    fn extracts_openai_shaped_content() {
        let value = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
        });
        assert_eq!(extract_assistant_content(&value), "hi there");
    }

    #[test]
    fn extracts_ollama_shaped_content() {
        let value = serde_json::json!({"message": {"content": "hi there"}});
        assert_eq!(extract_assistant_content(&value), "hi there");
    }

    #[test]
    fn missing_content_falls_back_to_empty_string() {
        assert_eq!(extract_assistant_content(&serde_json::json!({})), "");
    }
}
