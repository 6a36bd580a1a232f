use bytes::Bytes;
use gateway::config::AppConfig;
use gateway::endpoint::{self, DispatchOutcome, Method};
use gateway::hooks::{Auditor, Guardrail, Masker};
use gateway::{build_app_state, connect_store_if_needed, default_auditor, load_catalog, keepalive, AppState};
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use opentelemetry::trace::FutureExt;
use opentelemetry::{global, Context};
use opentelemetry_http::HeaderExtractor;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Instrument};

const REQUEST_ID_HEADER: &str = "x-request-id";

fn extract_context_from_request(req: &Request<Incoming>) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(req.headers())))
}

fn request_id(req: &Request<Incoming>) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn json_body(value: serde_json::Value) -> BoxBody<Bytes, hyper::Error> {
    gateway::http_error::full_body(value.to_string())
}

fn not_found() -> Response<BoxBody<Bytes, hyper::Error>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("content-type", "application/json")
        .body(json_body(serde_json::json!({"status": false, "error": {"code": "NotFound", "message": "no matching route"}})))
        .unwrap()
}

async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let request_id = request_id(&req);
    let started = Instant::now();
    let method_str = req.method().as_str().to_string();
    let path = req.uri().path().to_string();

    let span = tracing::info_span!("request", request_id = %request_id, method = %method_str, path = %path);
    let result = handle_inner(req, state).instrument(span.clone()).await;

    let _enter = span.enter();
    info!(duration_ms = started.elapsed().as_millis() as u64, "request completed");
    result
}

async fn handle_inner(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let method = match *req.method() {
        hyper::Method::GET => Method::Get,
        hyper::Method::POST => Method::Post,
        _ => return Ok(not_found()),
    };
    let path = req.uri().path().to_string();

    let Some(endpoint_impl) = state.registry.find(method, &path) else {
        return Ok(not_found());
    };

    let envelope = match method {
        Method::Get => common::Envelope::from_query_string(req.uri().query().unwrap_or_default()),
        Method::Post => {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(err) => {
                    warn!("failed reading request body: {err}");
                    Bytes::new()
                }
            };
            if body.is_empty() {
                common::Envelope::new()
            } else {
                match common::Envelope::from_json_bytes(&body) {
                    Ok(env) => env,
                    Err(_) => {
                        let err = common::GatewayError::BadRequest;
                        return Ok(gateway::http_error::error_response(&err));
                    }
                }
            }
        }
    };

    // Top-level request deadline (§5): bounds the whole dispatch lifecycle,
    // not just a single upstream leg. An elapsed deadline cancels whatever
    // dispatch was doing; `LeaseGuard`'s `Drop` impl covers releasing a
    // provider lock that was still held when that happens.
    let outcome = match tokio::time::timeout(
        state.config.request_timeout,
        endpoint::dispatch(&state.dispatch_ctx, endpoint_impl.as_ref(), &path, envelope),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(common::GatewayError::UpstreamTimeout),
    };

    match outcome {
        Ok(DispatchOutcome::Json(value)) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "application/json")
            .body(json_body(value))
            .unwrap()),
        Ok(DispatchOutcome::Stream(response)) => Ok(response),
        Err(err) => Ok(gateway::http_error::error_response(&err)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _tracer_provider = gateway::tracing_init::init_tracer();

    let config = AppConfig::from_env();
    info!(bind_addr = %config.bind_addr, strategy = %config.strategy_name, "starting gateway");

    let catalog = match load_catalog(&config).await {
        Ok(catalog) => catalog,
        Err(err) => {
            error!("failed loading catalog: {err}");
            std::process::exit(1);
        }
    };

    let store = match connect_store_if_needed(&config).await {
        Ok(store) => store,
        Err(err) => {
            error!("coordination store required by strategy '{}' is unreachable: {err}", config.strategy_name);
            std::process::exit(1);
        }
    };

    let maskers: Vec<Box<dyn Masker>> = Vec::new();
    let guardrails: Vec<Box<dyn Guardrail>> = Vec::new();
    let auditor: Arc<dyn Auditor> = default_auditor();

    let state = Arc::new(build_app_state(config, catalog, store.clone(), maskers, guardrails, auditor));

    if let Some(store) = store {
        let catalog = Arc::clone(&state.dispatch_ctx.catalog);
        let client = state.dispatch_ctx.http_client.clone();
        let check_interval = state.config.keepalive_interval;
        tokio::spawn(async move {
            keepalive::run(store, catalog, client, check_interval, false).await;
        });
    }

    let listener = TcpListener::bind(state.config.bind_addr.clone()).await?;
    info!("listening on http://{}", state.config.bind_addr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        let service = service_fn(move |req: Request<Incoming>| {
            let state = Arc::clone(&state);
            let parent_cx = extract_context_from_request(&req);
            async move { handle(req, state).await }.with_context(parent_cx)
        });

        tokio::task::spawn(async move {
            tracing::debug!("accepted connection from {:?}", peer_addr);
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!("error serving connection: {err}");
            }
        });
    }
}
