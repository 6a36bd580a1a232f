//! Upstream HTTP relay (§4.6): the buffered and streaming legs of a call to
//! a chosen provider. Streaming never buffers past a single chunk — the
//! upstream response is modeled as a lazy sequence of byte chunks and
//! forwarded as each one arrives (§9 "Streaming").

use crate::strategy::LeaseGuard;
use bytes::Bytes;
use common::{ApiType, GatewayError, HttpMethod, Operation, ProviderSpec};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::Response;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

const STREAM_CHANNEL_CAPACITY: usize = 16;

/// The concrete upstream URL + HTTP method for one operation against one
/// provider, derived from the §4.2 dispatch table.
pub fn upstream_url(provider: &ProviderSpec, operation: Operation) -> Result<(String, HttpMethod), GatewayError> {
    let api_type: ApiType = provider.api_type()?;
    let (path, method) = api_type
        .path_for(operation)
        .ok_or_else(|| GatewayError::ApiTypeMismatch {
            api_type: provider.api_type.clone(),
        })?;
    let host = provider.api_host.trim_end_matches('/');
    Ok((format!("{host}{path}"), method))
}

fn request_builder(client: &reqwest::Client, method: HttpMethod, url: &str) -> reqwest::RequestBuilder {
    match method {
        HttpMethod::Get => client.get(url),
        HttpMethod::Post => client.post(url),
    }
}

/// Buffered call (§4.6 "Buffered path"): POSTs/GETs the envelope, waits for
/// the full body, parses it as JSON. No retries at this layer.
pub async fn call_buffered(
    client: &reqwest::Client,
    provider: &ProviderSpec,
    method: HttpMethod,
    url: &str,
    body: &[u8],
    timeout: Duration,
) -> Result<(u16, serde_json::Value), GatewayError> {
    let mut request = request_builder(client, method, url)
        .timeout(timeout)
        .header("content-type", "application/json");

    if let Some(token) = provider.api_token.as_deref().filter(|t| !t.is_empty()) {
        request = request.bearer_auth(token);
    }

    if matches!(method, HttpMethod::Post) {
        request = request.body(body.to_vec());
    }

    let response = request.send().await.map_err(|err| {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout
        } else {
            GatewayError::UpstreamError {
                status: 0,
                body: err.to_string(),
            }
        }
    })?;

    let status = response.status().as_u16();
    if status >= 500 {
        let body_text = response.text().await.unwrap_or_default();
        return Err(GatewayError::UpstreamError {
            status,
            body: body_text,
        });
    }

    let value: serde_json::Value = response.json().await.map_err(|err| GatewayError::UpstreamError {
        status,
        body: err.to_string(),
    })?;

    Ok((status, value))
}

/// Streaming call (§4.6 "Streaming path"): relays the upstream byte stream
/// chunk-by-chunk into the client response body via an mpsc channel, the
/// same pattern the buffered-chat handler uses for its own pass-through.
///
/// `lease` is the provider lock acquired for this request. The client is
/// still receiving bytes from the spawned forwarding task after this
/// function returns, so the lease is released when that task finishes, not
/// when this function returns (§4.3.4: released on response end, not on
/// upstream-call return).
pub async fn call_streaming(
    client: &reqwest::Client,
    provider: &ProviderSpec,
    method: HttpMethod,
    url: &str,
    body: &[u8],
    timeout: Duration,
    mut lease: LeaseGuard,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, GatewayError> {
    let mut request = request_builder(client, method, url)
        .timeout(timeout)
        .header("content-type", "application/json")
        .header("accept", "text/event-stream");

    if let Some(token) = provider.api_token.as_deref().filter(|t| !t.is_empty()) {
        request = request.bearer_auth(token);
    }
    if matches!(method, HttpMethod::Post) {
        request = request.body(body.to_vec());
    }

    let upstream_response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            lease.release().await;
            return Err(if err.is_timeout() {
                GatewayError::UpstreamTimeout
            } else {
                GatewayError::UpstreamError {
                    status: 0,
                    body: err.to_string(),
                }
            });
        }
    };

    let status = upstream_response.status();
    if status.as_u16() >= 500 {
        let body_text = upstream_response.text().await.unwrap_or_default();
        lease.release().await;
        return Err(GatewayError::UpstreamError {
            status: status.as_u16(),
            body: body_text,
        });
    }

    let mut builder = Response::builder()
        .status(status.as_u16())
        .header("content-type", "text/event-stream");

    let (tx, rx) = mpsc::channel::<Bytes>(STREAM_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut byte_stream = upstream_response.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            match chunk {
                Ok(bytes) => {
                    if tx.send(bytes).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let error_frame = format!("data: {{\"error\": \"{err}\"}}\n\n");
                    let _ = tx.send(Bytes::from(error_frame)).await;
                    break;
                }
            }
        }
        lease.release().await;
    });

    let stream = ReceiverStream::new(rx).map(|chunk| Ok::<_, hyper::Error>(Frame::data(chunk)));
    let stream_body = BoxBody::new(StreamBody::new(stream));

    builder
        .body(stream_body)
        .map_err(|err| GatewayError::Internal(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(api_type: &str) -> ProviderSpec {
        serde_json::from_value(serde_json::json!({
            "id": "a", "api_host": "http://h:7000/", "api_type": api_type, "input_size": 4096
        }))
        .unwrap()
    }

    #[test]
    fn upstream_url_strips_trailing_slash_and_appends_path() {
        let provider = provider("vllm");
        let (url, method) = upstream_url(&provider, Operation::Chat).unwrap();
        assert_eq!(url, "http://h:7000/v1/chat/completions");
        assert!(matches!(method, HttpMethod::Post));
    }

    #[test]
    fn builtin_api_type_has_no_upstream_route() {
        let provider = provider("builtin");
        let err = upstream_url(&provider, Operation::Chat).unwrap_err();
        assert!(matches!(err, GatewayError::ApiTypeMismatch { .. }));
    }
}
