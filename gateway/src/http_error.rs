//! Turns a [`GatewayError`] into the JSON error envelope and mapped HTTP
//! status from §7: `{status: false, error: {code, message, details?}}`.
//! `common::GatewayError` stays free of any HTTP dependency; this is the one
//! place that builds an actual `hyper::Response` from it.

use bytes::Bytes;
use common::GatewayError;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{Response, StatusCode};

pub fn full_body<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, hyper::Error> {
    Full::new(chunk.into()).map_err(|never| match never {}).boxed()
}

pub fn error_response(err: &GatewayError) -> Response<BoxBody<Bytes, hyper::Error>> {
    let status = err.status_code();
    if status >= 500 {
        tracing::error!(code = err.code(), "{err}");
    } else {
        tracing::warn!(code = err.code(), "{err}");
    }

    let body = serde_json::json!({
        "status": false,
        "error": {
            "code": err.code(),
            "message": err.to_string(),
        }
    });

    let status_code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Response::builder()
        .status(status_code)
        .header("content-type", "application/json")
        .body(full_body(body.to_string()))
        .unwrap_or_else(|_| {
            let mut resp = Response::new(full_body("internal error"));
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_guardrail_blocked_to_451() {
        let err = GatewayError::GuardrailBlocked {
            reason: "pii".to_string(),
        };
        let resp = error_response(&err);
        assert_eq!(resp.status(), StatusCode::from_u16(451).unwrap());
    }
}
