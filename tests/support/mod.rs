//! Shared helpers for the HTTP integration tests.
#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use modelgate::prelude::*;
use serde_json::Value;
use tower::ServiceExt;

pub const BOUNDARY: &str = "modelgate-test-boundary";

/// Router over a state with the built-in strategies registered.
pub fn gateway(config: &GatewayConfig) -> (Router, GatewayState) {
    let state = GatewayState::new(config);
    let report = register_all(state.factory(), state.schemas(), builtin_plugins());
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    (build_router(state.clone()), state)
}

/// Router with open authentication.
pub fn open_gateway() -> (Router, GatewayState) {
    gateway(&GatewayConfig::default())
}

/// Send one request and decode the JSON response body.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn with_key(mut request: Request<Body>, key: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert("x-api-key", key.parse().unwrap());
    request
}

/// One part of a hand-built multipart body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        field: &'a str,
        filename: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

pub fn post_multipart(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                field,
                filename,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Model ids listed by `GET /models`.
pub async fn listed_ids(router: &Router) -> Vec<String> {
    let (status, body) = send(router, get("/models")).await;
    assert_eq!(status, StatusCode::OK);
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["modelId"].as_str().unwrap().to_string())
        .collect()
}

/// Envelope shape holds both ways.
pub fn assert_envelope(body: &Value) {
    match body["success"].as_bool() {
        Some(true) => {
            assert!(body.get("data").is_some(), "success without data: {body}");
            assert!(body.get("error").is_none(), "success with error: {body}");
        }
        Some(false) => {
            assert!(body.get("error").is_some(), "failure without error: {body}");
            assert!(body.get("data").is_none(), "failure with data: {body}");
        }
        None => panic!("not an envelope: {body}"),
    }
}
