mod support;

use axum::http::StatusCode;
use modelgate::prelude::*;
use modelgate::strategies::echo::EchoStrategy;
use serde_json::json;

use support::{
    Part, assert_envelope, gateway, get, listed_ids, open_gateway, post_json, post_multipart,
    send, with_key,
};

#[tokio::test]
async fn echo_round_trip() {
    let (router, _) = open_gateway();

    let (status, body) = send(&router, post_json("/models/echo/invoke", &json!({ "text": "hi" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["result"]["echoed"], json!("hi"));
    assert_eq!(body["metadata"]["modelId"], json!("echo"));
    assert!(body["metadata"]["processingTime"].is_u64());

    let (status, body) = send(&router, post_json("/models/echo/invoke", &json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["name"], json!("ValidationError"));
    let details = body["error"]["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["field"], json!("text"));
    assert_eq!(details[0]["message"], json!("Field 'text' is required"));

    let (status, body) = send(&router, post_json("/models/ghost/invoke", &json!({ "text": "hi" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["name"], json!("NotFoundError"));
}

#[tokio::test]
async fn every_violation_is_reported() {
    let (router, _) = open_gateway();
    let (status, body) = send(
        &router,
        post_json(
            "/models/text-generation/invoke",
            &json!({ "prompt": 5, "maxTokens": 0 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let mut fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["maxTokens", "prompt"]);
    assert_eq!(body["error"]["path"], json!("/models/text-generation/invoke"));
    assert_eq!(body["error"]["method"], json!("POST"));
}

#[tokio::test]
async fn envelope_shape_holds_for_success_and_failure() {
    let (router, _) = open_gateway();
    let requests = vec![
        post_json("/models/echo/invoke", &json!({ "text": "ok" })),
        post_json("/models/echo/invoke", &json!({ "text": "" })),
        post_json("/models/ghost/invoke", &json!({})),
        post_json(
            "/models/image-generation/invoke",
            &json!({ "prompt": "a lighthouse", "n": 2, "seed": 7 }),
        ),
        post_json("/models/image-generation/invoke", &json!({ "prompt": "x", "n": 9 })),
        get("/does-not-exist"),
    ];
    for request in requests {
        let (_, body) = send(&router, request).await;
        assert_envelope(&body);
    }
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let (router, _) = open_gateway();
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/models/echo/invoke")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{ not json"))
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["name"], json!("BadRequestError"));
    assert!(body["error"]["message"].as_str().unwrap().starts_with("Malformed JSON body"));
}

#[tokio::test]
async fn listing_survives_failed_registration() {
    let (router, state) = open_gateway();
    let before = listed_ids(&router).await;
    assert_eq!(before, vec!["echo", "image-generation", "ocr", "text-generation"]);

    let err = register_plugin(
        state.factory(),
        state.schemas(),
        PluginEntry::new("echo", json!({ "type": "object" }), creator(EchoStrategy::default)),
    )
    .unwrap_err();
    assert!(matches!(err, GatewayError::DuplicateRegistration(_)));

    assert_eq!(listed_ids(&router).await, before);
    let (status, _) = send(&router, post_json("/models/echo/invoke", &json!({ "text": "still" }))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn api_keys_gate_model_routes() {
    let config = GatewayConfig::builder()
        .api_key(ApiKeyRecord::new("ops", "ops-secret").with_user("ops-team"))
        .api_key(ApiKeyRecord::new("viewer", "viewer-secret").with_permissions(["models:read"]))
        .build()
        .unwrap();
    let (router, _) = gateway(&config);
    let invoke = || post_json("/models/echo/invoke", &json!({ "text": "hi" }));

    let (status, body) = send(&router, invoke()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], json!("API key required"));

    let (status, body) = send(&router, with_key(invoke(), "wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], json!("Invalid API key"));

    let (status, body) = send(&router, with_key(invoke(), "viewer-secret")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["name"], json!("ForbiddenError"));

    let (status, _) = send(&router, with_key(get("/models"), "viewer-secret")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, with_key(invoke(), "ops-secret")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"]["echoed"], json!("hi"));

    let (status, _) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn multipart_upload_reaches_the_strategy() {
    let (router, _) = open_gateway();
    let request = post_multipart(
        "/models/ocr/invoke",
        &[
            Part::Text("language", "en"),
            Part::File {
                field: "document",
                filename: "note.txt",
                content_type: "text/plain",
                bytes: b"hello from a scan",
            },
        ],
    );

    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["result"]["text"], json!("hello from a scan"));
    assert_eq!(body["data"]["result"]["language"], json!("en"));
    assert_eq!(body["data"]["metadata"]["fileName"], json!("note.txt"));
}

#[tokio::test]
async fn disallowed_mime_type_is_rejected_while_parsing() {
    let (router, _) = open_gateway();
    let request = post_multipart(
        "/models/ocr/invoke",
        &[Part::File {
            field: "document",
            filename: "setup.exe",
            content_type: "application/x-msdownload",
            bytes: b"MZ\x90\x00",
        }],
    );

    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["name"], json!("UploadError"));
    assert!(body["error"]["details"].is_null());
}

#[tokio::test]
async fn oversized_file_is_payload_too_large() {
    let (router, state) = open_gateway();
    register_plugin(
        state.factory(),
        state.schemas(),
        PluginEntry::new(
            "tiny-scanner",
            json!({ "type": "object" }),
            creator(EchoStrategy::default),
        )
        .with_upload(UploadDeclaration::Enabled(
            UploadPolicy::default().with_max_file_size(8),
        )),
    )
    .unwrap();

    let request = post_multipart(
        "/models/tiny-scanner/invoke",
        &[Part::File {
            field: "file",
            filename: "big.txt",
            content_type: "text/plain",
            bytes: b"this is definitely more than eight bytes",
        }],
    );
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_envelope(&body);
}

#[tokio::test]
async fn too_many_files_is_an_upload_error() {
    let (router, _) = open_gateway();
    let names: Vec<String> = (1..=6).map(|i| format!("page{i}.txt")).collect();
    let parts: Vec<Part<'_>> = names
        .iter()
        .map(|name| Part::File {
            field: "document",
            filename: name,
            content_type: "text/plain",
            bytes: b"scanned page",
        })
        .collect();

    let (status, body) = send(&router, post_multipart("/models/ocr/invoke", &parts)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["name"], json!("UploadError"));
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("Too many files"), "{message}");
    assert_envelope(&body);
}

#[tokio::test]
async fn multipart_to_json_only_model_is_rejected() {
    let (router, _) = open_gateway();
    let request = post_multipart("/models/echo/invoke", &[Part::Text("text", "hi")]);
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["message"],
        json!("Model 'echo' does not accept file uploads")
    );
}

#[tokio::test]
async fn model_detail_exposes_schema_and_upload_policy() {
    let (router, _) = open_gateway();

    let (status, body) = send(&router, get("/models/ocr")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["modelId"], json!("ocr"));
    assert_eq!(body["data"]["inputSchema"]["type"], json!("object"));
    assert!(body["data"]["fileUpload"]["maxFileSize"].is_u64());

    let (_, body) = send(&router, get("/models/echo")).await;
    assert!(body["data"]["fileUpload"].is_null());

    let (status, _) = send(&router, get("/models/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let (router, _) = open_gateway();

    let (status, body) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["models"], json!(4));

    let (status, body) = send(&router, get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["name"], json!("NotFoundError"));
    assert_eq!(body["error"]["path"], json!("/nope"));
}
