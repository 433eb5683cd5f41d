//! HTTP helper behavior against a mock server

mod common;

use ai_kit::config::HttpConfig;
use ai_kit::transport::{FilePart, HttpClient};
use ai_kit::{classify_status, ErrorKind};
use bytes::Bytes;
use reqwest::Method;
use serde_json::json;
use std::collections::HashMap;

fn client() -> HttpClient {
    HttpClient::new(&HttpConfig::default()).unwrap()
}

#[test]
fn test_status_table() {
    let table = [
        (400, ErrorKind::InvalidRequest),
        (401, ErrorKind::Authentication),
        (403, ErrorKind::PermissionDenied),
        (404, ErrorKind::NotFound),
        (408, ErrorKind::Timeout),
        (413, ErrorKind::RequestTooLarge),
        (418, ErrorKind::InvalidRequest),
        (422, ErrorKind::InvalidRequest),
        (429, ErrorKind::RateLimited),
        (500, ErrorKind::ServerError),
        (502, ErrorKind::ServerError),
        (503, ErrorKind::Overloaded),
        (504, ErrorKind::Timeout),
        (529, ErrorKind::Overloaded),
        (200, ErrorKind::Unknown),
        (302, ErrorKind::Unknown),
    ];
    for (status, kind) in table {
        assert_eq!(classify_status(status), kind, "status {}", status);
    }
}

#[tokio::test]
async fn test_error_body_becomes_message() {
    common::init_tracing();
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/v1/things")
        .with_status(422)
        .with_body("  field `prompt` is required \n")
        .create_async()
        .await;

    let err = client()
        .request_json(
            Method::POST,
            &format!("{}/v1/things", server.url()),
            &HashMap::new(),
            Some(&json!({})),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(err.upstream_status(), Some(422));
    assert_eq!(err.message(), "field `prompt` is required");
}

#[tokio::test]
async fn test_empty_error_body_gets_generated_message() {
    let mut server = mockito::Server::new_async().await;
    let _m = server.mock("GET", "/gone").with_status(503).create_async().await;
    let url = format!("{}/gone", server.url());

    let err = client().download(&url).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Overloaded);
    assert_eq!(err.message(), format!("Upstream HTTP 503 for {}", url));
}

#[tokio::test]
async fn test_download_reports_content_type() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/a.wav")
        .with_header("content-type", "audio/wav")
        .with_body("RIFF")
        .create_async()
        .await;

    let d = client().download(&format!("{}/a.wav", server.url())).await.unwrap();
    assert_eq!(d.bytes, Bytes::from_static(b"RIFF"));
    assert_eq!(d.content_type.as_deref(), Some("audio/wav"));
}

#[tokio::test]
async fn test_multipart_upload() {
    let mut server = mockito::Server::new_async().await;
    let m = server
        .mock("POST", "/upload")
        .match_header(
            "content-type",
            mockito::Matcher::Regex("multipart/form-data; boundary=.*".into()),
        )
        .match_body(mockito::Matcher::Regex("name=\"purpose\"".into()))
        .with_body(r#"{"id":"file_1"}"#)
        .create_async()
        .await;

    let out = client()
        .request_multipart(
            Method::POST,
            &format!("{}/upload", server.url()),
            &HashMap::new(),
            &[("purpose".to_string(), "input".to_string())],
            Some(FilePart {
                field_name: "file".into(),
                file_name: "a.png".into(),
                data: Bytes::from_static(b"png"),
                mime_type: "image/png".into(),
            }),
        )
        .await
        .unwrap();
    assert_eq!(out["id"], "file_1");
    m.assert_async().await;
}
