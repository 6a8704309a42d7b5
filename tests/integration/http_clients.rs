//! HTTP clients against a local one-shot server

use cloud_asset_mirror::config::Credentials;
use cloud_asset_mirror::enumerator::signal::{classify_signal, Signal};
use cloud_asset_mirror::fetcher::cloudinary::CloudinaryClient;
use cloud_asset_mirror::fetcher::http::{build_http_client, HttpContentSource};
use cloud_asset_mirror::fetcher::{ApiFailure, ContentSource, FetchError, ListingApi};
use futures_util::StreamExt;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve one canned response and hand back the raw request head
async fn serve_once(status: &'static str, body: &'static str) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&request).into_owned()
    });
    (addr, handle)
}

fn credentials() -> Credentials {
    Credentials {
        cloud_name: "demo".to_string(),
        api_key: "key".to_string(),
        api_secret: "secret".to_string(),
    }
}

#[tokio::test]
async fn test_listing_request_shape_and_parse() {
    let body = r#"{"resources":[{"public_id":"samples/dog","format":"jpg","secure_url":"https://res.example.com/dog.jpg","asset_folder":"samples","bytes":120}],"next_cursor":"n2"}"#;
    let (addr, server) = serve_once("200 OK", body).await;

    let client = CloudinaryClient::new(
        build_http_client().unwrap(),
        format!("http://{addr}"),
        credentials(),
        "image",
    );
    let page = client.list_page(25, Some("n1")).await.unwrap();

    assert_eq!(page.next_cursor.as_deref(), Some("n2"));
    assert_eq!(page.resources.len(), 1);
    assert_eq!(page.resources[0].id, "samples/dog");
    assert_eq!(page.resources[0].folder, "samples");

    let request = server.await.unwrap();
    let request_line = request.lines().next().unwrap();
    assert!(request_line.starts_with("GET /v1_1/demo/resources/image?"));
    assert!(request_line.contains("max_results=25"));
    assert!(request_line.contains("next_cursor=n1"));
    // base64("key:secret")
    assert!(request.to_lowercase().contains("authorization: basic a2v5onnly3jlda=="));
}

#[tokio::test]
async fn test_rate_limit_response_becomes_throttling_signal() {
    let body = r#"{"error":{"message":"Rate Limit Exceeded. Try again on 2030-01-01 10:00:00 UTC"}}"#;
    let (addr, _server) = serve_once("420 Enhance Your Calm", body).await;

    let client = CloudinaryClient::new(
        build_http_client().unwrap(),
        format!("http://{addr}"),
        credentials(),
        "image",
    );
    let failure = client.list_page(10, None).await.unwrap_err();

    assert_eq!(failure.status(), Some(420));
    assert!(failure.message().starts_with("Rate Limit Exceeded"));
    match classify_signal(&failure) {
        Signal::Throttled(signal) => {
            assert_eq!(signal.resume_at.to_rfc3339(), "2030-01-01T10:00:00+00:00")
        }
        Signal::Failed(err) => panic!("expected throttling, got {err}"),
    }
}

#[tokio::test]
async fn test_unauthorized_listing_is_http_failure() {
    let body = r#"{"error":{"message":"Invalid api_key key"}}"#;
    let (addr, _server) = serve_once("401 Unauthorized", body).await;

    let client = CloudinaryClient::new(
        build_http_client().unwrap(),
        format!("http://{addr}"),
        credentials(),
        "raw",
    );
    let failure = client.list_page(10, None).await.unwrap_err();

    assert_eq!(
        failure,
        ApiFailure::Http {
            status: 401,
            message: "Invalid api_key key".to_string(),
        }
    );
}

#[tokio::test]
async fn test_content_source_streams_body_with_length() {
    let (addr, _server) = serve_once("200 OK", "hello bytes").await;
    let source = HttpContentSource::new(build_http_client().unwrap());

    let content = source.fetch(&format!("http://{addr}/dog.jpg")).await.unwrap();
    assert_eq!(content.total_size, Some(11));

    let chunks: Vec<_> = content.stream.collect().await;
    let body: Vec<u8> = chunks
        .into_iter()
        .flat_map(|c| c.unwrap().to_vec())
        .collect();
    assert_eq!(body, b"hello bytes");
}

#[tokio::test]
async fn test_content_source_maps_error_status() {
    let (addr, _server) = serve_once("404 Not Found", "{}").await;
    let source = HttpContentSource::new(build_http_client().unwrap());

    match source.fetch(&format!("http://{addr}/missing.jpg")).await {
        Err(FetchError::Status(status)) => assert_eq!(status, 404),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("expected an error status"),
    }
}
