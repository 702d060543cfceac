use std::time::Duration;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Size of a transparent 1x1 GIF
pub const PIXEL_BYTES: usize = 43;

/// Creates a mock HTTP server that answers HEAD requests under `/pixel/`
/// like a tracking pixel endpoint: a small image with an explicit length.
pub async fn mock_pixel_server(content_type: &str, length: usize) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path_regex(r"^/pixel/.+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(vec![0u8; length], content_type)
                .insert_header("content-length", length.to_string().as_str()),
        )
        .mount(&server)
        .await;

    server
}

/// Creates a mock HTTP server that serves an HTML page for every HEAD request
pub async fn mock_html_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(vec![b'x'; 2048], "text/html; charset=utf-8")
                .insert_header("content-length", "2048"),
        )
        .mount(&server)
        .await;

    server
}

/// Creates a mock HTTP server that delays responses to simulate network timeouts.
///
/// The server waits `delay_ms` milliseconds before answering with a pixel.
pub async fn mock_timeout_server(delay_ms: u64) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(vec![0u8; PIXEL_BYTES], "image/gif")
                .insert_header("content-length", PIXEL_BYTES.to_string().as_str())
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(&server)
        .await;

    server
}

/// Creates a mock HTTP server where `/redirect/*` answers with a 302 to a
/// pixel served by the same server under `/pixel/target`.
pub async fn mock_redirect_server() -> MockServer {
    let server = mock_pixel_server("image/gif", PIXEL_BYTES).await;
    let location = format!("{}/pixel/target", server.uri());

    Mock::given(method("HEAD"))
        .and(path_regex(r"^/redirect/.+$"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", location.as_str()))
        .mount(&server)
        .await;

    server
}

/// Creates a mock AdGuard Home query log endpoint.
///
/// Only requests carrying the expected basic auth header and `limit`
/// parameter are answered with `body`; anything else gets a 401.
pub async fn mock_querylog_server(auth_header: &str, limit: u32, body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/control/querylog"))
        .and(header("authorization", auth_header))
        .and(query_param("limit", limit.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .with_priority(10)
        .mount(&server)
        .await;

    server
}

/// Creates a mock HTTP server that returns the specified HTTP error status code.
pub async fn mock_error_server(status_code: u16) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status_code))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(status_code))
        .mount(&server)
        .await;

    server
}
