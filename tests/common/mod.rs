//! Shared utilities for integration testing.
#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::Response,
    routing::{any, get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use forward_proxy::config::ProxyConfig;
use forward_proxy::http::{AppState, HttpServer};
use forward_proxy::lifecycle::Shutdown;

/// Config suited to tests: no env proxies, no monitor task, no exporter.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.pool.trust_env_proxy = false;
    config.memory.enabled = false;
    config.observability.metrics_enabled = false;
    config.timeouts.shutdown_grace_secs = 2.0;
    config
}

/// HTTP client that never goes through an environment proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// A proxy running on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Shutdown,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestProxy {
    pub async fn start(config: ProxyConfig) -> Self {
        Self::start_with_state(AppState::new(config).unwrap()).await
    }

    pub async fn start_with_state(state: AppState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HttpServer::with_state(state.clone());
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
        Self {
            addr,
            state,
            shutdown,
            handle,
        }
    }

    /// URL that forwards to `target` (`host:port/path?query`).
    pub fn proxy_url(&self, target: &str) -> String {
        format!("http://{}/proxy/{}", self.addr, target)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Leases held on the currently published outbound client.
    pub fn in_flight(&self) -> usize {
        self.state.pool.current().map(|c| c.in_flight()).unwrap_or(0)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("proxy did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Poll `condition` until it holds or `within` elapses.
pub async fn wait_until(condition: impl Fn() -> bool, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Start an axum backend that reflects what it receives.
///
/// Routes:
/// - `/echo/*`: method, path, query, headers and body (text and hex) as JSON
/// - `/upload`: multipart fields and files (with hex contents) as JSON
/// - `/stream/{n}`: `n` chunks of 1 KiB, 10ms apart
/// - `/drip`: a small chunk every 20ms, forever
/// - `/slow`: answers after 3s
/// - `/status/{code}`: that status
/// - `/cookies`: two `set-cookie` headers, no content type
pub async fn start_echo_backend() -> SocketAddr {
    let app = Router::new()
        .route("/echo", any(echo))
        .route("/echo/{*rest}", any(echo))
        .route("/upload", post(upload))
        .route("/stream/{chunks}", get(stream))
        .route("/drip", get(drip))
        .route("/slow", get(slow))
        .route("/status/{code}", any(status))
        .route("/cookies", get(cookies));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let headers: Map<String, Value> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or_default().to_string())))
        .collect();
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query().unwrap_or(""),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
        "body_hex": to_hex(&body),
    }))
}

/// Lowercase hex of `bytes`.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn upload(mut multipart: Multipart) -> Json<Value> {
    let mut fields = Map::new();
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.unwrap();
                files.push(json!({
                    "field": name,
                    "file_name": file_name,
                    "content_type": content_type,
                    "size": data.len(),
                    "hex": to_hex(&data),
                }));
            }
            None => {
                fields.insert(name, Value::String(field.text().await.unwrap()));
            }
        }
    }
    Json(json!({ "fields": fields, "files": files }))
}

async fn stream(Path(chunks): Path<usize>) -> Response {
    let body = futures_util::stream::iter(0..chunks).then(|_| async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, Infallible>(Bytes::from(vec![b'x'; 1024]))
    });
    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(body))
        .unwrap()
}

async fn drip() -> Response {
    let body = futures_util::stream::unfold((), |_| async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Some((Ok::<_, Infallible>(Bytes::from_static(b"tick\n")), ()))
    });
    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from_stream(body))
        .unwrap()
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "late"
}

async fn status(Path(code): Path<u16>) -> (StatusCode, &'static str) {
    (StatusCode::from_u16(code).unwrap(), "status body")
}

async fn cookies() -> Response {
    let mut response = Response::new(Body::from("plain"));
    let headers = response.headers_mut();
    headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
    headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("identity"));
    response
}

/// An address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Raw backend that promises 100 bytes, sends 10, then hangs up.
pub async fn start_truncating_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let head = "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nContent-Type: text/plain\r\n\r\n0123456789";
                let _ = socket.write_all(head.as_bytes()).await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}
