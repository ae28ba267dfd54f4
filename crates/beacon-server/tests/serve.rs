//! End-to-end serving over a real TCP socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use beacon_core::TelemetryContext;
use beacon_middleware::{HandlerResult, Request, Response, ResponseExt};
use beacon_server::{handler, PathParams, Router, Server, ShutdownSignal};
use http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

async fn echo_id(_ctx: TelemetryContext, req: Request) -> HandlerResult {
    let id = req
        .extensions()
        .get::<PathParams>()
        .and_then(|p| p.get("id"))
        .unwrap_or_default()
        .to_string();
    Ok(Response::json(StatusCode::OK, &serde_json::json!({ "id": id })))
}

async fn explode(_ctx: TelemetryContext, _req: Request) -> HandlerResult {
    panic!("This is a simulated panic!")
}

static SLOW_REQUEST_FINISHED: AtomicBool = AtomicBool::new(false);

async fn brief(_ctx: TelemetryContext, _req: Request) -> HandlerResult {
    tokio::time::sleep(Duration::from_millis(300)).await;
    Ok(Response::empty(StatusCode::NO_CONTENT))
}

async fn slow(_ctx: TelemetryContext, _req: Request) -> HandlerResult {
    tokio::time::sleep(Duration::from_millis(1500)).await;
    SLOW_REQUEST_FINISHED.store(true, Ordering::SeqCst);
    Ok(Response::empty(StatusCode::NO_CONTENT))
}

async fn start() -> (std::net::SocketAddr, ShutdownSignal, JoinHandle<()>) {
    start_with_grace(Duration::from_secs(1)).await
}

async fn start_with_grace(grace: Duration) -> (std::net::SocketAddr, ShutdownSignal, JoinHandle<()>) {
    let router = Router::new()
        .get("/api/users/:id", handler(echo_id))
        .get("/api/panic", handler(explode))
        .get("/brief", handler(brief))
        .get("/slow", handler(slow));
    let server = Server::builder()
        .router(router)
        .shutdown_timeout(grace)
        .build();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let signal = shutdown.clone();
    let task = tokio::spawn(async move {
        server.serve(listener, signal).await.unwrap();
    });

    (addr, shutdown, task)
}

async fn send(addr: std::net::SocketAddr, method: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    raw
}

#[tokio::test]
async fn test_request_is_routed() {
    let (addr, shutdown, task) = start().await;

    let raw = send(addr, "GET", "/api/users/7").await;
    assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");
    assert!(raw.ends_with(r#"{"id":"7"}"#), "{raw}");

    shutdown.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (addr, shutdown, task) = start().await;

    let raw = send(addr, "GET", "/nowhere").await;
    assert!(raw.starts_with("HTTP/1.1 404"), "{raw}");
    assert!(raw.ends_with(r#"{"error":"Cannot GET /nowhere"}"#), "{raw}");

    shutdown.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_panic_does_not_take_down_server() {
    let (addr, shutdown, task) = start().await;

    let raw = send(addr, "GET", "/api/panic").await;
    assert!(raw.starts_with("HTTP/1.1 500"), "{raw}");
    assert!(raw.ends_with(r#"{"error":"Internal Server Error"}"#), "{raw}");

    let raw = send(addr, "GET", "/api/users/1").await;
    assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");

    shutdown.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let (addr, shutdown, task) = start().await;
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_in_flight_request_finishes_within_grace() {
    let (addr, shutdown, task) = start_with_grace(Duration::from_secs(2)).await;

    let client = tokio::spawn(async move { send(addr, "GET", "/brief").await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger();

    let raw = client.await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 204"), "{raw}");
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_request_past_grace_is_cut_off() {
    let (addr, shutdown, task) = start_with_grace(Duration::from_millis(200)).await;

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /slow HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        let _ = stream.read_to_end(&mut raw).await;
        raw
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();

    let raw = client.await.unwrap();
    assert!(raw.is_empty(), "{}", String::from_utf8_lossy(&raw));

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert!(!SLOW_REQUEST_FINISHED.load(Ordering::SeqCst));
}
