//! HTTP server.
//!
//! The server owns the accept loop. For every request it:
//!
//! 1. Buffers the body
//! 2. Matches the route and stores the path parameters in the request extensions
//! 3. Builds the per-request [`TelemetryContext`] (deadline) and
//!    [`MiddlewareContext`] (route pattern, client address)
//! 4. Runs the [`Pipeline`] around the route's handler, or around a
//!    `404 Cannot <METHOD> <path>` handler when nothing matched
//!
//! On shutdown the listener is closed, open connections finish their in-flight
//! requests, and the server waits for them up to the configured grace period.
//! Connections still open after that are aborted before [`Server::serve`]
//! returns, so no request outlives it.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use beacon_config::ServerConfig;
use beacon_core::{AppError, TelemetryContext};
use beacon_middleware::{MiddlewareContext, Pipeline, Request};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::error::ServerError;
use crate::router::{PathParams, Router};
use crate::shutdown::ShutdownSignal;

/// Body type of responses written to the wire.
pub type ResponseBody = Full<Bytes>;

/// The Beacon HTTP server.
pub struct Server {
    router: Router,
    pipeline: Pipeline,
    request_timeout: Duration,
    shutdown_timeout: Duration,
    http_addr: String,
}

impl Server {
    /// Creates a server builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Returns the router.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Returns the per-request deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Binds the configured address and serves until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and serves until `shutdown` triggers.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr: SocketAddr = self
            .http_addr
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.http_addr.clone()))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown` triggers.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Server starting");

        let server = Arc::new(self);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let server = Arc::clone(&server);
                        let shutdown = shutdown.clone();

                        connections.spawn(async move {
                            if let Err(e) = server.serve_connection(stream, remote_addr, shutdown).await {
                                tracing::debug!(remote_addr = %remote_addr, error = %e, "Connection error");
                            }
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to accept connection"),
                },

                Some(_) = connections.join_next(), if !connections.is_empty() => {}

                () = shutdown.recv() => break,
            }
        }

        drop(listener);
        tracing::info!(
            active_connections = connections.len(),
            timeout_ms = server.shutdown_timeout.as_millis() as u64,
            "Draining connections"
        );

        let drained = tokio::time::timeout(server.shutdown_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                active_connections = connections.len(),
                "Shutdown timeout reached, aborting open connections"
            );
            connections.shutdown().await;
        }

        tracing::info!("Server exited");
        Ok(())
    }

    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |request: http::Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle(request, remote_addr).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    /// Runs one request through the pipeline.
    pub async fn handle(
        &self,
        request: http::Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> http::Response<ResponseBody> {
        let (parts, body) = request.into_parts();
        let (body, body_error) = match body.collect().await {
            Ok(collected) => (collected.to_bytes(), None),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read request body");
                (Bytes::new(), Some(AppError::bad_request("Invalid request body")))
            }
        };

        let client_ip = client_ip(&parts.headers, remote_addr.ip());
        let request = http::Request::from_parts(parts, body);
        self.dispatch(request, client_ip, body_error).await.map(Full::new)
    }

    /// Routes a buffered request and runs it through the pipeline.
    pub async fn dispatch(
        &self,
        mut request: Request,
        client_ip: String,
        body_error: Option<AppError>,
    ) -> beacon_middleware::Response {
        let telemetry = TelemetryContext::new().with_timeout(self.request_timeout);
        let mut ctx = MiddlewareContext::new(telemetry).with_client_ip(client_ip);

        let matched = self
            .router
            .match_route(request.method(), request.uri().path());
        let handler = match matched {
            Some(matched) => {
                ctx = ctx.with_route(matched.pattern());
                let handler = Arc::clone(matched.handler());
                request.extensions_mut().insert(matched.into_params());
                Some(handler)
            }
            None => {
                request.extensions_mut().insert(PathParams::default());
                None
            }
        };

        let timeout = self.request_timeout;
        self.pipeline
            .process(ctx, request, move |ctx, request| {
                if let Some(err) = body_error {
                    return Box::pin(async move { Err(err) });
                }

                let Some(handler) = handler else {
                    let message = format!("Cannot {} {}", request.method(), request.uri().path());
                    return Box::pin(async move { Err(AppError::not_found(message)) });
                };

                let pending = handler(ctx.telemetry().clone(), request);
                Box::pin(async move {
                    tokio::time::timeout(timeout, pending).await.unwrap_or_else(|_| {
                        Err(AppError::with_status(
                            StatusCode::SERVICE_UNAVAILABLE,
                            "Request timed out",
                        ))
                    })
                })
            })
            .await
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("http_addr", &self.http_addr)
            .field("router", &self.router)
            .field("pipeline", &self.pipeline)
            .field("request_timeout", &self.request_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

/// Returns the client address: the first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the peer address.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: IpAddr) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map_or_else(|| peer.to_string(), ToString::to_string)
}

/// Builder for [`Server`].
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    router: Option<Router>,
    pipeline: Option<Pipeline>,
}

impl ServerBuilder {
    /// Creates a builder with the default server configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address, request deadline and drain timeout from `config`.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the bind address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.http_addr = addr.into();
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the drain timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Sets the router.
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Sets the pipeline. Defaults to an untraced pipeline.
    #[must_use]
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            router: self.router.unwrap_or_default(),
            pipeline: self.pipeline.unwrap_or_else(|| Pipeline::builder().build()),
            request_timeout: self.config.request_timeout,
            shutdown_timeout: self.config.shutdown_timeout,
            http_addr: self.config.http_addr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use beacon_middleware::{Response, ResponseExt};
    use std::net::Ipv4Addr;

    fn request(method: &str, uri: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
    }

    fn server() -> Server {
        let router = Router::new().get(
            "/api/users/:id",
            handler(|_ctx, req: Request| async move {
                let id = req
                    .extensions()
                    .get::<PathParams>()
                    .and_then(|p| p.get("id"))
                    .unwrap_or_default()
                    .to_string();
                Ok(Response::json(StatusCode::OK, &serde_json::json!({ "id": id })))
            }),
        );
        Server::builder().router(router).build()
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer), "10.0.0.1");

        headers.insert("x-real-ip", "192.168.1.5".parse().unwrap());
        assert_eq!(client_ip(&headers, peer), "192.168.1.5");

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.2".parse().unwrap());
        assert_eq!(client_ip(&headers, peer), "203.0.113.7");
    }

    #[test]
    fn test_builder_uses_config() {
        let server = Server::builder()
            .config(ServerConfig::default())
            .request_timeout(Duration::from_secs(5))
            .build();
        assert_eq!(server.request_timeout(), Duration::from_secs(5));
        assert_eq!(server.router().route_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_passes_params() {
        let response = server()
            .dispatch(request("GET", "/api/users/42"), "127.0.0.1".to_string(), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), br#"{"id":"42"}"#);
    }

    #[tokio::test]
    async fn test_unmatched_route_is_404() {
        let response = server()
            .dispatch(request("PUT", "/api/users/42"), "127.0.0.1".to_string(), None)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.body().as_ref(),
            br#"{"error":"Cannot PUT /api/users/42"}"#
        );
    }

    #[tokio::test]
    async fn test_body_error_is_400() {
        let response = server()
            .dispatch(
                request("GET", "/api/users/42"),
                "127.0.0.1".to_string(),
                Some(AppError::bad_request("Invalid request body")),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_hits_deadline() {
        let router = Router::new().get(
            "/slow",
            handler(|_ctx, _req| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Response::empty(StatusCode::OK))
            }),
        );
        let server = Server::builder()
            .router(router)
            .request_timeout(Duration::from_secs(30))
            .build();

        let response = server
            .dispatch(request("GET", "/slow"), "127.0.0.1".to_string(), None)
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let err = Server::builder()
            .http_addr("not-an-address")
            .build()
            .run_with_shutdown(ShutdownSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidAddress(_)));
    }
}
