//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries per-request state through the pipeline:
//! the [`TelemetryContext`] handed on to handlers, what the router resolved,
//! and response headers that must survive an error outcome.

use beacon_core::TelemetryContext;
use http::HeaderMap;

use crate::types::Response;

/// Context that flows through the middleware pipeline.
///
/// # Example
///
/// ```
/// use beacon_core::TelemetryContext;
/// use beacon_middleware::context::MiddlewareContext;
///
/// let ctx = MiddlewareContext::new(TelemetryContext::new())
///     .with_route("/api/users/:id")
///     .with_client_ip("10.0.0.7");
///
/// assert_eq!(ctx.route(), Some("/api/users/:id"));
/// assert_eq!(ctx.route_or("/api/users/42"), "/api/users/:id");
/// ```
#[derive(Debug, Default)]
pub struct MiddlewareContext {
    /// Telemetry carrier passed to handlers.
    telemetry: TelemetryContext,

    /// Matched route pattern, if any route matched.
    route: Option<String>,

    /// Peer address of the client.
    client_ip: Option<String>,

    /// Headers merged into the response when the request ends in an error.
    deferred_headers: HeaderMap,
}

impl MiddlewareContext {
    /// Creates a context around a telemetry carrier.
    #[must_use]
    pub fn new(telemetry: TelemetryContext) -> Self {
        Self {
            telemetry,
            route: None,
            client_ip: None,
            deferred_headers: HeaderMap::new(),
        }
    }

    /// Sets the matched route pattern.
    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Sets the client address.
    #[must_use]
    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    /// Returns the telemetry carrier.
    #[must_use]
    pub fn telemetry(&self) -> &TelemetryContext {
        &self.telemetry
    }

    /// Returns the telemetry carrier mutably.
    pub fn telemetry_mut(&mut self) -> &mut TelemetryContext {
        &mut self.telemetry
    }

    /// Returns the matched route pattern.
    #[must_use]
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// Returns the matched route pattern, or `path` when nothing matched.
    #[must_use]
    pub fn route_or<'a>(&'a self, path: &'a str) -> &'a str {
        self.route.as_deref().unwrap_or(path)
    }

    /// Returns the client address.
    #[must_use]
    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    /// Returns the deferred header map for writing.
    pub fn deferred_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.deferred_headers
    }

    /// Moves the deferred headers into `response`.
    pub fn apply_deferred_headers(&mut self, response: &mut Response) {
        let headers = std::mem::take(&mut self.deferred_headers);
        response.headers_mut().extend(headers);
    }
}
