//! Request routing and path matching.
//!
//! Routes are `(method, pattern)` pairs. Patterns are `/`-separated segments;
//! a segment starting with `:` captures one path segment under that name.
//! Routes are tried in registration order and the first match wins.
//!
//! The matched pattern, not the raw path, becomes the request's `http.route`,
//! so `/api/users/42` and `/api/users/7` share the route `/api/users/:id`.
//!
//! # Example
//!
//! ```rust
//! use beacon_core::TelemetryContext;
//! use beacon_middleware::{HandlerResult, Request, Response, ResponseExt};
//! use beacon_server::{handler, Router};
//! use http::{Method, StatusCode};
//!
//! async fn get_user(_ctx: TelemetryContext, _req: Request) -> HandlerResult {
//!     Ok(Response::empty(StatusCode::OK))
//! }
//!
//! let router = Router::new().get("/api/users/:id", handler(get_user));
//!
//! let matched = router.match_route(&Method::GET, "/api/users/42").unwrap();
//! assert_eq!(matched.pattern(), "/api/users/:id");
//! assert_eq!(matched.params().get("id"), Some("42"));
//! assert!(router.match_route(&Method::POST, "/api/users/42").is_none());
//! ```

use std::collections::HashMap;

use http::Method;

use crate::handler::BoxHandler;

/// Path parameters captured by a route.
///
/// Inserted into the request extensions before the handler runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(HashMap<String, String>);

impl PathParams {
    /// Returns parameter `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns true if no parameters were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

struct Route {
    method: Method,
    pattern: String,
    segments: Vec<Segment>,
    handler: BoxHandler,
}

impl Route {
    fn new(method: Method, pattern: &str, handler: BoxHandler) -> Self {
        Self {
            method,
            pattern: pattern.to_string(),
            segments: parse_segments(pattern),
            handler,
        }
    }

    fn match_path(&self, path: &str) -> Option<PathParams> {
        let actual: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if actual.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, value) in self.segments.iter().zip(actual) {
            match segment {
                Segment::Literal(expected) if expected == value => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), value.to_string());
                }
            }
        }

        Some(PathParams(params))
    }
}

fn parse_segments(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix(':') {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(s.to_string()),
        })
        .collect()
}

/// A route that matched a request.
pub struct RouteMatch<'a> {
    pattern: &'a str,
    params: PathParams,
    handler: &'a BoxHandler,
}

impl<'a> RouteMatch<'a> {
    /// Returns the route pattern, e.g. `/api/users/:id`.
    #[must_use]
    pub fn pattern(&self) -> &'a str {
        self.pattern
    }

    /// Returns the captured parameters.
    #[must_use]
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Returns the route's handler.
    #[must_use]
    pub fn handler(&self) -> &'a BoxHandler {
        self.handler
    }

    /// Consumes the match, returning the captured parameters.
    #[must_use]
    pub fn into_params(self) -> PathParams {
        self.params
    }
}

impl std::fmt::Debug for RouteMatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatch")
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// HTTP request router.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Adds a route.
    #[must_use]
    pub fn route(mut self, method: Method, pattern: &str, handler: BoxHandler) -> Self {
        self.routes.push(Route::new(method, pattern, handler));
        self
    }

    /// Adds a `GET` route.
    #[must_use]
    pub fn get(self, pattern: &str, handler: BoxHandler) -> Self {
        self.route(Method::GET, pattern, handler)
    }

    /// Adds a `POST` route.
    #[must_use]
    pub fn post(self, pattern: &str, handler: BoxHandler) -> Self {
        self.route(Method::POST, pattern, handler)
    }

    /// Adds a `DELETE` route.
    #[must_use]
    pub fn delete(self, pattern: &str, handler: BoxHandler) -> Self {
        self.route(Method::DELETE, pattern, handler)
    }

    /// Returns the number of routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Returns `(method, pattern)` of every route, in registration order.
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, &str)> {
        self.routes
            .iter()
            .map(|r| (r.method.clone(), r.pattern.as_str()))
            .collect()
    }

    /// Matches a request to a route.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route.match_path(path).map(|params| RouteMatch {
                    pattern: &route.pattern,
                    params,
                    handler: &route.handler,
                })
            })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes())
            .finish()
    }
}
