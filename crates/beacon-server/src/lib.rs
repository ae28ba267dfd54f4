//! # Beacon Server
//!
//! HTTP serving and process lifecycle for Beacon.
//!
//! - [`Server`] - hyper accept loop running every request through the
//!   middleware [`Pipeline`](beacon_middleware::Pipeline)
//! - [`Router`] - Method and `:param` path matching
//! - [`ShutdownSignal`] - Graceful shutdown trigger
//! - [`Lifecycle`] - Ordered subsystem startup and bounded reverse teardown
//! - [`HealthReport`] - Dependency health body and status code
//!
//! ## Example
//!
//! ```rust,ignore
//! use beacon_server::{handler, Router, Server};
//!
//! let router = Router::new().get("/", handler(root));
//! let server = Server::builder()
//!     .config(config.server.clone())
//!     .router(router)
//!     .pipeline(pipeline)
//!     .build();
//!
//! server.run().await?;
//! ```

#![doc(html_root_url = "https://docs.rs/beacon-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod handler;
mod health;
pub mod lifecycle;
mod router;
mod server;
pub mod shutdown;

pub use error::{BoxError, LifecycleError, ServerError, StepFailure};
pub use handler::{handler, json_body, query_param, BoxHandler};
pub use health::{DependencyStatus, HealthReport, HealthStatus};
pub use lifecycle::{Lifecycle, StepFuture, StepResult};
pub use router::{PathParams, RouteMatch, Router};
pub use server::{client_ip, ResponseBody, Server, ServerBuilder};
pub use shutdown::ShutdownSignal;
