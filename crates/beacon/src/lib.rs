//! # Beacon
//!
//! An HTTP user service with request-scoped observability.
//!
//! - [`AppContext`] - Registry of every subsystem handle
//! - [`bootstrap::lifecycle`] - Ordered startup and reverse teardown of
//!   logging, tracing, metrics, PostgreSQL, Redis and the schema
//! - [`routes::router`] - The route table over [`ApiState`]
//!
//! ## Architecture
//!
//! ```text
//! main ─► ConfigLoader ─► Lifecycle::start(AppContext)
//!                              │
//!                              ▼
//!           Server ─► Pipeline (Recovery → Tracing → RequestLog) ─► handlers
//!                                                                      │
//!                                              UserReader ◄────────────┤
//!                                          (Redis, then PostgreSQL)    │
//!                                                        UserStore ◄───┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use beacon::{bootstrap, routes, ApiState, AppContext};
//!
//! let mut ctx = AppContext::new(config);
//! let mut lifecycle = bootstrap::lifecycle(&ctx.config.server);
//! lifecycle.start(&mut ctx).await?;
//!
//! let state = ApiState::from_context(&ctx).expect("storage is up");
//! let server = Server::builder()
//!     .config(ctx.config.server.clone())
//!     .router(routes::router(Arc::new(state)))
//!     .pipeline(ctx.pipeline())
//!     .build();
//! server.run().await?;
//!
//! lifecycle.shutdown(&ctx).await?;
//! ```

#![doc(html_root_url = "https://docs.rs/beacon/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod context;
pub mod handlers;
pub mod routes;
pub mod state;

pub use context::{AppContext, INSTRUMENTATION_SCOPE};
pub use state::ApiState;

/// Crate version, reported by `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
