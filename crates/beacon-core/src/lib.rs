//! # Beacon Core
//!
//! Core types shared by every Beacon crate.
//!
//! - [`AppError`] - Error taxonomy with HTTP status mapping
//! - [`TelemetryContext`] - Per-request trace identity and deadline
//! - [`User`], [`NewUser`] - The `users` resource
//! - [`Pagination`] - Normalized list query parameters

#![doc(html_root_url = "https://docs.rs/beacon-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod user;

pub use context::TelemetryContext;
pub use error::{AppError, AppResult, ErrorBody, ErrorCategory, FAULT_MESSAGE};
pub use user::{NewUser, Pagination, User, DEFAULT_LIMIT, MAX_LIMIT};
