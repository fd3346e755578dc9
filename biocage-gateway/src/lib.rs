//! HTTP API gateway for biocage sandboxes.
//!
//! Exposes sandbox lifecycle, path exposure, persistent-session execution
//! and one-shot execution over JSON. Each pooled sandbox owns one container.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod pool;
pub mod routes;

pub use error::GatewayError;
pub use pool::SandboxPool;
pub use routes::{create_router, AppState};
