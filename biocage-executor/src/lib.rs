//! Container lifecycle and persistent-session execution for biocage.
//!
//! A [`Sandbox`] drives one hardened container through a
//! [`ContainerRuntime`] (Docker in production), executes code in a
//! persistent interpreter session over a framed stdin protocol, falls back
//! to one-shot containers when stopped, and applies the failure policy
//! after every call.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod config;
pub mod docker;
pub mod ephemeral;
pub mod error;
pub mod framing;
pub mod handle;
pub mod output;
pub mod policy;
pub mod runner;
pub mod sandbox;
mod unix_client;

#[cfg(test)]
mod testing;

pub use backend::{ContainerRuntime, ProcessOutput};
pub use config::{ContainerSpec, LaunchMode, RunOptions, SandboxConfig, ScratchMount};
pub use docker::DockerBackend;
pub use ephemeral::EphemeralExecutor;
pub use error::ExecutorError;
pub use handle::ContainerHandle;
pub use output::parse_runner_output;
pub use policy::{assess, Assessment, ErrorCategory, FailureClass, FailurePolicy};
pub use runner::SessionExecutor;
pub use sandbox::{ExposeOutcome, LifecycleState, Sandbox, SandboxInfo};
