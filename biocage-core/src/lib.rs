//! Core value types for the biocage code-execution sandbox.
//!
//! Defines the domain values shared by the executor and the gateway:
//! execution results, resource limits, the exposed-path registry,
//! identifiers, and session summaries. Nothing in this crate spawns a
//! process or talks to a container runtime.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod execution;
pub mod exposure;
pub mod id;
pub mod limits;
pub mod session;

pub use error::CoreError;
pub use execution::{DroppedVariable, ExecutionResult, TIMEOUT_EXIT_CODE};
pub use exposure::{AccessMode, ExposedPath, ExposedPathRegistry, PathKind, SHARED_MOUNT_PREFIX};
pub use id::{ContainerId, ContainerName, SandboxId};
pub use limits::{CpuLimit, MemoryLimit, ResourceLimits};
pub use session::SessionSummary;
