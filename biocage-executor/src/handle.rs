//! Container handle: the sandbox's record of its running container.

use biocage_core::{ContainerId, ContainerName, ResourceLimits};
use chrono::{DateTime, Utc};

/// A handle to a running sandbox container.
///
/// Dropping this handle does NOT stop the container. The owning
/// [`Sandbox`](crate::Sandbox) stops it explicitly, or abandons it when
/// the sandbox itself is dropped.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ContainerHandle {
    /// Identifier assigned by the runtime.
    pub id: ContainerId,

    /// Name the container was launched under.
    pub name: ContainerName,

    /// Limits the container was launched with; reused on restart.
    pub limits: ResourceLimits,

    /// Timestamp when the container was started.
    pub started_at: DateTime<Utc>,
}

impl ContainerHandle {
    #[must_use]
    pub fn new(id: ContainerId, name: ContainerName, limits: ResourceLimits) -> Self {
        Self {
            id,
            name,
            limits,
            started_at: Utc::now(),
        }
    }
}
