//! In-memory registry of live sandboxes.
//!
//! Each sandbox sits behind its own async mutex: requests against one
//! sandbox are serialized, requests against different sandboxes are not.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Instant,
};

use biocage_executor::{ContainerRuntime, Sandbox};
use tokio::sync::Mutex;
use uuid::Uuid;

/// The sandbox type the gateway pools: runtime chosen at startup.
pub type PooledSandbox = Sandbox<Arc<dyn ContainerRuntime>>;

/// Shared handle to one pooled sandbox.
pub type SandboxHandle = Arc<Mutex<PooledSandbox>>;

/// Metadata stored for each active sandbox.
pub struct SandboxEntry {
    pub sandbox: SandboxHandle,
    /// Wall-clock time at which the sandbox was created.
    pub created_at: Instant,
}

/// Thread-safe registry of active sandboxes.
#[derive(Default)]
pub struct SandboxPool {
    entries: RwLock<HashMap<Uuid, SandboxEntry>>,
}

impl SandboxPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sandbox under its own ID and return that ID.
    ///
    /// # Panics
    /// Panics if the internal `RwLock` is poisoned (a previous thread panicked
    /// while holding the write lock).
    pub fn insert(&self, sandbox: PooledSandbox) -> Uuid {
        let id = sandbox.id().as_uuid();
        let entry = SandboxEntry {
            sandbox: Arc::new(Mutex::new(sandbox)),
            created_at: Instant::now(),
        };
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        self.entries
            .write()
            .expect("sandbox pool write lock poisoned")
            .insert(id, entry);
        id
    }

    /// Look up a sandbox by ID.
    ///
    /// # Panics
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<SandboxHandle> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        self.entries
            .read()
            .expect("sandbox pool read lock poisoned")
            .get(&id)
            .map(|entry| Arc::clone(&entry.sandbox))
    }

    /// Remove a sandbox by ID, handing it back for cleanup.
    ///
    /// # Panics
    /// Panics if the internal `RwLock` is poisoned.
    pub fn remove(&self, id: Uuid) -> Option<SandboxHandle> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        self.entries
            .write()
            .expect("sandbox pool write lock poisoned")
            .remove(&id)
            .map(|entry| entry.sandbox)
    }

    /// Return `true` if the sandbox ID is currently registered.
    ///
    /// # Panics
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        self.entries
            .read()
            .expect("sandbox pool read lock poisoned")
            .contains_key(&id)
    }

    /// Number of registered sandboxes.
    ///
    /// # Panics
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        self.entries.read().expect("sandbox pool read lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every sandbox, oldest first, for shutdown cleanup.
    ///
    /// # Panics
    /// Panics if the internal `RwLock` is poisoned.
    pub fn drain(&self) -> Vec<SandboxHandle> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut entries: Vec<SandboxEntry> = self
            .entries
            .write()
            .expect("sandbox pool write lock poisoned")
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        entries.sort_by_key(|entry| entry.created_at);
        entries.into_iter().map(|entry| entry.sandbox).collect()
    }
}
