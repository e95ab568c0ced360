//! Registry of in-flight item loads.
//!
//! Every materialization of an item draws a fresh [`Generation`] and holds a
//! [`LoadTicket`] for as long as it runs. The registry refuses a second
//! concurrent load of the same identifier; loads of different identifiers
//! never interact. Nothing compiled is ever kept: the registry stores only
//! identifier and generation pairs.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use whorl_core::{Error, ExecutionStage, Result};

static GLOBAL: LazyLock<Arc<LoadRegistry>> = LazyLock::new(|| Arc::new(LoadRegistry::new()));

/// Process-unique number identifying one load context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Returns the raw generation number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// A load was refused because the identifier is already being loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{identifier}' is already being loaded ({active})")]
pub struct AlreadyLoading {
    /// Identifier that was refused
    pub identifier: String,
    /// Generation of the load in flight
    pub active: Generation,
}

/// Tracks which identifiers are currently being loaded.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use whorl_runtime::registry::LoadRegistry;
///
/// let registry = Arc::new(LoadRegistry::new());
/// let first = registry.begin("lamp").unwrap();
/// assert!(registry.begin("lamp").is_err());
/// assert!(registry.begin("rope").is_ok());
///
/// drop(first);
/// assert!(registry.begin("lamp").is_ok());
/// ```
#[derive(Debug, Default)]
pub struct LoadRegistry {
    next_generation: AtomicU64,
    in_flight: Mutex<HashMap<String, Generation>>,
}

impl LoadRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Generation>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a load of `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionError`] at the load stage if `identifier`
    /// is already being loaded.
    pub fn begin(self: &Arc<Self>, identifier: &str) -> Result<LoadTicket> {
        let generation = Generation(self.next_generation.fetch_add(1, Ordering::Relaxed) + 1);
        let mut entries = self.entries();
        if let Some(&active) = entries.get(identifier) {
            return Err(Error::execution(
                identifier,
                ExecutionStage::Load,
                AlreadyLoading {
                    identifier: identifier.to_string(),
                    active,
                },
            ));
        }
        entries.insert(identifier.to_string(), generation);
        drop(entries);

        debug!(item = %identifier, %generation, "load started");
        Ok(LoadTicket {
            registry: Arc::clone(self),
            identifier: identifier.to_string(),
            generation,
        })
    }

    /// Number of loads currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` if `identifier` is currently being loaded.
    #[must_use]
    pub fn is_loading(&self, identifier: &str) -> bool {
        self.entries().contains_key(identifier)
    }
}

/// Proof of an in-flight load; ends the load when dropped.
#[derive(Debug)]
pub struct LoadTicket {
    registry: Arc<LoadRegistry>,
    identifier: String,
    generation: Generation,
}

impl LoadTicket {
    /// Generation of this load.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Identifier being loaded.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl Drop for LoadTicket {
    fn drop(&mut self) {
        let mut entries = self.registry.entries();
        if entries.get(&self.identifier) == Some(&self.generation) {
            entries.remove(&self.identifier);
        }
        debug!(item = %self.identifier, generation = %self.generation, "load finished");
    }
}
