use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use switchyard_core::{Destination, RouteError};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// DestinationRegistry
// ---------------------------------------------------------------------------

/// Registry of send targets, keyed by URI.
///
/// Lookups happen on every dispatch, so the map is a `DashMap`; registration
/// order is tracked separately for deterministic start/stop sequencing.
/// Destinations are started in registration order and stopped in reverse.
pub struct DestinationRegistry {
    by_uri: DashMap<String, Arc<dyn Destination>>,
    init_order: RwLock<Vec<String>>,
}

impl DestinationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_uri: DashMap::new(),
            init_order: RwLock::new(Vec::new()),
        }
    }

    /// Register a destination under its own URI. Re-registering a URI
    /// replaces the destination but keeps its original position.
    pub fn register(&self, destination: Arc<dyn Destination>) {
        let uri = destination.uri().to_string();
        if self.by_uri.insert(uri.clone(), destination).is_none() {
            self.init_order.write().push(uri);
        } else {
            debug!(uri = %uri, "destination replaced");
        }
    }

    /// Retrieve a destination by URI.
    #[must_use]
    pub fn get(&self, uri: &str) -> Option<Arc<dyn Destination>> {
        self.by_uri.get(uri).map(|entry| entry.value().clone())
    }

    /// Like [`get`](Self::get), but an unknown URI is a `NoSuchDestination`
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NoSuchDestination`](switchyard_core::ErrorKind)
    /// when nothing is registered under `uri`.
    pub fn resolve(&self, uri: &str) -> Result<Arc<dyn Destination>, RouteError> {
        self.get(uri)
            .ok_or_else(|| RouteError::no_such_destination(uri))
    }

    #[must_use]
    pub fn contains(&self, uri: &str) -> bool {
        self.by_uri.contains_key(uri)
    }

    /// URIs in registration order.
    #[must_use]
    pub fn uris(&self) -> Vec<String> {
        self.init_order.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_uri.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_uri.is_empty()
    }

    /// Start all registered destinations in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if any destination's `start()` call fails.
    pub async fn start_all(&self) -> anyhow::Result<()> {
        let order = self.init_order.read().clone();
        for uri in &order {
            if let Some(destination) = self.get(uri) {
                destination.start().await?;
            }
        }
        info!(count = order.len(), "destinations started");
        Ok(())
    }

    /// Stop all registered destinations in reverse registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if any destination's `stop()` call fails.
    pub async fn stop_all(&self) -> anyhow::Result<()> {
        let order = self.init_order.read().clone();
        for uri in order.iter().rev() {
            if let Some(destination) = self.get(uri) {
                destination.stop().await?;
            }
        }
        info!(count = order.len(), "destinations stopped");
        Ok(())
    }
}

impl Default for DestinationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DestinationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationRegistry")
            .field("uris", &*self.init_order.read())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
