//! Endpoint resolution.
//!
//! [`EndpointLocator::resolve`] makes a single attempt to turn a logical name
//! into a live endpoint. Retrying is the establisher's job.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::ports::{Endpoint, Registry};
use crate::LogicalName;

/// Resolves logical receiver names through the injected [`Registry`].
#[derive(Clone)]
pub struct EndpointLocator {
    registry: Arc<dyn Registry>,
}

impl EndpointLocator {
    /// Creates a locator reading from `registry`.
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    /// One resolution attempt: sync the registry, then look `name` up.
    ///
    /// Returns `None` when the name is not registered, when the registered
    /// endpoint is already dead, or when the registry fails.
    pub async fn resolve(&self, name: &LogicalName) -> Option<Endpoint> {
        if let Err(e) = self.registry.sync().await {
            warn!(%name, error = %e, "Registry sync failed; looking up stale view");
        }

        match self.registry.lookup(name).await {
            Ok(Some(endpoint)) if endpoint.is_alive() => Some(endpoint),
            Ok(Some(_)) => {
                debug!(%name, "Registered endpoint is dead");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(%name, error = %e, "Registry lookup failed");
                None
            }
        }
    }
}
