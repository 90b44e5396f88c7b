//! Connection establishment with retry.
//!
//! [`ConnectionEstablisher::establish`] wraps the locator in a retry loop,
//! performs the registration handshake and arms the liveness monitor. A
//! [`Connection`] is only ever returned fully registered and monitored.
//!
//! ## Retry timing
//!
//! Every attempt is preceded by the policy interval, giving a freshly
//! registered receiver time to converge in the registry. A limited policy of
//! `N` attempts therefore resolves at `interval, 2 * interval, .., N * interval`
//! and fails with [`ConnectorError::DiscoveryTimeout`] right after the last
//! one. An unlimited policy never fails.

use tracing::{debug, info, instrument, warn};

use crate::locator::EndpointLocator;
use crate::monitor::{self, MonitorGuard};
use crate::ports::Endpoint;
use crate::{
    ClientHandle, ConnectionId, ConnectorError, ForwardMessage, LogicalName, RetryPolicy,
    SlotKind, Timestamp,
};

/// A registered, monitored connection to a receiver endpoint.
pub struct Connection {
    id: ConnectionId,
    endpoint: Endpoint,
    connected_at: Timestamp,
    _monitor: MonitorGuard,
}

impl Connection {
    /// Identity used to match monitor notifications to this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// When the registration handshake completed.
    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    /// Returns `false` once the endpoint has terminated.
    pub fn is_alive(&self) -> bool {
        self.endpoint.is_alive()
    }

    /// Hands `message` to the endpoint.
    pub fn deliver(&self, message: ForwardMessage) -> Result<(), crate::EndpointError> {
        self.endpoint.deliver(message)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("alive", &self.endpoint.is_alive())
            .finish()
    }
}

/// Resolves, registers with and monitors receiver endpoints.
#[derive(Clone)]
pub struct ConnectionEstablisher {
    locator: EndpointLocator,
}

impl ConnectionEstablisher {
    /// Creates an establisher resolving names through `locator`.
    pub fn new(locator: EndpointLocator) -> Self {
        Self { locator }
    }

    /// Establishes a connection to `name` for `slot` on behalf of `client`.
    ///
    /// A rejected registration handshake counts as a failed attempt. Returns
    /// [`ConnectorError::DiscoveryTimeout`] once a limited policy is spent.
    #[instrument(skip(self, policy, client), fields(client = %client.id(), retry = %policy.count()))]
    pub async fn establish(
        &self,
        slot: SlotKind,
        name: &LogicalName,
        policy: &RetryPolicy,
        client: &ClientHandle,
    ) -> Result<Connection, ConnectorError> {
        let mut attempts: u32 = 0;

        while policy.count().permits(attempts) {
            tokio::time::sleep(policy.interval()).await;
            attempts = attempts.saturating_add(1);

            let Some(endpoint) = self.locator.resolve(name).await else {
                debug!(attempt = attempts, "Receiver not found");
                continue;
            };

            if let Err(e) = endpoint.register(client.clone()).await {
                warn!(attempt = attempts, error = %e, "Registration handshake failed");
                continue;
            }

            let id = ConnectionId::new_random();
            let monitor = monitor::arm(slot, id, &endpoint, client.clone());
            info!(attempt = attempts, connection = %id, "Connected to receiver");

            return Ok(Connection {
                id,
                endpoint,
                connected_at: Timestamp::now(),
                _monitor: monitor,
            });
        }

        Err(ConnectorError::DiscoveryTimeout {
            name: name.clone(),
            attempts,
        })
    }
}
