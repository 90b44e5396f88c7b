//! In-memory collaborators.
//!
//! [`LocalRegistry`] and [`LocalReceiver`] implement the [`crate::ports`]
//! traits inside one process. They back the scenario tests and the demo
//! binary, and can stand in for a real discovery service or pipeline server
//! wherever one is not available.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::monitor::{Liveness, TerminationSignal};
use crate::ports::{Endpoint, ReceiverEndpoint, Registry};
use crate::{
    ClientHandle, ClientId, EndpointError, ForwardMessage, LogicalName, Payload, RegistryError,
};

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// An eventually-consistent, in-memory name registry.
///
/// Registrations are staged and only become visible to lookups after the
/// next [`Registry::sync`], the way a distributed registry only shows a
/// remote registration once it has converged. Every lookup is recorded so
/// tests can count and time resolution attempts.
#[derive(Default)]
pub struct LocalRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    staged: HashMap<LogicalName, Endpoint>,
    published: HashMap<LogicalName, Endpoint>,
    lookups: HashMap<LogicalName, Vec<Instant>>,
    syncs: usize,
}

impl LocalRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `endpoint` under `name`, replacing any previous registration
    /// at the next sync.
    pub fn register(&self, name: LogicalName, endpoint: Endpoint) {
        debug!(%name, "Staging registration");
        self.lock().staged.insert(name, endpoint);
    }

    /// Removes `name` immediately.
    pub fn unregister(&self, name: &LogicalName) {
        let mut state = self.lock();
        state.staged.remove(name);
        state.published.remove(name);
    }

    /// Number of `sync` calls so far.
    pub fn sync_count(&self) -> usize {
        self.lock().syncs
    }

    /// Number of lookups made for `name` so far.
    pub fn lookup_attempts(&self, name: &LogicalName) -> usize {
        self.lock().lookups.get(name).map_or(0, Vec::len)
    }

    /// When each lookup for `name` happened, in order.
    pub fn lookup_instants(&self, name: &LogicalName) -> Vec<Instant> {
        self.lock().lookups.get(name).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Registry for LocalRegistry {
    async fn sync(&self) -> Result<(), RegistryError> {
        let mut state = self.lock();
        let staged = std::mem::take(&mut state.staged);
        state.published.extend(staged);
        state.syncs += 1;
        Ok(())
    }

    async fn lookup(&self, name: &LogicalName) -> Result<Option<Endpoint>, RegistryError> {
        let mut state = self.lock();
        state
            .lookups
            .entry(name.clone())
            .or_default()
            .push(Instant::now());
        Ok(state.published.get(name).cloned())
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Messages a [`LocalReceiver`] has accepted, in delivery order.
pub type ReceiverInbox = mpsc::UnboundedReceiver<ForwardMessage>;

/// An in-process receiver endpoint.
///
/// Accepts registration handshakes, collects delivered messages in its
/// [`ReceiverInbox`], and can send backward data or the ready signal to the
/// clients registered with it. [`LocalReceiver::kill`] terminates it, firing
/// every monitor armed on it.
pub struct LocalReceiver {
    liveness: Liveness,
    inbox: mpsc::UnboundedSender<ForwardMessage>,
    clients: Mutex<Vec<ClientHandle>>,
    registrations: AtomicUsize,
    reject_with: Option<String>,
}

impl LocalReceiver {
    /// A live receiver that accepts every handshake.
    pub fn new() -> (Arc<Self>, ReceiverInbox) {
        Self::build(None)
    }

    /// A receiver that refuses every registration handshake with `reason`.
    pub fn rejecting(reason: impl Into<String>) -> (Arc<Self>, ReceiverInbox) {
        Self::build(Some(reason.into()))
    }

    fn build(reject_with: Option<String>) -> (Arc<Self>, ReceiverInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let receiver = Self {
            liveness: Liveness::new(),
            inbox: tx,
            clients: Mutex::new(Vec::new()),
            registrations: AtomicUsize::new(0),
            reject_with,
        };
        (Arc::new(receiver), rx)
    }

    /// Number of successful registration handshakes.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Clients currently registered with this receiver.
    pub fn registered_clients(&self) -> Vec<ClientId> {
        self.clients().iter().map(ClientHandle::id).collect()
    }

    /// Terminates the receiver. Registered clients are forgotten.
    pub fn kill(&self, reason: impl Into<String>) {
        self.liveness.terminate(reason);
        self.clients().clear();
    }

    /// Sends `payload` back to every registered client that is still running.
    /// Returns how many clients accepted it.
    pub fn send_backward(&self, payload: Payload) -> usize {
        self.clients()
            .iter()
            .filter(|client| client.backward(payload.clone()).is_ok())
            .count()
    }

    /// Sends the ready signal to every registered client.
    pub fn signal_ready(&self) -> usize {
        self.clients()
            .iter()
            .filter(|client| client.ready().is_ok())
            .count()
    }

    fn clients(&self) -> MutexGuard<'_, Vec<ClientHandle>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReceiverEndpoint for LocalReceiver {
    async fn register(&self, client: ClientHandle) -> Result<(), EndpointError> {
        if !self.liveness.is_alive() {
            return Err(EndpointError::Terminated);
        }
        if let Some(reason) = &self.reject_with {
            return Err(EndpointError::Rejected(reason.clone()));
        }
        self.registrations.fetch_add(1, Ordering::SeqCst);
        self.clients().push(client);
        Ok(())
    }

    fn deliver(&self, message: ForwardMessage) -> Result<(), EndpointError> {
        if !self.liveness.is_alive() {
            return Err(EndpointError::Terminated);
        }
        self.inbox
            .send(message)
            .map_err(|_| EndpointError::Terminated)
    }

    fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    fn termination(&self) -> TerminationSignal {
        self.liveness.signal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registrations_are_visible_only_after_sync() {
        let registry = LocalRegistry::new();
        let name = LogicalName::new("sink").unwrap();
        let (receiver, _inbox) = LocalReceiver::new();
        registry.register(name.clone(), receiver);

        assert!(registry.lookup(&name).await.unwrap().is_none());
        registry.sync().await.unwrap();
        assert!(registry.lookup(&name).await.unwrap().is_some());
        assert_eq!(registry.lookup_attempts(&name), 2);

        registry.unregister(&name);
        assert!(registry.lookup(&name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn killed_receiver_refuses_delivery() {
        let (receiver, mut inbox) = LocalReceiver::new();
        receiver
            .deliver(ForwardMessage::PushData("one".into()))
            .unwrap();
        receiver.kill("shutdown");

        assert!(!receiver.is_alive());
        assert_eq!(
            receiver.deliver(ForwardMessage::PushData("two".into())),
            Err(EndpointError::Terminated)
        );
        assert_eq!(
            inbox.recv().await,
            Some(ForwardMessage::PushData("one".into()))
        );
        assert_eq!(receiver.termination().wait().await, "shutdown");
    }
}
