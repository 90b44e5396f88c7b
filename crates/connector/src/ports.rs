//! Port traits: the boundary between the client core and its collaborators.
//!
//! The core defines *what* it needs from the discovery registry, the
//! pipeline server's receiver endpoints and the embedding application; other
//! code supplies *how*. [`crate::local`] provides in-memory implementations
//! of the first two.
//!
//! | Trait | Implemented by | Invoked by |
//! |-------|----------------|------------|
//! | [`Registry`] | discovery service | [`crate::locator::EndpointLocator`] |
//! | [`ReceiverEndpoint`] | pipeline server | establisher, client actor |
//! | [`DataflowCapability`] | embedding application | client actor |

use std::sync::Arc;

use async_trait::async_trait;

use crate::monitor::TerminationSignal;
use crate::{
    CapabilityError, ClientHandle, EndpointError, ForwardMessage, LogicalName, Mode, Payload,
    RegistryError,
};

/// A shared, callable reference to a receiver endpoint.
pub type Endpoint = Arc<dyn ReceiverEndpoint>;

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Process-wide name registry mapping logical names to receiver endpoints.
///
/// The registry may be eventually consistent across nodes; callers force
/// convergence with [`Registry::sync`] before a lookup that must observe a
/// recent registration. The client core never writes to the registry.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Forces the local view of the registry to converge.
    async fn sync(&self) -> Result<(), RegistryError>;

    /// Looks up the endpoint currently registered under `name`.
    async fn lookup(&self, name: &LogicalName) -> Result<Option<Endpoint>, RegistryError>;
}

// ---------------------------------------------------------------------------
// Receivers
// ---------------------------------------------------------------------------

/// A receiver endpoint on the pipeline server (forwarder or backwarder).
#[async_trait]
pub trait ReceiverEndpoint: Send + Sync + 'static {
    /// Registration handshake announcing `client` to this receiver.
    ///
    /// Called once per established connection. The receiver may keep the
    /// handle to send backward data and `ready` signals to the client.
    async fn register(&self, client: ClientHandle) -> Result<(), EndpointError>;

    /// Delivers one message. Messages from one sender arrive in send order.
    ///
    /// [`EndpointError::Terminated`] keeps the message queued until the slot
    /// reconnects. [`EndpointError::Rejected`] drops it.
    fn deliver(&self, message: ForwardMessage) -> Result<(), EndpointError>;

    /// Returns `false` once the endpoint has terminated.
    fn is_alive(&self) -> bool;

    /// Returns a signal that resolves when the endpoint terminates.
    ///
    /// The signal does not keep the endpoint alive.
    fn termination(&self) -> TerminationSignal;
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// The set of capability functions an application implements.
///
/// Declared up front so the client can reject an incomplete implementation at
/// construction time instead of discovering it on the first trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Implements [`DataflowCapability::push_message`].
    pub push: bool,
    /// Implements [`DataflowCapability::pull_message`].
    pub pull: bool,
    /// Implements [`DataflowCapability::backward_message`].
    pub backward: bool,
}

impl Capabilities {
    /// A producer for Push mode.
    pub fn push() -> Self {
        Self {
            push: true,
            ..Self::default()
        }
    }

    /// A producer for Pull mode. Pull always needs a backward consumer too.
    pub fn pull() -> Self {
        Self {
            pull: true,
            backward: true,
            ..Self::default()
        }
    }

    /// Adds the backward consumer.
    pub fn with_backward(self) -> Self {
        Self {
            backward: true,
            ..self
        }
    }

    /// Checks that this set fits `mode` and the backward-flow setting.
    ///
    /// Exactly one of push / pull must be declared and it must match the mode;
    /// backward must be declared iff backward flow is enabled.
    pub fn check(self, mode: Mode, backward_enabled: bool) -> Result<(), String> {
        match (mode, self.push, self.pull) {
            (_, true, true) => {
                return Err("capability declares both push_message and pull_message".into())
            }
            (Mode::Push, false, _) => {
                return Err("push mode requires a push_message capability".into())
            }
            (Mode::Pull, _, false) => {
                return Err("pull mode requires a pull_message capability".into())
            }
            _ => {}
        }
        match (backward_enabled, self.backward) {
            (true, false) => Err("backward flow requires a backward_message capability".into()),
            (false, true) => Err("backward_message declared but backward flow is disabled".into()),
            _ => Ok(()),
        }
    }
}

/// Application-supplied data production and consumption.
///
/// Only the functions declared by [`DataflowCapability::capabilities`] are
/// ever called; the defaults report [`CapabilityError::NotImplemented`].
#[async_trait]
pub trait DataflowCapability: Send + 'static {
    /// Which of the functions below this implementation provides.
    fn capabilities(&self) -> Capabilities;

    /// Produces the next payload for a `push` trigger (Push mode).
    async fn push_message(&mut self) -> Result<Payload, CapabilityError> {
        Err(CapabilityError::NotImplemented("push_message"))
    }

    /// Produces the next payload for a `pull` trigger (Pull mode).
    async fn pull_message(&mut self) -> Result<Payload, CapabilityError> {
        Err(CapabilityError::NotImplemented("pull_message"))
    }

    /// Consumes a payload the server sent back. The result is not forwarded.
    async fn backward_message(&mut self, payload: Payload) -> Result<(), CapabilityError> {
        let _ = payload;
        Err(CapabilityError::NotImplemented("backward_message"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_sets_match_their_modes() {
        assert!(Capabilities::push().check(Mode::Push, false).is_ok());
        assert!(Capabilities::push().with_backward().check(Mode::Push, true).is_ok());
        assert!(Capabilities::pull().check(Mode::Pull, true).is_ok());
    }

    #[test]
    fn mismatched_capability_sets_are_rejected() {
        assert!(Capabilities::push().check(Mode::Pull, true).is_err());
        assert!(Capabilities::pull().check(Mode::Push, true).is_err());
        assert!(Capabilities::push().check(Mode::Push, true).is_err());
        assert!(Capabilities::push().with_backward().check(Mode::Push, false).is_err());

        let both = Capabilities {
            push: true,
            pull: true,
            backward: true,
        };
        assert!(both.check(Mode::Pull, true).is_err());
    }
}
