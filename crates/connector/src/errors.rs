//! Error types for the dataflow client.
//!
//! [`ConnectorError`] is what the client actor and its handles report.
//! The narrower [`RegistryError`], [`EndpointError`] and [`CapabilityError`]
//! are produced by the external collaborators behind the traits in
//! [`crate::ports`] and converted into [`ConnectorError`] where they matter.
//!
//! [`ConnectorError::is_fatal`] is the single place that decides whether an
//! error terminates the owning actor.

use thiserror::Error;

use crate::{LogicalName, SlotKind};

// ---------------------------------------------------------------------------
// Client-level errors
// ---------------------------------------------------------------------------

/// Errors raised by the client actor, its handles and its construction.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Every permitted resolution attempt for a logical name failed.
    ///
    /// Fatal: the establishing call path (start-up or reconnection) gives up
    /// and the owning actor terminates with this error.
    #[error("Discovery of '{name}' timed out after {attempts} attempt(s)")]
    DiscoveryTimeout {
        /// The logical name that never resolved.
        name: LogicalName,
        /// Number of resolution attempts made.
        attempts: u32,
    },

    /// The client configuration is unusable.
    ///
    /// Produced at construction time, before any connection attempt.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An event arrived that the client's mode or capability set does not
    /// accept (e.g. a `pull` trigger on a Push-mode client).
    ///
    /// The event is logged and dropped; the actor keeps running.
    #[error("Capability contract violation: {message}")]
    CapabilityContractViolation {
        /// Which event was rejected and why.
        message: String,
    },

    /// A trigger targeted a slot that holds no connection and never will
    /// (passive connection mode).
    #[error("No connection for the {slot} slot")]
    SlotUnavailable {
        /// The slot that could not be used.
        slot: SlotKind,
    },

    /// An application callback failed while producing or consuming data.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// The client actor has terminated; the event was not dispatched.
    #[error("Client has terminated")]
    ClientTerminated,

    /// The client task panicked or was cancelled.
    #[error("Client task aborted: {reason}")]
    ClientAborted {
        /// Description from the runtime.
        reason: String,
    },
}

impl ConnectorError {
    /// Returns `true` if this error terminates the owning actor.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryTimeout { .. }
                | Self::InvalidConfiguration { .. }
                | Self::ClientAborted { .. }
        )
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub(crate) fn violation(message: impl Into<String>) -> Self {
        Self::CapabilityContractViolation {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// Failure of the discovery registry.
///
/// The locator treats any registry failure as "not found" for that attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry could not be reached or did not converge.
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by a receiver endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// The endpoint has terminated.
    #[error("Endpoint terminated")]
    Terminated,

    /// The endpoint refused the registration handshake.
    #[error("Registration rejected: {0}")]
    Rejected(String),
}

/// Failure reported by an application-supplied capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// The capability does not implement the named function.
    #[error("Capability does not implement {0}")]
    NotImplemented(&'static str),

    /// The capability ran but failed.
    #[error("Capability failed: {0}")]
    Failed(String),
}
