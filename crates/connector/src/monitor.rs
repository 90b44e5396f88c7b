//! Liveness monitoring.
//!
//! A monitor is a one-shot, ownerless observation of a receiver endpoint. It
//! waits on the endpoint's [`TerminationSignal`] (never on the endpoint
//! itself) and, when that fires, posts exactly one [`EndpointLost`] event to
//! the owning client's mailbox. The notification travels on the mailbox, not
//! on the endpoint's data path, so "last message" and "endpoint died" are
//! never interleaved on one channel.
//!
//! Dropping the [`MonitorGuard`] removes the monitor.

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::client::ClientEvent;
use crate::ports::Endpoint;
use crate::{ClientHandle, ConnectionId, SlotKind};

/// Reason reported when an endpoint's liveness source disappears without an
/// explicit termination reason.
pub const NOPROC: &str = "noproc";

// ---------------------------------------------------------------------------
// Liveness source (endpoint side)
// ---------------------------------------------------------------------------

/// Liveness state owned by a receiver endpoint implementation.
///
/// Hands out [`TerminationSignal`]s to monitors and flips exactly once.
#[derive(Debug)]
pub struct Liveness {
    tx: watch::Sender<Option<String>>,
}

impl Liveness {
    /// A source that starts alive.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Marks the endpoint terminated. Only the first reason is kept.
    pub fn terminate(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                false
            } else {
                *current = Some(reason);
                true
            }
        });
    }

    /// Returns `true` until [`Liveness::terminate`] is called.
    pub fn is_alive(&self) -> bool {
        self.tx.borrow().is_none()
    }

    /// Returns a new signal observing this liveness source.
    pub fn signal(&self) -> TerminationSignal {
        TerminationSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once when the observed endpoint terminates.
#[derive(Debug)]
pub struct TerminationSignal {
    rx: watch::Receiver<Option<String>>,
}

impl TerminationSignal {
    /// Waits for termination and returns its reason.
    ///
    /// If the liveness source is dropped without a reason, [`NOPROC`] is
    /// returned.
    pub async fn wait(mut self) -> String {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone().unwrap_or_else(|| NOPROC.to_string());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor (client side)
// ---------------------------------------------------------------------------

/// The failure notification a monitor delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointLost {
    /// Slot that owned the connection when the monitor was armed.
    pub slot: SlotKind,
    /// Identity of the dead connection.
    pub connection: ConnectionId,
    /// Termination reason reported by the endpoint.
    pub reason: String,
}

/// Keeps a monitor armed. Dropping it demonitors.
#[derive(Debug)]
pub struct MonitorGuard {
    task: AbortHandle,
}

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Arms a monitor on `endpoint` that notifies `client` once when it dies.
///
/// Must be called from within a tokio runtime.
pub fn arm(
    slot: SlotKind,
    connection: ConnectionId,
    endpoint: &Endpoint,
    client: ClientHandle,
) -> MonitorGuard {
    let signal = endpoint.termination();
    let task = tokio::spawn(async move {
        let reason = signal.wait().await;
        debug!(%slot, %connection, %reason, "Monitored endpoint terminated");
        // The client may already have terminated; nothing to notify then.
        let _ = client.notify(ClientEvent::EndpointLost(EndpointLost {
            slot,
            connection,
            reason,
        }));
    });
    MonitorGuard {
        task: task.abort_handle(),
    }
}
