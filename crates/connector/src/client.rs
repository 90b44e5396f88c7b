//! The client actor and its handle.
//!
//! Each [`DataflowClient`] is one tokio task draining one unbounded mailbox.
//! Events are handled to completion in arrival order; a reconnection in
//! progress holds back every later event for that client, and only that
//! client. Many clients run side by side without sharing state.
//!
//! ## Event handling
//!
//! | Event | Accepted in | Action |
//! |-------|-------------|--------|
//! | [`ClientEvent::Push`] | Push mode | `push_message()` → [`ForwardMessage::PushData`] to the forwarder |
//! | [`ClientEvent::Pull`] | Pull mode | `pull_message()` → [`ForwardMessage::SendData`] to the forwarder |
//! | [`ClientEvent::Forward`] / [`ClientEvent::Backward`] | backward flow enabled | `backward_message(payload)` |
//! | [`ClientEvent::Ready`] | Pull mode | establish the backwarder with a single attempt if it is not live |
//! | [`ClientEvent::EndpointLost`] | always | clear the owning slot and re-establish it |
//! | [`ClientEvent::Stop`] | always | terminate cleanly |
//!
//! Events that do not fit the mode are capability contract violations: they
//! are logged and dropped without touching any slot.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::establisher::ConnectionEstablisher;
use crate::locator::EndpointLocator;
use crate::monitor::EndpointLost;
use crate::ports::{DataflowCapability, Registry};
use crate::slot::{ReceiverSlot, Receivers, SlotStatus};
use crate::{
    ClientConfig, ClientId, ClientSettings, ConnectionMode, ConnectorError, ForwardMessage, Mode,
    Payload, RetryPolicy, SlotKind,
};

// ---------------------------------------------------------------------------
// Mailbox events
// ---------------------------------------------------------------------------

/// Everything a client actor reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Local trigger: produce and push one payload (Push mode).
    Push,
    /// Local trigger: produce one payload in answer to demand (Pull mode).
    Pull,
    /// Inbound forward data from the backwarder.
    Forward(Payload),
    /// Inbound backward data from the backwarder.
    Backward(Payload),
    /// Readiness signal that (re)arms the backwarder in Pull mode.
    Ready,
    /// A monitored receiver terminated.
    EndpointLost(EndpointLost),
    /// Terminate the client.
    Stop,
}

// ---------------------------------------------------------------------------
// Observable status
// ---------------------------------------------------------------------------

/// Lifecycle state of a client as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    /// Not started, or running in passive connection mode.
    Disconnected,
    /// At least one required slot has no live connection yet.
    Connecting,
    /// Every required slot holds a live connection.
    Ready,
    /// The actor has stopped; handles reject further events.
    Terminated,
}

/// Snapshot of a client published after every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientStatus {
    /// The client this snapshot describes.
    pub client: ClientId,
    /// Dataflow mode the client runs in.
    pub mode: Mode,
    /// Lifecycle state of the client as a whole.
    pub state: ClientState,
    /// The forwarder slot.
    pub forwarder: SlotStatus,
    /// The backwarder slot, present iff backward flow is enabled.
    pub backwarder: Option<SlotStatus>,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable address of a client actor.
///
/// Used by the embedding runtime to fire triggers, and handed to receivers
/// during the registration handshake so they can send data back.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    mailbox: mpsc::UnboundedSender<ClientEvent>,
    status: watch::Receiver<ClientStatus>,
}

impl ClientHandle {
    /// Identity of the client this handle addresses.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Fires a `push` trigger.
    pub fn push(&self) -> Result<(), ConnectorError> {
        self.notify(ClientEvent::Push)
    }

    /// Fires a `pull` trigger.
    pub fn pull(&self) -> Result<(), ConnectorError> {
        self.notify(ClientEvent::Pull)
    }

    /// Delivers inbound forward data to the client.
    pub fn forward(&self, payload: Payload) -> Result<(), ConnectorError> {
        self.notify(ClientEvent::Forward(payload))
    }

    /// Delivers inbound backward data to the client.
    pub fn backward(&self, payload: Payload) -> Result<(), ConnectorError> {
        self.notify(ClientEvent::Backward(payload))
    }

    /// Sends the readiness signal.
    pub fn ready(&self) -> Result<(), ConnectorError> {
        self.notify(ClientEvent::Ready)
    }

    /// Asks the client to terminate once earlier events are handled.
    pub fn stop(&self) -> Result<(), ConnectorError> {
        self.notify(ClientEvent::Stop)
    }

    /// Returns `true` once the client no longer accepts events.
    pub fn is_terminated(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Returns the latest published status.
    pub fn status(&self) -> ClientStatus {
        self.status.borrow().clone()
    }

    /// Waits until the published status satisfies `predicate`.
    ///
    /// Fails with [`ConnectorError::ClientTerminated`] if the client stops
    /// without ever satisfying it.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&ClientStatus) -> bool,
    ) -> Result<ClientStatus, ConnectorError> {
        let mut status = self.status.clone();
        let result = status
            .wait_for(predicate)
            .await
            .map(|s| s.clone())
            .map_err(|_| ConnectorError::ClientTerminated);
        result
    }

    pub(crate) fn notify(&self, event: ClientEvent) -> Result<(), ConnectorError> {
        self.mailbox
            .send(event)
            .map_err(|_| ConnectorError::ClientTerminated)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A running client actor.
///
/// The task ends with `Ok(())` after a [`ClientHandle::stop`], or once every
/// handle is gone (including those held by receivers and monitors), and with
/// the fatal error otherwise (e.g. [`ConnectorError::DiscoveryTimeout`]).
#[derive(Debug)]
pub struct DataflowClient {
    handle: ClientHandle,
    task: JoinHandle<Result<(), ConnectorError>>,
}

impl DataflowClient {
    /// Validates `config` against `capability` and spawns the client actor.
    ///
    /// Configuration and capability problems fail here with
    /// [`ConnectorError::InvalidConfiguration`], before any connection
    /// attempt. Must be called from within a tokio runtime.
    pub fn spawn(
        config: &ClientConfig,
        registry: Arc<dyn Registry>,
        capability: impl DataflowCapability,
    ) -> Result<Self, ConnectorError> {
        let settings = config.validate()?;
        capability
            .capabilities()
            .check(settings.mode, settings.backward_enabled)
            .map_err(ConnectorError::invalid_config)?;

        let id = ClientId::new_random();
        let receivers = Receivers::new(
            settings.forwarder.clone(),
            settings.backward_enabled.then(|| settings.backwarder.clone()),
        );
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ClientStatus {
            client: id,
            mode: settings.mode,
            state: ClientState::Disconnected,
            forwarder: receivers.forwarder().status(),
            backwarder: receivers.backwarder().map(ReceiverSlot::status),
        });
        let handle = ClientHandle {
            id,
            mailbox: mailbox_tx,
            status: status_rx,
        };

        let actor = ClientActor {
            id,
            establisher: ConnectionEstablisher::new(EndpointLocator::new(registry)),
            settings,
            receivers,
            capability: Box::new(capability),
            mailbox: handle.mailbox.downgrade(),
            status_rx: handle.status.clone(),
            state: ClientState::Disconnected,
            status: status_tx,
        };
        let task = tokio::spawn(actor.run(mailbox_rx));

        Ok(Self { handle, task })
    }

    /// Returns a new handle to the client.
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Waits for the actor to terminate and returns its outcome.
    ///
    /// The handle owned by `self` is released first, so a client nobody else
    /// can reach terminates on its own.
    pub async fn join(self) -> Result<(), ConnectorError> {
        let Self { handle, task } = self;
        drop(handle);
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(ConnectorError::ClientAborted {
                reason: e.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

enum Flow {
    Continue,
    Stop,
}

struct ClientActor {
    id: ClientId,
    settings: ClientSettings,
    receivers: Receivers,
    capability: Box<dyn DataflowCapability>,
    establisher: ConnectionEstablisher,
    // Weak so that dropping every external handle closes the mailbox.
    mailbox: mpsc::WeakUnboundedSender<ClientEvent>,
    status_rx: watch::Receiver<ClientStatus>,
    state: ClientState,
    status: watch::Sender<ClientStatus>,
}

impl ClientActor {
    #[instrument(name = "client", skip_all, fields(client = %self.id, mode = %self.settings.mode))]
    async fn run(
        mut self,
        mut mailbox: mpsc::UnboundedReceiver<ClientEvent>,
    ) -> Result<(), ConnectorError> {
        let outcome = self.process(&mut mailbox).await;
        match &outcome {
            Ok(()) => info!("Client stopped"),
            Err(e) => error!(error = %e, "Client terminated"),
        }

        // No flush: whatever is still queued is discarded.
        mailbox.close();
        self.receivers.teardown();
        self.state = ClientState::Terminated;
        self.publish();
        outcome
    }

    async fn process(
        &mut self,
        mailbox: &mut mpsc::UnboundedReceiver<ClientEvent>,
    ) -> Result<(), ConnectorError> {
        self.start().await?;

        while let Some(event) = mailbox.recv().await {
            match self.handle_event(event).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(error = %e, "Event dropped"),
            }
        }
        info!("Every handle dropped");
        Ok(())
    }

    async fn start(&mut self) -> Result<(), ConnectorError> {
        if self.settings.connection_mode == ConnectionMode::Passive {
            info!("Passive connection mode; not connecting");
            return Ok(());
        }

        self.state = ClientState::Connecting;
        self.connect(SlotKind::Forwarder, self.settings.retry).await?;

        // In Pull mode the backwarder is armed by the ready signal.
        if self.settings.backward_enabled && self.settings.mode == Mode::Push {
            self.connect(SlotKind::Backwarder, self.settings.retry).await?;
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: ClientEvent) -> Result<Flow, ConnectorError> {
        match event {
            ClientEvent::Push => self.produce(Mode::Push).await?,
            ClientEvent::Pull => self.produce(Mode::Pull).await?,
            ClientEvent::Forward(payload) | ClientEvent::Backward(payload) => {
                self.consume(payload).await?
            }
            ClientEvent::Ready => self.rearm_backwarder().await?,
            ClientEvent::EndpointLost(lost) => self.recover(lost).await?,
            ClientEvent::Stop => return Ok(Flow::Stop),
        }
        Ok(Flow::Continue)
    }

    async fn produce(&mut self, trigger: Mode) -> Result<(), ConnectorError> {
        if trigger != self.settings.mode {
            return Err(ConnectorError::violation(format!(
                "{trigger} trigger on a {} client",
                self.settings.mode
            )));
        }
        if self.settings.connection_mode == ConnectionMode::Passive {
            return Err(ConnectorError::SlotUnavailable {
                slot: SlotKind::Forwarder,
            });
        }

        let message = match trigger {
            Mode::Push => ForwardMessage::PushData(self.capability.push_message().await?),
            Mode::Pull => ForwardMessage::SendData(self.capability.pull_message().await?),
        };
        debug!(bytes = message.payload().len(), "Forwarding payload");
        self.receivers.forwarder_mut().send(message);
        self.publish();
        Ok(())
    }

    async fn consume(&mut self, payload: Payload) -> Result<(), ConnectorError> {
        if !self.settings.backward_enabled {
            return Err(ConnectorError::violation(
                "inbound data on a client without backward flow",
            ));
        }
        self.capability.backward_message(payload).await?;
        Ok(())
    }

    async fn rearm_backwarder(&mut self) -> Result<(), ConnectorError> {
        if self.settings.mode != Mode::Pull {
            return Err(ConnectorError::violation(format!(
                "ready signal on a {} client",
                self.settings.mode
            )));
        }
        if self.settings.connection_mode == ConnectionMode::Passive {
            return Err(ConnectorError::SlotUnavailable {
                slot: SlotKind::Backwarder,
            });
        }
        if self.receivers.backwarder().is_some_and(ReceiverSlot::is_live) {
            debug!("Backwarder already live; ready signal ignored");
            return Ok(());
        }

        let policy = RetryPolicy::single_attempt(self.settings.retry.interval());
        self.connect(SlotKind::Backwarder, policy).await
    }

    #[instrument(skip_all, fields(slot = %lost.slot, connection = %lost.connection))]
    async fn recover(&mut self, lost: EndpointLost) -> Result<(), ConnectorError> {
        let Some(kind) = self.receivers.owner_of(lost.connection) else {
            debug!("Notification for a connection no slot holds; ignored");
            return Ok(());
        };

        warn!(reason = %lost.reason, "Receiver lost; reconnecting");
        if let Some(slot) = self.receivers.get_mut(kind) {
            slot.clear_for_reconnect();
        }
        self.connect(kind, self.settings.retry).await?;
        info!("Receiver recovered");
        Ok(())
    }

    /// Runs the establisher for `kind` and installs the result.
    async fn connect(&mut self, kind: SlotKind, policy: RetryPolicy) -> Result<(), ConnectorError> {
        let Some(slot) = self.receivers.get_mut(kind) else {
            return Err(ConnectorError::SlotUnavailable { slot: kind });
        };
        slot.begin_connecting();
        let name = slot.name().clone();
        self.refresh_state();

        let client = self.handle().ok_or(ConnectorError::ClientTerminated)?;
        let connection = self
            .establisher
            .establish(kind, &name, &policy, &client)
            .await?;

        if let Some(slot) = self.receivers.get_mut(kind) {
            slot.attach(connection);
        }
        self.refresh_state();
        Ok(())
    }

    /// A strong handle for the establisher, while anyone still holds one.
    fn handle(&self) -> Option<ClientHandle> {
        Some(ClientHandle {
            id: self.id,
            mailbox: self.mailbox.upgrade()?,
            status: self.status_rx.clone(),
        })
    }

    fn refresh_state(&mut self) {
        if self.state != ClientState::Terminated
            && self.settings.connection_mode == ConnectionMode::Client
        {
            self.state = if self.receivers.all_live() {
                ClientState::Ready
            } else {
                ClientState::Connecting
            };
        }
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(ClientStatus {
            client: self.id,
            mode: self.settings.mode,
            state: self.state,
            forwarder: self.receivers.forwarder().status(),
            backwarder: self.receivers.backwarder().map(ReceiverSlot::status),
        });
    }
}
