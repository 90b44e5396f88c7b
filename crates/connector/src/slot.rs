//! Receiver slots: the client's record of each receiver connection.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::warn;

use crate::establisher::Connection;
use crate::{ConnectionId, EndpointError, ForwardMessage, LogicalName, SlotKind, Timestamp};

/// Connection state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// No connection and none being made.
    Empty,
    /// An establishment for this slot is in progress.
    Connecting,
    /// Holds a live, monitored connection.
    Live,
}

/// Observable snapshot of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    /// Discovery name of the receiver.
    pub name: LogicalName,
    /// Connection state.
    pub state: SlotState,
    /// Identity of the live connection, if any.
    pub connection: Option<ConnectionId>,
    /// When the live connection was established.
    pub connected_at: Option<Timestamp>,
    /// Reconnections triggered by monitor notifications so far.
    pub reconnects: u32,
    /// Messages waiting for the slot to recover.
    pub pending: usize,
}

/// Outcome of one delivery attempt.
enum Delivery {
    Sent,
    Dropped,
    Deferred(ForwardMessage),
}

/// One receiver connection owned by the client actor.
///
/// Holds at most one connection. Messages that cannot be delivered because the
/// endpoint died are queued, and every later send tries to flush the queue
/// first; attaching a fresh connection flushes it too.
#[derive(Debug)]
pub struct ReceiverSlot {
    kind: SlotKind,
    name: LogicalName,
    connection: Option<Connection>,
    connecting: bool,
    pending: VecDeque<ForwardMessage>,
    reconnects: u32,
}

impl ReceiverSlot {
    /// An empty slot for the receiver registered under `name`.
    pub fn new(kind: SlotKind, name: LogicalName) -> Self {
        Self {
            kind,
            name,
            connection: None,
            connecting: false,
            pending: VecDeque::new(),
            reconnects: 0,
        }
    }

    /// Which receiver this slot tracks.
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Discovery name of the receiver.
    pub fn name(&self) -> &LogicalName {
        &self.name
    }

    /// Returns `true` while the slot holds a connection.
    pub fn is_live(&self) -> bool {
        self.connection.is_some()
    }

    /// Returns `true` if this slot currently holds `connection`.
    pub fn owns(&self, connection: ConnectionId) -> bool {
        self.connection.as_ref().map(Connection::id) == Some(connection)
    }

    /// Marks an establishment in progress.
    pub fn begin_connecting(&mut self) {
        self.connecting = true;
    }

    /// Drops the current connection (and its monitor), counting a reconnect.
    pub fn clear_for_reconnect(&mut self) {
        self.connection = None;
        self.connecting = true;
        self.reconnects = self.reconnects.saturating_add(1);
    }

    /// Installs a fresh connection and flushes queued messages in order.
    pub fn attach(&mut self, connection: Connection) {
        self.connecting = false;
        self.connection = Some(connection);
        self.flush();
    }

    /// Tears the slot down. Queued messages are discarded.
    pub fn teardown(&mut self) {
        self.connection = None;
        self.connecting = false;
        self.pending.clear();
    }

    /// Sends `message` behind anything already queued.
    ///
    /// Messages stay queued only while the endpoint is down or reconnecting.
    /// A message the live endpoint refuses is logged and dropped.
    pub fn send(&mut self, message: ForwardMessage) {
        self.pending.push_back(message);
        self.flush();
    }

    fn flush(&mut self) {
        while let Some(message) = self.pending.pop_front() {
            if let Delivery::Deferred(message) = self.deliver(message) {
                self.pending.push_front(message);
                break;
            }
        }
    }

    fn deliver(&self, message: ForwardMessage) -> Delivery {
        let Some(connection) = self.connection.as_ref().filter(|c| c.is_alive()) else {
            return Delivery::Deferred(message);
        };
        match connection.deliver(message.clone()) {
            Ok(()) => Delivery::Sent,
            Err(EndpointError::Terminated) => {
                warn!(slot = %self.kind, "Endpoint terminated; queueing until reconnect");
                Delivery::Deferred(message)
            }
            Err(e @ EndpointError::Rejected(_)) => {
                warn!(slot = %self.kind, error = %e, "Message refused by receiver; dropped");
                Delivery::Dropped
            }
        }
    }

    /// Snapshot of the slot for [`crate::ClientStatus`].
    pub fn status(&self) -> SlotStatus {
        let state = match (&self.connection, self.connecting) {
            (Some(_), _) => SlotState::Live,
            (None, true) => SlotState::Connecting,
            (None, false) => SlotState::Empty,
        };
        SlotStatus {
            name: self.name.clone(),
            state,
            connection: self.connection.as_ref().map(Connection::id),
            connected_at: self.connection.as_ref().map(Connection::connected_at),
            reconnects: self.reconnects,
            pending: self.pending.len(),
        }
    }
}

/// The forwarder slot and the optional backwarder slot.
#[derive(Debug)]
pub struct Receivers {
    forwarder: ReceiverSlot,
    backwarder: Option<ReceiverSlot>,
}

impl Receivers {
    /// Empty slots; the backwarder exists only if a name is given.
    pub fn new(forwarder: LogicalName, backwarder: Option<LogicalName>) -> Self {
        Self {
            forwarder: ReceiverSlot::new(SlotKind::Forwarder, forwarder),
            backwarder: backwarder.map(|name| ReceiverSlot::new(SlotKind::Backwarder, name)),
        }
    }

    pub fn forwarder(&self) -> &ReceiverSlot {
        &self.forwarder
    }

    pub fn forwarder_mut(&mut self) -> &mut ReceiverSlot {
        &mut self.forwarder
    }

    pub fn backwarder(&self) -> Option<&ReceiverSlot> {
        self.backwarder.as_ref()
    }

    /// The slot for `kind`, if the client has one.
    pub fn get_mut(&mut self, kind: SlotKind) -> Option<&mut ReceiverSlot> {
        match kind {
            SlotKind::Forwarder => Some(&mut self.forwarder),
            SlotKind::Backwarder => self.backwarder.as_mut(),
        }
    }

    /// Finds the slot holding `connection`. At most one slot can match.
    pub fn owner_of(&self, connection: ConnectionId) -> Option<SlotKind> {
        std::iter::once(&self.forwarder)
            .chain(self.backwarder.as_ref())
            .find(|slot| slot.owns(connection))
            .map(ReceiverSlot::kind)
    }

    /// Returns `true` when every present slot holds a live connection.
    pub fn all_live(&self) -> bool {
        self.forwarder.is_live() && self.backwarder.as_ref().map_or(true, ReceiverSlot::is_live)
    }

    /// Tears down every slot.
    pub fn teardown(&mut self) {
        self.forwarder.teardown();
        if let Some(slot) = self.backwarder.as_mut() {
            slot.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_slot_is_empty() {
        let slot = ReceiverSlot::new(SlotKind::Forwarder, LogicalName::new("f").unwrap());
        let status = slot.status();
        assert_eq!(status.state, SlotState::Empty);
        assert_eq!(status.connection, None);
        assert_eq!(status.reconnects, 0);
    }

    #[test]
    fn messages_queue_while_disconnected() {
        let mut slot = ReceiverSlot::new(SlotKind::Forwarder, LogicalName::new("f").unwrap());
        slot.clear_for_reconnect();
        slot.send(ForwardMessage::PushData("a".into()));
        slot.send(ForwardMessage::PushData("b".into()));

        let status = slot.status();
        assert_eq!(status.state, SlotState::Connecting);
        assert_eq!(status.pending, 2);
        assert_eq!(status.reconnects, 1);

        slot.teardown();
        assert_eq!(slot.status().pending, 0);
        assert_eq!(slot.status().state, SlotState::Empty);
    }

    #[test]
    fn receivers_without_backwarder() {
        let receivers = Receivers::new(LogicalName::new("f").unwrap(), None);
        assert!(receivers.backwarder().is_none());
        assert!(!receivers.all_live());
        assert_eq!(receivers.owner_of(ConnectionId::new_random()), None);
    }
}
