//! Shared fixtures for the connector integration tests.

#![allow(dead_code)]

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use connector::local::{LocalReceiver, LocalRegistry, ReceiverInbox};
use connector::{
    Capabilities, CapabilityError, ClientConfig, ClientHandle, DataflowCapability,
    DataflowClient, LogicalName, Mode, Payload, RetryCount,
};
use tokio::sync::mpsc;

pub const FORWARDER: &str = "test_forwarder";
pub const BACKWARDER: &str = "test_backwarder";

pub fn name(value: &str) -> LogicalName {
    LogicalName::new(value).unwrap()
}

pub fn attempts(n: u32) -> RetryCount {
    RetryCount::Limited(NonZeroU32::new(n).unwrap())
}

/// A client config with test receiver names and a 100ms interval.
pub fn config(mode: Mode, max_retry_count: RetryCount) -> ClientConfig {
    let mut config = ClientConfig::new(mode);
    config.forwarder_name = FORWARDER.to_string();
    config.backwarder_name = BACKWARDER.to_string();
    config.max_retry_count = max_retry_count;
    config.retry_interval_ms = 100;
    config
}

/// Creates a receiver and stages it in `registry` under `name`.
pub fn serve(registry: &LocalRegistry, name: &str) -> (Arc<LocalReceiver>, ReceiverInbox) {
    let (receiver, inbox) = LocalReceiver::new();
    registry.register(self::name(name), receiver.clone());
    (receiver, inbox)
}

/// A passive client, useful only for the handle it provides.
pub fn passive_handle(registry: Arc<LocalRegistry>) -> (DataflowClient, ClientHandle) {
    let mut config = config(Mode::Push, attempts(1));
    config.connection_mode = connector::ConnectionMode::Passive;
    let client = DataflowClient::spawn(&config, registry, TestCapability::push()).unwrap();
    let handle = client.handle();
    (client, handle)
}

/// Numbers its payloads `msg-1`, `msg-2`, ... and reports backward payloads
/// on a channel.
pub struct TestCapability {
    capabilities: Capabilities,
    produced: u32,
    backward: Option<mpsc::UnboundedSender<Payload>>,
}

impl TestCapability {
    pub fn push() -> Self {
        Self {
            capabilities: Capabilities::push(),
            produced: 0,
            backward: None,
        }
    }

    pub fn push_with_backward() -> (Self, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let capability = Self {
            capabilities: Capabilities::push().with_backward(),
            produced: 0,
            backward: Some(tx),
        };
        (capability, rx)
    }

    pub fn pull() -> (Self, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let capability = Self {
            capabilities: Capabilities::pull(),
            produced: 0,
            backward: Some(tx),
        };
        (capability, rx)
    }

    fn next(&mut self) -> Payload {
        self.produced += 1;
        Payload::from(format!("msg-{}", self.produced))
    }
}

#[async_trait]
impl DataflowCapability for TestCapability {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn push_message(&mut self) -> Result<Payload, CapabilityError> {
        Ok(self.next())
    }

    async fn pull_message(&mut self) -> Result<Payload, CapabilityError> {
        Ok(self.next())
    }

    async fn backward_message(&mut self, payload: Payload) -> Result<(), CapabilityError> {
        match &self.backward {
            Some(tx) => tx
                .send(payload)
                .map_err(|_| CapabilityError::Failed("observer gone".into())),
            None => Err(CapabilityError::NotImplemented("backward_message")),
        }
    }
}
