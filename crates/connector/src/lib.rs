//! Resilient dataflow client for Flowlink pipelines.
//!
//! A [`DataflowClient`] attaches an application-defined producer/consumer to
//! a pipeline server. It locates the server's receiver endpoints by logical
//! name, connects with bounded or unbounded retry, monitors every connection,
//! reconnects transparently when a receiver dies, and routes data according
//! to its [`Mode`]. The application only implements
//! [`ports::DataflowCapability`].
//!
//! ## Architectural Layer
//!
//! **Core + port definitions.** The registry, the receivers and the
//! application are reached only through the traits in [`ports`]; the
//! [`local`] module ships in-memory implementations of the first two.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`LogicalName`, `ClientId`, `ConnectionId`) |
//! | [`types`] | Value types (`Payload`, `Mode`, `RetryPolicy`, ...) |
//! | [`errors`] | `ConnectorError` and collaborator error types |
//! | [`config`] | `ClientConfig` and validated `ClientSettings` |
//! | [`ports`] | `Registry`, `ReceiverEndpoint`, `DataflowCapability` |
//! | [`locator`] | Single-attempt name resolution |
//! | [`establisher`] | Retrying establishment, handshake, monitor arming |
//! | [`monitor`] | One-shot liveness monitors |
//! | [`slot`] | Forwarder / backwarder slot bookkeeping |
//! | [`client`] | The client actor, its handle and status |
//! | [`local`] | In-memory registry and receiver |

pub mod client;
pub mod config;
pub mod errors;
pub mod establisher;
pub mod identifiers;
pub mod local;
pub mod locator;
pub mod monitor;
pub mod ports;
pub mod slot;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use client::{ClientEvent, ClientHandle, ClientState, ClientStatus, DataflowClient};
pub use config::{ClientConfig, ClientSettings};
pub use errors::{CapabilityError, ConnectorError, EndpointError, RegistryError};
pub use identifiers::{ClientId, ConnectionId, LogicalName};
pub use ports::{Capabilities, DataflowCapability, Endpoint, ReceiverEndpoint, Registry};
pub use slot::{SlotState, SlotStatus};
pub use types::{
    ConnectionMode, ForwardMessage, Mode, Payload, RetryCount, RetryPolicy, SlotKind, Timestamp,
};
