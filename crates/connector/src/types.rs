//! Shared value types for the dataflow client.
//!
//! Unlike the identifiers in [`crate::identifiers`], these types carry values
//! with invariants (a limited retry count is never zero, a payload is opaque
//! bytes) and drive the client's routing decisions.

use std::num::NonZeroU32;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Payloads and messages
// ---------------------------------------------------------------------------

/// Opaque application data carried between a client and the pipeline server.
///
/// The client never inspects or re-encodes a payload; it is forwarded exactly
/// as the capability produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Wraps raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the payload, returning the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self(text.into_bytes())
    }
}

// ---------------------------------------------------------------------------

/// A message sent from a client to its forwarder.
///
/// The shape depends on the client's [`Mode`]: Push clients emit
/// [`ForwardMessage::PushData`], Pull clients answer demand with
/// [`ForwardMessage::SendData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardMessage {
    /// Data produced spontaneously by a Push-mode client.
    PushData(Payload),
    /// Data produced in response to demand by a Pull-mode client.
    SendData(Payload),
}

impl ForwardMessage {
    /// Returns the carried payload regardless of message shape.
    pub fn payload(&self) -> &Payload {
        match self {
            Self::PushData(p) | Self::SendData(p) => p,
        }
    }
}

// ---------------------------------------------------------------------------
// Operating mode
// ---------------------------------------------------------------------------

/// How a client produces data for its forwarder. Fixed for the client's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The client produces data whenever its runtime fires a `push` trigger.
    Push,
    /// The client produces data on demand (`pull` trigger). Also accepted as
    /// `"demand"` in configuration.
    #[serde(alias = "demand")]
    Pull,
}

impl Mode {
    /// Returns `true` if this mode needs a return channel from the server.
    pub fn requires_backward(self) -> bool {
        matches!(self, Self::Pull)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

// ---------------------------------------------------------------------------

/// Whether the client reaches out to its receivers at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Resolve and register with the receivers on start (normal operation).
    #[default]
    Client,
    /// Skip all outbound connection attempts. Used by test harnesses that
    /// drive the client's mailbox directly.
    Passive,
}

// ---------------------------------------------------------------------------

/// The two receiver slots a client may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    /// Carries client → server data. Always present.
    Forwarder,
    /// Carries server → client data. Present only with bidirectional flow.
    Backwarder,
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forwarder => write!(f, "forwarder"),
            Self::Backwarder => write!(f, "backwarder"),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// How many resolution attempts an establishment may make.
///
/// Serialised as a positive integer or the string `"infinity"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RetryCountRepr", into = "RetryCountRepr")]
pub enum RetryCount {
    /// Give up after this many attempts.
    Limited(NonZeroU32),
    /// Keep attempting until the endpoint appears.
    Unlimited,
}

impl RetryCount {
    /// Returns `true` if another attempt may follow `attempts_made` failed ones.
    pub fn permits(self, attempts_made: u32) -> bool {
        match self {
            Self::Limited(limit) => attempts_made < limit.get(),
            Self::Unlimited => true,
        }
    }
}

impl std::fmt::Display for RetryCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{n}"),
            Self::Unlimited => write!(f, "infinity"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RetryCountRepr {
    Count(u32),
    Keyword(String),
}

impl TryFrom<RetryCountRepr> for RetryCount {
    type Error = String;

    fn try_from(repr: RetryCountRepr) -> Result<Self, Self::Error> {
        match repr {
            RetryCountRepr::Count(n) => NonZeroU32::new(n)
                .map(Self::Limited)
                .ok_or_else(|| "max_retry_count must be at least 1".to_string()),
            RetryCountRepr::Keyword(k) if k == "infinity" || k == "infinite" => Ok(Self::Unlimited),
            RetryCountRepr::Keyword(k) => Err(format!(
                "unrecognised max_retry_count '{k}' (expected a positive integer or \"infinity\")"
            )),
        }
    }
}

impl From<RetryCount> for RetryCountRepr {
    fn from(count: RetryCount) -> Self {
        match count {
            RetryCount::Limited(n) => Self::Count(n.get()),
            RetryCount::Unlimited => Self::Keyword("infinity".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------

/// Retry budget and spacing for one connection establishment.
///
/// Derived from configuration for each establishment; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    count: RetryCount,
    interval: Duration,
}

impl RetryPolicy {
    /// Creates a policy from an attempt budget and the wait before each attempt.
    pub fn new(count: RetryCount, interval: Duration) -> Self {
        Self { count, interval }
    }

    /// A policy that makes exactly one attempt.
    pub fn single_attempt(interval: Duration) -> Self {
        Self::new(RetryCount::Limited(NonZeroU32::MIN), interval)
    }

    pub fn count(&self) -> RetryCount {
        self.count
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
