//! Newtype identifiers.
//!
//! Every concept with an identity is a distinct newtype. A [`ClientId`] can
//! never be handed where a [`ConnectionId`] is expected even though both wrap
//! a UUID, and a [`LogicalName`] is guaranteed non-empty once constructed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for UUID-wrapped newtypes (internally generated).
// Generates: struct (Copy), new_random(), from_uuid(), as_uuid(), Display.
// ---------------------------------------------------------------------------
macro_rules! uuid_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying [`Uuid`].
            pub fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed
// ---------------------------------------------------------------------------

uuid_id! {
    /// Identifies one client instance (one actor task).
    ///
    /// Generated at spawn time and attached to every span the client emits so
    /// that activity from concurrent clients can be told apart.
    ClientId
}

uuid_id! {
    /// Identifies one established connection to a receiver endpoint.
    ///
    /// A fresh id is minted for every successful establishment, including
    /// reconnections to the same logical name. Monitor notifications carry it
    /// so the client can tell which slot owned the dead connection.
    ConnectionId
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// A discovery name under which a receiver registers itself
    /// (e.g. `"dataflow_forwarder"`).
    ///
    /// Stable across receiver restarts; decoupled from any process or address.
    LogicalName
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_name_rejects_empty() {
        assert!(LogicalName::new("").is_none());
        assert_eq!(
            LogicalName::new("sink").map(|n| n.to_string()),
            Some("sink".to_string())
        );
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new_random(), ConnectionId::new_random());
    }
}
