//! Extension-internal messages and connection status.
//!
//! These messages travel on the extension's internal bus between the page
//! runtime and the popup. They are distinct from [`PlayerCommand`]s, which
//! arrive from the controller server.
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | `request-initial-data` | popup → page | Ask for the current state |
//! | `initial-data` | page → popup | Reply with the connection status |
//! | `connection-status` | page → popup | One-way status broadcast |
//!
//! [`PlayerCommand`]: crate::protocol::PlayerCommand

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Tri-state summary of the relay's connection to the controller server.
///
/// Always derived from the desired-enabled flag and the socket ready state,
/// never stored directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// The connection is disabled.
    Disconnected,
    /// The connection is enabled but the socket is not open yet.
    Connecting,
    /// The socket is open.
    Connected,
}

impl ConnectionStatus {
    /// Returns the wire representation of the status.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All connection statuses in wire form, used by the shape validators.
const CONNECTION_STATUSES: [&str; 3] = ["disconnected", "connecting", "connected"];

// ============================================================================
// ExtensionMessage
// ============================================================================

/// Initial state carried by an `initial-data` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialData {
    /// Connection status at the time of the request.
    #[serde(rename = "connectionStatus")]
    pub connection_status: ConnectionStatus,
}

/// A message on the extension-internal bus.
///
/// # Format
///
/// ```json
/// { "type": "connection-status", "payload": "connected" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExtensionMessage {
    /// Popup asks the page runtime for its current state.
    RequestInitialData,

    /// Reply to [`ExtensionMessage::RequestInitialData`].
    InitialData {
        /// The state snapshot.
        payload: InitialData,
    },

    /// One-way broadcast of a status change.
    ConnectionStatus {
        /// The new connection status.
        payload: ConnectionStatus,
    },
}

impl ExtensionMessage {
    /// Parses a raw JSON value into a typed extension message.
    ///
    /// Returns `None` unless one of the shape validators accepts the value.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        if !is_request_initial_data(value)
            && !is_initial_data(value)
            && !is_connection_status(value)
        {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

// ============================================================================
// Validators
// ============================================================================

/// Returns `true` if the value is a `request-initial-data` message.
#[must_use]
pub fn is_request_initial_data(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get("type"))
        .and_then(Value::as_str)
        == Some("request-initial-data")
}

/// Returns `true` if the value is an `initial-data` message.
#[must_use]
pub fn is_initial_data(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if obj.get("type").and_then(Value::as_str) != Some("initial-data") {
        return false;
    }

    obj.get("payload")
        .and_then(Value::as_object)
        .and_then(|payload| payload.get("connectionStatus"))
        .and_then(Value::as_str)
        .is_some_and(|status| CONNECTION_STATUSES.contains(&status))
}

/// Returns `true` if the value is a `connection-status` message.
#[must_use]
pub fn is_connection_status(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if obj.get("type").and_then(Value::as_str) != Some("connection-status") {
        return false;
    }

    obj.get("payload")
        .and_then(Value::as_str)
        .is_some_and(|status| CONNECTION_STATUSES.contains(&status))
}

// ============================================================================
// Tests
// ============================================================================
