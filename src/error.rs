//! Error types for the player relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! Most failure paths in the relay core deliberately degrade to "log and
//! continue" (malformed payloads, closed popups, transport hiccups). The
//! [`enum@Error`] type covers the remaining, genuinely fallible surfaces:
//! sending on a socket that is not open, requesting over a bus with no
//! receiver, and invalid configuration values.
//!
//! # Usage
//!
//! Fallible operations return [`Result<T>`] which uses [`enum@Error`]:
//!
//! ```ignore
//! use player_relay::{Result, Error};
//!
//! fn forward(client: &SocketClient, frame: &str) -> Result<()> {
//!     client.send(frame)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::InvalidUrl`] |
//! | Connection | [`Error::ConnectionClosed`] |
//! | Messaging | [`Error::NoReceiver`], [`Error::Protocol`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Server URL is not a valid WebSocket URL.
    ///
    /// Returned when a configured URL fails to parse or has a non-ws scheme.
    #[error("Invalid WebSocket URL: {url}")]
    InvalidUrl {
        /// The offending URL value.
        url: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// No socket is currently open.
    ///
    /// Returned when sending while the socket is closed or still connecting.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Messaging Errors
    // ========================================================================
    /// No receiver is registered on the bus.
    ///
    /// Returned by request/response sends when the other end (e.g. the popup)
    /// is not listening. Fire-and-forget sends swallow this case instead.
    #[error("No receiver registered on the message bus")]
    NoReceiver,

    /// Protocol violation or unexpected message.
    ///
    /// Returned when a reply or message format is invalid.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
