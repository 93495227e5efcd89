//! Cross-context messaging.
//!
//! The relay spans three isolated contexts: the page runtime holding the
//! socket, the main world driving the player, and the popup showing status.
//! This module provides the transports between them and the handlers that
//! validate traffic at each boundary.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `transport` | Window and runtime message channels |
//! | `page` | Main-world command receiver |
//! | `popup` | Popup request/status handler |

// ============================================================================
// Submodules
// ============================================================================

/// Main-world message handler.
pub mod page;

/// Popup message handler.
pub mod popup;

/// Message transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use page::PageMessagingHandler;
pub use popup::PopupMessagingHandler;
pub use transport::{
    Inbound, MessageTransport, ReceiveCallback, Responder, RuntimeChannel, WindowChannel,
};
