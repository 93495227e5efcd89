//! Popup message handler.
//!
//! Handles message communication with the popup over the extension-internal
//! bus. Inbound messages are validated and passed to the provided callback;
//! outbound messages are sent with [`PopupMessagingHandler::send_message`].

// ============================================================================
// Imports
// ============================================================================

use tracing::warn;

use crate::messaging::transport::{MessageTransport, Responder, RuntimeChannel};
use crate::protocol::{ExtensionMessage, is_request_initial_data};

// ============================================================================
// PopupMessagingHandler
// ============================================================================

/// Handles messages to and from the popup.
///
/// Self-registers its listener on construction. Only `request-initial-data`
/// messages reach the callback; unknown messages are logged and swallowed.
pub struct PopupMessagingHandler {
    channel: RuntimeChannel,
}

impl PopupMessagingHandler {
    /// Creates a new handler on the given bus.
    ///
    /// The callback receives the validated message and, when the popup
    /// awaits a reply, a [`Responder`] to answer it.
    pub fn new(
        channel: RuntimeChannel,
        callback: impl Fn(ExtensionMessage, Option<Responder>) + Send + Sync + 'static,
    ) -> Self {
        channel.on_receive(Box::new(move |inbound| {
            if !is_request_initial_data(&inbound.data) {
                warn!(message = %inbound.data, "Received unknown message");
                return;
            }

            if let Some(message) = ExtensionMessage::from_value(&inbound.data) {
                callback(message, inbound.responder);
            }
        }));

        Self { channel }
    }

    /// Sends a message to the popup.
    ///
    /// Delivery failures are swallowed: the popup may be closed and unable
    /// to receive, which is expected and non-actionable.
    pub fn send_message(&self, message: &ExtensionMessage) {
        match serde_json::to_value(message) {
            Ok(value) => self.channel.post(value),
            Err(e) => warn!(error = %e, "Failed to serialize outbound message"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
