//! Main-world message handler.
//!
//! Receives player commands relayed over the window channel from the page
//! runtime and hands validated commands to the page automation callback.

// ============================================================================
// Imports
// ============================================================================

use tracing::warn;

use crate::messaging::transport::{MessageTransport, WindowChannel};
use crate::protocol::PlayerCommand;

// ============================================================================
// PageMessagingHandler
// ============================================================================

/// Handles messages arriving in the main world from the page runtime.
///
/// Self-registers its listener on construction. Envelopes from a foreign
/// origin are ignored; messages that are not valid player commands are
/// logged and swallowed, never surfaced as errors.
pub struct PageMessagingHandler {
    page_origin: String,
}

impl PageMessagingHandler {
    /// Creates a new handler listening on `channel`.
    ///
    /// Only envelopes whose sender origin equals `page_origin` are
    /// considered; everything else on the window is someone else's traffic.
    pub fn new(
        channel: &WindowChannel,
        page_origin: impl Into<String>,
        callback: impl Fn(PlayerCommand) + Send + Sync + 'static,
    ) -> Self {
        let page_origin = page_origin.into();

        let origin = page_origin.clone();
        channel.on_receive(Box::new(move |inbound| {
            if inbound.origin.as_deref() != Some(origin.as_str()) {
                return;
            }

            match PlayerCommand::from_value(&inbound.data) {
                Some(command) => callback(command),
                None => warn!(message = %inbound.data, "Received unknown message"),
            }
        }));

        Self { page_origin }
    }

    /// Returns the origin this handler accepts messages from.
    #[inline]
    #[must_use]
    pub fn page_origin(&self) -> &str {
        &self.page_origin
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::sync::mpsc::unbounded_channel;

    const ORIGIN: &str = "https://music.example.com";

    #[test]
    fn test_forwards_valid_commands() {
        let channel = WindowChannel::new(ORIGIN);
        let (tx, mut rx) = unbounded_channel();
        let handler = PageMessagingHandler::new(&channel, ORIGIN, move |command| {
            let _ = tx.send(command);
        });
        assert_eq!(handler.page_origin(), ORIGIN);

        channel.post(json!({ "type": "toggle-play-pause" }));
        assert_eq!(rx.try_recv().expect("command"), PlayerCommand::TogglePlayPause);
    }

    #[test]
    fn test_ignores_foreign_origin() {
        let channel = WindowChannel::new(ORIGIN);
        let foreign = channel.endpoint("https://evil.example.com");

        let (tx, mut rx) = unbounded_channel();
        let _handler = PageMessagingHandler::new(&channel, ORIGIN, move |command| {
            let _ = tx.send(command);
        });

        foreign.post(json!({ "type": "toggle-play-pause" }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_swallows_unknown_messages() {
        let channel = WindowChannel::new(ORIGIN);
        let (tx, mut rx) = unbounded_channel();
        let _handler = PageMessagingHandler::new(&channel, ORIGIN, move |command| {
            let _ = tx.send(command);
        });

        channel.post(json!({ "type": "request-initial-data" }));
        channel.post(json!("garbage"));
        assert!(rx.try_recv().is_err());
    }
}
