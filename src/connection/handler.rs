//! Connection state handler.
//!
//! [`ConnectionHandler`] owns the desired-enabled flag and server URL, drives
//! one [`SocketClient`] accordingly, derives the tri-state
//! [`ConnectionStatus`], and notifies an observer on every status change.
//!
//! # State Machine
//!
//! ```text
//! disconnected --(enable)--> connecting --(socket open)--> connected
//! connected --(unsolicited close)--> connecting
//! connected | connecting --(disable)--> disconnected
//! ```
//!
//! Both settings are applied through the transition-coalescing discipline of
//! [`TransitionState`]: a second request during an in-flight transition lands
//! in the single pending slot and is applied once the current transition
//! settles, iteratively, until nothing is queued.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::connection::TransitionState;
use crate::protocol::{ConnectionStatus, PlayerCommand};
use crate::socket::{ReadyState, SocketClient, SocketOptions};

// ============================================================================
// Constants
// ============================================================================

/// Delay before a dropped connection is reopened.
const RECONNECT_DELAY: Duration = Duration::from_secs(10);

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with every recognized player command.
pub type CommandCallback = Box<dyn Fn(PlayerCommand) + Send + Sync>;

/// Callback invoked on every connection status change.
pub type StatusCallback = Box<dyn Fn(ConnectionStatus) + Send + Sync>;

// ============================================================================
// ConnectionHandler
// ============================================================================

/// Drives the socket connection to the controller server.
///
/// # Thread Safety
///
/// `ConnectionHandler` is `Send + Sync` and cheap to clone; all clones share
/// the same state.
pub struct ConnectionHandler {
    inner: Arc<HandlerInner>,
}

impl Clone for ConnectionHandler {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// State shared between handler clones and socket event listeners.
struct HandlerInner {
    /// Desired-enabled flag with its transition slot.
    is_enabled: Mutex<TransitionState<bool>>,
    /// Server URL with its transition slot.
    server_url: Mutex<TransitionState<String>>,
    /// The live socket client, if any.
    client: Mutex<Option<SocketClient>>,
    /// Receives every recognized player command.
    command_callback: CommandCallback,
    /// Receives every status change, if registered.
    status_callback: Option<StatusCallback>,
}

impl ConnectionHandler {
    /// Creates a new handler with the initial settings from storage.
    ///
    /// Connects immediately when `is_enabled` is `true`.
    pub fn new(
        is_enabled: bool,
        server_url: impl Into<String>,
        command_callback: impl Fn(PlayerCommand) + Send + Sync + 'static,
        status_callback: Option<StatusCallback>,
    ) -> Self {
        let handler = Self {
            inner: Arc::new(HandlerInner {
                is_enabled: Mutex::new(TransitionState::new(is_enabled)),
                server_url: Mutex::new(TransitionState::new(server_url.into())),
                client: Mutex::new(None),
                command_callback: Box::new(command_callback),
                status_callback,
            }),
        };

        if is_enabled {
            handler.connect();
        }

        handler
    }

    /// Returns the currently applied enabled flag.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled.lock().value
    }

    /// Returns the currently applied server URL.
    #[inline]
    #[must_use]
    pub fn server_url(&self) -> String {
        self.inner.server_url.lock().value.clone()
    }

    /// Returns the derived connection status.
    ///
    /// `Disconnected` when disabled; `Connected` when the socket is open;
    /// `Connecting` otherwise (covers connect attempts, a close during
    /// reconnect, and the gap between disconnect and the next connect).
    #[inline]
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.connection_status()
    }

    /// Enables or disables the connection.
    ///
    /// If a transition of this flag is already in flight, the request lands
    /// in the pending slot (last write wins) and is applied once the current
    /// transition settles.
    pub async fn set_is_enabled(&self, enabled: bool) {
        let mut target = {
            let mut state = self.inner.is_enabled.lock();
            if !state.try_begin(enabled) {
                return;
            }
            enabled
        };

        loop {
            let previous = self.inner.is_enabled.lock().apply(target);
            if target && !previous {
                self.connect();
            } else if !target && previous {
                self.disconnect().await;
            }

            match self.inner.is_enabled.lock().settle() {
                Some(next) => target = next,
                None => break,
            }
        }
    }

    /// Changes the server URL.
    ///
    /// Follows the same transition discipline as
    /// [`ConnectionHandler::set_is_enabled`]. When the URL actually changed
    /// and the connection is enabled, the socket is disconnected and reopened
    /// against the new URL. An unchanged URL is a no-op.
    pub async fn set_server_url(&self, server_url: impl Into<String>) {
        let mut target = {
            let mut state = self.inner.server_url.lock();
            let server_url = server_url.into();
            if !state.try_begin(server_url.clone()) {
                return;
            }
            server_url
        };

        loop {
            let previous = self.inner.server_url.lock().apply(target.clone());
            if previous != target && self.is_enabled() {
                self.disconnect().await;
                self.connect();
            }

            match self.inner.server_url.lock().settle() {
                Some(next) => target = next,
                None => break,
            }
        }
    }

    // ========================================================================
    // Socket Lifecycle
    // ========================================================================

    /// Creates and opens the socket client.
    ///
    /// A warning-level no-op when a client already exists.
    fn connect(&self) {
        let mut guard = self.inner.client.lock();
        if guard.is_some() {
            warn!("Already connected to the controller server");
            return;
        }

        let server_url = self.inner.server_url.lock().value.clone();
        let client = SocketClient::new(
            server_url,
            SocketOptions {
                reconnect: true,
                reconnect_delay: RECONNECT_DELAY,
            },
        );

        let weak = Arc::downgrade(&self.inner);
        client.add_open_listener(move || {
            if let Some(inner) = weak.upgrade() {
                debug!("connected to controller server");
                inner.notify_status();
            }
        });

        client.add_error_listener(|e| {
            warn!(error = %e, "socket error");
        });

        let weak = Arc::downgrade(&self.inner);
        client.add_close_listener(move || {
            if let Some(inner) = weak.upgrade() {
                debug!("socket connection closed");
                inner.notify_status();
            }
        });

        let weak = Arc::downgrade(&self.inner);
        client.add_message_listener(move |text| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_message(text);
            }
        });

        client.open();
        *guard = Some(client);
        drop(guard);

        // Report the connecting state right away; the open and close events
        // cover all later changes.
        self.inner.notify_status();
    }

    /// Closes and discards the socket client.
    ///
    /// A warning-level no-op when no client exists.
    async fn disconnect(&self) {
        let client = self.inner.client.lock().clone();
        let Some(client) = client else {
            warn!("Not connected to the controller server");
            return;
        };

        let was_connected = client.close().await;
        *self.inner.client.lock() = None;
        if !was_connected {
            // The socket was already closed, so no close event fired to
            // report this change; do it manually.
            self.inner.notify_status();
        }
        debug!("disconnected from controller server");
    }
}

impl HandlerInner {
    /// Derives the connection status from the enabled flag and socket state.
    fn connection_status(&self) -> ConnectionStatus {
        if !self.is_enabled.lock().value {
            return ConnectionStatus::Disconnected;
        }

        let open = self
            .client
            .lock()
            .as_ref()
            .is_some_and(|client| client.ready_state() == ReadyState::Open);
        if open {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Connecting
        }
    }

    /// Invokes the status callback, if one is registered.
    fn notify_status(&self) {
        if let Some(callback) = &self.status_callback {
            callback(self.connection_status());
        }
    }

    /// Parses and validates one raw frame, forwarding recognized commands.
    ///
    /// Parse failures and unrecognized shapes are logged and dropped.
    fn handle_message(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, text, "Unable to parse message");
                return;
            }
        };

        match PlayerCommand::from_value(&value) {
            Some(command) => {
                debug!(command = command.kind(), "player command received");
                (self.command_callback)(command);
            }
            None => warn!(%value, "Received unknown command"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
