//! Page runtime bootstrap.
//!
//! Assembles the full relay for one page: reads the stored settings (applying
//! defaults and the remember-connection rule), builds the connection handler,
//! and wires it to the popup bus and the window channel. Setting writes made
//! after bootstrap are watched and forwarded to the handler.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, OnceLock};

use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::connection::{ConnectionHandler, StatusCallback};
use crate::error::{Error, Result};
use crate::messaging::{MessageTransport, PopupMessagingHandler, RuntimeChannel, WindowChannel};
use crate::protocol::{ConnectionStatus, ExtensionMessage, InitialData};
use crate::settings::{
    CONNECTION_ENABLED_KEY, DEFAULT_SERVER_URL, SettingsStore, WS_SERVER_KEY,
    remember_connection_key,
};

// ============================================================================
// PageRuntime
// ============================================================================

/// The assembled relay for one page.
///
/// Dropping the runtime drops the connection handler and its socket; the
/// listeners it registered on the transports and the settings store only
/// hold weak or slot-guarded references and go inert.
pub struct PageRuntime {
    connection: ConnectionHandler,
    popup: Arc<PopupMessagingHandler>,
    window: WindowChannel,
}

impl PageRuntime {
    /// Returns the connection handler.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &ConnectionHandler {
        &self.connection
    }

    /// Returns the popup messaging handler.
    #[inline]
    #[must_use]
    pub fn popup(&self) -> &PopupMessagingHandler {
        &self.popup
    }

    /// Returns the window endpoint commands are relayed through.
    #[inline]
    #[must_use]
    pub fn window(&self) -> &WindowChannel {
        &self.window
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

/// Bootstraps the relay for the page behind `window`.
///
/// Settings are initialized from `settings` with their defaults and written
/// back, so later readers always find concrete values:
///
/// - `page:{origin}/remember-connection` defaults to `false`
/// - `connection-enabled` defaults to `false`, and is forced to `false`
///   when the page's remember flag is off
/// - `ws-server` defaults to `ws://localhost:9772`; stored values that do
///   not parse as a `ws`/`wss` URL fall back to the default
///
/// # Errors
///
/// Returns an error when the settings store fails to read or write.
pub async fn bootstrap_page(
    settings: Arc<dyn SettingsStore>,
    window: WindowChannel,
    bus: RuntimeChannel,
) -> Result<PageRuntime> {
    let origin = window.origin().to_owned();
    let remember_key = remember_connection_key(&origin);

    // Resolve the stored settings to concrete values.
    let remember = read_bool(settings.as_ref(), &remember_key).await?;
    let mut enabled = read_bool(settings.as_ref(), CONNECTION_ENABLED_KEY).await?;
    if enabled && !remember {
        debug!("connection not remembered for this page, starting disabled");
        enabled = false;
    }
    let server_url = server_url_or_default(settings.get(WS_SERVER_KEY).await?.as_ref());

    // Write the initialized values back before installing the watchers.
    settings.set(&remember_key, json!(remember)).await?;
    settings.set(CONNECTION_ENABLED_KEY, json!(enabled)).await?;
    settings.set(WS_SERVER_KEY, json!(server_url)).await?;

    // The popup handler needs the connection handler for initial-data
    // replies, and the connection handler needs the popup handler for
    // status updates. Break the cycle with a write-once slot.
    let connection_slot: Arc<OnceLock<ConnectionHandler>> = Arc::new(OnceLock::new());

    let slot = Arc::clone(&connection_slot);
    let popup = Arc::new(PopupMessagingHandler::new(bus, move |_, responder| {
        let Some(responder) = responder else {
            return;
        };
        let connection_status = slot
            .get()
            .map_or(ConnectionStatus::Disconnected, ConnectionHandler::connection_status);
        let reply = ExtensionMessage::InitialData {
            payload: InitialData { connection_status },
        };
        if let Ok(value) = serde_json::to_value(&reply) {
            responder.respond(value);
        }
    }));

    let command_window = window.clone();
    let status_popup = Arc::clone(&popup);
    let status_callback: StatusCallback = Box::new(move |status| {
        status_popup.send_message(&ExtensionMessage::ConnectionStatus { payload: status });
    });

    let connection = ConnectionHandler::new(
        enabled,
        server_url,
        move |command| match serde_json::to_value(&command) {
            Ok(value) => command_window.post(value),
            Err(e) => warn!(error = %e, "Failed to serialize player command"),
        },
        Some(status_callback),
    );
    let _ = connection_slot.set(connection.clone());

    // Forward later setting writes to the handler, skipping unchanged or
    // ill-typed values.
    let watched = connection.clone();
    settings.watch(
        CONNECTION_ENABLED_KEY,
        Box::new(move |new, old| {
            let Some(enabled) = new.as_bool() else {
                return;
            };
            if old.and_then(Value::as_bool) == Some(enabled) {
                return;
            }
            let watched = watched.clone();
            tokio::spawn(async move {
                watched.set_is_enabled(enabled).await;
            });
        }),
    );

    let watched = connection.clone();
    settings.watch(
        WS_SERVER_KEY,
        Box::new(move |new, old| {
            if new.as_str().is_none() || new == old.unwrap_or(&Value::Null) {
                return;
            }
            let server_url = server_url_or_default(Some(new));
            let watched = watched.clone();
            tokio::spawn(async move {
                watched.set_server_url(server_url).await;
            });
        }),
    );

    Ok(PageRuntime {
        connection,
        popup,
        window,
    })
}

// ============================================================================
// Helpers
// ============================================================================

/// Reads a boolean setting, treating absent or ill-typed values as `false`.
async fn read_bool(settings: &dyn SettingsStore, key: &str) -> Result<bool> {
    Ok(settings
        .get(key)
        .await?
        .as_ref()
        .and_then(Value::as_bool)
        .unwrap_or(false))
}

/// Resolves the stored server URL, falling back to the default when the
/// stored value is absent, ill-typed, unparsable, or not a websocket URL.
fn server_url_or_default(raw: Option<&Value>) -> String {
    let Some(candidate) = raw.and_then(Value::as_str) else {
        return DEFAULT_SERVER_URL.to_owned();
    };

    match validate_server_url(candidate) {
        Ok(()) => candidate.to_owned(),
        Err(e) => {
            warn!(error = %e, "Stored server URL rejected, using default");
            DEFAULT_SERVER_URL.to_owned()
        }
    }
}

/// Checks that a candidate server URL parses and carries a `ws`/`wss`
/// scheme.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] otherwise.
pub fn validate_server_url(candidate: &str) -> Result<()> {
    let url = Url::parse(candidate).map_err(|_| Error::invalid_url(candidate))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(Error::invalid_url(candidate));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    use crate::settings::MemorySettingsStore;

    const ORIGIN: &str = "https://music.example.com";
    const WAIT: Duration = Duration::from_secs(5);

    async fn bind_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        (listener, format!("ws://127.0.0.1:{port}"))
    }

    /// Accepts connections forever, reporting each and forwarding the given
    /// frames on every new connection.
    fn run_server(listener: TcpListener, frames: Vec<String>) -> UnboundedReceiver<u32> {
        let (accepted_tx, accepted_rx) = unbounded_channel();
        tokio::spawn(async move {
            let mut count = 0u32;
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                count += 1;
                let _ = accepted_tx.send(count);
                for frame in &frames {
                    let _ = ws.send(Message::Text(frame.clone().into())).await;
                }
                tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });
            }
        });
        accepted_rx
    }

    async fn bootstrap(settings: MemorySettingsStore) -> (PageRuntime, RuntimeChannel) {
        let bus = RuntimeChannel::new();
        let runtime = bootstrap_page(
            Arc::new(settings),
            WindowChannel::new(ORIGIN),
            bus.endpoint(),
        )
        .await
        .expect("bootstrap");
        (runtime, bus)
    }

    #[tokio::test]
    async fn test_defaults_initialized_and_written_back() {
        let settings = MemorySettingsStore::new();
        let (runtime, _bus) = bootstrap(settings.clone()).await;

        assert!(!runtime.connection().is_enabled());
        assert_eq!(runtime.connection().server_url(), DEFAULT_SERVER_URL);

        assert_eq!(
            settings
                .get(&remember_connection_key(ORIGIN))
                .await
                .expect("get"),
            Some(json!(false))
        );
        assert_eq!(
            settings.get(CONNECTION_ENABLED_KEY).await.expect("get"),
            Some(json!(false))
        );
        assert_eq!(
            settings.get(WS_SERVER_KEY).await.expect("get"),
            Some(json!(DEFAULT_SERVER_URL))
        );
    }

    #[tokio::test]
    async fn test_enabled_forced_off_when_not_remembered() {
        let settings = MemorySettingsStore::new();
        settings
            .set(CONNECTION_ENABLED_KEY, json!(true))
            .await
            .expect("set");

        let (runtime, _bus) = bootstrap(settings.clone()).await;

        assert!(!runtime.connection().is_enabled());
        assert_eq!(
            settings.get(CONNECTION_ENABLED_KEY).await.expect("get"),
            Some(json!(false))
        );
    }

    #[tokio::test]
    async fn test_remembered_connection_connects_at_startup() {
        let (listener, url) = bind_server().await;
        let mut accepted = run_server(listener, vec![]);

        let settings = MemorySettingsStore::new();
        settings
            .set(&remember_connection_key(ORIGIN), json!(true))
            .await
            .expect("set");
        settings
            .set(CONNECTION_ENABLED_KEY, json!(true))
            .await
            .expect("set");
        settings.set(WS_SERVER_KEY, json!(url)).await.expect("set");

        let (runtime, _bus) = bootstrap(settings).await;
        assert!(runtime.connection().is_enabled());
        assert_eq!(
            timeout(WAIT, accepted.recv()).await.expect("accept"),
            Some(1)
        );

        runtime.connection().set_is_enabled(false).await;
    }

    #[tokio::test]
    async fn test_invalid_server_url_falls_back_to_default() {
        for stored in [json!("not a url"), json!("http://localhost:9772"), json!(42)] {
            let settings = MemorySettingsStore::new();
            settings.set(WS_SERVER_KEY, stored).await.expect("set");

            let (runtime, _bus) = bootstrap(settings).await;
            assert_eq!(runtime.connection().server_url(), DEFAULT_SERVER_URL);
        }
    }

    #[test]
    fn test_validate_server_url() {
        assert!(validate_server_url("ws://localhost:9772").is_ok());
        assert!(validate_server_url("wss://relay.example.com/control").is_ok());

        let err = validate_server_url("http://localhost:9772").expect_err("scheme");
        assert!(matches!(err, Error::InvalidUrl { .. }));
        assert!(validate_server_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_setting_writes_drive_the_connection() {
        let (listener, url) = bind_server().await;
        let mut accepted = run_server(listener, vec![]);

        let settings = MemorySettingsStore::new();
        settings
            .set(&remember_connection_key(ORIGIN), json!(true))
            .await
            .expect("set");
        settings.set(WS_SERVER_KEY, json!(url)).await.expect("set");

        let (runtime, _bus) = bootstrap(settings.clone()).await;
        assert!(!runtime.connection().is_enabled());

        settings
            .set(CONNECTION_ENABLED_KEY, json!(true))
            .await
            .expect("set");
        assert_eq!(
            timeout(WAIT, accepted.recv()).await.expect("accept"),
            Some(1)
        );

        // Rewriting the same value must not cycle the connection.
        settings
            .set(CONNECTION_ENABLED_KEY, json!(true))
            .await
            .expect("set");
        assert!(accepted.try_recv().is_err());

        settings
            .set(CONNECTION_ENABLED_KEY, json!(false))
            .await
            .expect("set");
        timeout(WAIT, async {
            while runtime.connection().is_enabled() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("disabled within timeout");
    }

    #[tokio::test]
    async fn test_popup_request_returns_initial_data() {
        let settings = MemorySettingsStore::new();
        let (_runtime, bus) = bootstrap(settings).await;

        let reply = bus
            .request(json!({ "type": "request-initial-data" }))
            .await
            .expect("reply");
        assert_eq!(
            reply,
            json!({ "type": "initial-data", "payload": { "connectionStatus": "disconnected" } })
        );
    }

    #[tokio::test]
    async fn test_status_changes_mirrored_to_popup() {
        let (listener, url) = bind_server().await;
        let _accepted = run_server(listener, vec![]);

        let settings = MemorySettingsStore::new();
        settings.set(WS_SERVER_KEY, json!(url)).await.expect("set");

        let (runtime, bus) = bootstrap(settings).await;

        let (tx, mut rx) = unbounded_channel();
        bus.on_receive(Box::new(move |inbound| {
            let _ = tx.send(inbound.data);
        }));

        runtime.connection().set_is_enabled(true).await;
        let first = timeout(WAIT, rx.recv())
            .await
            .expect("status within timeout")
            .expect("bus open");
        assert_eq!(
            first,
            json!({ "type": "connection-status", "payload": "connecting" })
        );
        let second = timeout(WAIT, rx.recv())
            .await
            .expect("status within timeout")
            .expect("bus open");
        assert_eq!(
            second,
            json!({ "type": "connection-status", "payload": "connected" })
        );

        runtime.connection().set_is_enabled(false).await;
    }

    #[tokio::test]
    async fn test_commands_relayed_to_the_window() {
        let (listener, url) = bind_server().await;
        let _accepted = run_server(listener, vec![r#"{"type":"next-track"}"#.to_string()]);

        let settings = MemorySettingsStore::new();
        settings
            .set(&remember_connection_key(ORIGIN), json!(true))
            .await
            .expect("set");
        settings
            .set(CONNECTION_ENABLED_KEY, json!(true))
            .await
            .expect("set");
        settings.set(WS_SERVER_KEY, json!(url)).await.expect("set");

        let (runtime, _bus) = bootstrap(settings).await;

        // The main world listens on its own window endpoint.
        let main_world = runtime.window().endpoint(ORIGIN);
        let (tx, mut rx) = unbounded_channel();
        main_world.on_receive(Box::new(move |inbound| {
            let _ = tx.send((inbound.origin, inbound.data));
        }));

        let (origin, data) = timeout(WAIT, rx.recv())
            .await
            .expect("command within timeout")
            .expect("window open");
        assert_eq!(origin.as_deref(), Some(ORIGIN));
        assert_eq!(data, json!({ "type": "next-track" }));

        runtime.connection().set_is_enabled(false).await;
    }
}
