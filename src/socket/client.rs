//! Resilient WebSocket client.
//!
//! [`SocketClient`] wraps one raw WebSocket connection behind an event-based
//! surface and can automatically reopen the connection after an unsolicited
//! close.
//!
//! # Event Loop
//!
//! Each [`SocketClient::open`] call spawns a tokio task that owns the raw
//! socket exclusively and handles:
//!
//! - The connect attempt (ready state `Connecting`)
//! - Incoming text frames, surfaced via the `message` event
//! - Outgoing frames and shutdown requests from the client handle
//! - The close transition, surfaced via the `close` event
//!
//! # Reconnection
//!
//! Reconnection is driven solely by the `close` event: when a close was not
//! requested through [`SocketClient::close`] and `reconnect` is enabled, the
//! client schedules exactly one fresh open after `reconnect_delay`. Transport
//! errors surface via the `error` event only; a failed connect behaves like a
//! browser socket and fires `error` followed by `close`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Ready states of the underlying socket, mirroring the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// No socket exists, or the last one finished closing.
    Closed,
    /// A close is in progress.
    Closing,
    /// A connect attempt is in progress.
    Connecting,
    /// The socket is open and frames flow.
    Open,
}

/// The four socket events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketEventKind {
    /// The socket finished connecting.
    Open,
    /// A transport error occurred.
    Error,
    /// The socket closed.
    Close,
    /// A text frame arrived.
    Message,
}

/// Options for a [`SocketClient`], immutable for the client's lifetime.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Whether to reopen automatically after an unsolicited close.
    pub reconnect: bool,
    /// Delay before the automatic reopen.
    pub reconnect_delay: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_delay: Duration::from_secs(10),
        }
    }
}

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

// ============================================================================
// Listener Storage
// ============================================================================

type OpenListener = Arc<dyn Fn() + Send + Sync>;
type ErrorListener = Arc<dyn Fn(&Error) + Send + Sync>;
type CloseListener = Arc<dyn Fn() + Send + Sync>;
type MessageListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-event listener lists, invoked in registration order.
#[derive(Default)]
struct Listeners {
    open: Vec<(ListenerId, OpenListener)>,
    error: Vec<(ListenerId, ErrorListener)>,
    close: Vec<(ListenerId, CloseListener)>,
    message: Vec<(ListenerId, MessageListener)>,
}

// ============================================================================
// LoopCommand
// ============================================================================

/// Commands from the client handle to the event loop.
enum LoopCommand {
    /// Send one text frame.
    Send(String),
    /// Close the socket gracefully.
    Shutdown,
}

// ============================================================================
// SocketClient
// ============================================================================

/// A WebSocket client with an event surface and optional auto-reconnect.
///
/// # Thread Safety
///
/// `SocketClient` is `Send + Sync` and cheap to clone; all clones share the
/// same underlying socket and listener registry.
pub struct SocketClient {
    inner: Arc<SocketInner>,
}

impl Clone for SocketClient {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Shared state between the client handle and the event-loop task.
struct SocketInner {
    /// Server URL, fixed per client.
    server_url: String,
    /// Reconnect options, fixed per client.
    options: SocketOptions,
    /// Current ready state of the underlying socket.
    ready_state: Mutex<ReadyState>,
    /// Registered event listeners.
    listeners: Mutex<Listeners>,
    /// Command channel of the current event loop, if one is running.
    command_tx: Mutex<Option<mpsc::UnboundedSender<LoopCommand>>>,
    /// Pending reconnect timer, at most one.
    reconnect_timer: Mutex<Option<JoinHandle<()>>>,
    /// Set by an explicit close to suppress reconnection.
    closing: AtomicBool,
    /// Notified once per transition to `Closed`.
    closed: Notify,
    /// Listener id allocator.
    next_listener_id: AtomicU64,
}

impl SocketClient {
    /// Creates a new client for the given server URL.
    ///
    /// No socket is created until [`SocketClient::open`] is called.
    #[must_use]
    pub fn new(server_url: impl Into<String>, options: SocketOptions) -> Self {
        Self {
            inner: Arc::new(SocketInner {
                server_url: server_url.into(),
                options,
                ready_state: Mutex::new(ReadyState::Closed),
                listeners: Mutex::new(Listeners::default()),
                command_tx: Mutex::new(None),
                reconnect_timer: Mutex::new(None),
                closing: AtomicBool::new(false),
                closed: Notify::new(),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the server URL this client connects to.
    #[inline]
    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.inner.server_url
    }

    /// Returns the current ready state.
    ///
    /// `Closed` if no socket has been created yet.
    #[inline]
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        *self.inner.ready_state.lock()
    }

    /// Returns `true` if a reconnect timer is outstanding.
    #[inline]
    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.inner.reconnect_timer.lock().is_some()
    }

    /// Opens a fresh socket to the server.
    ///
    /// Each call creates a new underlying socket; callers must not call
    /// `open` while one is already open.
    pub fn open(&self) {
        SocketInner::open(&self.inner);
    }

    /// Sends one text frame over the open socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the socket is not open.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        if *self.inner.ready_state.lock() != ReadyState::Open {
            return Err(Error::ConnectionClosed);
        }

        let guard = self.inner.command_tx.lock();
        let tx = guard.as_ref().ok_or(Error::ConnectionClosed)?;
        tx.send(LoopCommand::Send(text.into()))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Requests a graceful close.
    ///
    /// Cancels any pending reconnect timer as its first action, before
    /// inspecting socket state, so a close always suppresses a queued
    /// reconnect.
    ///
    /// Resolves `true` if the socket was open or connecting and the close
    /// completed; resolves `false` immediately if the socket was already
    /// closed (no close event will fire). If the socket is currently closing,
    /// waits for that close instead of closing again.
    pub async fn close(&self) -> bool {
        // Mark the close and cancel any queued reconnect under the timer
        // lock. The event loop checks the closing flag under the same lock
        // before scheduling, so a close can never interleave with a
        // schedule and leave a live timer behind.
        {
            let mut timer = self.inner.reconnect_timer.lock();
            self.inner.closing.store(true, Ordering::SeqCst);
            if let Some(handle) = timer.take() {
                handle.abort();
            }
        }

        // Arm the close notification before reading the state, so a close
        // that lands in between is not missed.
        let closed = self.inner.closed.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();

        // Read and transition under one guard: the event loop may move the
        // state to Closed concurrently, and that must not be overwritten.
        let request_shutdown = {
            let mut state = self.inner.ready_state.lock();
            match *state {
                ReadyState::Closed => return false,
                ReadyState::Closing => false,
                ReadyState::Connecting | ReadyState::Open => {
                    *state = ReadyState::Closing;
                    true
                }
            }
        };
        if request_shutdown {
            if let Some(tx) = self.inner.command_tx.lock().as_ref() {
                let _ = tx.send(LoopCommand::Shutdown);
            }
        }

        closed.await;
        true
    }

    // ========================================================================
    // Listener Registration
    // ========================================================================

    /// Registers a listener for the `open` event. Listeners run in
    /// registration order and are never removed automatically.
    pub fn add_open_listener(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        let id = self.next_listener_id();
        self.inner.listeners.lock().open.push((id, Arc::new(listener)));
        id
    }

    /// Registers a listener for the `error` event.
    pub fn add_error_listener(
        &self,
        listener: impl Fn(&Error) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.next_listener_id();
        self.inner
            .listeners
            .lock()
            .error
            .push((id, Arc::new(listener)));
        id
    }

    /// Registers a listener for the `close` event.
    pub fn add_close_listener(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        let id = self.next_listener_id();
        self.inner
            .listeners
            .lock()
            .close
            .push((id, Arc::new(listener)));
        id
    }

    /// Registers a listener for the `message` event. The payload is the raw
    /// text of one frame.
    pub fn add_message_listener(
        &self,
        listener: impl Fn(&str) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.next_listener_id();
        self.inner
            .listeners
            .lock()
            .message
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a previously registered listener.
    pub fn remove_listener(&self, kind: SocketEventKind, id: ListenerId) {
        let mut listeners = self.inner.listeners.lock();
        match kind {
            SocketEventKind::Open => listeners.open.retain(|(i, _)| *i != id),
            SocketEventKind::Error => listeners.error.retain(|(i, _)| *i != id),
            SocketEventKind::Close => listeners.close.retain(|(i, _)| *i != id),
            SocketEventKind::Message => listeners.message.retain(|(i, _)| *i != id),
        }
    }

    fn next_listener_id(&self) -> ListenerId {
        ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// Event Loop
// ============================================================================

impl SocketInner {
    /// Creates a fresh socket and spawns its event loop.
    fn open(inner: &Arc<Self>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *inner.command_tx.lock() = Some(command_tx);
        *inner.ready_state.lock() = ReadyState::Connecting;
        inner.closing.store(false, Ordering::SeqCst);

        debug!(url = %inner.server_url, "opening socket");
        tokio::spawn(Self::run(Arc::clone(inner), command_rx));
    }

    /// Event loop that owns the raw socket.
    async fn run(inner: Arc<Self>, mut command_rx: mpsc::UnboundedReceiver<LoopCommand>) {
        let connect = connect_async(inner.server_url.as_str());
        tokio::pin!(connect);

        // Connect phase. A shutdown request may arrive before the socket
        // exists; it wins over the connect attempt.
        let ws = loop {
            tokio::select! {
                result = &mut connect => match result {
                    Ok((ws, _)) => break ws,
                    Err(e) => {
                        let err = Error::from(e);
                        inner.emit_error(&err);
                        Self::finish_closed(&inner);
                        return;
                    }
                },

                command = command_rx.recv() => match command {
                    Some(LoopCommand::Shutdown) | None => {
                        Self::finish_closed(&inner);
                        return;
                    }
                    Some(LoopCommand::Send(_)) => {
                        warn!("Dropping outbound frame, socket not open yet");
                    }
                },
            }
        };

        *inner.ready_state.lock() = ReadyState::Open;
        debug!(url = %inner.server_url, "socket open");
        inner.emit_open();

        let (mut ws_write, mut ws_read) = ws.split();

        loop {
            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "frame received");
                        inner.emit_message(text.as_str());
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("socket closed by remote");
                        break;
                    }

                    Some(Err(e)) => {
                        let err = Error::from(e);
                        inner.emit_error(&err);
                        break;
                    }

                    None => {
                        debug!("socket stream ended");
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                },

                // Commands from the client handle
                command = command_rx.recv() => match command {
                    Some(LoopCommand::Send(text)) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            let err = Error::from(e);
                            inner.emit_error(&err);
                        }
                    }

                    Some(LoopCommand::Shutdown) | None => {
                        *inner.ready_state.lock() = ReadyState::Closing;
                        let _ = ws_write.close().await;
                        break;
                    }
                },
            }
        }

        Self::finish_closed(&inner);
    }

    /// Completes a close: updates state, fires the `close` event, wakes any
    /// waiting [`SocketClient::close`] call, and schedules a reconnect when
    /// the close was unsolicited.
    fn finish_closed(inner: &Arc<Self>) {
        *inner.ready_state.lock() = ReadyState::Closed;
        inner.command_tx.lock().take();
        inner.emit_close();
        inner.closed.notify_waiters();

        if !inner.options.reconnect {
            return;
        }

        // The closing flag is written under the timer lock by close(), so
        // it must be read under the same lock; only one reconnect timer
        // may be outstanding.
        let mut timer = inner.reconnect_timer.lock();
        if inner.closing.load(Ordering::SeqCst) || timer.is_some() {
            return;
        }

        let delay = inner.options.reconnect_delay;
        let reopen = Arc::clone(inner);
        *timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            // abort() cannot stop this task once the final poll has begun,
            // so re-check the closing flag under the timer lock before
            // reopening.
            let mut timer = reopen.reconnect_timer.lock();
            timer.take();
            if !reopen.closing.load(Ordering::SeqCst) {
                Self::open(&reopen);
            }
        }));
        debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
    }

    // ========================================================================
    // Event Dispatch
    // ========================================================================

    // Listener lists are snapshotted before invocation so callbacks may
    // re-enter the client (query state, add or remove listeners).

    fn emit_open(&self) {
        let listeners: Vec<OpenListener> = {
            let guard = self.listeners.lock();
            guard.open.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener();
        }
    }

    fn emit_error(&self, error: &Error) {
        let listeners: Vec<ErrorListener> = {
            let guard = self.listeners.lock();
            guard.error.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(error);
        }
    }

    fn emit_close(&self) {
        let listeners: Vec<CloseListener> = {
            let guard = self.listeners.lock();
            guard.close.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener();
        }
    }

    fn emit_message(&self, text: &str) {
        let listeners: Vec<MessageListener> = {
            let guard = self.listeners.lock();
            guard.message.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(text);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures_util::SinkExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    const WAIT: Duration = Duration::from_secs(5);

    async fn bind_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        (listener, format!("ws://127.0.0.1:{port}"))
    }

    /// Binds and immediately drops a listener to get a port that refuses
    /// connections.
    async fn refused_url() -> String {
        let (listener, url) = bind_server().await;
        drop(listener);
        url
    }

    fn watch_events(client: &SocketClient) -> UnboundedReceiver<&'static str> {
        let (tx, rx) = unbounded_channel();
        let open_tx = tx.clone();
        client.add_open_listener(move || {
            let _ = open_tx.send("open");
        });
        let error_tx = tx.clone();
        client.add_error_listener(move |_| {
            let _ = error_tx.send("error");
        });
        let close_tx = tx;
        client.add_close_listener(move || {
            let _ = close_tx.send("close");
        });
        rx
    }

    async fn next_event(rx: &mut UnboundedReceiver<&'static str>) -> &'static str {
        timeout(WAIT, rx.recv())
            .await
            .expect("event within timeout")
            .expect("event channel open")
    }

    #[tokio::test]
    async fn test_closed_before_open() {
        let client = SocketClient::new("ws://127.0.0.1:1", SocketOptions::default());
        assert_eq!(client.ready_state(), ReadyState::Closed);
        assert!(!client.reconnect_pending());

        // No socket exists, so there is nothing to close.
        assert!(!client.close().await);
    }

    #[tokio::test]
    async fn test_open_message_and_close() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("upgrade");
            ws.send(Message::Text(r#"{"type":"next-track"}"#.into()))
                .await
                .expect("send");
            // Keep the connection open until the client closes it.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let client = SocketClient::new(
            url,
            SocketOptions {
                reconnect: false,
                reconnect_delay: Duration::from_millis(100),
            },
        );
        let mut events = watch_events(&client);
        let (message_tx, mut message_rx) = unbounded_channel();
        client.add_message_listener(move |text| {
            let _ = message_tx.send(text.to_string());
        });

        client.open();
        assert_eq!(next_event(&mut events).await, "open");
        assert_eq!(client.ready_state(), ReadyState::Open);

        let text = timeout(WAIT, message_rx.recv())
            .await
            .expect("message within timeout")
            .expect("message channel open");
        assert_eq!(text, r#"{"type":"next-track"}"#);

        assert!(client.close().await);
        assert_eq!(client.ready_state(), ReadyState::Closed);
        assert_eq!(next_event(&mut events).await, "close");
        assert!(!client.reconnect_pending());
    }

    #[tokio::test]
    async fn test_connect_failure_fires_error_then_close() {
        let client = SocketClient::new(
            refused_url().await,
            SocketOptions {
                reconnect: false,
                reconnect_delay: Duration::from_millis(100),
            },
        );
        let mut events = watch_events(&client);

        client.open();
        assert_eq!(next_event(&mut events).await, "error");
        assert_eq!(next_event(&mut events).await, "close");
        assert_eq!(client.ready_state(), ReadyState::Closed);
        assert!(!client.reconnect_pending());
    }

    #[tokio::test]
    async fn test_unsolicited_close_reconnects() {
        let (listener, url) = bind_server().await;
        let (accepted_tx, mut accepted_rx) = unbounded_channel();
        tokio::spawn(async move {
            // First connection: accept, then drop it to force an
            // unsolicited close on the client side.
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = accept_async(stream).await.expect("upgrade");
            let _ = accepted_tx.send(1u32);
            drop(ws);

            // Second connection: the reconnect.
            let (stream, _) = listener.accept().await.expect("accept again");
            let mut ws = accept_async(stream).await.expect("upgrade again");
            let _ = accepted_tx.send(2u32);
            while let Some(Ok(_)) = ws.next().await {}
        });

        let client = SocketClient::new(
            url,
            SocketOptions {
                reconnect: true,
                reconnect_delay: Duration::from_millis(100),
            },
        );
        let mut events = watch_events(&client);

        client.open();
        assert_eq!(next_event(&mut events).await, "open");
        assert_eq!(
            timeout(WAIT, accepted_rx.recv()).await.expect("accept 1"),
            Some(1)
        );

        // Server dropped the connection.
        assert_eq!(next_event(&mut events).await, "close");

        // Exactly one timer, then a fresh socket.
        assert!(client.reconnect_pending());
        assert_eq!(next_event(&mut events).await, "open");
        assert_eq!(
            timeout(WAIT, accepted_rx.recv()).await.expect("accept 2"),
            Some(2)
        );

        assert!(client.close().await);
    }

    #[tokio::test]
    async fn test_close_cancels_pending_reconnect() {
        let client = SocketClient::new(
            refused_url().await,
            SocketOptions {
                reconnect: true,
                reconnect_delay: Duration::from_secs(30),
            },
        );
        let mut events = watch_events(&client);

        client.open();
        assert_eq!(next_event(&mut events).await, "error");
        assert_eq!(next_event(&mut events).await, "close");
        assert!(client.reconnect_pending());

        // The socket is already closed, so close() resolves false, but the
        // queued reconnect must be gone.
        assert!(!client.close().await);
        assert!(!client.reconnect_pending());
    }

    #[tokio::test]
    async fn test_close_of_dead_socket_never_reopens() {
        let client = SocketClient::new(
            refused_url().await,
            SocketOptions {
                reconnect: true,
                reconnect_delay: Duration::from_millis(100),
            },
        );
        let mut events = watch_events(&client);

        client.open();
        assert_eq!(next_event(&mut events).await, "error");
        assert_eq!(next_event(&mut events).await, "close");
        assert!(client.reconnect_pending());

        assert!(!client.close().await);
        assert!(!client.reconnect_pending());

        // Well past the reconnect delay: a reopen would show up as another
        // error/close pair against the refused port.
        sleep(Duration::from_millis(300)).await;
        assert_eq!(client.ready_state(), ReadyState::Closed);
        assert!(!client.reconnect_pending());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_during_connect() {
        // Bind without accepting so the connect attempt stays pending.
        let (listener, url) = bind_server().await;
        let _hold = listener;

        let client = SocketClient::new(
            url,
            SocketOptions {
                reconnect: true,
                reconnect_delay: Duration::from_secs(30),
            },
        );
        let mut events = watch_events(&client);

        client.open();
        assert_eq!(client.ready_state(), ReadyState::Connecting);

        assert!(client.close().await);
        assert_eq!(client.ready_state(), ReadyState::Closed);
        assert_eq!(next_event(&mut events).await, "close");
        assert!(!client.reconnect_pending());
    }

    #[tokio::test]
    async fn test_send_requires_open_socket() {
        let client = SocketClient::new("ws://127.0.0.1:1", SocketOptions::default());
        let err = client.send("{}").expect_err("send on closed socket");
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_listener_removal() {
        let client = SocketClient::new(
            refused_url().await,
            SocketOptions {
                reconnect: false,
                reconnect_delay: Duration::from_millis(100),
            },
        );

        let (removed_tx, mut removed_rx) = unbounded_channel();
        let id = client.add_close_listener(move || {
            let _ = removed_tx.send(());
        });
        client.remove_listener(SocketEventKind::Close, id);

        let (kept_tx, mut kept_rx) = unbounded_channel();
        client.add_close_listener(move || {
            let _ = kept_tx.send(());
        });

        client.open();
        timeout(WAIT, kept_rx.recv())
            .await
            .expect("close within timeout")
            .expect("close channel open");

        // The removed listener never fired.
        assert!(removed_rx.try_recv().is_err());
    }
}
