//! Cross-context message transports.
//!
//! The relay core runs across several isolated contexts (page runtime, main
//! world, popup) that share no memory, only message passing. This module
//! abstracts those channels behind one narrow interface,
//! [`MessageTransport`], with two concrete implementations:
//!
//! | Transport | Models | Properties |
//! |-----------|--------|------------|
//! | [`WindowChannel`] | the window message channel | broadcast, origin-tagged |
//! | [`RuntimeChannel`] | the extension-internal bus | fire-and-forget or request/reply |
//!
//! Delivery to zero receivers is never an error on the fire-and-forget path;
//! a closed popup is expected and non-actionable.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Callback invoked for every inbound envelope on a transport.
pub type ReceiveCallback = Box<dyn Fn(Inbound) + Send + Sync>;

type SharedCallback = Arc<dyn Fn(Inbound) + Send + Sync>;

// ============================================================================
// Inbound
// ============================================================================

/// An inbound envelope delivered to a receive callback.
#[derive(Clone)]
pub struct Inbound {
    /// Origin of the sending context, when the channel provides one.
    pub origin: Option<String>,
    /// The raw message value. Untrusted until validated.
    pub data: Value,
    /// Present when the sender awaits a reply.
    pub responder: Option<Responder>,
}

// ============================================================================
// Responder
// ============================================================================

/// Reply handle for request/response messages.
///
/// Cloned into every receiver; only the first reply is delivered, later ones
/// are dropped.
#[derive(Clone)]
pub struct Responder {
    reply: Arc<Mutex<Option<oneshot::Sender<Value>>>>,
}

impl Responder {
    fn new(reply: oneshot::Sender<Value>) -> Self {
        Self {
            reply: Arc::new(Mutex::new(Some(reply))),
        }
    }

    /// Sends the reply back to the requester.
    pub fn respond(&self, value: Value) {
        if let Some(reply) = self.reply.lock().take() {
            let _ = reply.send(value);
        }
    }
}

// ============================================================================
// MessageTransport
// ============================================================================

/// One cross-context channel: post outbound, subscribe inbound.
///
/// Implementations deliver synchronously to every registered callback, in
/// registration order.
pub trait MessageTransport: Send + Sync {
    /// Posts a fire-and-forget message. Delivery failures are swallowed.
    fn post(&self, message: Value);

    /// Registers a callback for inbound messages. Callbacks are never
    /// removed for the transport's lifetime.
    fn on_receive(&self, callback: ReceiveCallback);
}

// ============================================================================
// WindowChannel
// ============================================================================

/// Listener registry shared by all endpoints of one window.
#[derive(Default)]
struct WindowHub {
    listeners: Mutex<Vec<SharedCallback>>,
}

/// The window message channel between the scripts sharing one page.
///
/// Every endpoint posts to the same hub; envelopes carry the posting
/// endpoint's origin so receivers can filter out foreign frames.
#[derive(Clone)]
pub struct WindowChannel {
    hub: Arc<WindowHub>,
    origin: String,
}

impl WindowChannel {
    /// Creates a fresh window hub with one endpoint at `origin`.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            hub: Arc::new(WindowHub::default()),
            origin: origin.into(),
        }
    }

    /// Creates another endpoint on the same window with its own origin.
    #[must_use]
    pub fn endpoint(&self, origin: impl Into<String>) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
            origin: origin.into(),
        }
    }

    /// Returns this endpoint's origin.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn snapshot(&self) -> Vec<SharedCallback> {
        self.hub.listeners.lock().iter().map(Arc::clone).collect()
    }
}

impl MessageTransport for WindowChannel {
    fn post(&self, message: Value) {
        for listener in self.snapshot() {
            listener(Inbound {
                origin: Some(self.origin.clone()),
                data: message.clone(),
                responder: None,
            });
        }
    }

    fn on_receive(&self, callback: ReceiveCallback) {
        self.hub.listeners.lock().push(Arc::from(callback));
    }
}

// ============================================================================
// RuntimeChannel
// ============================================================================

/// Listener registry shared by all endpoints of one runtime bus.
#[derive(Default)]
struct RuntimeHub {
    listeners: Mutex<Vec<(u64, SharedCallback)>>,
    next_endpoint: AtomicU64,
}

/// The extension-internal message bus between popup and page runtime.
///
/// Supports fire-and-forget posts and request/reply exchanges. There is no
/// origin concept, both ends belong to the same extension, but a message is
/// never delivered back to the endpoint that sent it.
#[derive(Clone)]
pub struct RuntimeChannel {
    hub: Arc<RuntimeHub>,
    endpoint: u64,
}

impl RuntimeChannel {
    /// Creates a fresh runtime bus with one endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hub: Arc::new(RuntimeHub::default()),
            endpoint: 0,
        }
    }

    /// Creates another endpoint on the same bus.
    #[must_use]
    pub fn endpoint(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
            endpoint: self.hub.next_endpoint.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }

    /// Sends a message and awaits a single reply.
    ///
    /// # Errors
    ///
    /// - [`Error::NoReceiver`] if nothing else is listening on the bus
    /// - [`Error::Protocol`] if every receiver dropped the request unreplied
    pub async fn request(&self, message: Value) -> Result<Value> {
        let listeners = self.snapshot();
        if listeners.is_empty() {
            return Err(Error::NoReceiver);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let responder = Responder::new(reply_tx);
        for listener in listeners {
            listener(Inbound {
                origin: None,
                data: message.clone(),
                responder: Some(responder.clone()),
            });
        }
        drop(responder);

        reply_rx
            .await
            .map_err(|_| Error::protocol("request received no reply"))
    }

    /// Returns every listener except the ones this endpoint registered.
    fn snapshot(&self) -> Vec<SharedCallback> {
        self.hub
            .listeners
            .lock()
            .iter()
            .filter(|(endpoint, _)| *endpoint != self.endpoint)
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

impl Default for RuntimeChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTransport for RuntimeChannel {
    fn post(&self, message: Value) {
        let listeners = self.snapshot();
        if listeners.is_empty() {
            // Expected when the popup is closed.
            debug!("no receiver on the runtime bus, message dropped");
            return;
        }

        for listener in listeners {
            listener(Inbound {
                origin: None,
                data: message.clone(),
                responder: None,
            });
        }
    }

    fn on_receive(&self, callback: ReceiveCallback) {
        self.hub
            .listeners
            .lock()
            .push((self.endpoint, Arc::from(callback)));
    }
}

// ============================================================================
// Tests
// ============================================================================
