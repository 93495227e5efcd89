//! WebSocket client layer.
//!
//! This module wraps the raw WebSocket transport behind [`SocketClient`],
//! an event-surfaced client with reconnect-with-delay support. Higher layers
//! never touch the raw socket; it is owned exclusively by the client's
//! event-loop task.

// ============================================================================
// Submodules
// ============================================================================

/// Resilient WebSocket client.
pub mod client;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::{ListenerId, ReadyState, SocketClient, SocketEventKind, SocketOptions};
