//! Player relay core.
//!
//! Connects a media page to a local controller server over a websocket,
//! relays playback commands from the server to the page, and mirrors the
//! connection status to the popup. The socket survives server restarts by
//! reconnecting on a fixed delay; every inbound frame is validated before it
//! crosses a context boundary.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `bootstrap` | Page runtime assembly and setting watchers |
//! | `connection` | Connection state handler and transition coalescing |
//! | `error` | Crate-wide error type |
//! | `messaging` | Window and runtime transports with their handlers |
//! | `protocol` | Command and extension message types with validators |
//! | `settings` | Persistent settings storage |
//! | `socket` | Reconnecting websocket client |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use player_relay::bootstrap::bootstrap_page;
//! use player_relay::messaging::{RuntimeChannel, WindowChannel};
//! use player_relay::settings::MemorySettingsStore;
//!
//! # async fn run() -> player_relay::Result<()> {
//! let settings = Arc::new(MemorySettingsStore::new());
//! let window = WindowChannel::new("https://music.example.com");
//! let bus = RuntimeChannel::new();
//!
//! let runtime = bootstrap_page(settings, window, bus.endpoint()).await?;
//! println!("status: {}", runtime.connection().connection_status());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

/// Page runtime bootstrap.
pub mod bootstrap;

/// Connection state management.
pub mod connection;

/// Error types.
pub mod error;

/// Cross-context messaging.
pub mod messaging;

/// Wire protocol types and validators.
pub mod protocol;

/// Persistent extension settings.
pub mod settings;

/// Reconnecting websocket client.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use bootstrap::{PageRuntime, bootstrap_page};
pub use connection::ConnectionHandler;
pub use error::{Error, Result};
pub use protocol::{ConnectionStatus, ExtensionMessage, InitialData, PlayerCommand};
pub use socket::SocketClient;
