//! Wire message types and runtime validators.
//!
//! This module is the single trust boundary for data arriving from the
//! controller server's socket or from a cross-context channel. Every inbound
//! payload passes through exactly one shape validator before it is acted on.
//!
//! # Message Families
//!
//! | Family | Source | Purpose |
//! |--------|--------|---------|
//! | [`PlayerCommand`] | controller server | One playback action |
//! | [`ExtensionMessage`] | popup / page runtime | Status coordination |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Player commands and their validator |
//! | `message` | Extension messages, connection status, validators |

// ============================================================================
// Submodules
// ============================================================================

/// Player command messages.
pub mod command;

/// Extension-internal messages and connection status.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{PlayerCommand, is_player_command};
pub use message::{
    ConnectionStatus, ExtensionMessage, InitialData, is_connection_status, is_initial_data,
    is_request_initial_data,
};
