//! Connection state management.
//!
//! This module owns the desired connection settings and drives the socket
//! layer to match them. The handler serializes setting changes per field
//! through a one-slot pending mechanism, so rapid toggling can never leave a
//! half-applied state or an orphaned socket.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handler` | The connection state handler |
//! | `transition` | Transition-coalescing setting wrapper |

// ============================================================================
// Submodules
// ============================================================================

/// Connection state handler.
pub mod handler;

/// Transition-coalescing state for mutable settings.
pub mod transition;

// ============================================================================
// Re-exports
// ============================================================================

pub use handler::{CommandCallback, ConnectionHandler, StatusCallback};
pub use transition::TransitionState;
