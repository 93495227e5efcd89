//! Transition-coalescing state for mutable settings.
//!
//! A [`TransitionState`] wraps one setting (the enabled flag, the server URL)
//! that may be updated again while a previous update is still being applied.
//! Concurrent requests collapse into a single pending slot: last write wins,
//! intermediate values are lost by design, and at most one transition per
//! field is in flight at any time.

// ============================================================================
// TransitionState
// ============================================================================

/// A mutable setting with one pending slot for coalesced updates.
#[derive(Debug, Clone)]
pub struct TransitionState<T> {
    /// The currently applied value.
    pub value: T,
    /// The most recent value requested while a transition was in flight.
    pub pending: Option<T>,
    /// Whether a transition is currently being applied.
    pub is_transitioning: bool,
}

impl<T> TransitionState<T> {
    /// Creates a settled state holding `value`.
    #[inline]
    pub fn new(value: T) -> Self {
        Self {
            value,
            pending: None,
            is_transitioning: false,
        }
    }

    /// Attempts to start a transition towards `next`.
    ///
    /// If a transition is already in flight, `next` overwrites the pending
    /// slot and `false` is returned; the in-flight transition will pick it up
    /// when it settles. Otherwise the state is marked transitioning and the
    /// caller owns the transition.
    pub fn try_begin(&mut self, next: T) -> bool {
        if self.is_transitioning {
            self.pending = Some(next);
            return false;
        }
        self.is_transitioning = true;
        true
    }

    /// Applies `next` as the current value, returning the previous one.
    pub fn apply(&mut self, next: T) -> T {
        std::mem::replace(&mut self.value, next)
    }

    /// Completes one transition step.
    ///
    /// Returns the pending value if one was queued in the meantime (the
    /// transition stays in flight and must apply it next), or `None` once the
    /// state is settled.
    pub fn settle(&mut self) -> Option<T> {
        match self.pending.take() {
            Some(next) => Some(next),
            None => {
                self.is_transitioning = false;
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
