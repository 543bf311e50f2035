//! Per-form reservation sessions.
//!
//! Each open bet form runs one session: a state machine plus an event loop
//! that debounces stake edits, talks to the reservation advisor, and emits
//! lifecycle events for the UI layer.

pub mod manager;
pub mod state;

pub use manager::{ReservationSession, SessionCommand, SessionEvent, SessionHandle};
pub use state::SessionState;
