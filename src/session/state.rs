//! Reservation session state machine.

/// Lifecycle state of one reservation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No bookmaker selected or stake is zero; nothing reserved.
    Idle,
    /// A stake edit is waiting out the debounce window (or a failed upsert
    /// is waiting for the next edit).
    Pending,
    /// Upsert RPC in flight.
    Reserving,
    /// Reservation acknowledged and active at the coordinator.
    Active,
    /// Commit RPC in flight after a save.
    Committing,
    /// Cancel RPC in flight.
    Cancelling,
    /// Session ended; no further commands are processed.
    Closed,
}

impl SessionState {
    /// Whether the session has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Whether the session currently holds an acknowledged reservation.
    pub fn holds_reservation(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Committing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_closed_is_terminal() {
        for state in [
            SessionState::Idle,
            SessionState::Pending,
            SessionState::Reserving,
            SessionState::Active,
            SessionState::Committing,
            SessionState::Cancelling,
        ] {
            assert!(!state.is_terminal(), "state {state:?}");
        }
        assert!(SessionState::Closed.is_terminal());
    }

    #[test]
    fn reservation_holding_states() {
        assert!(SessionState::Active.holds_reservation());
        assert!(SessionState::Committing.holds_reservation());
        assert!(!SessionState::Pending.holds_reservation());
        assert!(!SessionState::Cancelling.holds_reservation());
    }
}
