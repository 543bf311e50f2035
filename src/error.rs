//! Unified error types for the reservation engine.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::coordinator::AdvisoryErrorCode;

/// Unified error type for the reservation engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Coordinator RPC error.
    #[error("coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// Reservation session error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Change feed error.
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the coordinator RPC boundary.
///
/// Advisory failures (`Disabled`, `Rpc`, `Exception`, `InvalidResponse`)
/// only leave the local view stale; a `Rejected` value is the authoritative
/// transaction refusing the operation and is terminal for that attempt.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// The reservation feature is administratively disabled for the tenant.
    #[error("reservations disabled for this tenant")]
    Disabled,

    /// Transport-level RPC failure.
    #[error("coordinator rpc failed: {0}")]
    Rpc(String),

    /// The coordinator reported a server-side exception.
    #[error("coordinator exception: {0}")]
    Exception(String),

    /// The coordinator responded with something unparseable.
    #[error("invalid coordinator response: {0}")]
    InvalidResponse(String),

    /// Authoritative rejection from the atomic create-bet transaction.
    #[error("rejected ({code}): {message}")]
    Rejected {
        /// Structured error code, surfaced to the operator verbatim.
        code: AdvisoryErrorCode,
        /// Human-readable message from the coordinator.
        message: String,
        /// Balance available at the authoritative check, when reported.
        available: Option<Decimal>,
        /// Balance the operation required, when reported.
        required: Option<Decimal>,
    },
}

impl CoordinatorError {
    /// Whether this error is advisory-only (stale view, safe to ignore)
    /// as opposed to an authoritative rejection.
    pub fn is_advisory(&self) -> bool {
        !matches!(self, CoordinatorError::Rejected { .. })
    }
}

/// Reservation session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session task has terminated and no longer accepts commands.
    #[error("session {session_id} is closed")]
    Closed {
        /// The closed session's id.
        session_id: String,
    },
}

/// Change feed connection and message errors.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Connection failed.
    #[error("feed connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("feed connection closed: code={code:?}, reason={reason}")]
    ConnectionClosed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// Message parsing failed.
    #[error("failed to parse feed message: {0}")]
    ParseError(String),

    /// Send failed.
    #[error("failed to send feed message: {0}")]
    SendFailed(String),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejection_is_not_advisory() {
        let err = CoordinatorError::Rejected {
            code: AdvisoryErrorCode::SaldoInsuficiente,
            message: "insufficient balance".to_string(),
            available: Some(dec!(40)),
            required: Some(dec!(50)),
        };
        assert!(!err.is_advisory());
        assert!(CoordinatorError::Disabled.is_advisory());
        assert!(CoordinatorError::Rpc("timeout".to_string()).is_advisory());
    }
}
