//! Change feed: other sessions' reservation mutations.
//!
//! The feed keeps the local balance view honest. `FeedSocket` maintains the
//! tenant-scoped WebSocket subscription; `ReservedLedger` folds the events
//! into a per-bookmaker reserved-by-others sum and broadcasts invalidations
//! so displayed balances refresh. Everything here is advisory and eventually
//! consistent; commit-time validation at the coordinator is the sole point
//! of truth.

pub mod listener;
pub mod websocket;

pub use listener::{FeedEvent, Invalidation, LedgerStats, ReservedLedger};
pub use websocket::{FeedSocket, ReconnectConfig};
