//! Advisory stake reservation and waterfall settlement engine.
//!
//! This library is the concurrency core of a multi-tenant sports-arbitrage
//! bookkeeping application. Operators working concurrently against the same
//! bookmaker accounts get early, real-time visibility of each other's
//! in-flight stakes through advisory reservations, while the authoritative
//! balance check stays inside the coordinator's atomic create-bet
//! transaction.
//!
//! # Layers
//!
//! ```text
//! stake input ──▶ ReservationSession (debounce) ──▶ Coordinator.upsert
//!                                                        │
//!                     change feed (tenant scoped) ◀──────┘
//!                            │
//!                     ReservedLedger ──▶ reserved-by-others ──▶ allocate()
//! ```
//!
//! The waterfall allocator splits a stake across bonus, free-bet and real
//! balances in strict priority order; it is pure and never errors. The
//! reservation layer is advisory only: it reduces the frequency of
//! last-moment conflicts, never their possibility.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`allocation`]: Waterfall allocator and edit-mode adjustment
//! - [`coordinator`]: Coordinator RPC boundary (traits, HTTP client, mock)
//! - [`session`]: Per-form reservation session state machine
//! - [`feed`]: Change feed subscription and reserved-by-others view
//! - [`api`]: HTTP API for health/metrics
//! - [`utils`]: Utility functions

pub mod allocation;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod session;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, Result};
