//! Coordinator boundary: the remote service owning reservation state.
//!
//! This module handles:
//! - Reservation and balance types shared across the RPC boundary
//! - The `ReservationAdvisor` / `SettlementAuthority` trait seam
//! - HTTP client for the coordinator RPC endpoints
//! - Mock coordinator for testing and simulation

pub mod client;
pub mod mock;
pub mod types;

pub use client::{HttpCoordinator, ReservationAdvisor, SettlementAuthority};
pub use mock::{MockConfig, MockCoordinator};
pub use types::{
    AdvisoryErrorCode, AvailableBalance, BalanceSnapshot, BetCommitReceipt, BetCommitRequest,
    FormKind, Reservation, ReservationStatus, UpsertRequest, UpsertResponse,
};
