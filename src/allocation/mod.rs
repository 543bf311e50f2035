//! Pure allocation computations.
//!
//! This module handles:
//! - Waterfall allocation of a stake across the three balance tiers
//! - Edit-mode real-balance adjustment for previously settled bets
//!
//! Nothing in here performs IO or raises errors; under-coverage is data.

pub mod adjustment;
pub mod waterfall;

pub use adjustment::{adjust_real_balance, BetResult, EditAdjustment};
pub use waterfall::{allocate, WaterfallAllocation};
