//! Edit-mode adjustment of the real-money balance.
//!
//! When a previously saved bet is reopened for editing, the displayed real
//! balance must reflect the world as it will be after the edit is saved:
//! a stake that is still held, or was already realized as a loss, has to be
//! added back before the new allocation is previewed. The adjusted value is
//! preview-only and never written back to any persisted balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Settlement result of a bet, as stored by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BetResult {
    /// Bet still open; the stake is held and will be released on edit.
    Pendente,
    /// Full win; payout already returned to the balance.
    Green,
    /// Half win.
    MeioGreen,
    /// Full loss; the stake is gone from the balance.
    Red,
    /// Half loss.
    MeioRed,
    /// Voided; stake already refunded.
    Void,
}

impl BetResult {
    /// Parse an optional ledger string. `None`, empty and unknown values all
    /// mean "no settlement recorded", which edit mode treats like an open bet.
    pub fn from_wire(value: Option<&str>) -> Option<BetResult> {
        value.filter(|v| !v.is_empty())?.parse().ok()
    }

    /// Whether the original stake's effect is already reflected in the
    /// current balance (payout or refund landed), so no correction applies.
    pub fn settled_into_balance(&self) -> bool {
        matches!(self, BetResult::Green | BetResult::MeioGreen | BetResult::Void)
    }
}

/// Signed correction to the real-money tier for the duration of an edit
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditAdjustment {
    /// Stake of the bet as it was last saved.
    pub previous_stake: Decimal,
    /// Last known settlement state, if any.
    pub last_result: Option<BetResult>,
    /// Correction applied to the real tier (`+previous_stake` or zero).
    pub delta_real: Decimal,
}

impl EditAdjustment {
    /// Compute the correction for the bet being edited.
    pub fn for_bet(previous_stake: Decimal, last_result: Option<BetResult>) -> Self {
        let delta_real = match last_result {
            Some(result) if result.settled_into_balance() => Decimal::ZERO,
            // Open or realized as a loss: undo the old consumption first.
            _ => previous_stake,
        };

        Self {
            previous_stake,
            last_result,
            delta_real,
        }
    }

    /// Apply the correction to a committed real balance for preview.
    pub fn apply(&self, real_balance: Decimal) -> Decimal {
        real_balance + self.delta_real
    }
}

/// Adjust the committed real balance for an edit-mode preview.
///
/// The result feeds the waterfall allocator as its `real_balance` input.
pub fn adjust_real_balance(
    real_balance: Decimal,
    previous_stake: Decimal,
    last_result: Option<BetResult>,
) -> Decimal {
    EditAdjustment::for_bet(previous_stake, last_result).apply(real_balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn loss_adds_stake_back() {
        // previousStake=50, lastResult=RED, realBalance=200 -> 250
        let adjusted = adjust_real_balance(dec!(200), dec!(50), Some(BetResult::Red));
        assert_eq!(adjusted, dec!(250));
    }

    #[test]
    fn win_leaves_balance_untouched() {
        // previousStake=50, lastResult=GREEN, realBalance=200 -> 200
        let adjusted = adjust_real_balance(dec!(200), dec!(50), Some(BetResult::Green));
        assert_eq!(adjusted, dec!(200));
    }

    #[test]
    fn open_and_loss_results_add_stake_back() {
        for result in [
            None,
            Some(BetResult::Pendente),
            Some(BetResult::Red),
            Some(BetResult::MeioRed),
        ] {
            let adjusted = adjust_real_balance(dec!(100), dec!(25), result);
            assert_eq!(adjusted, dec!(125), "result {result:?}");
        }
    }

    #[test]
    fn settled_results_apply_no_correction() {
        for result in [BetResult::Green, BetResult::MeioGreen, BetResult::Void] {
            let adjusted = adjust_real_balance(dec!(100), dec!(25), Some(result));
            assert_eq!(adjusted, dec!(100), "result {result:?}");
        }
    }

    #[test]
    fn adjustment_captures_delta() {
        let adj = EditAdjustment::for_bet(dec!(50), Some(BetResult::MeioRed));
        assert_eq!(adj.delta_real, dec!(50));

        let adj = EditAdjustment::for_bet(dec!(50), Some(BetResult::Void));
        assert_eq!(adj.delta_real, dec!(0));
    }

    #[test]
    fn wire_parsing() {
        assert_eq!(BetResult::from_wire(Some("GREEN")), Some(BetResult::Green));
        assert_eq!(
            BetResult::from_wire(Some("MEIO_RED")),
            Some(BetResult::MeioRed)
        );
        assert_eq!(BetResult::from_wire(Some("")), None);
        assert_eq!(BetResult::from_wire(None), None);
        assert_eq!(BetResult::from_wire(Some("GARBAGE")), None);
    }

    #[test]
    fn wire_round_trip() {
        assert_eq!(BetResult::MeioGreen.to_string(), "MEIO_GREEN");
        assert_eq!(BetResult::Pendente.to_string(), "PENDENTE");
    }
}
