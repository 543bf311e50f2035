//! Waterfall allocation of a stake across balance tiers.

use rust_decimal::Decimal;

/// Deterministic split of a requested stake across the three balance tiers.
///
/// Produced fresh on every input change and never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaterfallAllocation {
    /// The stake the operator asked for.
    pub stake_requested: Decimal,
    /// Portion covered by bonus credit (always consumed first).
    pub from_bonus: Decimal,
    /// Portion covered by free-bet credit (only when opted in).
    pub from_free_bet: Decimal,
    /// Portion covered by real money.
    pub from_real: Decimal,
    /// Portion no tier could cover.
    pub shortfall: Decimal,
    /// Whether the stake is fully covered (`shortfall == 0`).
    pub fully_covered: bool,
}

impl WaterfallAllocation {
    /// Total amount drawn from promotional tiers (bonus + free-bet).
    pub fn from_promotional(&self) -> Decimal {
        self.from_bonus + self.from_free_bet
    }
}

/// Allocate a stake across the bonus, free-bet and real tiers.
///
/// Strict, ordered, greedy, no backtracking:
/// bonus is mandatory whenever present, free-bet is opt-in per stake, real
/// money covers the rest. Whatever remains is the shortfall.
///
/// A zero or negative stake allocates nothing and counts as fully covered.
/// Negative tier balances are treated as empty tiers, so every `from_*`
/// component stays within `[0, tier]` for arbitrary inputs.
pub fn allocate(
    stake: Decimal,
    bonus_balance: Decimal,
    free_bet_balance: Decimal,
    real_balance: Decimal,
    use_free_bet: bool,
) -> WaterfallAllocation {
    if stake <= Decimal::ZERO {
        return WaterfallAllocation {
            stake_requested: stake,
            from_bonus: Decimal::ZERO,
            from_free_bet: Decimal::ZERO,
            from_real: Decimal::ZERO,
            shortfall: Decimal::ZERO,
            fully_covered: true,
        };
    }

    let mut remaining = stake;

    let from_bonus = bonus_balance.max(Decimal::ZERO).min(remaining);
    remaining -= from_bonus;

    let from_free_bet = if use_free_bet {
        free_bet_balance.max(Decimal::ZERO).min(remaining)
    } else {
        Decimal::ZERO
    };
    remaining -= from_free_bet;

    let from_real = real_balance.max(Decimal::ZERO).min(remaining);
    remaining -= from_real;

    WaterfallAllocation {
        stake_requested: stake,
        from_bonus,
        from_free_bet,
        from_real,
        shortfall: remaining,
        fully_covered: remaining == Decimal::ZERO,
    }
}
