//! Balance agreement.

use lrc_schemas::AccountHistory;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::{BalanceBasis, BalancePolicy, BalanceStrategy};

/// Round to `precision` fractional digits, ties to even.
pub fn round_balance(d: Decimal, precision: u32) -> Decimal {
    d.round_dp_with_strategy(precision, RoundingStrategy::MidpointNearestEven)
}

/// Net change of every entry, oldest first, optionally limited to one asset.
pub fn summed_balance(history: &AccountHistory, asset: Option<&str>) -> Decimal {
    history
        .chronological()
        .into_iter()
        .filter(|e| asset.map_or(true, |a| e.asset.eq_ignore_ascii_case(a)))
        .fold(Decimal::ZERO, |acc, e| acc + e.net_change())
}

/// Pick the unrounded source-side balance for `policy`.
pub fn select_source_balance(
    history: &AccountHistory,
    policy: &BalancePolicy,
    reported: Option<Decimal>,
) -> (Decimal, BalanceBasis) {
    match (policy.strategy, reported) {
        (BalanceStrategy::Reported, Some(b)) => (b, BalanceBasis::Reported),
        (BalanceStrategy::Reported, None) => (
            summed_balance(history, policy.asset.as_deref()),
            BalanceBasis::SummedFallback,
        ),
        (BalanceStrategy::Summed, _) => (
            summed_balance(history, policy.asset.as_deref()),
            BalanceBasis::Summed,
        ),
    }
}
