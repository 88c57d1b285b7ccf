//! Aggregate verdict across the accounts of one source.

use crate::types::ReconciliationResult;

/// AND of every account's balance and count agreement.
pub fn overall_ok(results: &[ReconciliationResult]) -> bool {
    results.iter().all(ReconciliationResult::is_ok)
}

/// Accounts that failed balance or count agreement, in result order.
pub fn failing_accounts(results: &[ReconciliationResult]) -> Vec<&str> {
    results
        .iter()
        .filter(|r| !r.is_ok())
        .map(|r| r.account.as_str())
        .collect()
}
