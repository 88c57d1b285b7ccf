//! lrc-reconcile
//!
//! Reconciliation of one account's normalized history against the store.
//!
//! Decisions:
//! - New entries are a true set difference on `(category, key)`, skipped
//!   entirely in show-all mode
//! - Balances are compared after rounding both sides to the same precision,
//!   exact equality only
//! - A mismatch is reported, never raised
//! - Store keys the source no longer reports break count agreement
//!
//! Deterministic, pure logic. No IO. No clock.

mod balance;
mod engine;
mod types;
mod verdict;

pub use balance::{round_balance, select_source_balance, summed_balance};
pub use engine::{new_entries, reconcile};
pub use types::*;
pub use verdict::{failing_accounts, overall_ok};
