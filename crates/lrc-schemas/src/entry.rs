use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Key, RawRecord};

/// Kind of ledger record a source exposes.
///
/// Blockchain explorers expose `NormalTx`, `InternalTx`, `TokenTx`,
/// `BlockReward`, `Withdrawal` and `ValidatorBalance`; exchanges expose
/// `Trade`, `Deposit`, `Withdrawal` and `LedgerLine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    NormalTx,
    InternalTx,
    TokenTx,
    BlockReward,
    Withdrawal,
    Deposit,
    Trade,
    LedgerLine,
    ValidatorBalance,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::NormalTx,
        Category::InternalTx,
        Category::TokenTx,
        Category::BlockReward,
        Category::Withdrawal,
        Category::Deposit,
        Category::Trade,
        Category::LedgerLine,
        Category::ValidatorBalance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::NormalTx => "normal_tx",
            Category::InternalTx => "internal_tx",
            Category::TokenTx => "token_tx",
            Category::BlockReward => "block_reward",
            Category::Withdrawal => "withdrawal",
            Category::Deposit => "deposit",
            Category::Trade => "trade",
            Category::LedgerLine => "ledger_line",
            Category::ValidatorBalance => "validator_balance",
        }
    }

    /// Accepts the snake_case name and the dashed form (`normal-tx`).
    pub fn parse(s: &str) -> Option<Category> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        Category::ALL.into_iter().find(|c| c.as_str() == norm)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical ledger line produced by normalization. Never mutated afterwards.
///
/// Sign convention: inflows are positive, outflows negative. `fee` is a
/// non-negative charge borne by `account` (zero when the account did not pay).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: Key,
    pub source: String,
    pub account: String,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
    pub amount: Decimal,
    pub asset: String,
    pub fee: Decimal,
    pub counterparty_from: Option<String>,
    pub counterparty_to: Option<String>,
    /// Source payload, with parse flags when a sentinel value was substituted.
    pub raw: RawRecord,
}

impl LedgerEntry {
    /// Effect of this entry on the account balance.
    pub fn net_change(&self) -> Decimal {
        self.amount - self.fee
    }

    /// `true` when normalization had to substitute a sentinel for any field.
    pub fn is_flagged(&self) -> bool {
        !self.raw.parse_flags().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_accepts_both_spellings() {
        assert_eq!(Category::parse("normal-tx"), Some(Category::NormalTx));
        assert_eq!(Category::parse("TOKEN_TX"), Some(Category::TokenTx));
        assert_eq!(Category::parse("ledger_line"), Some(Category::LedgerLine));
        assert_eq!(Category::parse("swap"), None);
    }

    #[test]
    fn category_names_round_trip() {
        for c in Category::ALL {
            assert_eq!(Category::parse(c.as_str()), Some(c));
            let json = serde_json::to_string(&c).unwrap();
            assert_eq!(json, format!("\"{}\"", c.as_str()));
        }
    }
}
