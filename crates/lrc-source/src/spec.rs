//! Declarative per-source rules.
//!
//! A source is described by data, not by code: how it paginates, how a key is
//! derived for each category, and which raw fields hold the timestamp, amount,
//! asset, counterparties and fee. These types deserialize straight from the
//! `sources[]` section of the layered config.

use std::collections::BTreeMap;

use lrc_schemas::Category;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// How the paginator decides that a page was the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A page with fewer records than `page_size` ends the sequence.
    #[default]
    ShortPage,
    /// The source returns `{current, last}` metadata; `current >= last` ends it.
    /// Pages without metadata fall back to the short-page rule.
    LastPageMarker,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaginationStyle {
    /// Index of the first page: 0 or 1 depending on the source.
    #[serde(default)]
    pub first_page: u64,
    pub page_size: usize,
    #[serde(default)]
    pub termination: Termination,
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// One side of a paired key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairOperand {
    /// Integer read from a raw field.
    Field(String),
    /// The account identifier itself (validator index).
    Account,
}

/// Key derivation rule for one category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRule {
    /// Natural unique field (hash, trade id, block number).
    Field(String),
    /// Szudzik pairing of two integers, in this order.
    Pair([PairOperand; 2]),
}

impl KeyRule {
    /// Raw field names referenced by this rule.
    pub fn field_names(&self) -> Vec<&str> {
        match self {
            KeyRule::Field(f) => vec![f.as_str()],
            KeyRule::Pair(ops) => ops
                .iter()
                .filter_map(|op| match op {
                    PairOperand::Field(f) => Some(f.as_str()),
                    PairOperand::Account => None,
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Field mapping
// ---------------------------------------------------------------------------

/// Timestamp encoding. Any string other than the named formats is taken as a
/// chrono `strftime` pattern, interpreted as UTC.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum TimestampFormat {
    #[default]
    Auto,
    EpochSeconds,
    EpochMillis,
    Rfc3339,
    Pattern(String),
}

impl From<String> for TimestampFormat {
    fn from(s: String) -> Self {
        match s.as_str() {
            "auto" => TimestampFormat::Auto,
            "epoch_seconds" => TimestampFormat::EpochSeconds,
            "epoch_millis" => TimestampFormat::EpochMillis,
            "rfc3339" => TimestampFormat::Rfc3339,
            _ => TimestampFormat::Pattern(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetRef {
    Field(String),
    Fixed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeRule {
    Field(String),
    /// Product of two fields, e.g. gas used times gas price.
    Product([String; 2]),
}

/// How the sign of an amount is decided.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "DirectionRepr")]
pub enum Direction {
    Inflow,
    Outflow,
    /// Keep the sign the source reports.
    Signed,
    /// Negative when `from` is the account, positive when `to` is.
    #[default]
    ByCounterparty,
    /// Negative when the side field holds one of `outflow_values` (case-insensitive).
    Side {
        field: String,
        outflow_values: Vec<String>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DirectionRepr {
    Named(NamedDirection),
    Side {
        side_field: String,
        #[serde(default)]
        outflow_values: Vec<String>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum NamedDirection {
    Inflow,
    Outflow,
    Signed,
    ByCounterparty,
}

impl From<DirectionRepr> for Direction {
    fn from(r: DirectionRepr) -> Self {
        match r {
            DirectionRepr::Named(NamedDirection::Inflow) => Direction::Inflow,
            DirectionRepr::Named(NamedDirection::Outflow) => Direction::Outflow,
            DirectionRepr::Named(NamedDirection::Signed) => Direction::Signed,
            DirectionRepr::Named(NamedDirection::ByCounterparty) => Direction::ByCounterparty,
            DirectionRepr::Side {
                side_field,
                outflow_values,
            } => Direction::Side {
                field: side_field,
                outflow_values,
            },
        }
    }
}

/// Where each canonical field lives in a raw record of one category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldMap {
    pub timestamp: String,
    #[serde(default)]
    pub timestamp_format: TimestampFormat,
    pub amount: String,
    /// Fixed scale shift applied to the amount (18 for wei).
    #[serde(default)]
    pub decimals: Option<u32>,
    /// Per-record scale shift (token decimals).
    #[serde(default)]
    pub decimals_field: Option<String>,
    pub asset: AssetRef,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub fee: Option<FeeRule>,
    #[serde(default)]
    pub fee_decimals: Option<u32>,
    #[serde(default)]
    pub direction: Direction,
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategorySpec {
    pub category: Category,
    pub key: KeyRule,
    pub fields: FieldMap,
    /// Endpoint path for HTTP sources.
    #[serde(default)]
    pub path: Option<String>,
    /// Extra query parameters for HTTP sources (`action: txlist`).
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explorer_category_deserializes() {
        let spec: CategorySpec = serde_json::from_value(json!({
            "category": "normal_tx",
            "key": {"field": "hash"},
            "fields": {
                "timestamp": "timeStamp",
                "amount": "value",
                "decimals": 18,
                "asset": {"fixed": "ETH"},
                "from": "from",
                "to": "to",
                "fee": {"product": ["gasUsed", "gasPrice"]},
                "fee_decimals": 18
            },
            "query": {"action": "txlist"}
        }))
        .unwrap();

        assert_eq!(spec.category, Category::NormalTx);
        assert_eq!(spec.key, KeyRule::Field("hash".to_string()));
        assert_eq!(spec.fields.timestamp_format, TimestampFormat::Auto);
        assert_eq!(spec.fields.direction, Direction::ByCounterparty);
        assert_eq!(
            spec.fields.fee,
            Some(FeeRule::Product([
                "gasUsed".to_string(),
                "gasPrice".to_string()
            ]))
        );
        assert_eq!(spec.query.get("action").map(String::as_str), Some("txlist"));
    }

    #[test]
    fn pair_key_with_account_operand() {
        let rule: KeyRule =
            serde_json::from_value(json!({"pair": [{"field": "epoch"}, "account"]})).unwrap();
        assert_eq!(
            rule,
            KeyRule::Pair([PairOperand::Field("epoch".to_string()), PairOperand::Account])
        );
        assert_eq!(rule.field_names(), vec!["epoch"]);
    }

    #[test]
    fn direction_forms() {
        let d: Direction = serde_json::from_value(json!("outflow")).unwrap();
        assert_eq!(d, Direction::Outflow);

        let d: Direction = serde_json::from_value(json!({
            "side_field": "type",
            "outflow_values": ["sell"]
        }))
        .unwrap();
        assert_eq!(
            d,
            Direction::Side {
                field: "type".to_string(),
                outflow_values: vec!["sell".to_string()]
            }
        );

        assert!(serde_json::from_value::<Direction>(json!("sideways")).is_err());
    }

    #[test]
    fn timestamp_format_names_and_patterns() {
        let f: TimestampFormat = serde_json::from_value(json!("epoch_millis")).unwrap();
        assert_eq!(f, TimestampFormat::EpochMillis);
        let f: TimestampFormat = serde_json::from_value(json!("%d/%m/%Y %H:%M")).unwrap();
        assert_eq!(f, TimestampFormat::Pattern("%d/%m/%Y %H:%M".to_string()));
    }

    #[test]
    fn pagination_defaults() {
        let p: PaginationStyle = serde_json::from_value(json!({"page_size": 100})).unwrap();
        assert_eq!(p.first_page, 0);
        assert_eq!(p.termination, Termination::ShortPage);
    }
}
