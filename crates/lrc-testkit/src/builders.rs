//! Shorthands for scenario tests.

use std::collections::BTreeMap;

use lrc_runtime::SourceDescriptor;
use lrc_schemas::{Category, RawRecord};
use lrc_source::{
    AssetRef, CategorySpec, Direction, FeeRule, FieldMap, KeyRule, PaginationStyle, Termination,
    TimestampFormat,
};
use serde_json::{json, Map, Value};

/// Raw record from a JSON object literal. Non-objects give an empty record.
pub fn record(v: Value) -> RawRecord {
    RawRecord::from_value(v).unwrap_or_else(|| RawRecord::new(Map::new()))
}

/// Exchange deposit: `{id, time, amount, asset}`.
pub fn deposit(id: u64, time: i64, amount: &str) -> RawRecord {
    record(json!({"id": id, "time": time, "amount": amount, "asset": "USD"}))
}

/// Explorer transfer: `{hash, timeStamp, from, to, value, fee}`, value and fee in ether.
pub fn transfer(hash: &str, time: i64, from: &str, to: &str, value: &str, fee: &str) -> RawRecord {
    record(json!({
        "hash": hash,
        "timeStamp": time.to_string(),
        "from": from,
        "to": to,
        "value": value,
        "fee": fee,
    }))
}

pub fn pagination(first_page: u64, page_size: usize, termination: Termination) -> PaginationStyle {
    PaginationStyle {
        first_page,
        page_size,
        termination,
    }
}

/// `deposit` category keyed by `id`, inflow, fixed USD asset.
pub fn deposit_category() -> CategorySpec {
    CategorySpec {
        category: Category::Deposit,
        key: KeyRule::Field("id".to_string()),
        fields: FieldMap {
            timestamp: "time".to_string(),
            timestamp_format: TimestampFormat::Auto,
            amount: "amount".to_string(),
            decimals: None,
            decimals_field: None,
            asset: AssetRef::Fixed("USD".to_string()),
            from: None,
            to: None,
            fee: None,
            fee_decimals: None,
            direction: Direction::Inflow,
        },
        path: None,
        query: BTreeMap::new(),
    }
}

/// `normal_tx` category keyed by `hash`, signed by counterparty, ETH.
pub fn transfer_category() -> CategorySpec {
    CategorySpec {
        category: Category::NormalTx,
        key: KeyRule::Field("hash".to_string()),
        fields: FieldMap {
            timestamp: "timeStamp".to_string(),
            timestamp_format: TimestampFormat::Auto,
            amount: "value".to_string(),
            decimals: None,
            decimals_field: None,
            asset: AssetRef::Fixed("ETH".to_string()),
            from: Some("from".to_string()),
            to: Some("to".to_string()),
            fee: Some(FeeRule::Field("fee".to_string())),
            fee_decimals: None,
            direction: Direction::ByCounterparty,
        },
        path: None,
        query: BTreeMap::new(),
    }
}

/// Descriptor with summed balance, default precision and no rate limit.
pub fn descriptor(
    name: &str,
    accounts: &[&str],
    pagination: PaginationStyle,
    categories: Vec<CategorySpec>,
) -> SourceDescriptor {
    SourceDescriptor {
        name: name.to_string(),
        accounts: accounts.iter().map(|a| a.to_string()).collect(),
        pagination,
        min_request_interval_ms: None,
        balance: Default::default(),
        categories,
        http: None,
    }
}
