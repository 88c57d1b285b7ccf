//! Raw record to [`LedgerEntry`] conversion.
//!
//! This module turns the records of one `(account, category)` stream into
//! canonical entries:
//! - timestamps parsed to UTC, epoch zero on failure
//! - amounts parsed exactly into [`Decimal`], zero on failure, signed by the
//!   category's [`Direction`] rule
//! - fees parsed and charged only to the paying account
//! - incoming legs of transfers between tracked accounts dropped
//!
//! Parse failures never abort a pass. The substituted field is listed in the
//! retained raw copy (see [`RawRecord::with_parse_flags`]).
//!
//! It does **not** fetch, and it does not compare against the store.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lrc_schemas::{AccountHistory, KeyError, LedgerEntry, ParseFlag, RawRecord};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::keys::derive_key;
use crate::spec::{AssetRef, CategorySpec, Direction, FeeRule, TimestampFormat};

/// Naive layouts tried by [`TimestampFormat::Auto`] after RFC 3339.
const NAIVE_LAYOUTS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

// ---------------------------------------------------------------------------
// Context / outcome
// ---------------------------------------------------------------------------

/// Request-scoped inputs shared by every record of one stream.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub source: &'a str,
    pub account: &'a str,
    /// Every account tracked for this source, as built by [`tracked_set`].
    pub tracked: &'a HashSet<String>,
}

/// Lowercased, trimmed account identifiers for self-transfer detection.
pub fn tracked_set<I, S>(accounts: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    accounts
        .into_iter()
        .map(|a| a.as_ref().trim().to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Entry(LedgerEntry),
    /// Incoming leg whose sender is another tracked account.
    SelfTransfer,
    /// No key could be derived; the record is skipped.
    Unkeyed(KeyError),
}

fn same_account(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

/// Parse a timestamp value under `format`. `None` when it cannot be read.
pub fn parse_timestamp(v: &Value, format: &TimestampFormat) -> Option<DateTime<Utc>> {
    match format {
        TimestampFormat::Auto => match v {
            Value::Number(_) => epoch_seconds(v),
            Value::String(s) => {
                let t = s.trim();
                if t.parse::<f64>().is_ok() {
                    return epoch_seconds(v);
                }
                if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
                    return Some(dt.with_timezone(&Utc));
                }
                NAIVE_LAYOUTS
                    .iter()
                    .find_map(|layout| NaiveDateTime::parse_from_str(t, layout).ok())
                    .map(|n| n.and_utc())
                    .or_else(|| {
                        NaiveDate::parse_from_str(t, "%Y-%m-%d")
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                            .map(|n| n.and_utc())
                    })
            }
            _ => None,
        },
        TimestampFormat::EpochSeconds => epoch_seconds(v),
        TimestampFormat::EpochMillis => {
            let ms = match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }?;
            DateTime::from_timestamp_millis(ms)
        }
        TimestampFormat::Rfc3339 => DateTime::parse_from_rfc3339(v.as_str()?.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        TimestampFormat::Pattern(p) => {
            let t = v.as_str()?.trim();
            if let Ok(dt) = DateTime::parse_from_str(t, p) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(n) = NaiveDateTime::parse_from_str(t, p) {
                return Some(n.and_utc());
            }
            NaiveDate::parse_from_str(t, p)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|n| n.and_utc())
        }
    }
}

/// Integer or fractional epoch seconds, as a JSON number or numeric string.
fn epoch_seconds(v: &Value) -> Option<DateTime<Utc>> {
    let text = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    if let Ok(secs) = text.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    let f = text.parse::<f64>().ok().filter(|f| f.is_finite())?;
    let secs = f.floor();
    let nanos = ((f - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// Parse a decimal value exactly, shifting the point left by `decimals`
/// (`"1500000000000000000"` with 18 decimals is `1.5`).
///
/// Accepts JSON numbers and numeric strings, including scientific notation.
pub fn parse_decimal(v: &Value, decimals: u32) -> Option<Decimal> {
    let text = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }

    if text.contains(['e', 'E']) {
        let mut d = Decimal::from_scientific(&text).ok()?;
        for _ in 0..decimals {
            d = d.checked_div(Decimal::TEN)?;
        }
        return Some(d.normalize());
    }

    let shifted = shift_point(&text, decimals)?;
    Decimal::from_str(&shifted).ok().map(|d| d.normalize())
}

/// Move the decimal point of a plain decimal string `decimals` places left.
fn shift_point(s: &str, decimals: u32) -> Option<String> {
    let (sign, body) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.strip_prefix('+').unwrap_or(s)),
    };
    let (int, frac) = body.split_once('.').unwrap_or((body, ""));
    if int.is_empty() && frac.is_empty() {
        return None;
    }
    if !int.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let digits = format!("{int}{frac}");
    let point = int.len() as i64 - decimals as i64;
    let (ip, fp) = if point <= 0 {
        (
            "0".to_string(),
            format!("{}{digits}", "0".repeat(point.unsigned_abs() as usize)),
        )
    } else {
        let (i, f) = digits.split_at(point as usize);
        (i.to_string(), f.to_string())
    };
    let ip = if ip.is_empty() { "0".to_string() } else { ip };

    Some(if fp.is_empty() {
        format!("{sign}{ip}")
    } else {
        format!("{sign}{ip}.{fp}")
    })
}

// ---------------------------------------------------------------------------
// Record normalization
// ---------------------------------------------------------------------------

/// Normalize one raw record of `spec.category` for `ctx.account`.
pub fn normalize(raw: RawRecord, spec: &CategorySpec, ctx: &NormalizeContext<'_>) -> Normalized {
    let key = match derive_key(&raw, &spec.key, ctx.account) {
        Ok(k) => k,
        Err(e) => return Normalized::Unkeyed(e),
    };

    let fields = &spec.fields;
    let from = fields.from.as_deref().and_then(|f| raw.text(f));
    let to = fields.to.as_deref().and_then(|f| raw.text(f));

    let from_is_account = from.as_deref().is_some_and(|f| same_account(f, ctx.account));
    let to_is_account = to.as_deref().is_some_and(|t| same_account(t, ctx.account));

    if to_is_account && !from_is_account {
        if let Some(f) = from.as_deref() {
            if ctx.tracked.contains(&f.trim().to_ascii_lowercase()) {
                return Normalized::SelfTransfer;
            }
        }
    }

    let mut flags: Vec<ParseFlag> = Vec::new();

    let timestamp = match raw
        .get(&fields.timestamp)
        .and_then(|v| parse_timestamp(v, &fields.timestamp_format))
    {
        Some(ts) => ts,
        None => {
            flags.push(ParseFlag::Timestamp);
            DateTime::<Utc>::default()
        }
    };

    let decimals = match (&fields.decimals_field, fields.decimals) {
        (Some(df), _) => raw.u64_field(df).and_then(|d| u32::try_from(d).ok()),
        (None, d) => Some(d.unwrap_or(0)),
    };
    let magnitude = match decimals.and_then(|d| raw.get(&fields.amount).and_then(|v| parse_decimal(v, d))) {
        Some(a) => a,
        None => {
            flags.push(ParseFlag::Amount);
            Decimal::ZERO
        }
    };

    let amount = match &fields.direction {
        Direction::Inflow => magnitude.abs(),
        Direction::Outflow => -magnitude.abs(),
        Direction::Signed => magnitude,
        Direction::ByCounterparty => match (from_is_account, to_is_account) {
            (true, true) => Decimal::ZERO,
            (true, false) => -magnitude.abs(),
            (false, true) => magnitude.abs(),
            (false, false) => magnitude,
        },
        Direction::Side {
            field,
            outflow_values,
        } => {
            match raw.text(field) {
                Some(side) if outflow_values.iter().any(|v| v.eq_ignore_ascii_case(&side)) => {
                    -magnitude.abs()
                }
                Some(_) => magnitude.abs(),
                None => {
                    flags.push(ParseFlag::Side);
                    magnitude.abs()
                }
            }
        }
    };

    let fee_charged = match fields.direction {
        Direction::ByCounterparty => from_is_account,
        _ => true,
    };
    let fee = match (&fields.fee, fee_charged) {
        (Some(rule), true) => match parse_fee(&raw, rule, fields.fee_decimals.unwrap_or(0)) {
            Ok(f) => f,
            Err(()) => {
                flags.push(ParseFlag::Fee);
                Decimal::ZERO
            }
        },
        _ => Decimal::ZERO,
    };

    let asset = match &fields.asset {
        AssetRef::Fixed(code) => code.clone(),
        AssetRef::Field(f) => raw.text(f).unwrap_or_default(),
    };

    let raw = if flags.is_empty() {
        raw
    } else {
        warn!(
            source = ctx.source,
            account = ctx.account,
            category = %spec.category,
            key = %key,
            flags = ?flags,
            "sentinel substituted for unparseable field"
        );
        raw.with_parse_flags(&flags)
    };

    Normalized::Entry(LedgerEntry {
        key,
        source: ctx.source.to_string(),
        account: ctx.account.to_string(),
        category: spec.category,
        timestamp,
        amount,
        asset,
        fee,
        counterparty_from: from,
        counterparty_to: to,
        raw,
    })
}

/// Non-negative fee. An absent field means no fee; a present but unreadable one is an error.
fn parse_fee(raw: &RawRecord, rule: &FeeRule, decimals: u32) -> Result<Decimal, ()> {
    let fee = match rule {
        FeeRule::Field(f) => match raw.get(f) {
            None => return Ok(Decimal::ZERO),
            Some(v) => parse_decimal(v, decimals).ok_or(())?,
        },
        FeeRule::Product([a, b]) => match (raw.get(a), raw.get(b)) {
            (Some(va), Some(vb)) => {
                let x = parse_decimal(va, 0).ok_or(())?;
                let y = parse_decimal(vb, decimals).ok_or(())?;
                x.checked_mul(y).ok_or(())?
            }
            _ => return Ok(Decimal::ZERO),
        },
    };
    Ok(fee.abs().normalize())
}

/// Normalize a whole stream into a fresh history. Duplicate `(key, category)`
/// pairs collapse to the first occurrence.
pub fn normalize_records(
    records: Vec<RawRecord>,
    spec: &CategorySpec,
    ctx: &NormalizeContext<'_>,
) -> AccountHistory {
    let mut history = AccountHistory::new(ctx.source, ctx.account);
    history.touch(spec.category);

    for raw in records {
        match normalize(raw, spec, ctx) {
            Normalized::Entry(entry) => {
                history.push(entry);
            }
            Normalized::SelfTransfer => history.self_transfers_dropped += 1,
            Normalized::Unkeyed(err) => {
                warn!(
                    source = ctx.source,
                    account = ctx.account,
                    category = %spec.category,
                    error = %err,
                    "record skipped: no key"
                );
                history.unkeyed += 1;
            }
        }
    }

    let duplicates = history.duplicates_collapsed();
    if duplicates > 0 || history.self_transfers_dropped > 0 {
        debug!(
            source = ctx.source,
            account = ctx.account,
            category = %spec.category,
            duplicates,
            self_transfers = history.self_transfers_dropped,
            "records collapsed during normalization"
        );
    }
    history
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{FieldMap, KeyRule};
    use chrono::TimeZone;
    use lrc_schemas::{Category, Key, PARSE_FLAGS_FIELD};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    const ME: &str = "0xAbC0000000000000000000000000000000000001";
    const MINE_TOO: &str = "0xabc0000000000000000000000000000000000002";
    const STRANGER: &str = "0x9990000000000000000000000000000000000009";

    fn explorer_spec() -> CategorySpec {
        CategorySpec {
            category: Category::NormalTx,
            key: KeyRule::Field("hash".to_string()),
            fields: FieldMap {
                timestamp: "timeStamp".to_string(),
                timestamp_format: TimestampFormat::Auto,
                amount: "value".to_string(),
                decimals: Some(18),
                decimals_field: None,
                asset: AssetRef::Fixed("ETH".to_string()),
                from: Some("from".to_string()),
                to: Some("to".to_string()),
                fee: Some(FeeRule::Product([
                    "gasUsed".to_string(),
                    "gasPrice".to_string(),
                ])),
                fee_decimals: Some(18),
                direction: Direction::ByCounterparty,
            },
            path: None,
            query: BTreeMap::new(),
        }
    }

    fn trade_spec() -> CategorySpec {
        CategorySpec {
            category: Category::Trade,
            key: KeyRule::Field("id".to_string()),
            fields: FieldMap {
                timestamp: "time".to_string(),
                timestamp_format: TimestampFormat::Auto,
                amount: "vol".to_string(),
                decimals: None,
                decimals_field: None,
                asset: AssetRef::Field("pair".to_string()),
                from: None,
                to: None,
                fee: Some(FeeRule::Field("fee".to_string())),
                fee_decimals: None,
                direction: Direction::Side {
                    field: "type".to_string(),
                    outflow_values: vec!["sell".to_string()],
                },
            },
            path: None,
            query: BTreeMap::new(),
        }
    }

    fn tracked() -> HashSet<String> {
        tracked_set([ME, MINE_TOO])
    }

    fn ctx(tracked: &HashSet<String>) -> NormalizeContext<'_> {
        NormalizeContext {
            source: "etherscan",
            account: ME,
            tracked,
        }
    }

    fn rec(v: Value) -> RawRecord {
        RawRecord::from_value(v).unwrap()
    }

    fn entry(n: Normalized) -> LedgerEntry {
        match n {
            Normalized::Entry(e) => e,
            other => panic!("expected entry, got {other:?}"),
        }
    }

    // --- parsers -----------------------------------------------------------

    #[test]
    fn shift_point_cases() {
        assert_eq!(shift_point("1500000000000000000", 18).as_deref(), Some("1.500000000000000000"));
        assert_eq!(shift_point("5", 3).as_deref(), Some("0.005"));
        assert_eq!(shift_point("-12.5", 1).as_deref(), Some("-1.25"));
        assert_eq!(shift_point("42", 0).as_deref(), Some("42"));
        assert_eq!(shift_point("1,5", 0), None);
        assert_eq!(shift_point("", 2), None);
    }

    #[test]
    fn parse_decimal_is_exact() {
        assert_eq!(parse_decimal(&json!("0.1"), 0), Some(dec("0.1")));
        assert_eq!(
            parse_decimal(&json!("1500000000000000000"), 18),
            Some(dec("1.5"))
        );
        assert_eq!(parse_decimal(&json!(250), 2), Some(dec("2.5")));
        assert_eq!(parse_decimal(&json!("1e-3"), 0), Some(dec("0.001")));
        assert_eq!(parse_decimal(&json!("abc"), 0), None);
        assert_eq!(parse_decimal(&json!(""), 0), None);
        assert_eq!(parse_decimal(&json!(null), 0), None);
    }

    #[test]
    fn timestamp_auto_formats() {
        let expected = Utc.with_ymd_and_hms(2021, 3, 25, 9, 13, 38).unwrap();
        let fmt = TimestampFormat::Auto;
        assert_eq!(parse_timestamp(&json!(1616663618), &fmt), Some(expected));
        assert_eq!(parse_timestamp(&json!("1616663618"), &fmt), Some(expected));
        assert_eq!(
            parse_timestamp(&json!("2021-03-25T09:13:38Z"), &fmt),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!("2021-03-25T11:13:38+02:00"), &fmt),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!("2021-03-25 09:13:38"), &fmt),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!("2021-03-25"), &fmt),
            Some(Utc.with_ymd_and_hms(2021, 3, 25, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp(&json!("yesterday"), &fmt), None);
    }

    #[test]
    fn timestamp_fractional_seconds_and_millis() {
        let ts = parse_timestamp(&json!(1616663618.5), &TimestampFormat::Auto).unwrap();
        assert_eq!(ts.timestamp(), 1616663618);
        assert_eq!(ts.timestamp_subsec_millis(), 500);

        let ms = parse_timestamp(&json!(1616663618123i64), &TimestampFormat::EpochMillis).unwrap();
        assert_eq!(ms.timestamp_millis(), 1616663618123);
    }

    #[test]
    fn timestamp_custom_pattern() {
        let fmt = TimestampFormat::Pattern("%d/%m/%Y %H:%M".to_string());
        assert_eq!(
            parse_timestamp(&json!("25/03/2021 09:13"), &fmt),
            Some(Utc.with_ymd_and_hms(2021, 3, 25, 9, 13, 0).unwrap())
        );
    }

    // --- records -----------------------------------------------------------

    #[test]
    fn outgoing_transfer_is_negative_and_pays_fee() {
        let t = tracked();
        let e = entry(normalize(
            rec(json!({
                "hash": "0xAA",
                "timeStamp": "1616663618",
                "value": "2000000000000000000",
                "from": ME.to_lowercase(),
                "to": STRANGER,
                "gasUsed": "21000",
                "gasPrice": "100000000000"
            })),
            &explorer_spec(),
            &ctx(&t),
        ));

        assert_eq!(e.key, Key::Str("0xaa".to_string()));
        assert_eq!(e.amount, dec("-2"));
        assert_eq!(e.fee, dec("0.0021"));
        assert_eq!(e.net_change(), dec("-2.0021"));
        assert_eq!(e.asset, "ETH");
        assert!(!e.is_flagged());
    }

    #[test]
    fn incoming_transfer_from_stranger_is_positive_without_fee() {
        let t = tracked();
        let e = entry(normalize(
            rec(json!({
                "hash": "0xBB",
                "timeStamp": 1616663618,
                "value": "500000000000000000",
                "from": STRANGER,
                "to": ME,
                "gasUsed": "21000",
                "gasPrice": "100000000000"
            })),
            &explorer_spec(),
            &ctx(&t),
        ));
        assert_eq!(e.amount, dec("0.5"));
        assert_eq!(e.fee, Decimal::ZERO);
    }

    #[test]
    fn incoming_leg_from_tracked_account_is_dropped() {
        let t = tracked();
        let n = normalize(
            rec(json!({
                "hash": "0xCC",
                "timeStamp": 1616663618,
                "value": "1",
                "from": MINE_TOO.to_uppercase().replace("0X", "0x"),
                "to": ME
            })),
            &explorer_spec(),
            &ctx(&t),
        );
        assert_eq!(n, Normalized::SelfTransfer);
    }

    #[test]
    fn self_send_has_zero_amount_and_pays_fee() {
        let t = tracked();
        let e = entry(normalize(
            rec(json!({
                "hash": "0xDD",
                "timeStamp": 1616663618,
                "value": "1000000000000000000",
                "from": ME,
                "to": ME,
                "gasUsed": "1",
                "gasPrice": "1000000000000000000"
            })),
            &explorer_spec(),
            &ctx(&t),
        ));
        assert_eq!(e.amount, Decimal::ZERO);
        assert_eq!(e.fee, dec("1"));
    }

    #[test]
    fn unparseable_fields_fall_back_and_are_flagged() {
        let t = tracked();
        let e = entry(normalize(
            rec(json!({
                "hash": "0xEE",
                "timeStamp": "not a time",
                "value": "lots",
                "from": ME,
                "to": STRANGER,
                "gasUsed": "x",
                "gasPrice": "1"
            })),
            &explorer_spec(),
            &ctx(&t),
        ));
        assert_eq!(e.timestamp, DateTime::<Utc>::default());
        assert_eq!(e.amount, Decimal::ZERO);
        assert_eq!(e.fee, Decimal::ZERO);
        assert_eq!(
            e.raw.parse_flags(),
            vec![ParseFlag::Amount, ParseFlag::Fee, ParseFlag::Timestamp]
        );
        assert_eq!(e.raw.get("value"), Some(&json!("lots")));
        assert!(e.raw.get(PARSE_FLAGS_FIELD).is_some());
    }

    #[test]
    fn missing_key_is_unkeyed() {
        let t = tracked();
        let n = normalize(
            rec(json!({"timeStamp": 1, "value": "1", "from": ME, "to": STRANGER})),
            &explorer_spec(),
            &ctx(&t),
        );
        assert!(matches!(n, Normalized::Unkeyed(KeyError::MissingField { .. })));
    }

    #[test]
    fn side_field_sets_sign_and_fee_always_charged() {
        let t = tracked();
        let spec = trade_spec();
        let sell = entry(normalize(
            rec(json!({"id": "T1", "time": 1616663618.1234, "vol": "0.5", "pair": "XBTEUR", "type": "SELL", "fee": "0.01"})),
            &spec,
            &ctx(&t),
        ));
        let buy = entry(normalize(
            rec(json!({"id": "T2", "time": 1616663619, "vol": "0.25", "pair": "XBTEUR", "type": "buy", "fee": "0.01"})),
            &spec,
            &ctx(&t),
        ));

        assert_eq!(sell.amount, dec("-0.5"));
        assert_eq!(buy.amount, dec("0.25"));
        assert_eq!(sell.fee, dec("0.01"));
        assert_eq!(buy.fee, dec("0.01"));
        assert_eq!(sell.asset, "XBTEUR");
    }

    #[test]
    fn missing_side_is_inflow_and_flagged() {
        let t = tracked();
        let spec = trade_spec();
        let e = entry(normalize(
            rec(json!({"id": "T3", "time": 1616663620, "vol": "0.5", "pair": "XBTEUR", "fee": "0.01"})),
            &spec,
            &ctx(&t),
        ));
        assert_eq!(e.amount, dec("0.5"));
        assert_eq!(e.raw.parse_flags(), vec![ParseFlag::Side]);

        let blank = entry(normalize(
            rec(json!({"id": "T4", "time": 1616663621, "vol": "0.5", "pair": "XBTEUR", "type": " ", "fee": "0.01"})),
            &spec,
            &ctx(&t),
        ));
        assert_eq!(blank.raw.parse_flags(), vec![ParseFlag::Side]);
    }

    #[test]
    fn token_decimals_from_record() {
        let t = tracked();
        let mut spec = explorer_spec();
        spec.category = Category::TokenTx;
        spec.fields.decimals = None;
        spec.fields.decimals_field = Some("tokenDecimal".to_string());
        spec.fields.asset = AssetRef::Field("tokenSymbol".to_string());
        spec.fields.fee = None;

        let e = entry(normalize(
            rec(json!({
                "hash": "0x01", "timeStamp": 1, "value": "1234500", "tokenDecimal": "6",
                "tokenSymbol": "USDC", "from": STRANGER, "to": ME
            })),
            &spec,
            &ctx(&t),
        ));
        assert_eq!(e.amount, dec("1.2345"));
        assert_eq!(e.asset, "USDC");

        let e = entry(normalize(
            rec(json!({"hash": "0x02", "timeStamp": 1, "value": "1", "tokenSymbol": "USDC", "from": STRANGER, "to": ME})),
            &spec,
            &ctx(&t),
        ));
        assert_eq!(e.raw.parse_flags(), vec![ParseFlag::Amount]);
    }

    #[test]
    fn normalizing_a_page_twice_collapses_duplicates() {
        let t = tracked();
        let spec = explorer_spec();
        let page = vec![
            rec(json!({"hash": "0x1", "timeStamp": 1, "value": "1", "from": STRANGER, "to": ME})),
            rec(json!({"hash": "0x2", "timeStamp": 2, "value": "2", "from": STRANGER, "to": ME})),
        ];

        let once = normalize_records(page.clone(), &spec, &ctx(&t));
        let mut twice = normalize_records(page.clone(), &spec, &ctx(&t));
        twice.merge(normalize_records(page, &spec, &ctx(&t)));

        assert_eq!(
            once.entries(Category::NormalTx),
            twice.entries(Category::NormalTx)
        );
        assert_eq!(twice.duplicates_collapsed(), 2);
    }

    #[test]
    fn normalize_records_counts_skips() {
        let t = tracked();
        let records = vec![
            rec(json!({"hash": "0x1", "timeStamp": 1, "value": "1", "from": STRANGER, "to": ME})),
            rec(json!({"hash": "0x1", "timeStamp": 1, "value": "1", "from": STRANGER, "to": ME})),
            rec(json!({"hash": "0x2", "timeStamp": 1, "value": "1", "from": MINE_TOO, "to": ME})),
            rec(json!({"timeStamp": 1, "value": "1"})),
        ];
        let h = normalize_records(records, &explorer_spec(), &ctx(&t));

        assert_eq!(h.len(), 1);
        assert_eq!(h.duplicates_collapsed(), 1);
        assert_eq!(h.self_transfers_dropped, 1);
        assert_eq!(h.unkeyed, 1);
    }

    #[test]
    fn empty_stream_still_registers_category() {
        let t = tracked();
        let h = normalize_records(Vec::new(), &explorer_spec(), &ctx(&t));
        assert!(h.is_empty());
        assert!(h.category(Category::NormalTx).is_some());
    }
}
