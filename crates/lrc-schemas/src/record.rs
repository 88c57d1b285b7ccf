//! Raw source records.
//!
//! A [`RawRecord`] is the JSON object a source returned for one ledger item,
//! untouched. Normalization reads from it and keeps a copy on the resulting
//! entry so reports can show the original payload. When normalization had to
//! substitute a sentinel value, the copy carries the reasons under
//! [`PARSE_FLAGS_FIELD`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field injected into the retained raw copy listing the parse fallbacks taken.
pub const PARSE_FLAGS_FIELD: &str = "_lrc_parse_flags";

/// A normalization fallback that was applied to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFlag {
    /// Timestamp could not be parsed; epoch zero was used.
    Timestamp,
    /// Amount could not be parsed; zero was used.
    Amount,
    /// Fee could not be parsed; zero was used.
    Fee,
    /// Side field missing or blank; the amount was taken as an inflow.
    Side,
}

impl ParseFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseFlag::Timestamp => "timestamp",
            ParseFlag::Amount => "amount",
            ParseFlag::Fee => "fee",
            ParseFlag::Side => "side",
        }
    }

    fn parse(s: &str) -> Option<ParseFlag> {
        match s {
            "timestamp" => Some(ParseFlag::Timestamp),
            "amount" => Some(ParseFlag::Amount),
            "fee" => Some(ParseFlag::Fee),
            "side" => Some(ParseFlag::Side),
            _ => None,
        }
    }
}

/// Opaque source-specific mapping of field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value; only objects are records.
    pub fn from_value(v: Value) -> Option<Self> {
        match v {
            Value::Object(m) => Some(Self(m)),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    /// Field rendered as text: strings are returned trimmed, numbers and
    /// booleans in their JSON form. Blank strings count as absent.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::String(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Non-negative integer field, accepting JSON integers and digit strings.
    pub fn u64_field(&self, field: &str) -> Option<u64> {
        match self.get(field)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Copy of this record with `flags` recorded under [`PARSE_FLAGS_FIELD`].
    /// An empty flag list returns an unmodified copy.
    pub fn with_parse_flags(&self, flags: &[ParseFlag]) -> RawRecord {
        let mut copy = self.clone();
        if flags.is_empty() {
            return copy;
        }
        let mut names: Vec<&'static str> = flags.iter().map(ParseFlag::as_str).collect();
        names.sort_unstable();
        names.dedup();
        copy.0.insert(
            PARSE_FLAGS_FIELD.to_string(),
            Value::Array(names.into_iter().map(|n| Value::String(n.into())).collect()),
        );
        copy
    }

    /// Parse fallbacks previously recorded by [`with_parse_flags`](Self::with_parse_flags).
    pub fn parse_flags(&self) -> Vec<ParseFlag> {
        match self.0.get(PARSE_FLAGS_FIELD) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().and_then(ParseFlag::parse))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(m: Map<String, Value>) -> Self {
        Self(m)
    }
}
