//! Canonical entry identity.
//!
//! A [`Key`] is either a natural identifier lifted from one source field
//! (transaction hash, trade id, block number) or a composite integer built
//! from two non-negative integers with Szudzik's pairing function.
//!
//! # Canonical form
//! - all-digit text and non-negative JSON integers become [`Key::Int`]
//! - `0x`-prefixed text (hashes, addresses) is lowercased
//! - any other text is trimmed and kept verbatim as [`Key::Str`]
//!
//! The canonical string form ([`Display`](std::fmt::Display)) round-trips
//! through [`FromStr`](std::str::FromStr); serde uses that string form.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

/// Szudzik pairing of two non-negative integers.
///
/// `pair(a, b) = a*a + a + b` if `a >= b`, else `a + b*b`.
///
/// Injective over `u64 x u64`. The result is `u128` so that no input pair
/// overflows: the largest output, `pair(u64::MAX, u64::MAX)`, is `u128::MAX`.
/// The function is not symmetric; argument order is part of the key rule.
pub fn pair(a: u64, b: u64) -> u128 {
    let (a, b) = (a as u128, b as u128);
    if a >= b {
        a * a + a + b
    } else {
        a + b * b
    }
}

/// Inverse of [`pair`].
pub fn unpair(z: u128) -> (u64, u64) {
    let s = isqrt(z);
    let r = z - s * s;
    // s < 2^64 for every u128, and r <= 2s, so both halves fit in u64.
    if r < s {
        (r as u64, s as u64)
    } else {
        (s as u64, (r - s) as u64)
    }
}

/// Floor square root (Newton iteration from an upper bound).
fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let bits = 128 - n.leading_zeros();
    let mut x: u128 = 1 << bits.div_ceil(2);
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a key could not be derived from a raw record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The field is absent, null, or blank.
    MissingField { field: String },
    /// A paired operand was not a non-negative integer that fits in `u64`.
    NotAnInteger { field: String, raw: String },
    /// The value has a JSON type that cannot identify a record (object, array, bool, fraction).
    UnsupportedValue { field: String, raw: String },
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::MissingField { field } => write!(f, "key field '{field}' is missing"),
            KeyError::NotAnInteger { field, raw } => {
                write!(f, "key field '{field}' is not a non-negative integer: '{raw}'")
            }
            KeyError::UnsupportedValue { field, raw } => {
                write!(f, "key field '{field}' has an unsupported value: {raw}")
            }
        }
    }
}

impl std::error::Error for KeyError {}

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// Canonical identifier for a ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(u128),
    Str(String),
}

impl Key {
    /// Canonicalize free text. Returns `None` for blank input.
    pub fn from_text(s: &str) -> Option<Key> {
        let t = s.trim();
        if t.is_empty() {
            return None;
        }
        if t.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = t.parse::<u128>() {
                return Some(Key::Int(n));
            }
        }
        if t.starts_with("0x") || t.starts_with("0X") {
            return Some(Key::Str(t.to_ascii_lowercase()));
        }
        Some(Key::Str(t.to_string()))
    }

    /// Canonicalize a JSON field value taken from a raw record.
    pub fn from_value(field: &str, v: &Value) -> Result<Key, KeyError> {
        match v {
            Value::Null => Err(KeyError::MissingField {
                field: field.to_string(),
            }),
            Value::String(s) => Key::from_text(s).ok_or_else(|| KeyError::MissingField {
                field: field.to_string(),
            }),
            Value::Number(n) => match n.as_u64() {
                Some(u) => Ok(Key::Int(u as u128)),
                None => Err(KeyError::UnsupportedValue {
                    field: field.to_string(),
                    raw: n.to_string(),
                }),
            },
            other => Err(KeyError::UnsupportedValue {
                field: field.to_string(),
                raw: other.to_string(),
            }),
        }
    }

    /// Composite key from two integers via [`pair`].
    pub fn paired(a: u64, b: u64) -> Key {
        Key::Int(pair(a, b))
    }

    pub fn as_int(&self) -> Option<u128> {
        match self {
            Key::Int(n) => Some(*n),
            Key::Str(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::from_text(s).ok_or_else(|| KeyError::MissingField {
            field: "key".to_string(),
        })
    }
}

impl From<u64> for Key {
    fn from(n: u64) -> Self {
        Key::Int(n as u128)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = Key;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-blank key string or a non-negative integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Key, E> {
                Ok(Key::from(v))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Key, E> {
                Ok(Key::Int(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Key, E> {
                u64::try_from(v)
                    .map(Key::from)
                    .map_err(|_| E::custom(format!("negative key {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Key, E> {
                Key::from_text(v).ok_or_else(|| E::custom("blank key"))
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
