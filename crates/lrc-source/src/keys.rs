//! Key derivation from a raw record under a [`KeyRule`].

use lrc_schemas::{Key, KeyError, RawRecord};
use serde_json::Value;

use crate::spec::{KeyRule, PairOperand};

/// Derive the canonical key of `raw`.
///
/// `account` is only consulted by [`PairOperand::Account`] operands.
pub fn derive_key(raw: &RawRecord, rule: &KeyRule, account: &str) -> Result<Key, KeyError> {
    match rule {
        KeyRule::Field(field) => match raw.get(field) {
            Some(v) => Key::from_value(field, v),
            None => Err(KeyError::MissingField {
                field: field.clone(),
            }),
        },
        KeyRule::Pair([a, b]) => {
            let a = operand(raw, a, account)?;
            let b = operand(raw, b, account)?;
            Ok(Key::paired(a, b))
        }
    }
}

fn operand(raw: &RawRecord, op: &PairOperand, account: &str) -> Result<u64, KeyError> {
    match op {
        PairOperand::Account => parse_u64("account", account),
        PairOperand::Field(field) => match raw.get(field) {
            None => Err(KeyError::MissingField {
                field: field.clone(),
            }),
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| KeyError::NotAnInteger {
                field: field.clone(),
                raw: n.to_string(),
            }),
            Some(Value::String(s)) if s.trim().is_empty() => Err(KeyError::MissingField {
                field: field.clone(),
            }),
            Some(Value::String(s)) => parse_u64(field, s),
            Some(other) => Err(KeyError::NotAnInteger {
                field: field.clone(),
                raw: other.to_string(),
            }),
        },
    }
}

fn parse_u64(field: &str, s: &str) -> Result<u64, KeyError> {
    s.trim().parse::<u64>().map_err(|_| KeyError::NotAnInteger {
        field: field.to_string(),
        raw: s.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lrc_schemas::pair;
    use serde_json::json;

    fn rec(v: Value) -> RawRecord {
        RawRecord::from_value(v).unwrap()
    }

    fn field(name: &str) -> KeyRule {
        KeyRule::Field(name.to_string())
    }

    #[test]
    fn natural_field_is_canonicalized() {
        let r = rec(json!({"hash": "0xABC", "blockNumber": "17000000", "tradeId": 55}));
        assert_eq!(
            derive_key(&r, &field("hash"), "acct").unwrap(),
            Key::Str("0xabc".to_string())
        );
        assert_eq!(
            derive_key(&r, &field("blockNumber"), "acct").unwrap(),
            Key::Int(17_000_000)
        );
        assert_eq!(
            derive_key(&r, &field("tradeId"), "acct").unwrap(),
            Key::Int(55)
        );
    }

    #[test]
    fn missing_natural_field() {
        let r = rec(json!({"hash": null}));
        assert_eq!(
            derive_key(&r, &field("hash"), "acct"),
            Err(KeyError::MissingField {
                field: "hash".to_string()
            })
        );
        assert!(derive_key(&r, &field("txid"), "acct").is_err());
    }

    #[test]
    fn validator_snapshot_pairs_epoch_with_account() {
        let rule = KeyRule::Pair([
            PairOperand::Field("epoch".to_string()),
            PairOperand::Account,
        ]);
        let r = rec(json!({"epoch": "250000", "balance": "32000000000"}));
        assert_eq!(
            derive_key(&r, &rule, "1234").unwrap(),
            Key::Int(pair(250_000, 1234))
        );
    }

    #[test]
    fn operand_order_is_part_of_the_rule() {
        let r = rec(json!({"seq": 7, "sub": 3}));
        let ab = KeyRule::Pair([
            PairOperand::Field("seq".to_string()),
            PairOperand::Field("sub".to_string()),
        ]);
        let ba = KeyRule::Pair([
            PairOperand::Field("sub".to_string()),
            PairOperand::Field("seq".to_string()),
        ]);
        assert_ne!(
            derive_key(&r, &ab, "x").unwrap(),
            derive_key(&r, &ba, "x").unwrap()
        );
    }

    #[test]
    fn non_integer_operands_are_rejected() {
        let rule = KeyRule::Pair([
            PairOperand::Field("epoch".to_string()),
            PairOperand::Account,
        ]);
        let r = rec(json!({"epoch": -1}));
        assert!(matches!(
            derive_key(&r, &rule, "1"),
            Err(KeyError::NotAnInteger { .. })
        ));

        let r = rec(json!({"epoch": 5}));
        assert!(matches!(
            derive_key(&r, &rule, "0xvalidator"),
            Err(KeyError::NotAnInteger { field, .. }) if field == "account"
        ));
    }
}
