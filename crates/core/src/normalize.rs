//! Normalization of loosely-typed result fields.
//!
//! The calibration scripts serialize through R, so a scalar frequently
//! arrives wrapped in a one-element array (`["Sepsis"]`, `[0.3]`) and
//! numbers sometimes arrive as strings. Every result field goes through
//! these adapters when the payload is decoded; nothing downstream coerces.
//!
//! The adapters never reject a value: anything they cannot interpret
//! collapses to `None` (or an empty list).

use serde_json::Value;

/// Unwrap a sequence to its first element; scalars pass through.
///
/// Returns `None` for `null` and for empty arrays.
pub fn first_scalar(value: &Value) -> Option<&Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => items.first().and_then(first_scalar),
        other => Some(other),
    }
}

pub fn as_string(value: &Value) -> Option<String> {
    match first_scalar(value)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn as_f64(value: &Value) -> Option<f64> {
    let number = match first_scalar(value)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

pub fn as_u64(value: &Value) -> Option<u64> {
    match first_scalar(value)? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

pub fn as_bool(value: &Value) -> Option<bool> {
    match first_scalar(value)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Borrow the elements of an array; `null` and scalars yield nothing.
pub fn as_items(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sequence_of_one_unwraps() {
        assert_eq!(as_string(&json!(["Sepsis"])), Some("Sepsis".into()));
        assert_eq!(as_f64(&json!([0.3])), Some(0.3));
    }

    #[test]
    fn scalar_passes_through() {
        assert_eq!(as_string(&json!("Sepsis")), Some("Sepsis".into()));
        assert_eq!(as_f64(&json!(0.3)), Some(0.3));
    }

    #[test]
    fn nested_and_empty_sequences() {
        assert_eq!(as_f64(&json!([[0.25]])), Some(0.25));
        assert_eq!(as_f64(&json!([])), None);
        assert_eq!(as_string(&Value::Null), None);
    }

    #[test]
    fn numeric_strings_parse() {
        assert_eq!(as_f64(&json!("0.125")), Some(0.125));
        assert_eq!(as_u64(&json!(["1000"])), Some(1000));
        assert_eq!(as_u64(&json!(1000.0)), Some(1000));
    }

    #[test]
    fn non_numeric_values_collapse_to_none() {
        assert_eq!(as_f64(&json!("n/a")), None);
        assert_eq!(as_f64(&json!({"value": 1})), None);
        assert_eq!(as_u64(&json!(-4)), None);
        assert_eq!(as_u64(&json!(2.5)), None);
    }

    #[test]
    fn r_style_booleans() {
        assert_eq!(as_bool(&json!(["TRUE"])), Some(true));
        assert_eq!(as_bool(&json!(false)), Some(false));
        assert_eq!(as_bool(&json!(1)), Some(true));
        assert_eq!(as_bool(&json!("maybe")), None);
    }

    #[test]
    fn items_of_non_array_is_empty() {
        assert_eq!(as_items(&json!([1, 2])).len(), 2);
        assert!(as_items(&json!({"a": 1})).is_empty());
        assert!(as_items(&Value::Null).is_empty());
    }
}
