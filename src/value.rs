//! Coercion rules over `serde_json::Value`: string rendering, truthiness,
//! equality, ordering, indexing, and the integer coercion used by ranges
//! and counters.

use crate::ast::CompareOp;
use serde_json::Value;

/// A number with the integer/float distinction preserved. Arithmetic on two
/// integers stays integral; anything else widens to a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    /// Reads a number out of a value. Numeric strings parse; everything
    /// else coerces to integer zero.
    pub fn coerce(value: &Value) -> Num {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Num::Int(i)
                } else {
                    Num::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Num::Int(i)
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    Num::Float(f)
                } else {
                    Num::Int(0)
                }
            }
            _ => Num::Int(0),
        }
    }

    /// Reads a number only from values that actually are numeric; used by
    /// ordering comparisons, which must not invent numbers.
    pub fn from_value(value: &Value) -> Option<Num> {
        match value {
            Value::Number(n) => Some(if let Some(i) = n.as_i64() {
                Num::Int(i)
            } else {
                Num::Float(n.as_f64()?)
            }),
            _ => None,
        }
    }

    pub fn to_value(self) -> Value {
        match self {
            Num::Int(i) => Value::from(i),
            Num::Float(f) => Value::from(f),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

/// Coerces a value to a string for output. Nil renders as the empty string;
/// sequences concatenate their elements' string forms.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(render).collect(),
        Value::Object(_) => value.to_string(),
    }
}

/// Liquid truthiness: everything is truthy except nil and `false`.
pub fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// Structural equality, except that numbers compare numerically so that
/// `1 == 1.0` holds across the integer/float divide.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (Num::from_value(a), Num::from_value(b)) {
        (Some(x), Some(y)) => match (x, y) {
            (Num::Int(i), Num::Int(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

/// Applies a comparison operator. Ordering operators are defined only for
/// numbers; on anything else they yield false rather than failing.
pub fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(lhs, rhs),
        CompareOp::Ne => !values_equal(lhs, rhs),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let (Some(a), Some(b)) = (Num::from_value(lhs), Num::from_value(rhs)) else {
                return false;
            };
            match op {
                CompareOp::Lt => a.as_f64() < b.as_f64(),
                CompareOp::Le => a.as_f64() <= b.as_f64(),
                CompareOp::Gt => a.as_f64() > b.as_f64(),
                CompareOp::Ge => a.as_f64() >= b.as_f64(),
                _ => unreachable!(),
            }
        }
        CompareOp::Contains => contains(lhs, rhs),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        (Value::Array(items), n) => items.iter().any(|item| values_equal(item, n)),
        _ => false,
    }
}

/// `container[key]` with a string key: only mappings respond to it.
pub fn index_by_key(container: &Value, key: &str) -> Value {
    match container {
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// `container[i]` with an integer key. Sequences index from zero; mappings
/// look the key up restringified. Out of range is nil.
pub fn index_by_int(container: &Value, index: i64) -> Value {
    match container {
        Value::Array(items) => usize::try_from(index)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null),
        Value::Object(map) => map.get(&index.to_string()).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Indexing with a runtime-resolved key value.
pub fn index_by_value(container: &Value, key: &Value) -> Value {
    match key {
        Value::String(s) => index_by_key(container, s),
        Value::Number(n) => match n.as_i64() {
            Some(i) => index_by_int(container, i),
            None => Value::Null,
        },
        _ => Value::Null,
    }
}

/// Lax integer coercion for range endpoints and counters: integers pass
/// through, floats truncate, numeric strings parse, everything else is 0.
pub fn to_integer(value: &Value) -> i64 {
    match Num::coerce(value) {
        Num::Int(i) => i,
        Num::Float(f) => f.trunc() as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_scalars() {
        assert_eq!(render(&json!(null)), "");
        assert_eq!(render(&json!(true)), "true");
        assert_eq!(render(&json!(42)), "42");
        assert_eq!(render(&json!(4.5)), "4.5");
        assert_eq!(render(&json!("hi")), "hi");
    }

    #[test]
    fn test_render_sequence_concatenates() {
        assert_eq!(render(&json!([1, "a", null, 2])), "1a2");
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!(0)));
        assert!(is_truthy(&json!("")));
        assert!(is_truthy(&json!([])));
    }

    #[test]
    fn test_numeric_equality_across_int_and_float() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn test_ordering_is_false_for_non_numbers() {
        assert!(!compare(CompareOp::Lt, &json!("a"), &json!("b")));
        assert!(compare(CompareOp::Lt, &json!(1), &json!(2.5)));
        assert!(!compare(CompareOp::Ge, &json!(null), &json!(1)));
    }

    #[test]
    fn test_contains() {
        assert!(compare(CompareOp::Contains, &json!("hello"), &json!("ell")));
        assert!(compare(CompareOp::Contains, &json!(["a", "b"]), &json!("b")));
        assert!(!compare(CompareOp::Contains, &json!(7), &json!(7)));
    }

    #[test]
    fn test_indexing() {
        let seq = json!(["x", "y"]);
        assert_eq!(index_by_int(&seq, 1), json!("y"));
        assert_eq!(index_by_int(&seq, 9), json!(null));
        assert_eq!(index_by_int(&seq, -1), json!(null));
        let map = json!({"a": 1, "2": "two"});
        assert_eq!(index_by_key(&map, "a"), json!(1));
        assert_eq!(index_by_int(&map, 2), json!("two"));
        assert_eq!(index_by_key(&json!("str"), "a"), json!(null));
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(to_integer(&json!(3)), 3);
        assert_eq!(to_integer(&json!(3.9)), 3);
        assert_eq!(to_integer(&json!("  7 ")), 7);
        assert_eq!(to_integer(&json!(null)), 0);
        assert_eq!(to_integer(&json!("x")), 0);
    }
}
