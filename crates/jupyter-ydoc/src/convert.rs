//! Value conversions between `serde_json` and yrs.
//!
//! Numbers are written as `Any::Number` (an f64) so documents produced here
//! encode the same way as those produced by the JavaScript front end. When
//! reading back, integral floats become JSON integers again.

use std::collections::HashMap;

use base64::Engine;
use serde_json::{Map as JsonMap, Number, Value};
use yrs::{Any, Array, GetString, Map, Out, ReadTxn};

/// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Convert serde_json::Value to yrs::Any.
pub fn json_to_any(value: &Value) -> Any {
    match value {
        Value::Null => Any::Null,
        Value::Bool(b) => Any::Bool(*b),
        Value::Number(n) => n.as_f64().map(Any::Number).unwrap_or(Any::Null),
        Value::String(s) => Any::String(s.as_str().into()),
        Value::Array(arr) => {
            let items: Vec<Any> = arr.iter().map(json_to_any).collect();
            Any::Array(items.into())
        }
        Value::Object(obj) => {
            let map: HashMap<String, Any> = obj
                .iter()
                .map(|(k, v)| (k.clone(), json_to_any(v)))
                .collect();
            Any::Map(map.into())
        }
    }
}

/// Convert yrs::Any to serde_json::Value.
pub fn any_to_json(any: &Any) -> Value {
    match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(b) => Value::Bool(*b),
        Any::Number(n) => number_to_json(*n),
        Any::BigInt(i) => Value::Number((*i).into()),
        Any::String(s) => Value::String(s.to_string()),
        Any::Buffer(b) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(b.as_ref()))
        }
        Any::Array(arr) => Value::Array(arr.iter().map(any_to_json).collect()),
        Any::Map(map) => {
            let obj: JsonMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), any_to_json(v)))
                .collect();
            Value::Object(obj)
        }
    }
}

fn number_to_json(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::Number((n as i64).into())
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Convert yrs::Out to serde_json::Value.
///
/// Nested shared types are rendered recursively; a `Y.Text` becomes its
/// string content.
pub fn out_to_json<T: ReadTxn>(value: &Out, txn: &T) -> Value {
    match value {
        Out::Any(any) => any_to_json(any),
        Out::YText(text) => Value::String(text.get_string(txn)),
        Out::YArray(arr) => Value::Array(arr.iter(txn).map(|v| out_to_json(&v, txn)).collect()),
        Out::YMap(map) => {
            let obj: JsonMap<String, Value> = map
                .iter(txn)
                .map(|(k, v)| (k.to_string(), out_to_json(&v, txn)))
                .collect();
            Value::Object(obj)
        }
        _ => Value::Null,
    }
}

/// Read an integer from a stored value, accepting both float and bigint encodings.
pub(crate) fn out_to_i64(value: &Out) -> Option<i64> {
    match value {
        Out::Any(Any::Number(n)) if n.fract() == 0.0 => Some(*n as i64),
        Out::Any(Any::BigInt(i)) => Some(*i),
        _ => None,
    }
}

pub(crate) fn out_to_string<T: ReadTxn>(value: &Out, txn: &T) -> Option<String> {
    match value {
        Out::Any(Any::String(s)) => Some(s.to_string()),
        Out::YText(text) => Some(text.get_string(txn)),
        _ => None,
    }
}

/// Structural equality that treats `1` and `1.0` as the same number.
pub fn json_deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| json_deep_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| json_deep_equal(v, other)))
        }
        _ => a == b,
    }
}
