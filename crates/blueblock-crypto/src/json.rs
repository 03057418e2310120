//! Compact JSON encoding of batch records.

use serde::Serialize;
use serde_json::{Number, Value};

/// Largest integer an IEEE-754 double holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Serialize one record to the compact JSON bytes its leaf commits to.
///
/// Integral floats are written as integers, so `45.0` encodes as `45` and
/// `1e2` as `100`, matching JavaScript's `JSON.stringify`. Object keys keep
/// their input order.
pub fn to_leaf_json<T: Serialize + ?Sized>(item: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut value = serde_json::to_value(item)?;
    normalize_numbers(&mut value);
    serde_json::to_vec(&value)
}

/// Rewrite every integral float in `value` as an integer, in place.
///
/// Floats beyond 2^53 are left alone; they have no exact integer form.
pub fn normalize_numbers(value: &mut Value) {
    match value {
        Value::Number(n) => {
            if let Some(int) = integral(n) {
                *n = int;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_numbers),
        Value::Object(map) => map.values_mut().for_each(normalize_numbers),
        Value::Null | Value::Bool(_) | Value::String(_) => {}
    }
}

fn integral(n: &Number) -> Option<Number> {
    if n.is_i64() || n.is_u64() {
        return None;
    }
    let f = n.as_f64()?;
    if f.fract() != 0.0 || f.abs() > MAX_SAFE_INTEGER {
        return None;
    }
    Some(Number::from(f as i64))
}
