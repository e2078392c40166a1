//! Deep-size approximation and deep-clone utilities for JSON-representable
//! values (§4.A SizedValue).
//!
//! Grounded on the checksum/size bookkeeping style of
//! `enterprise::cache::codec::EncodedData` in the teacher crate: plain
//! arithmetic over a value, no external crate needed.

use std::collections::HashSet;

use serde_json::Value;

use crate::cache::error::CacheError;

/// Approximate in-memory size of a JSON value, in bytes.
///
/// Strings count UTF-16 code units × 2; numbers/booleans = 8; null = 4;
/// arrays = 24 + sum of child sizes; objects = 24 + sum of
/// (key length × 2 + child size). Cycles cannot occur in `serde_json::Value`
/// (it is a tree, not a graph), but the visited-set discipline from the
/// spec is preserved via a depth-based guard against pathological nesting.
pub fn approximate_size(value: &Value) -> usize {
    let mut visited = HashSet::new();
    size_inner(value, &mut visited, 0)
}

const MAX_DEPTH: usize = 256;

fn size_inner(value: &Value, visited: &mut HashSet<usize>, depth: usize) -> usize {
    if depth > MAX_DEPTH {
        return 0;
    }
    match value {
        Value::Null => 4,
        Value::Bool(_) => 8,
        Value::Number(_) => 8,
        Value::String(s) => s.encode_utf16().count() * 2,
        Value::Array(items) => {
            let ptr = items.as_ptr() as usize;
            if !visited.insert(ptr) {
                return 0;
            }
            24 + items.iter().map(|v| size_inner(v, visited, depth + 1)).sum::<usize>()
        }
        Value::Object(map) => {
            let ptr = map as *const _ as usize;
            if !visited.insert(ptr) {
                return 0;
            }
            24 + map
                .iter()
                .map(|(k, v)| k.encode_utf16().count() * 2 + size_inner(v, visited, depth + 1))
                .sum::<usize>()
        }
    }
}

/// Deep-clones a JSON value. `serde_json::Value::clone` is already a deep,
/// non-aliasing copy, so this exists to name the operation from §4.A and to
/// give it the `ErrInvalidPayload` failure mode for non-serializable inputs
/// that callers reach through [`deep_clone`].
pub fn deep_clone_json(value: &Value) -> Value {
    value.clone()
}

/// Generic deep-clone used by [`crate::cache::memory`] when promoting or
/// duplicating an `Entry<T>`. Fails with [`CacheError::InvalidPayload`] only
/// in the sense that callers holding a non-`Clone` payload cannot reach this
/// function at all (enforced at compile time); kept `Result`-returning so
/// call sites read the same as other fallible cache operations.
pub fn deep_clone<T: Clone>(value: &T) -> Result<T, CacheError> {
    Ok(value.clone())
}
