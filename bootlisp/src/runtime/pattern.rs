// Structural pattern matching used by the `match` special form.

use crate::runtime::environment::Name;
use crate::runtime::error::RuntimeResult;
use crate::runtime::heap::{EnvId, Heap};
use crate::runtime::values::Value;

/// Symbol that introduces a rest capture in patterns and parameter lists.
pub const REST_MARKER: &str = "&";

/// If `element` opens a rest capture, returns the pattern that receives the remaining
/// tail. `& p` captures into `p`; the shorthand `&name` captures into `name`.
/// A bare `&` with nothing after it is an ordinary symbol.
pub(crate) fn rest_target(element: &Value, following: &Value) -> Option<Value> {
    match element.as_symbol() {
        Some(REST_MARKER) => following.as_pair().map(|p| p.head.clone()),
        Some(s) if s.len() > 1 && s.starts_with(REST_MARKER) => {
            Some(Value::symbol(&s[REST_MARKER.len()..]))
        }
        _ => None,
    }
}

/// The literal inside a `(quote X)` pattern.
fn quoted_literal(pattern: &Value) -> Option<&Value> {
    let pair = pattern.as_pair()?;
    if !pair.head.is_symbol_named("quote") {
        return None;
    }
    pair.tail.as_pair().map(|p| &p.head)
}

/// Attempts one pattern against `value` in a fresh child of `env`. On success the
/// returned environment holds the captured bindings; on failure nothing is visible.
pub fn try_match(
    heap: &mut Heap,
    env: EnvId,
    pattern: &Value,
    value: &Value,
) -> RuntimeResult<Option<EnvId>> {
    let match_env = heap.new_env(env);
    if match_pattern(heap, match_env, pattern, value)? {
        Ok(Some(match_env))
    } else {
        Ok(None)
    }
}

/// Matches `pattern` against `value`, binding captures into `env`.
pub fn match_pattern(
    heap: &mut Heap,
    env: EnvId,
    pattern: &Value,
    value: &Value,
) -> RuntimeResult<bool> {
    if let Some(literal) = quoted_literal(pattern) {
        // quoted patterns compare, they never bind
        return Ok(literal == value);
    }
    match (pattern, value) {
        (Value::Symbol(s), _) => {
            heap.extend(env, Name::Symbol(s.clone()), value.clone())?;
            Ok(true)
        }
        (Value::Pair(_), Value::Pair(_) | Value::Nil) => match_lists(heap, env, pattern, value),
        _ => Ok(pattern == value),
    }
}

fn match_lists(heap: &mut Heap, env: EnvId, pattern: &Value, value: &Value) -> RuntimeResult<bool> {
    let mut remaining_pattern = pattern;
    let mut remaining_value = value;
    while let Value::Pair(p) = remaining_pattern {
        if let Some(rest) = rest_target(&p.head, &p.tail) {
            return match_pattern(heap, env, &rest, remaining_value);
        }
        let Value::Pair(v) = remaining_value else {
            return Ok(false);
        };
        if !match_pattern(heap, env, &p.head, &v.head)? {
            return Ok(false);
        }
        remaining_pattern = &p.tail;
        remaining_value = &v.tail;
    }
    Ok(remaining_value.is_nil())
}
