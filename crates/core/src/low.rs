//! Low data: the loosely structured call specification.
//!
//! A low data object is a JSON map. Most keys are named arguments; a few are
//! reserved and interpreted by [`Signature::resolve`](crate::signature::Signature::resolve).

use serde_json::{Map, Value};

/// Call specification passed to the invoker and across the worker boundary.
pub type LowData = Map<String, Value>;

/// Holds the function name for [`invoke_low`](crate::registry::FunctionRegistry::invoke_low).
pub const FUN_KEY: &str = "fun";

/// Holds the ordered positional arguments (a JSON array).
pub const ARG_KEY: &str = "arg";

/// Holds extra named arguments (a JSON object) merged with the top level.
pub const KWARG_KEY: &str = "kwarg";

/// Keys starting with this prefix are private metadata, not arguments.
pub const PRIVATE_PREFIX: &str = "__";

/// Whether `key` is one of the reserved low data keys.
pub fn is_reserved(key: &str) -> bool {
    matches!(key, FUN_KEY | ARG_KEY | KWARG_KEY)
}

/// Whether `key` names private metadata such as `__user__`.
pub fn is_private(key: &str) -> bool {
    key.starts_with(PRIVATE_PREFIX)
}

/// Build low data from command-line style arguments.
///
/// `key=value` tokens become named arguments under [`KWARG_KEY`]; every other
/// token is appended to [`ARG_KEY`]. Values are parsed as JSON when they are
/// valid JSON and kept as plain strings otherwise, so `2` is a number and
/// `foo` is a string.
pub fn parse_cli_args<S: AsRef<str>>(tokens: &[S]) -> LowData {
    let mut args = Vec::new();
    let mut kwargs = Map::new();

    for token in tokens {
        let token = token.as_ref();
        match split_keyword(token) {
            Some((key, raw)) => {
                kwargs.insert(key.to_string(), parse_value(raw));
            }
            None => args.push(parse_value(token)),
        }
    }

    let mut low = LowData::new();
    low.insert(ARG_KEY.to_string(), Value::Array(args));
    low.insert(KWARG_KEY.to_string(), Value::Object(kwargs));
    low
}

fn split_keyword(token: &str) -> Option<(&str, &str)> {
    let (key, value) = token.split_once('=')?;
    let valid = !key.is_empty()
        && !key.starts_with(|c: char| c.is_ascii_digit())
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some((key, value))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
