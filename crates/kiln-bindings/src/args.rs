//! Argument checking helpers for native functions
//!
//! Positions are 1-based in messages, matching what script authors see.

use kiln_sdk::{BridgeError, BridgeResult, ScriptValue};

static NIL: ScriptValue = ScriptValue::Nil;

/// Argument at `index` (0-based), `nil` when absent
pub fn arg(args: &[ScriptValue], index: usize) -> &ScriptValue {
    args.get(index).unwrap_or(&NIL)
}

/// Error for an argument of the wrong kind
pub fn bad_argument(index: usize, function: &str, expected: &str, got: &ScriptValue) -> BridgeError {
    BridgeError::Argument(format!(
        "bad argument #{} to '{}' ({} expected, got {})",
        index + 1,
        function,
        expected,
        got.type_name()
    ))
}

/// UTF-8 string argument
pub fn check_str<'a>(args: &'a [ScriptValue], index: usize, function: &str) -> BridgeResult<&'a str> {
    let value = arg(args, index);
    value
        .as_str()
        .ok_or_else(|| bad_argument(index, function, "string", value))
}

/// Optional UTF-8 string argument. Only an absent argument takes the
/// default; an explicit `nil` is rejected like any other non-string.
pub fn opt_str<'a>(args: &'a [ScriptValue], index: usize, function: &str) -> BridgeResult<Option<&'a str>> {
    if index >= args.len() {
        return Ok(None);
    }
    check_str(args, index, function).map(Some)
}

/// Raw byte string argument
pub fn check_bytes<'a>(args: &'a [ScriptValue], index: usize, function: &str) -> BridgeResult<&'a [u8]> {
    let value = arg(args, index);
    value
        .as_script_str()
        .map(|s| s.as_bytes())
        .ok_or_else(|| bad_argument(index, function, "string", value))
}

/// Integer argument (integral floats accepted)
pub fn check_integer(args: &[ScriptValue], index: usize, function: &str) -> BridgeResult<i64> {
    let value = arg(args, index);
    value
        .as_integer()
        .ok_or_else(|| bad_argument(index, function, "integer", value))
}

/// Non-negative integer argument
pub fn check_usize(args: &[ScriptValue], index: usize, function: &str) -> BridgeResult<usize> {
    let n = check_integer(args, index, function)?;
    usize::try_from(n).map_err(|_| {
        BridgeError::Argument(format!(
            "bad argument #{} to '{}' (non-negative integer expected, got {})",
            index + 1,
            function,
            n
        ))
    })
}

/// Number argument
pub fn check_number(args: &[ScriptValue], index: usize, function: &str) -> BridgeResult<f64> {
    let value = arg(args, index);
    value
        .as_number()
        .ok_or_else(|| bad_argument(index, function, "number", value))
}

/// Optional boolean argument; any value other than `nil` and `false` is true
pub fn opt_bool(args: &[ScriptValue], index: usize) -> Option<bool> {
    match arg(args, index) {
        ScriptValue::Nil => None,
        value => Some(value.is_truthy()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_argument_is_nil() {
        let args = [ScriptValue::Integer(1)];
        assert_eq!(arg(&args, 3), &ScriptValue::Nil);
        assert_eq!(opt_bool(&args, 1), None);
    }

    #[test]
    fn test_optional_string_rejects_explicit_nil() {
        let args = [ScriptValue::from("DE"), ScriptValue::Nil];
        assert_eq!(opt_str(&args[..1], 1, "f"), Ok(None));
        assert_eq!(opt_str(&args, 0, "f"), Ok(Some("DE")));
        let err = opt_str(&args, 1, "f").unwrap_err();
        assert_eq!(
            err,
            BridgeError::Argument("bad argument #2 to 'f' (string expected, got nil)".to_string())
        );
    }

    #[test]
    fn test_bad_argument_message() {
        let err = check_str(&[], 0, "IpAddr").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Argument error: bad argument #1 to 'IpAddr' (string expected, got nil)"
        );
    }

    #[test]
    fn test_numeric_arguments() {
        let args = [ScriptValue::Number(4.0), ScriptValue::Integer(-1), ScriptValue::Number(0.5)];
        assert_eq!(check_integer(&args, 0, "f").unwrap(), 4);
        assert!(check_usize(&args, 1, "f").is_err());
        assert!(check_integer(&args, 2, "f").is_err());
        assert_eq!(check_number(&args, 1, "f").unwrap(), -1.0);
    }
}
