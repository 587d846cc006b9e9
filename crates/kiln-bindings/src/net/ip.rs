//! IpAddr handles
//!
//! Addresses are embedded in their handle. Functions taking an address
//! accept a textual address, an IPv4 address as an integer, or an existing
//! IpAddr handle.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use kiln_sdk::{BridgeError, BridgeResult, ScriptContext, ScriptValue};

use super::intel::IntelProvider;
use crate::args::{arg, bad_argument};
use crate::dispatch::DispatchTable;
use crate::registry::check_handle;

/// Tag carried by IpAddr handles
pub const TAG: &str = "kiln.IpAddr";

/// Dispatch table for IpAddr handles; reverse lookups go to `intel`
pub fn table(intel: Arc<dyn IntelProvider>) -> BridgeResult<Arc<DispatchTable<IpAddr>>> {
    DispatchTable::<IpAddr>::builder(TAG)
        .method("getReverseDns", move |_ctx, handle, _args| {
            let addr = handle.with(|addr| *addr)?;
            Ok(intel.reverse_dns(&addr).into())
        })
        .method("isV4", |_ctx, handle, _args| {
            handle.with(|addr| addr.is_ipv4().into())
        })
        .to_string(|addr| addr.to_string())
        .build()
}

/// Read an address argument
pub fn check_ip(
    ctx: &dyn ScriptContext,
    args: &[ScriptValue],
    index: usize,
    function: &str,
) -> BridgeResult<IpAddr> {
    match arg(args, index) {
        ScriptValue::String(s) => {
            let text = s.to_string_lossy();
            text.trim()
                .parse()
                .map_err(|_| BridgeError::Argument(format!("invalid IP address '{}'", text)))
        }
        value @ (ScriptValue::Integer(_) | ScriptValue::Number(_)) => {
            let n = value
                .as_integer()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    BridgeError::Argument(format!(
                        "IPv4 address integer out of range in '{}'",
                        function
                    ))
                })?;
            Ok(IpAddr::V4(Ipv4Addr::from(n)))
        }
        value @ ScriptValue::Userdata(_) => check_handle::<IpAddr>(ctx, value)?.with(|addr| *addr),
        other => Err(bad_argument(index, function, "IpAddr, string or integer", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_engine::ScriptEngine;

    #[test]
    fn test_check_ip_forms() {
        let engine = ScriptEngine::new();
        let args = [
            ScriptValue::from("192.0.2.1"),
            ScriptValue::Integer(0x7f00_0001),
            ScriptValue::from(" ::1 "),
        ];
        assert_eq!(
            check_ip(&engine, &args, 0, "f").unwrap(),
            "192.0.2.1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            check_ip(&engine, &args, 1, "f").unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
        assert_eq!(check_ip(&engine, &args, 2, "f").unwrap().to_string(), "::1");
    }

    #[test]
    fn test_check_ip_rejects() {
        let engine = ScriptEngine::new();
        let args = [
            ScriptValue::from("300.1.1.1"),
            ScriptValue::Integer(-1),
            ScriptValue::Bool(true),
        ];
        assert!(matches!(check_ip(&engine, &args, 0, "f"), Err(BridgeError::Argument(_))));
        assert!(matches!(check_ip(&engine, &args, 1, "f"), Err(BridgeError::Argument(_))));
        assert!(matches!(check_ip(&engine, &args, 2, "f"), Err(BridgeError::Argument(_))));
    }
}
