//! Network bindings: addresses, address intelligence and country names
//!
//! Installed surface:
//! - `getCountryName(code [, lang])`
//! - `IpAddr(addr)`
//! - `netIntel.getAsByIp(addr)`, `netIntel.getLocationByIp(addr)`

pub mod country;
pub mod intel;
pub mod ip;

use std::sync::Arc;

use kiln_sdk::{BridgeResult, ScriptValue};

use crate::args::{check_str, opt_str};
use crate::dispatch::DispatchTable;
use crate::handle::{allocate, allocate_optional, Slot};
use crate::namespace::Namespace;

pub use country::country_name;
pub use intel::{AsRecord, IntelProvider, Location, Record, StaticIntelProvider};
pub use ip::check_ip;

/// Tag carried by AS record handles
pub const AS_TAG: &str = "kiln.AsRecord";

/// Tag carried by location handles
pub const LOCATION_TAG: &str = "kiln.Location";

/// Dispatch table for AS records
pub fn as_table() -> BridgeResult<Arc<DispatchTable<AsRecord>>> {
    DispatchTable::<AsRecord>::builder(AS_TAG)
        .field("number", |r| r.number.into())
        .field("handle", |r| r.handle.as_str().into())
        .field("name", |r| r.name.as_str().into())
        .method("isHosting", |_ctx, handle, _args| {
            handle.with(|r| r.is_hosting().into())
        })
        .build()
}

/// Dispatch table for locations
pub fn location_table() -> BridgeResult<Arc<DispatchTable<Location>>> {
    DispatchTable::<Location>::builder(LOCATION_TAG)
        .field("city", |l| l.city.as_str().into())
        .field("state", |l| l.state.as_str().into())
        .field("country_code", |l| l.country_code.as_str().into())
        .build()
}

/// Add the network functions to `ns`
pub fn register(ns: Namespace, intel: Arc<dyn IntelProvider>) -> BridgeResult<Namespace> {
    let ip_table = ip::table(Arc::clone(&intel))?;
    let as_table = as_table()?;
    let location_table = location_table()?;

    ns.function("getCountryName", |_ctx, args| {
        let code = check_str(args, 0, "getCountryName")?;
        let lang = opt_str(args, 1, "getCountryName")?.unwrap_or("EN");
        Ok(country_name(code, lang).into())
    })
    .function("IpAddr", move |ctx, args| {
        let addr = check_ip(ctx, args, 0, "IpAddr")?;
        allocate(ctx, &ip_table, Slot::embedded(addr))
    })
    .namespace("netIntel", move |ns| {
        let by_as = Arc::clone(&intel);
        let by_location = intel;
        Ok(ns
            .function("getAsByIp", move |ctx, args| {
                let addr = check_ip(ctx, args, 0, "getAsByIp")?;
                let record = by_as.as_by_ip(&addr).map(Slot::from);
                allocate_optional(ctx, &as_table, record)
            })
            .function("getLocationByIp", move |ctx, args| -> BridgeResult<ScriptValue> {
                let addr = check_ip(ctx, args, 0, "getLocationByIp")?;
                let location = by_location.location_by_ip(&addr).map(Slot::from);
                allocate_optional(ctx, &location_table, location)
            }))
    })
}
