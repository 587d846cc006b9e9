//! Vector3 bindings over `glam::DVec3`
//!
//! Vectors are embedded values; arithmetic methods return new handles and
//! never modify the receiver. Components are writable through `v.x = ...`.

use std::sync::Arc;

use glam::DVec3;
use kiln_sdk::{format_number, BridgeError, BridgeResult, ScriptContext, ScriptValue};
use once_cell::sync::OnceCell;

use crate::args::{arg, check_number};
use crate::dispatch::DispatchTable;
use crate::handle::{allocate, Slot};
use crate::namespace::Namespace;
use crate::registry::check_handle;

/// Tag carried by Vector3 handles
pub const TAG: &str = "kiln.Vector3";

static TABLE: OnceCell<Arc<DispatchTable<DVec3>>> = OnceCell::new();

fn component(value: ScriptValue) -> BridgeResult<f64> {
    value
        .as_number()
        .ok_or_else(|| BridgeError::type_mismatch("number", value.type_name()))
}

fn other(ctx: &dyn ScriptContext, args: &[ScriptValue]) -> BridgeResult<DVec3> {
    check_handle::<DVec3>(ctx, arg(args, 0))?.with(|v| *v)
}

fn push(ctx: &mut dyn ScriptContext, v: DVec3) -> BridgeResult<ScriptValue> {
    allocate(ctx, &table()?, Slot::embedded(v))
}

/// Dispatch table for Vector3 handles (built once per process)
pub fn table() -> BridgeResult<Arc<DispatchTable<DVec3>>> {
    TABLE
        .get_or_try_init(|| {
            DispatchTable::<DVec3>::builder(TAG)
                .property("x", |v| v.x.into(), |v, value| {
                    v.x = component(value)?;
                    Ok(())
                })
                .property("y", |v| v.y.into(), |v, value| {
                    v.y = component(value)?;
                    Ok(())
                })
                .property("z", |v| v.z.into(), |v, value| {
                    v.z = component(value)?;
                    Ok(())
                })
                .method("length", |_ctx, handle, _args| {
                    handle.with(|v| v.length().into())
                })
                .method("dot", |ctx, handle, args| {
                    let rhs = other(ctx, args)?;
                    handle.with(|v| v.dot(rhs).into())
                })
                .method("cross", |ctx, handle, args| {
                    let rhs = other(ctx, args)?;
                    let result = handle.with(|v| v.cross(rhs))?;
                    push(ctx, result)
                })
                .method("add", |ctx, handle, args| {
                    let rhs = other(ctx, args)?;
                    let result = handle.with(|v| *v + rhs)?;
                    push(ctx, result)
                })
                .method("scale", |ctx, handle, args| {
                    let factor = check_number(args, 0, "scale")?;
                    let result = handle.with(|v| *v * factor)?;
                    push(ctx, result)
                })
                .method("normalize", |ctx, handle, _args| {
                    let result = handle.with(|v| v.normalize_or_zero())?;
                    push(ctx, result)
                })
                .to_string(|v| {
                    format!(
                        "Vector3({}, {}, {})",
                        format_number(v.x),
                        format_number(v.y),
                        format_number(v.z)
                    )
                })
                .build()
        })
        .cloned()
}

/// Add `new(x, y, z)` to `ns`
pub fn register(ns: Namespace) -> BridgeResult<Namespace> {
    let table = table()?;
    Ok(ns.function("new", move |ctx, args| {
        let v = DVec3::new(
            check_number(args, 0, "new")?,
            check_number(args, 1, "new")?,
            check_number(args, 2, "new")?,
        );
        allocate(ctx, &table, Slot::embedded(v))
    }))
}
