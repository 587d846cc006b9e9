//! Type registry: Rust type ↔ type tag
//!
//! A process-wide mapping from `TypeId` to the tag stored on handles of
//! that type. Typed accessors check the tag before downcasting the payload,
//! so a handle can never be reinterpreted as another native type.

use std::any::TypeId;
use std::rc::Rc;

use kiln_sdk::{BridgeError, BridgeResult, ScriptContext, ScriptValue, TypeTag};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::handle::{Handle, HandleCell};

#[derive(Default)]
struct TypeRegistry {
    by_type: FxHashMap<TypeId, TypeTag>,
    by_tag: FxHashMap<TypeTag, TypeId>,
}

static REGISTRY: Lazy<RwLock<TypeRegistry>> = Lazy::new(|| RwLock::new(TypeRegistry::default()));

/// Register `T` under `tag`.
///
/// Idempotent for the same pair. Registering `T` under a second tag, or
/// reusing a tag for a different type, is an error.
pub fn register_type<T: 'static>(tag: &str) -> BridgeResult<TypeTag> {
    let id = TypeId::of::<T>();
    let tag = TypeTag::new(tag);

    {
        let registry = REGISTRY.read();
        if let Some(existing) = registry.by_type.get(&id) {
            return if *existing == tag {
                Ok(existing.clone())
            } else {
                Err(BridgeError::Argument(format!(
                    "type already registered as '{}', cannot register as '{}'",
                    existing, tag
                )))
            };
        }
    }

    let mut registry = REGISTRY.write();
    match (registry.by_type.get(&id), registry.by_tag.get(&tag)) {
        (Some(existing), _) if *existing == tag => return Ok(existing.clone()),
        (Some(existing), _) => {
            return Err(BridgeError::Argument(format!(
                "type already registered as '{}', cannot register as '{}'",
                existing, tag
            )))
        }
        (None, Some(_)) => {
            return Err(BridgeError::Argument(format!(
                "tag '{}' is already used by another type",
                tag
            )))
        }
        (None, None) => {}
    }
    registry.by_type.insert(id, tag.clone());
    registry.by_tag.insert(tag.clone(), id);
    Ok(tag)
}

/// Tag registered for `T`, if any
pub fn registered_tag<T: 'static>() -> Option<TypeTag> {
    REGISTRY.read().by_type.get(&TypeId::of::<T>()).cloned()
}

/// Tag carried by a value (`None` for untagged userdata and non-userdata)
pub fn tag_of(ctx: &dyn ScriptContext, value: &ScriptValue) -> Option<TypeTag> {
    ctx.userdata_tag(value)
}

/// Name used for `actual` in type mismatch errors
fn describe(ctx: &dyn ScriptContext, value: &ScriptValue) -> String {
    match tag_of(ctx, value) {
        Some(tag) => tag.to_string(),
        None => value.type_name().to_string(),
    }
}

/// Check that `value` carries exactly `expected`
pub fn check_type(ctx: &dyn ScriptContext, value: &ScriptValue, expected: &TypeTag) -> BridgeResult<()> {
    match tag_of(ctx, value) {
        Some(tag) if tag == *expected => Ok(()),
        _ => Err(BridgeError::type_mismatch(
            expected.as_str(),
            describe(ctx, value),
        )),
    }
}

/// Check the tag of `value` and return a typed handle
pub fn check_handle<T: 'static>(ctx: &dyn ScriptContext, value: &ScriptValue) -> BridgeResult<Handle<T>> {
    let expected = registered_tag::<T>().ok_or_else(|| {
        BridgeError::Argument(format!(
            "native type {} is not registered",
            std::any::type_name::<T>()
        ))
    })?;
    check_type(ctx, value, &expected)?;

    let payload = ctx
        .userdata_payload(value)
        .ok_or(BridgeError::InvalidReference)?;
    Rc::downcast::<HandleCell<T>>(payload)
        .map(Handle::from_cell)
        .map_err(|_| BridgeError::type_mismatch(expected.as_str(), "foreign payload"))
}

/// Check `value` against a closed list of accepted tags, in order.
///
/// Returns the tag that matched.
pub fn check_any(ctx: &dyn ScriptContext, value: &ScriptValue, accepted: &[&TypeTag]) -> BridgeResult<TypeTag> {
    if let Some(tag) = tag_of(ctx, value) {
        if let Some(found) = accepted.iter().find(|t| ***t == tag) {
            return Ok((*found).clone());
        }
    }
    let expected = accepted
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(" | ");
    Err(BridgeError::type_mismatch(expected, describe(ctx, value)))
}
