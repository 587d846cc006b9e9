//! Integration tests for the reference runtime: userdata, metatables and
//! finalization.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use kiln_engine::ScriptEngine;
use kiln_sdk::{native_fn, BridgeError, ScriptContext, ScriptValue, TypeTag, UserdataInit};

thread_local! {
    static FINALIZED: Cell<usize> = const { Cell::new(0) };
}

fn count_finalize(_: &dyn Any) {
    FINALIZED.with(|c| c.set(c.get() + 1));
}

fn finalized() -> usize {
    FINALIZED.with(|c| c.get())
}

fn counter_userdata(engine: &mut ScriptEngine, metatable: Option<ScriptValue>) -> ScriptValue {
    engine
        .create_userdata(UserdataInit {
            tag: Some(TypeTag::new("Counter")),
            payload: Rc::new(Cell::new(0i64)),
            metatable,
            finalizer: Some(count_finalize),
        })
        .unwrap()
}

#[test]
fn test_userdata_tag_and_payload() {
    let mut engine = ScriptEngine::new();
    let ud = counter_userdata(&mut engine, None);

    assert_eq!(engine.userdata_tag(&ud), Some(TypeTag::new("Counter")));
    let payload = engine.userdata_payload(&ud).unwrap();
    assert!(payload.downcast::<Cell<i64>>().is_ok());

    assert_eq!(engine.userdata_tag(&ScriptValue::Integer(1)), None);
}

#[test]
fn test_metatable_index_and_tostring() {
    let mut engine = ScriptEngine::new();
    let mt = engine.create_table();
    let index = engine.create_function(
        "__index",
        native_fn(|ctx, args| {
            let payload = ctx
                .userdata_payload(&args[0])
                .ok_or(BridgeError::InvalidReference)?;
            let cell = payload
                .downcast::<Cell<i64>>()
                .map_err(|_| BridgeError::InvalidReference)?;
            match args[1].as_str() {
                Some("value") => Ok(ScriptValue::Integer(cell.get())),
                _ => Ok(ScriptValue::Nil),
            }
        }),
    );
    let tostring =
        engine.create_function("__tostring", native_fn(|_ctx, _args| Ok("Counter!".into())));
    engine.raw_set(&mt, "__index".into(), index).unwrap();
    engine.raw_set(&mt, "__tostring".into(), tostring).unwrap();

    let ud = counter_userdata(&mut engine, Some(mt));
    assert_eq!(engine.index(&ud, "value").unwrap(), ScriptValue::Integer(0));
    assert_eq!(engine.index(&ud, "other").unwrap(), ScriptValue::Nil);
    assert_eq!(engine.tostring(&ud).unwrap(), "Counter!");

    let err = engine.call_method(&ud, "missing", &[]).unwrap_err();
    assert!(matches!(err, BridgeError::Runtime(_)));
}

#[test]
fn test_userdata_without_metatable_cannot_be_indexed() {
    let mut engine = ScriptEngine::new();
    let ud = counter_userdata(&mut engine, None);
    assert!(engine.index(&ud, "x").is_err());
    assert!(engine.tostring(&ud).unwrap().starts_with("userdata: "));
}

#[test]
fn test_collection_finalizes_once() {
    let before = finalized();
    let mut engine = ScriptEngine::new();
    let ud = counter_userdata(&mut engine, None);

    engine.pin(&ud);
    engine.collect_garbage();
    assert_eq!(finalized(), before);
    assert!(engine.is_live(&ud));

    engine.unpin(&ud);
    engine.collect_garbage();
    assert_eq!(finalized(), before + 1);
    assert!(!engine.is_live(&ud));
    assert!(engine.userdata_payload(&ud).is_none());
}

#[test]
fn test_forced_finalize_then_collect() {
    let before = finalized();
    let mut engine = ScriptEngine::new();
    let ud = counter_userdata(&mut engine, None);
    let globals = engine.globals();
    engine.raw_set(&globals, "keep".into(), ud.clone()).unwrap();

    assert!(engine.finalize(&ud));
    assert!(!engine.finalize(&ud));
    assert_eq!(finalized(), before + 1);
    assert!(engine.userdata_payload(&ud).is_none());

    engine.raw_set(&globals, "keep".into(), ScriptValue::Nil).unwrap();
    engine.collect_garbage();
    assert_eq!(finalized(), before + 1);
}

#[test]
fn test_drop_finalizes_everything() {
    let before = finalized();
    {
        let mut engine = ScriptEngine::new();
        let a = counter_userdata(&mut engine, None);
        let b = counter_userdata(&mut engine, None);
        engine.pin(&a);
        engine.pin(&b);
    }
    assert_eq!(finalized(), before + 2);
}

#[test]
fn test_registry_survives_collection() {
    let mut engine = ScriptEngine::new();
    let registry = engine.registry();
    let t = engine.create_table();
    engine.raw_set(&registry, "cached".into(), t.clone()).unwrap();

    engine.collect_garbage();
    assert!(engine.is_live(&t));
    assert_eq!(engine.stats().collections, 1);
}
