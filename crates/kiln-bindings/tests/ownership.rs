//! Handle ownership, finalization and dispatch through a live runtime

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kiln_bindings::handle::allocate_optional;
use kiln_bindings::net::Record;
use kiln_bindings::{allocate, check_handle, check_type, tag_of, DispatchTable, OwnershipMode, Slot};
use kiln_engine::ScriptEngine;
use kiln_sdk::{BridgeError, ScriptContext, ScriptValue, TypeTag};

struct Sentinel(Arc<AtomicUsize>);

impl Drop for Sentinel {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn sentinel_table() -> Arc<DispatchTable<Sentinel>> {
    DispatchTable::<Sentinel>::builder("test.Sentinel")
        .field("drops", |s| (s.0.load(Ordering::SeqCst) as i64).into())
        .build()
        .unwrap()
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[test]
fn test_borrowed_finalization_keeps_value() {
    let drops = counter();
    let owner = Arc::new(Sentinel(Arc::clone(&drops)));
    let table = sentinel_table();

    let mut engine = ScriptEngine::new();
    let ud = allocate(&mut engine, &table, Slot::borrowed(&owner)).unwrap();
    engine.collect_garbage();

    assert!(!engine.is_live(&ud));
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(owner);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_owned_finalization_drops_value() {
    let drops = counter();
    let table = sentinel_table();

    let mut engine = ScriptEngine::new();
    let ud = allocate(&mut engine, &table, Slot::owned(Sentinel(Arc::clone(&drops)))).unwrap();
    engine.pin(&ud);
    engine.collect_garbage();
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    engine.unpin(&ud);
    engine.collect_garbage();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shared_value_destroyed_exactly_once() {
    let drops = counter();
    let value = Arc::new(Sentinel(Arc::clone(&drops)));
    let table = sentinel_table();

    let mut engine = ScriptEngine::new();
    let h1 = allocate(&mut engine, &table, Slot::shared(Arc::clone(&value))).unwrap();
    let h2 = allocate(&mut engine, &table, Slot::shared(Arc::clone(&value))).unwrap();
    drop(value);

    assert!(engine.finalize(&h1));
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    let survivor = check_handle::<Sentinel>(&engine, &h2).unwrap();
    assert!(survivor.is_valid());
    assert_eq!(engine.index(&h2, "drops").unwrap(), ScriptValue::Integer(0));
    drop(survivor);

    assert!(engine.finalize(&h2));
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    assert!(!engine.finalize(&h1));
    assert!(!engine.finalize(&h2));
    engine.collect_garbage();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lookup_records_follow_their_ownership() {
    let drops = counter();
    let table = sentinel_table();
    let mut engine = ScriptEngine::new();

    let built = Record::Owned(Sentinel(Arc::clone(&drops)));
    let owned = allocate_optional(&mut engine, &table, Some(Slot::from(built))).unwrap();
    engine.pin(&owned);
    assert_eq!(
        check_handle::<Sentinel>(&engine, &owned).unwrap().mode(),
        Some(OwnershipMode::Owned)
    );
    assert_eq!(engine.call_method(&owned, "isValid", &[]).unwrap(), ScriptValue::Bool(true));
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    let kept = Arc::new(Sentinel(Arc::clone(&drops)));
    let retained = Record::Retained(Arc::clone(&kept));
    let borrowed = allocate_optional(&mut engine, &table, Some(Slot::from(retained))).unwrap();
    assert!(engine.finalize(&borrowed));
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    assert!(engine.finalize(&owned));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    drop(kept);
    assert_eq!(drops.load(Ordering::SeqCst), 2);

    assert_eq!(allocate_optional(&mut engine, &table, None).unwrap(), ScriptValue::Nil);
}

struct Labelled;

#[test]
fn test_tables_sharing_a_tag_keep_their_own_members() {
    let first = DispatchTable::<Labelled>::builder("test.Labelled")
        .field("label", |_| "first".into())
        .build()
        .unwrap();
    let second = DispatchTable::<Labelled>::builder("test.Labelled")
        .field("label", |_| "second".into())
        .build()
        .unwrap();
    let mut engine = ScriptEngine::new();

    let a = allocate(&mut engine, &first, Slot::embedded(Labelled)).unwrap();
    let b = allocate(&mut engine, &second, Slot::embedded(Labelled)).unwrap();
    let c = allocate(&mut engine, &first, Slot::embedded(Labelled)).unwrap();

    assert_eq!(engine.index(&a, "label").unwrap(), ScriptValue::from("first"));
    assert_eq!(engine.index(&b, "label").unwrap(), ScriptValue::from("second"));
    assert_eq!(engine.index(&c, "label").unwrap(), ScriptValue::from("first"));
    assert!(check_type(&engine, &b, first.tag()).is_ok());
}

#[test]
fn test_finalized_handle_is_invalid_reference() {
    let table = sentinel_table();
    let mut engine = ScriptEngine::new();
    let ud = allocate(&mut engine, &table, Slot::owned(Sentinel(counter()))).unwrap();
    engine.pin(&ud);
    engine.finalize(&ud);

    assert_eq!(
        engine.index(&ud, "drops").unwrap_err(),
        BridgeError::InvalidReference
    );
    assert_eq!(
        engine.call_method(&ud, "isValid", &[]).unwrap_err(),
        BridgeError::InvalidReference
    );
}

#[test]
fn test_null_borrowed_handle_reports_invalid() {
    let table = sentinel_table();
    let mut engine = ScriptEngine::new();
    let owner = Arc::new(Sentinel(counter()));
    let ud = allocate(&mut engine, &table, Slot::borrowed(&owner)).unwrap();
    engine.pin(&ud);

    assert_eq!(engine.call_method(&ud, "isValid", &[]).unwrap(), ScriptValue::Bool(true));
    drop(owner);
    assert_eq!(engine.call_method(&ud, "isValid", &[]).unwrap(), ScriptValue::Bool(false));
    assert_eq!(engine.index(&ud, "drops").unwrap_err(), BridgeError::InvalidReference);
}

struct Bomb;

impl Drop for Bomb {
    fn drop(&mut self) {
        panic!("destructor failure");
    }
}

#[test]
fn test_panicking_destructor_is_swallowed() {
    let table = DispatchTable::<Bomb>::builder("test.Bomb").build().unwrap();
    let mut engine = ScriptEngine::new();
    let ud = allocate(&mut engine, &table, Slot::owned(Bomb)).unwrap();

    assert_eq!(engine.collect_garbage().finalizer_panics, 1);
    assert!(!engine.is_live(&ud));

    let again = allocate(&mut engine, &table, Slot::embedded(Bomb)).unwrap();
    assert!(engine.finalize(&again));
    assert_eq!(engine.stats().finalizer_panics, 2);
}

struct Sample;

#[test]
fn test_colliding_member_names_dispatch_separately() {
    assert_eq!(kiln_bindings::joaat(b"fieldefma"), 0xf833_2791);
    assert_eq!(kiln_bindings::joaat(b"fieldiaae"), 0xf833_2791);

    let table = DispatchTable::<Sample>::builder("test.Sample")
        .field("fieldefma", |_| "first".into())
        .field("fieldiaae", |_| "second".into())
        .build()
        .unwrap();
    let mut engine = ScriptEngine::new();
    let ud = allocate(&mut engine, &table, Slot::embedded(Sample)).unwrap();

    assert_eq!(engine.index(&ud, "fieldefma").unwrap(), ScriptValue::from("first"));
    assert_eq!(engine.index(&ud, "fieldiaae").unwrap(), ScriptValue::from("second"));
    assert_eq!(engine.index(&ud, "fieldxxxx").unwrap(), ScriptValue::Nil);
}

struct Left;
struct Right;

#[test]
fn test_check_type_matches_tag_of() {
    let left = DispatchTable::<Left>::builder("test.Left").build().unwrap();
    let right = DispatchTable::<Right>::builder("test.Right").build().unwrap();

    let mut engine = ScriptEngine::new();
    let l = allocate(&mut engine, &left, Slot::embedded(Left)).unwrap();
    let r = allocate(&mut engine, &right, Slot::embedded(Right)).unwrap();
    let plain = engine.create_table();

    let tags = [left.tag().clone(), right.tag().clone(), TypeTag::new("test.Nobody")];
    for value in [&l, &r, &plain, &ScriptValue::Integer(7)] {
        for tag in &tags {
            let matches = tag_of(&engine, value).as_ref() == Some(tag);
            assert_eq!(check_type(&engine, value, tag).is_ok(), matches);
        }
    }

    assert!(check_handle::<Left>(&engine, &l).is_ok());
    assert_eq!(
        check_handle::<Left>(&engine, &r).unwrap_err(),
        BridgeError::type_mismatch("test.Left", "test.Right")
    );
    assert_eq!(
        check_handle::<Left>(&engine, &plain).unwrap_err(),
        BridgeError::type_mismatch("test.Left", "table")
    );
}

#[test]
fn test_method_on_wrong_receiver_is_type_mismatch() {
    let left = DispatchTable::<Left>::builder("test.Left").build().unwrap();
    let right = DispatchTable::<Right>::builder("test.Right").build().unwrap();
    let mut engine = ScriptEngine::new();
    let l = allocate(&mut engine, &left, Slot::embedded(Left)).unwrap();
    let r = allocate(&mut engine, &right, Slot::embedded(Right)).unwrap();

    let is_valid = engine.index(&l, "isValid").unwrap();
    let err = engine.call(&is_valid, &[r]).unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch { .. }));
}
