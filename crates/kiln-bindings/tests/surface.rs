//! The installed `kiln` namespace, driven the way a script would drive it

use std::io::{Cursor, Write};
use std::net::IpAddr;
use std::sync::Arc;

use kiln_bindings::net::{AsRecord, IntelProvider, Location, Record, StaticIntelProvider};
use kiln_bindings::{check_handle, BridgeConfig, Bindings, OwnershipMode};
use kiln_engine::ScriptEngine;
use kiln_sdk::{BridgeError, ScriptContext, ScriptValue};

const DATASET: &str = r#"{
    "as": [{"start": "198.51.100.0", "end": "198.51.100.255", "number": 64496,
            "handle": "DOC-NET", "name": "Documentation Networks", "hosting": true}],
    "locations": [{"start": "198.51.100.0", "end": "198.51.100.255",
                   "city": "Zurich", "state": "Zurich", "country_code": "CH"}],
    "reverse_dns": [{"ip": "198.51.100.7", "name": "edge.example.org"}]
}"#;

fn installed() -> ScriptEngine {
    let mut engine = ScriptEngine::new();
    Bindings::new().install(&mut engine).unwrap();
    engine
}

fn with_intel(provider: Arc<StaticIntelProvider>) -> ScriptEngine {
    let mut engine = ScriptEngine::new();
    Bindings::new()
        .with_intel_provider(provider)
        .install(&mut engine)
        .unwrap();
    engine
}

fn s(text: &str) -> ScriptValue {
    ScriptValue::from(text)
}

// ============================================================================
// Installation
// ============================================================================

#[test]
fn test_install_twice_reuses_table() {
    let bindings = Bindings::new();
    let mut engine = ScriptEngine::new();
    let first = bindings.install(&mut engine).unwrap();
    let objects = engine.live_objects();

    let second = bindings.install(&mut engine).unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.live_objects(), objects);
}

#[test]
fn test_install_under_configured_namespace() {
    let config = BridgeConfig::from_str("namespace = \"native\"").unwrap();
    let bindings = Bindings::from_config(config).unwrap();
    let mut engine = ScriptEngine::new();
    bindings.install(&mut engine).unwrap();

    assert_eq!(engine.get_global("kiln").unwrap(), ScriptValue::Nil);
    assert_eq!(
        engine.call_path("native.getCountryName", &[s("fr")]).unwrap(),
        s("France")
    );
}

#[test]
fn test_bad_arguments_raise_argument_errors() {
    let mut engine = installed();
    let err = engine.call_path("kiln.vector.new", &[1.into()]).unwrap_err();
    assert!(matches!(err, BridgeError::Argument(_)));

    let err = engine
        .call_path("kiln.json.decode", &[s("{\"a\":")])
        .unwrap_err();
    assert!(matches!(err, BridgeError::Argument(_)));
}

// ============================================================================
// Network
// ============================================================================

#[test]
fn test_country_names() {
    let mut engine = installed();
    assert_eq!(engine.call_path("kiln.getCountryName", &[s("DE")]).unwrap(), s("Germany"));
    assert_eq!(
        engine.call_path("kiln.getCountryName", &[s("de"), s("DE")]).unwrap(),
        s("Deutschland")
    );
    assert_eq!(engine.call_path("kiln.getCountryName", &[s("XX")]).unwrap(), ScriptValue::Nil);
}

#[test]
fn test_country_name_rejects_nil_language() {
    let mut engine = installed();
    let err = engine
        .call_path("kiln.getCountryName", &[s("DE"), ScriptValue::Nil])
        .unwrap_err();
    assert_eq!(
        err,
        BridgeError::Argument(
            "bad argument #2 to 'getCountryName' (string expected, got nil)".to_string()
        )
    );
}

#[test]
fn test_ip_addr_forms() {
    let mut engine = installed();
    let from_text = engine.call_path("kiln.IpAddr", &[s("192.0.2.1")]).unwrap();
    let from_int = engine
        .call_path("kiln.IpAddr", &[ScriptValue::Integer(0xC000_0201)])
        .unwrap();
    let from_handle = engine.call_path("kiln.IpAddr", &[from_text.clone()]).unwrap();

    for addr in [&from_text, &from_int, &from_handle] {
        assert_eq!(engine.tostring(addr).unwrap(), "192.0.2.1");
        assert_eq!(engine.call_method(addr, "isV4", &[]).unwrap(), ScriptValue::Bool(true));
    }

    let err = engine.call_path("kiln.IpAddr", &[s("not an address")]).unwrap_err();
    assert!(matches!(err, BridgeError::Argument(_)));
}

#[test]
fn test_intel_miss_is_nil() {
    let mut engine = installed();
    assert_eq!(
        engine.call_path("kiln.netIntel.getAsByIp", &[s("198.51.100.7")]).unwrap(),
        ScriptValue::Nil
    );
    assert_eq!(
        engine.call_path("kiln.netIntel.getLocationByIp", &[s("198.51.100.7")]).unwrap(),
        ScriptValue::Nil
    );
}

#[test]
fn test_intel_hit_has_typed_fields() {
    let provider = Arc::new(StaticIntelProvider::from_json(DATASET).unwrap());
    let mut engine = with_intel(provider);

    let record = engine
        .call_path("kiln.netIntel.getAsByIp", &[s("198.51.100.7")])
        .unwrap();
    assert_eq!(engine.index(&record, "number").unwrap(), ScriptValue::Integer(64496));
    assert_eq!(engine.index(&record, "handle").unwrap(), s("DOC-NET"));
    assert_eq!(engine.call_method(&record, "isHosting", &[]).unwrap(), ScriptValue::Bool(true));
    assert_eq!(engine.call_method(&record, "isValid", &[]).unwrap(), ScriptValue::Bool(true));

    let location = engine
        .call_path("kiln.netIntel.getLocationByIp", &[ScriptValue::Integer(0xC633_6407)])
        .unwrap();
    assert_eq!(engine.index(&location, "country_code").unwrap(), s("CH"));

    let addr = engine.call_path("kiln.IpAddr", &[s("198.51.100.7")]).unwrap();
    assert_eq!(engine.call_method(&addr, "getReverseDns", &[]).unwrap(), s("edge.example.org"));
    let other = engine.call_path("kiln.IpAddr", &[s("198.51.100.8")]).unwrap();
    assert_eq!(engine.call_method(&other, "getReverseDns", &[]).unwrap(), ScriptValue::Nil);
}

#[test]
fn test_reload_nulls_outstanding_records() {
    let provider = Arc::new(StaticIntelProvider::from_json(DATASET).unwrap());
    let mut engine = with_intel(Arc::clone(&provider));

    let record = engine
        .call_path("kiln.netIntel.getAsByIp", &[s("198.51.100.7")])
        .unwrap();
    engine.pin(&record);
    provider.reload_from_json("{}").unwrap();

    assert_eq!(engine.call_method(&record, "isValid", &[]).unwrap(), ScriptValue::Bool(false));
    assert_eq!(engine.index(&record, "name").unwrap_err(), BridgeError::InvalidReference);
}

/// Builds a fresh record for every lookup and keeps nothing
struct SyntheticIntel {
    ptr: &'static str,
}

impl IntelProvider for SyntheticIntel {
    fn as_by_ip(&self, addr: &IpAddr) -> Option<Record<AsRecord>> {
        Some(Record::Owned(AsRecord {
            number: 64512,
            handle: "SYNTH".to_string(),
            name: format!("synthetic {}", addr),
            hosting: false,
        }))
    }

    fn location_by_ip(&self, _addr: &IpAddr) -> Option<Record<Location>> {
        Some(Record::Owned(Location {
            city: "Lyon".to_string(),
            state: "Auvergne-Rhone-Alpes".to_string(),
            country_code: "FR".to_string(),
        }))
    }

    fn reverse_dns(&self, _addr: &IpAddr) -> Option<String> {
        Some(self.ptr.to_string())
    }
}

#[test]
fn test_unretained_records_stay_valid() {
    let mut engine = ScriptEngine::new();
    Bindings::new()
        .with_intel_provider(Arc::new(SyntheticIntel { ptr: "synth.example" }))
        .install(&mut engine)
        .unwrap();

    let record = engine
        .call_path("kiln.netIntel.getAsByIp", &[s("203.0.113.9")])
        .unwrap();
    engine.pin(&record);
    assert_eq!(
        check_handle::<AsRecord>(&engine, &record).unwrap().mode(),
        Some(OwnershipMode::Owned)
    );
    assert_eq!(engine.call_method(&record, "isValid", &[]).unwrap(), ScriptValue::Bool(true));
    assert_eq!(engine.index(&record, "number").unwrap(), ScriptValue::Integer(64512));
    assert_eq!(engine.index(&record, "name").unwrap(), s("synthetic 203.0.113.9"));

    let location = engine
        .call_path("kiln.netIntel.getLocationByIp", &[s("203.0.113.9")])
        .unwrap();
    assert_eq!(engine.index(&location, "city").unwrap(), s("Lyon"));
}

#[test]
fn test_retained_records_are_borrowed() {
    let provider = Arc::new(StaticIntelProvider::from_json(DATASET).unwrap());
    let mut engine = with_intel(provider);
    let record = engine
        .call_path("kiln.netIntel.getAsByIp", &[s("198.51.100.7")])
        .unwrap();
    assert_eq!(
        check_handle::<AsRecord>(&engine, &record).unwrap().mode(),
        Some(OwnershipMode::Borrowed)
    );
}

#[test]
fn test_bindings_in_one_runtime_keep_their_providers() {
    let mut engine = ScriptEngine::new();
    for (namespace, ptr) in [("a", "from-a"), ("b", "from-b")] {
        let config = BridgeConfig::from_str(&format!("namespace = \"{}\"", namespace)).unwrap();
        Bindings::from_config(config)
            .unwrap()
            .with_intel_provider(Arc::new(SyntheticIntel { ptr }))
            .install(&mut engine)
            .unwrap();
    }

    let from_a = engine.call_path("a.IpAddr", &[s("10.0.0.1")]).unwrap();
    let from_b = engine.call_path("b.IpAddr", &[s("10.0.0.1")]).unwrap();
    assert_eq!(engine.call_method(&from_a, "getReverseDns", &[]).unwrap(), s("from-a"));
    assert_eq!(engine.call_method(&from_b, "getReverseDns", &[]).unwrap(), s("from-b"));
    assert_eq!(engine.tostring(&from_b).unwrap(), "10.0.0.1");
}

// ============================================================================
// JSON
// ============================================================================

#[test]
fn test_json_end_to_end() {
    let mut engine = installed();
    let text = r#"{"a":1,"b":[true,null,"x"]}"#;
    let value = engine.call_path("kiln.json.decode", &[s(text)]).unwrap();

    assert_eq!(engine.index(&value, "a").unwrap(), ScriptValue::Integer(1));
    let b = engine.index(&value, "b").unwrap();
    assert_eq!(engine.table_len(&b).unwrap(), 3);
    assert_eq!(engine.index(&b, 1).unwrap(), ScriptValue::Bool(true));
    assert_eq!(engine.index(&b, 2).unwrap(), ScriptValue::Nil);
    assert_eq!(engine.index(&b, 3).unwrap(), s("x"));

    let encoded = engine.call_path("kiln.json.encode", &[value]).unwrap();
    assert_eq!(encoded, s(text));
}

#[test]
fn test_json_encode_classifies_tables() {
    let mut engine = installed();

    let seq = engine.create_table();
    for i in 1..=3 {
        engine.raw_set(&seq, ScriptValue::Integer(i), ScriptValue::Integer(i * 10)).unwrap();
    }
    let sparse = engine.create_table();
    engine.raw_set(&sparse, ScriptValue::Integer(1), s("a")).unwrap();
    engine.raw_set(&sparse, ScriptValue::Integer(3), s("c")).unwrap();
    let empty = engine.create_table();

    let encode = |engine: &mut ScriptEngine, v: ScriptValue| {
        engine.call_path("kiln.json.encode", &[v]).unwrap()
    };
    assert_eq!(encode(&mut engine, seq), s("[10,20,30]"));
    assert_eq!(encode(&mut engine, sparse), s(r#"{"1":"a","3":"c"}"#));
    assert_eq!(encode(&mut engine, empty), s("{}"));
}

#[test]
fn test_json_encode_rejects_handles() {
    let mut engine = installed();
    let v = engine
        .call_path("kiln.vector.new", &[1.into(), 2.into(), 3.into()])
        .unwrap();
    let err = engine.call_path("kiln.json.encode", &[v]).unwrap_err();
    assert!(matches!(err, BridgeError::NotDocumentCastable(_)));
}

// ============================================================================
// Vector3
// ============================================================================

#[test]
fn test_vector_properties_and_methods() {
    let mut engine = installed();
    let v = engine
        .call_path("kiln.vector.new", &[3.into(), 4.into(), 0.into()])
        .unwrap();
    assert_eq!(engine.call_method(&v, "length", &[]).unwrap(), ScriptValue::Number(5.0));

    engine.set_index(&v, "z", ScriptValue::Integer(12)).unwrap();
    assert_eq!(engine.index(&v, "z").unwrap(), ScriptValue::Number(12.0));
    assert_eq!(engine.call_method(&v, "length", &[]).unwrap(), ScriptValue::Number(13.0));

    let unit = engine
        .call_path("kiln.vector.new", &[1.into(), 0.into(), 0.into()])
        .unwrap();
    let sum = engine.call_method(&v, "add", &[unit.clone()]).unwrap();
    assert_eq!(engine.tostring(&sum).unwrap(), "Vector3(4.0, 4.0, 12.0)");
    assert_eq!(engine.tostring(&v).unwrap(), "Vector3(3.0, 4.0, 12.0)");
    assert_eq!(engine.call_method(&v, "dot", &[unit]).unwrap(), ScriptValue::Number(3.0));
}

#[test]
fn test_vector_write_errors() {
    let mut engine = installed();
    let v = engine
        .call_path("kiln.vector.new", &[1.into(), 2.into(), 3.into()])
        .unwrap();

    let err = engine.set_index(&v, "length", 1.into()).unwrap_err();
    assert!(matches!(err, BridgeError::Argument(ref m) if m.contains("read-only")));
    let err = engine.set_index(&v, "w", 1.into()).unwrap_err();
    assert!(matches!(err, BridgeError::Argument(ref m) if m.contains("no member")));
    let err = engine.set_index(&v, "x", s("far")).unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch { .. }));
}

// ============================================================================
// Audio
// ============================================================================

#[test]
fn test_audio_devices_and_playback() {
    let mut engine = installed();
    let devices = engine.call_path("kiln.audio.getDevices", &[]).unwrap();
    assert_eq!(engine.table_len(&devices).unwrap(), 1);

    let device = engine.call_path("kiln.audio.getDefaultDevice", &[]).unwrap();
    assert_eq!(engine.index(&device, "name").unwrap(), s("Default Output"));
    assert_eq!(engine.index(&device, "channels").unwrap(), ScriptValue::Integer(2));

    let playback = engine.call_method(&device, "open", &[]).unwrap();
    let mixer = engine.call_path("kiln.audio.newMixer", &[playback.clone()]).unwrap();
    engine.pin(&mixer);

    engine
        .call_method(&mixer, "playTone", &[440.into(), ScriptValue::Number(0.5)])
        .unwrap();
    assert_eq!(engine.call_method(&playback, "isPlaying", &[]).unwrap(), ScriptValue::Bool(true));

    // Dropping the script's playback handle leaves the mixer's reference
    engine.finalize(&playback);
    let again = engine.index(&mixer, "playback").unwrap();
    assert_eq!(engine.index(&again, "deviceName").unwrap(), s("Default Output"));

    let frames = engine
        .call_method(&mixer, "advance", &[ScriptValue::Number(1.0)])
        .unwrap();
    assert_eq!(frames, ScriptValue::Integer(24_000));
    assert_eq!(engine.call_method(&mixer, "isPlaying", &[]).unwrap(), ScriptValue::Bool(false));
    assert_eq!(engine.call_method(&again, "isPlaying", &[]).unwrap(), ScriptValue::Bool(false));
}

#[test]
fn test_new_mixer_requires_playback() {
    let mut engine = installed();
    let device = engine.call_path("kiln.audio.getDefaultDevice", &[]).unwrap();
    let err = engine.call_path("kiln.audio.newMixer", &[device]).unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch { .. }));
}

// ============================================================================
// Readers
// ============================================================================

fn zip_bytes() -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    zip.start_file("readme.txt", options).unwrap();
    zip.write_all(b"kiln archive").unwrap();
    zip.start_file("data/values.json", options).unwrap();
    zip.write_all(b"[1,2,3]").unwrap();
    zip.finish().unwrap().into_inner()
}

fn list_entries(engine: &mut ScriptEngine, zip: &ScriptValue) -> Vec<(String, ScriptValue)> {
    let list = engine.call_method(zip, "getFileList", &[]).unwrap();
    let len = engine.table_len(&list).unwrap();
    (1..=len as i64)
        .map(|i| {
            let entry = engine.index(&list, i).unwrap();
            let name = engine.index(&entry, "name").unwrap();
            let offset = engine.index(&entry, "offset").unwrap();
            (name.as_str().unwrap_or_default().to_string(), offset)
        })
        .collect()
}

#[test]
fn test_string_reader_methods() {
    let mut engine = installed();
    let r = engine.call_path("kiln.io.StringReader", &[s("abcdef")]).unwrap();

    assert_eq!(engine.call_method(&r, "size", &[]).unwrap(), ScriptValue::Integer(6));
    assert_eq!(engine.call_method(&r, "read", &[2.into()]).unwrap(), s("ab"));
    assert_eq!(
        engine.call_method(&r, "readByte", &[]).unwrap(),
        ScriptValue::Integer(i64::from(b'c'))
    );
    assert_eq!(engine.call_method(&r, "tell", &[]).unwrap(), ScriptValue::Integer(3));
    engine.call_method(&r, "seek", &[5.into()]).unwrap();
    assert_eq!(engine.call_method(&r, "hasMore", &[]).unwrap(), ScriptValue::Bool(true));
    assert_eq!(engine.call_method(&r, "read", &[10.into()]).unwrap(), s("f"));
    assert_eq!(engine.call_method(&r, "hasMore", &[]).unwrap(), ScriptValue::Bool(false));
    assert_eq!(engine.call_method(&r, "readByte", &[]).unwrap(), ScriptValue::Nil);
}

#[test]
fn test_zip_reader_accepts_both_reader_kinds() {
    let bytes = zip_bytes();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();
    let path = file.path().to_string_lossy().into_owned();

    let mut engine = installed();
    let from_string = engine
        .call_path("kiln.io.StringReader", &[ScriptValue::String(bytes.into())])
        .unwrap();
    let from_file = engine.call_path("kiln.io.FileReader", &[s(&path)]).unwrap();

    for reader in [from_string, from_file] {
        let zip = engine.call_path("kiln.io.ZipReader", &[reader]).unwrap();
        let entries = list_entries(&mut engine, &zip);
        let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["readme.txt", "data/values.json"]);

        let contents = engine
            .call_method(&zip, "getFileContents", &[entries[1].1.clone()])
            .unwrap();
        assert_eq!(contents, s("[1,2,3]"));
    }
}

#[test]
fn test_zip_reader_rejects_other_values() {
    let mut engine = installed();
    let v = engine
        .call_path("kiln.vector.new", &[0.into(), 0.into(), 0.into()])
        .unwrap();
    let err = engine.call_path("kiln.io.ZipReader", &[v]).unwrap_err();
    assert_eq!(
        err,
        BridgeError::type_mismatch("kiln.StringReader | kiln.FileReader", "kiln.Vector3")
    );

    let err = engine.call_path("kiln.io.FileReader", &[s("/nonexistent/kiln.zip")]).unwrap_err();
    assert!(matches!(err, BridgeError::NativeOperation(_)));
}
