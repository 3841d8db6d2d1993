#![allow(missing_docs)]

mod common;

use bytes::Bytes;
use common::{decode_text, encode_text, encode_text_with, roundtrip};
use fluxcode::{
    ArrayValue, BigIntValue, BlobValue, BufferKind, BufferValue, DateValue, EncodeOptions,
    ErrorRedaction, ErrorValue, FileValue, FormDataValue, MapValue, ObjectValue, RegexValue,
    SetValue, UrlValue, Value,
};
use time::OffsetDateTime;

// --- SCALARS ---

#[tokio::test]
async fn scalar_kinds_survive_the_wire() {
    for value in [
        Value::Undefined,
        Value::Null,
        Value::Bool(true),
        Value::Bool(false),
        Value::Number(0.0),
        Value::Number(-0.0),
        Value::Number(10.5),
        Value::Number(-3.25),
        Value::Number(f64::NAN),
        Value::Number(f64::INFINITY),
        Value::Number(f64::NEG_INFINITY),
        Value::String(String::new()),
        Value::String("hello \"world\"\nline two \\ done".into()),
        Value::Symbol("app.token".into()),
        Value::BigInt(BigIntValue::new("-170141183460469231731687303715884105728").unwrap()),
    ] {
        assert_eq!(roundtrip(value.clone()).await, value);
    }
}

#[tokio::test]
async fn unicode_strings_survive_fragmentation_and_escaping() {
    let value = Value::String("snowman \u{2603} / emoji \u{1F600} / quote \"".into());
    assert_eq!(roundtrip(value.clone()).await, value);
}

// --- TAGGED SCALAR-LIKE KINDS ---

#[tokio::test]
async fn date_roundtrips_to_the_same_instant() {
    let instant = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
    let back = roundtrip(Value::Date(DateValue::new(instant))).await;
    match back {
        Value::Date(d) => assert_eq!(d.instant(), instant),
        other => assert!(false, "expected a date, got {other:?}"),
    }
}

#[tokio::test]
async fn url_and_regex_roundtrip() {
    let url = Value::Url(UrlValue::new("https://example.com/a?b=c"));
    assert_eq!(roundtrip(url.clone()).await, url);

    let regex = Value::Regex(RegexValue::new(r"^\d+[a-z\]]$", "gi"));
    assert_eq!(roundtrip(regex.clone()).await, regex);
}

#[tokio::test]
async fn every_buffer_kind_keeps_its_bytes_and_kind() {
    let payload = Bytes::from_static(&[0, 1, 2, 250, 255]);
    for kind in [
        BufferKind::ArrayBuffer,
        BufferKind::Int8,
        BufferKind::Uint8,
        BufferKind::Uint8Clamped,
        BufferKind::Int16,
        BufferKind::Uint16,
        BufferKind::Int32,
        BufferKind::Uint32,
        BufferKind::Float32,
        BufferKind::Float64,
        BufferKind::BigInt64,
        BufferKind::BigUint64,
        BufferKind::DataView,
    ] {
        let value = Value::Buffer(BufferValue::new(kind, payload.clone()));
        assert_eq!(roundtrip(value.clone()).await, value);
    }
}

// --- CONTAINERS ---

#[tokio::test]
async fn nested_containers_roundtrip_structurally() {
    let inner = ObjectValue::new();
    inner.set("n", Value::Number(1.0));
    inner.set("list", Value::from(vec![Value::Null, Value::Bool(true)]));

    let set = SetValue::new();
    set.add(Value::Number(1.0));
    set.add(Value::String("one".into()));

    let map = MapValue::new();
    map.set(
        Value::from(vec![Value::Number(1.0)]),
        Value::String("array key".into()),
    );
    map.set(Value::String("k".into()), Value::Number(2.0));

    let root = ObjectValue::new();
    root.set("inner", Value::Object(inner));
    root.set("set", Value::Set(set));
    root.set("map", Value::Map(map));

    let value = Value::Object(root);
    assert_eq!(roundtrip(value.clone()).await, value);
}

#[tokio::test]
async fn form_data_keeps_duplicate_names_in_order() {
    let form = FormDataValue::new();
    form.append("tag", Value::String("a".into()));
    form.append("tag", Value::String("b".into()));
    form.append("file", Value::String("payload".into()));

    let back = roundtrip(Value::FormData(form)).await;
    match back {
        Value::FormData(form) => {
            let entries = form.entries();
            assert_eq!(entries.len(), 3);
            assert_eq!(entries[0], ("tag".into(), Value::String("a".into())));
            assert_eq!(entries[1], ("tag".into(), Value::String("b".into())));
        }
        other => assert!(false, "expected form data, got {other:?}"),
    }
}

// --- IDENTITY ---

#[tokio::test]
async fn shared_child_decodes_to_one_identity() {
    let shared = ArrayValue::from_vec(vec![Value::Number(1.0)]);
    let value = Value::from(vec![
        Value::Array(shared.clone()),
        Value::Array(shared),
    ]);

    let back = roundtrip(value).await;
    let Value::Array(outer) = back else {
        return assert!(false, "expected an array");
    };
    let a = outer.get(0).and_then(|v| v.ref_identity());
    let b = outer.get(1).and_then(|v| v.ref_identity());
    assert!(a.is_some());
    assert_eq!(a, b);
}

#[tokio::test]
async fn cyclic_object_roundtrips() {
    let obj = ObjectValue::new();
    obj.set("me", Value::Object(obj.clone()));

    let text = encode_text(Value::Object(obj)).await.expect("encodes");
    assert_eq!(text, "{\"me\":@0}\n");

    let back = decode_text(&text).await.expect("decodes");
    let identity = back.ref_identity();
    let Value::Object(back_obj) = back else {
        return assert!(false, "expected an object");
    };
    assert_eq!(back_obj.get("me").and_then(|v| v.ref_identity()), identity);
}

// --- ERRORS, BLOBS, FILES ---

#[tokio::test]
async fn error_with_cause_roundtrips_when_redaction_is_off() {
    let cause = ErrorValue::new("TypeError", "inner detail");
    let err = ErrorValue::new("RangeError", "outer detail");
    err.set_stack("at line 1");
    err.set_cause(Value::Error(cause));

    let options = EncodeOptions {
        redact_errors: ErrorRedaction::Off,
        ..EncodeOptions::default()
    };
    let text = encode_text_with(Value::Error(err), options)
        .await
        .expect("encodes");
    let back = decode_text(&text).await.expect("decodes");

    let Value::Error(back_err) = back else {
        return assert!(false, "expected an error");
    };
    assert_eq!(back_err.name(), "RangeError");
    assert_eq!(back_err.message(), "outer detail");
    assert_eq!(back_err.stack().as_deref(), Some("at line 1"));
    match back_err.cause() {
        Some(Value::Error(inner)) => assert_eq!(inner.message(), "inner detail"),
        other => assert!(false, "expected an error cause, got {other:?}"),
    }
}

#[tokio::test]
async fn blob_content_arrives_through_its_resolution_line() {
    let blob = BlobValue::from_bytes(Bytes::from_static(b"hello"), "text/plain");
    let back = roundtrip(Value::Blob(blob)).await;

    let Value::Blob(blob) = back else {
        return assert!(false, "expected a blob");
    };
    assert_eq!(blob.size(), 5);
    assert_eq!(blob.content_type(), "text/plain");
    assert_eq!(blob.bytes().await, Ok(Bytes::from_static(b"hello")));
}

#[tokio::test]
async fn file_metadata_and_content_roundtrip() {
    let file = FileValue::from_bytes(
        Bytes::from_static(b"abc"),
        "application/octet-stream",
        "data.bin",
        1_700_000_000_000.0,
    );
    let back = roundtrip(Value::File(file)).await;

    let Value::File(file) = back else {
        return assert!(false, "expected a file");
    };
    assert_eq!(file.name(), "data.bin");
    assert_eq!(file.size(), 3);
    assert_eq!(file.last_modified_ms(), 1_700_000_000_000.0);
    assert_eq!(file.bytes().await, Ok(Bytes::from_static(b"abc")));
}

// --- DEPTH ---

#[tokio::test]
async fn very_deep_graphs_roundtrip_without_overflowing() {
    let mut value = Value::Number(0.0);
    for _ in 0..100_000 {
        value = Value::from(vec![value]);
    }

    let text = encode_text(value).await.expect("encodes");
    let mut back = decode_text(&text).await.expect("decodes");

    let mut depth = 0u32;
    while let Value::Array(arr) = back {
        back = arr.get(0).expect("one element per level");
        depth += 1;
    }
    assert_eq!(depth, 100_000);
    assert_eq!(back, Value::Number(0.0));
}
