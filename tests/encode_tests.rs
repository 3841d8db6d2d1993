#![allow(missing_docs)]

mod common;

use common::{encode_text, encode_text_with};
use fluxcode::{
    encode, ArrayValue, EncodeError, EncodeOptions, ErrorRedaction, ErrorValue, MapValue,
    ObjectValue, OpaqueValue, PromiseValue, SetValue, Value,
};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

// --- WIRE FIXTURES ---

#[tokio::test]
async fn scalar_fixtures_match_the_wire_grammar() {
    assert_eq!(encode_text(Value::Undefined).await.unwrap(), "undefined\n");
    assert_eq!(encode_text(Value::Null).await.unwrap(), "null\n");
    assert_eq!(encode_text(Value::Bool(false)).await.unwrap(), "false\n");
    assert_eq!(encode_text(Value::Number(42.0)).await.unwrap(), "42\n");
    assert_eq!(encode_text(Value::Number(-0.0)).await.unwrap(), "z\n");
    assert_eq!(
        encode_text(Value::Number(f64::INFINITY)).await.unwrap(),
        "I\n"
    );
    assert_eq!(
        encode_text(Value::BigInt(7_u64.into())).await.unwrap(),
        "b7\n"
    );
    assert_eq!(
        encode_text(Value::Symbol("tag".into())).await.unwrap(),
        "s\"tag\"\n"
    );
}

#[tokio::test]
async fn composite_fixtures_match_the_wire_grammar() {
    let set = SetValue::new();
    set.add(Value::Number(1.0));
    set.add(Value::Number(2.0));
    set.add(Value::Number(3.0));
    assert_eq!(encode_text(Value::Set(set)).await.unwrap(), "S[1,2,3]\n");

    let map = MapValue::new();
    map.set(Value::String("k".into()), Value::Number(1.0));
    assert_eq!(
        encode_text(Value::Map(map)).await.unwrap(),
        "M[[\"k\",1]]\n"
    );

    let obj = ObjectValue::new();
    obj.set("a", Value::from(vec![Value::Number(1.0)]));
    assert_eq!(
        encode_text(Value::Object(obj)).await.unwrap(),
        "{\"a\":[1]}\n"
    );
}

#[tokio::test]
async fn shared_values_encode_once_then_back_reference() {
    let shared = ArrayValue::from_vec(vec![Value::Number(1.0)]);
    let value = Value::from(vec![
        Value::Array(shared.clone()),
        Value::Array(shared),
    ]);
    assert_eq!(encode_text(value).await.unwrap(), "[[1],@1]\n");
}

// --- REDACTION ---

#[tokio::test]
async fn errors_are_redacted_by_default() {
    let err = ErrorValue::new("DatabaseError", "password=hunter2");
    err.set_stack("at secret_module:1");
    let text = encode_text(Value::Error(err)).await.unwrap();
    assert_eq!(
        text,
        "E{\"name\":\"Error\",\"message\":\"<redacted>\",\"stack\":undefined,\"cause\":undefined}\n"
    );
}

#[tokio::test]
async fn custom_redaction_marker_replaces_the_message() {
    let err = ErrorValue::new("DatabaseError", "password=hunter2");
    let options = EncodeOptions {
        redact_errors: ErrorRedaction::Custom("nope".into()),
        ..EncodeOptions::default()
    };
    let text = encode_text_with(Value::Error(err), options).await.unwrap();
    assert!(text.contains("\"message\":\"nope\""));
    assert!(text.contains("\"name\":\"Error\""));
}

#[tokio::test]
async fn redaction_off_sends_errors_verbatim() {
    let err = ErrorValue::new("RangeError", "index 9 out of bounds");
    let options = EncodeOptions {
        redact_errors: ErrorRedaction::Off,
        ..EncodeOptions::default()
    };
    let text = encode_text_with(Value::Error(err), options).await.unwrap();
    assert!(text.contains("\"name\":\"RangeError\""));
    assert!(text.contains("\"message\":\"index 9 out of bounds\""));
}

// --- REFUSALS AND CANCELLATION ---

#[tokio::test]
async fn opaque_value_without_plugin_is_refused() {
    struct Mystery;
    let value = Value::Opaque(OpaqueValue::new(Mystery));
    let result = encode_text(value).await;
    assert!(matches!(result, Err(EncodeError::UnsupportedValue(_))));
}

#[tokio::test]
async fn cancellation_ends_the_stream_with_one_error() {
    let token = CancellationToken::new();
    // A promise that never settles keeps the scheduler pending forever.
    let value = Value::Promise(PromiseValue::from_future(futures::future::pending()));
    let options = EncodeOptions {
        cancel: Some(token.clone()),
        ..EncodeOptions::default()
    };

    let mut stream = encode(value, options);
    let first = stream.next().await;
    assert_eq!(first, Some(Ok("$0\n".to_owned())));

    token.cancel();
    assert_eq!(stream.next().await, Some(Err(EncodeError::Cancelled)));
    assert_eq!(stream.next().await, None);
}

#[tokio::test]
async fn lines_are_produced_lazily_on_demand() {
    // Two settled promises: nothing beyond the root line may be encoded
    // until the consumer polls for it.
    let value = Value::from(vec![
        Value::Promise(PromiseValue::resolved(Value::Number(1.0))),
        Value::Promise(PromiseValue::resolved(Value::Number(2.0))),
    ]);
    let mut stream = encode(value, EncodeOptions::default());

    assert_eq!(stream.next().await, Some(Ok("[$0,$1]\n".to_owned())));
    let second = stream.next().await.expect("a resolution line").unwrap();
    let third = stream.next().await.expect("a resolution line").unwrap();
    let mut lines = [second, third];
    lines.sort();
    assert_eq!(lines, ["0:1\n".to_owned(), "1:2\n".to_owned()]);
    assert_eq!(stream.next().await, None);
}
