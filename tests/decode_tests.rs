#![allow(missing_docs)]

mod common;

use common::{decode_chars, decode_text};
use fluxcode::{decode, DecodeError, DecodeOptions, Value};
use futures::stream;

// --- CHUNK BOUNDARIES ---

/// Parsing must be insensitive to where the transport cuts its chunks, so
/// every fixture here is decoded whole and one character at a time.
#[tokio::test]
async fn fragmentation_never_changes_the_result() {
    for text in [
        "undefined\n",
        "null\n",
        "true\n",
        "NaN\n",
        "-12.5\n",
        "b-9007199254740993\n",
        "\"split \\\"quote\\\" and \\\\ backslash\"\n",
        "s\"token\"\n",
        "D\"2023-11-14T22:13:20Z\"\n",
        "U\"https://example.com/\"\n",
        "r[\"^a+$\",\"gi\"]\n",
        "o\"YWJj\"\n",
        "[undefined,null,true,false,NaN,I,i,z]\n",
        "{\"a\":[1,2],\"b\":S[3]}\n",
        "M[[\"k\",[1]],[2,null]]\n",
    ] {
        let whole = decode_text(text).await.expect("whole chunk decodes");
        let split = decode_chars(text).await.expect("char chunks decode");
        assert_eq!(whole, split, "fixture {text:?}");
    }
}

#[tokio::test]
async fn literal_may_span_many_chunks() {
    // The nine characters of `undefined` arrive one per chunk, inside a
    // surrounding array so the literal ends at a delimiter.
    let back = decode_chars("[undefined,1]\n").await.expect("decodes");
    let Value::Array(arr) = back else {
        return assert!(false, "expected an array");
    };
    assert_eq!(arr.get(0), Some(Value::Undefined));
    assert_eq!(arr.get(1), Some(Value::Number(1.0)));
}

// --- STRUCTURE ---

#[tokio::test]
async fn empty_containers_decode() {
    assert!(matches!(
        decode_text("[]\n").await,
        Ok(Value::Array(a)) if a.is_empty()
    ));
    assert!(matches!(
        decode_text("{}\n").await,
        Ok(Value::Object(o)) if o.is_empty()
    ));
    assert!(matches!(
        decode_text("S[]\n").await,
        Ok(Value::Set(s)) if s.is_empty()
    ));
    assert!(matches!(
        decode_text("M[]\n").await,
        Ok(Value::Map(m)) if m.is_empty()
    ));
}

#[tokio::test]
async fn duplicate_object_keys_keep_the_last_value() {
    let back = decode_text("{\"a\":1,\"a\":2}\n").await.expect("decodes");
    let Value::Object(obj) = back else {
        return assert!(false, "expected an object");
    };
    assert_eq!(obj.entries().len(), 1);
    assert_eq!(obj.get("a"), Some(Value::Number(2.0)));
}

#[tokio::test]
async fn back_reference_resolves_within_one_line() {
    let back = decode_text("[[1],@1]\n").await.expect("decodes");
    let Value::Array(outer) = back else {
        return assert!(false, "expected an array");
    };
    let a = outer.get(0).and_then(|v| v.ref_identity());
    let b = outer.get(1).and_then(|v| v.ref_identity());
    assert!(a.is_some());
    assert_eq!(a, b);
}

// --- FAILURES ---

#[tokio::test]
async fn unknown_back_reference_is_a_hard_error() {
    assert_eq!(
        decode_text("[@5]\n").await,
        Err(DecodeError::UnknownReference(5))
    );
}

#[tokio::test]
async fn unknown_type_tag_is_a_syntax_error() {
    assert!(matches!(
        decode_text("Q12\n").await,
        Err(DecodeError::Syntax(_))
    ));
}

#[tokio::test]
async fn malformed_date_is_a_syntax_error() {
    assert!(matches!(
        decode_text("D\"not a date\"\n").await,
        Err(DecodeError::Syntax(_))
    ));
}

#[tokio::test]
async fn malformed_base64_is_a_syntax_error() {
    assert!(matches!(
        decode_text("o\"!!!\"\n").await,
        Err(DecodeError::Syntax(_))
    ));
}

#[tokio::test]
async fn transport_error_propagates_to_the_caller() {
    let chunks: Vec<Result<String, DecodeError>> = vec![
        Ok("[1,".to_owned()),
        Err(DecodeError::Transport("socket reset".to_owned())),
    ];
    assert_eq!(
        decode(stream::iter(chunks), DecodeOptions::default()).await,
        Err(DecodeError::Transport("socket reset".to_owned()))
    );
}

#[tokio::test]
async fn unterminated_root_line_is_a_premature_end() {
    assert!(matches!(
        decode_text("42").await,
        Err(DecodeError::PrematureEnd(_))
    ));
}

#[tokio::test]
async fn parsed_root_survives_a_malformed_later_line() {
    // After the root line only `<id><status>payload` lines are valid; the
    // error tears down pending deferred values but cannot retract the root.
    assert_eq!(
        decode_text("1\n{\"a\":1}\n").await,
        Ok(Value::Number(1.0))
    );
}
