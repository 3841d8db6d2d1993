#![allow(missing_docs)]

mod common;

use common::{decode_text_with, encode_text_with};
use fluxcode::{
    DecodeError, DecodeOptions, EncodeOptions, OpaqueValue, PluginRegistry, TaggedValue,
    UnknownTagPolicy, Value,
};

#[derive(Debug, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

fn point_encoders() -> PluginRegistry {
    let mut plugins = PluginRegistry::new();
    plugins.register_encoder(|value: &OpaqueValue| {
        let p = value.downcast_ref::<Point>()?;
        Some(TaggedValue::new(
            "point",
            vec![Value::Number(p.x), Value::Number(p.y)],
        ))
    });
    plugins
}

fn point_decoders() -> PluginRegistry {
    let mut plugins = PluginRegistry::new();
    plugins.register_decoder(|tag: &str, args: &[Value]| {
        if tag != "point" {
            return None;
        }
        let x = args.first()?.as_f64()?;
        let y = args.get(1)?.as_f64()?;
        Some(Value::Opaque(OpaqueValue::new(Point { x, y })))
    });
    plugins
}

#[tokio::test]
async fn plugin_values_get_a_tagged_wire_form() {
    let options = EncodeOptions {
        plugins: point_encoders(),
        ..EncodeOptions::default()
    };
    let value = Value::Opaque(OpaqueValue::new(Point { x: 1.0, y: 2.0 }));
    let text = encode_text_with(value, options).await.expect("encodes");
    assert_eq!(text, "P[\"point\",1,2]\n");
}

#[tokio::test]
async fn plugin_values_roundtrip_through_both_sides() {
    let encode_options = EncodeOptions {
        plugins: point_encoders(),
        ..EncodeOptions::default()
    };
    let decode_options = DecodeOptions {
        plugins: point_decoders(),
        ..DecodeOptions::default()
    };

    let value = Value::Opaque(OpaqueValue::new(Point { x: -3.5, y: 0.25 }));
    let text = encode_text_with(value, encode_options).await.expect("encodes");
    let back = decode_text_with(&text, decode_options).await.expect("decodes");

    let Value::Opaque(opaque) = back else {
        return assert!(false, "expected an opaque value");
    };
    assert_eq!(
        opaque.downcast_ref::<Point>(),
        Some(&Point { x: -3.5, y: 0.25 })
    );
}

#[tokio::test]
async fn plugin_arguments_may_be_arbitrary_graphs() {
    struct Wrapper(Vec<Value>);

    let mut encoders = PluginRegistry::new();
    encoders.register_encoder(|value: &OpaqueValue| {
        let w = value.downcast_ref::<Wrapper>()?;
        Some(TaggedValue::new("wrapper", w.0.clone()))
    });
    let mut decoders = PluginRegistry::new();
    decoders.register_decoder(|tag: &str, args: &[Value]| {
        (tag == "wrapper").then(|| Value::from(args.to_vec()))
    });

    let value = Value::Opaque(OpaqueValue::new(Wrapper(vec![
        Value::from(vec![Value::Number(1.0), Value::Null]),
        Value::String("tail".into()),
    ])));
    let text = encode_text_with(
        value,
        EncodeOptions {
            plugins: encoders,
            ..EncodeOptions::default()
        },
    )
    .await
    .expect("encodes");
    assert_eq!(text, "P[\"wrapper\",[1,null],\"tail\"]\n");

    let back = decode_text_with(
        &text,
        DecodeOptions {
            plugins: decoders,
            ..DecodeOptions::default()
        },
    )
    .await
    .expect("decodes");
    assert_eq!(
        back,
        Value::from(vec![
            Value::from(vec![Value::Number(1.0), Value::Null]),
            Value::String("tail".into()),
        ])
    );
}

#[tokio::test]
async fn unknown_tag_decodes_to_undefined_by_default() {
    let back = decode_text_with("P[\"mystery\",1]\n", DecodeOptions::default())
        .await
        .expect("decodes");
    assert_eq!(back, Value::Undefined);
}

#[tokio::test]
async fn strict_policy_fails_the_decode_on_unknown_tags() {
    let options = DecodeOptions {
        unknown_tags: UnknownTagPolicy::Error,
        ..DecodeOptions::default()
    };
    assert_eq!(
        decode_text_with("P[\"mystery\",1]\n", options).await,
        Err(DecodeError::UnknownTag("mystery".to_owned()))
    );
}

#[tokio::test]
async fn first_matching_decoder_wins() {
    let mut plugins = PluginRegistry::new();
    plugins.register_decoder(|tag: &str, _args: &[Value]| {
        (tag == "point").then(|| Value::String("first".into()))
    });
    plugins.register_decoder(|tag: &str, _args: &[Value]| {
        (tag == "point").then(|| Value::String("second".into()))
    });

    let back = decode_text_with(
        "P[\"point\"]\n",
        DecodeOptions {
            plugins,
            ..DecodeOptions::default()
        },
    )
    .await
    .expect("decodes");
    assert_eq!(back, Value::String("first".into()));
}
