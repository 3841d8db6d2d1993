#![allow(dead_code)]

use fluxcode::{
    decode, encode_to_string, DecodeOptions, DecodeResult, EncodeOptions, EncodeResult, Value,
};
use futures::stream;

/// Encodes a value completely, waiting for every deferred source.
pub async fn encode_text(value: Value) -> EncodeResult<String> {
    encode_to_string(value, EncodeOptions::default()).await
}

pub async fn encode_text_with(value: Value, options: EncodeOptions) -> EncodeResult<String> {
    encode_to_string(value, options).await
}

/// Decodes wire text delivered as a single chunk.
pub async fn decode_text(text: &str) -> DecodeResult<Value> {
    decode_text_with(text, DecodeOptions::default()).await
}

pub async fn decode_text_with(text: &str, options: DecodeOptions) -> DecodeResult<Value> {
    decode(stream::iter([Ok(text.to_owned())]), options).await
}

/// Decodes wire text delivered one character per chunk, the worst possible
/// fragmentation a transport can produce.
pub async fn decode_chars(text: &str) -> DecodeResult<Value> {
    let chunks: Vec<DecodeResult<String>> = text.chars().map(|c| Ok(c.to_string())).collect();
    decode(stream::iter(chunks), DecodeOptions::default()).await
}

/// Full round trip with default options.
pub async fn roundtrip(value: Value) -> Value {
    let text = encode_text(value).await.expect("encodes");
    decode_text(&text).await.expect("decodes")
}
