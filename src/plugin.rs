//! Plugin hooks for caller-defined kinds.
//!
//! A plugin pair teaches the codec one extra family of values: the encode
//! side turns an opaque value into a tagged argument list, the decode side
//! turns that list back into a value. Plugins are carried explicitly in
//! [`PluginRegistry`] and passed through the options; there is no global
//! registration, so two codecs in one process can disagree about tags.

use std::sync::Arc;

use crate::value::{OpaqueValue, Value};

/// A plugin-produced encoding: a tag naming the kind plus its arguments.
///
/// Everything in `args` goes through the normal encoder, so arguments may be
/// arbitrary graphs, including further opaque values.
#[derive(Debug, Clone)]
pub struct TaggedValue {
    /// Discriminator matched by the decode side.
    pub tag: String,
    /// Reconstruction arguments.
    pub args: Vec<Value>,
}

impl TaggedValue {
    /// Builds a tagged encoding.
    pub fn new(tag: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            tag: tag.into(),
            args,
        }
    }
}

/// Encode-side hook: claim an opaque value by returning its tagged form.
pub trait EncodePlugin: Send + Sync {
    /// Returns `Some` to claim the value, `None` to pass.
    fn encode(&self, value: &OpaqueValue) -> Option<TaggedValue>;
}

impl<F> EncodePlugin for F
where
    F: Fn(&OpaqueValue) -> Option<TaggedValue> + Send + Sync,
{
    fn encode(&self, value: &OpaqueValue) -> Option<TaggedValue> {
        self(value)
    }
}

/// Decode-side hook: reconstruct a value from a recognized tag.
pub trait DecodePlugin: Send + Sync {
    /// Returns `Some` to claim the tag, `None` to pass.
    fn decode(&self, tag: &str, args: &[Value]) -> Option<Value>;
}

impl<F> DecodePlugin for F
where
    F: Fn(&str, &[Value]) -> Option<Value> + Send + Sync,
{
    fn decode(&self, tag: &str, args: &[Value]) -> Option<Value> {
        self(tag, args)
    }
}

/// An ordered collection of plugins. First match wins on both sides.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    encoders: Vec<Arc<dyn EncodePlugin>>,
    decoders: Vec<Arc<dyn DecodePlugin>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an encode plugin. Registration order is match order.
    pub fn register_encoder(&mut self, plugin: impl EncodePlugin + 'static) -> &mut Self {
        self.encoders.push(Arc::new(plugin));
        self
    }

    /// Appends a decode plugin. Registration order is match order.
    pub fn register_decoder(&mut self, plugin: impl DecodePlugin + 'static) -> &mut Self {
        self.decoders.push(Arc::new(plugin));
        self
    }

    /// Asks each encode plugin in order; `None` when nobody claims the value.
    pub(crate) fn encode_opaque(&self, value: &OpaqueValue) -> Option<TaggedValue> {
        self.encoders.iter().find_map(|p| p.encode(value))
    }

    /// Asks each decode plugin in order; `None` when nobody claims the tag.
    pub(crate) fn decode_tagged(&self, tag: &str, args: &[Value]) -> Option<Value> {
        self.decoders.iter().find_map(|p| p.decode(tag, args))
    }

    /// Number of registered plugins, both sides combined.
    pub fn len(&self) -> usize {
        self.encoders.len() + self.decoders.len()
    }

    /// True when no plugins are registered.
    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty() && self.decoders.is_empty()
    }

    /// Removes all plugins.
    pub fn clear(&mut self) {
        self.encoders.clear();
        self.decoders.clear();
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("encoders", &self.encoders.len())
            .field("decoders", &self.decoders.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registered_plugin_wins() {
        let mut registry = PluginRegistry::new();
        registry.register_decoder(|tag: &str, _args: &[Value]| {
            (tag == "point").then(|| Value::String("first".into()))
        });
        registry.register_decoder(|tag: &str, _args: &[Value]| {
            (tag == "point").then(|| Value::String("second".into()))
        });
        assert_eq!(
            registry.decode_tagged("point", &[]),
            Some(Value::String("first".into()))
        );
        assert_eq!(registry.decode_tagged("other", &[]), None);
    }

    #[test]
    fn encoder_sees_opaque_payload() {
        struct Celsius(f64);
        let mut registry = PluginRegistry::new();
        registry.register_encoder(|value: &OpaqueValue| {
            let c = value.downcast_ref::<Celsius>()?;
            Some(TaggedValue::new("celsius", vec![Value::Number(c.0)]))
        });
        let wrapped = OpaqueValue::new(Celsius(21.5));
        let tagged = registry.encode_opaque(&wrapped).expect("claimed");
        assert_eq!(tagged.tag, "celsius");
        assert_eq!(tagged.args, vec![Value::Number(21.5)]);
    }
}
