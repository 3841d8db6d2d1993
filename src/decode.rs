//! Decoding: incremental character scanner plus the resolution-line driver.
//!
//! The scanner consumes one character at a time and carries every piece of
//! state (mode, pending literal skips, string escape runs, the parse stack)
//! across chunk boundaries, so chunking never changes the result. `decode`
//! resolves with the root value as soon as the first line closes; a spawned
//! driver task keeps consuming resolution lines and settling deferred values
//! until the transport ends.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use log::{debug, trace};
use tokio::sync::oneshot;

use crate::deferred::{DeferredRegistry, PREMATURE_DEFERRED, PREMATURE_ROOT};
use crate::error::{DecodeError, DecodeResult};
use crate::plugin::PluginRegistry;
use crate::refs::IndexTable;
use crate::value::{
    ArrayValue, BigIntValue, BlobValue, BufferKind, BufferValue, DateValue, ErrorParts,
    ErrorValue, FileValue, FormDataValue, MapValue, ObjectValue, RegexValue, SetValue, UrlValue,
    Value,
};
use crate::wire;

// --- OPTIONS ---

/// What to do with a plugin tag no registered plugin recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTagPolicy {
    /// Decode the value as undefined and keep going.
    #[default]
    Undefined,
    /// Fail the whole decode with [`DecodeError::UnknownTag`].
    Error,
}

/// Options for [`decode`].
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Plugins consulted for tagged values.
    pub plugins: PluginRegistry,
    /// Unknown plugin tag handling.
    pub unknown_tags: UnknownTagPolicy,
}

/// Decodes a wire stream.
///
/// Resolves with the root value as soon as the root line has fully parsed.
/// Deferred values inside it settle later, driven by a background task that
/// keeps consuming the source. Must be called within a tokio runtime.
///
/// When the source ends before the root line completes, this fails with
/// [`DecodeError::PrematureEnd`]; deferred values still pending at source end
/// fail the same way. A structural error fails the root and every pending
/// deferred value with that cause.
pub async fn decode<S>(source: S, options: DecodeOptions) -> DecodeResult<Value>
where
    S: Stream<Item = DecodeResult<String>> + Send + 'static,
{
    let (root_tx, root_rx) = oneshot::channel::<DecodeResult<Value>>();
    tokio::spawn(drive(source, options, root_tx));
    root_rx
        .await
        .map_err(|_| DecodeError::PrematureEnd(PREMATURE_ROOT.to_owned()))?
}

async fn drive<S>(
    source: S,
    options: DecodeOptions,
    root_tx: oneshot::Sender<DecodeResult<Value>>,
) where
    S: Stream<Item = DecodeResult<String>> + Send + 'static,
{
    let mut source = Box::pin(source);
    let mut scanner = Scanner::new(options);
    let mut root_tx = Some(root_tx);

    let result: DecodeResult<()> = async {
        while let Some(chunk) = source.next().await {
            // Hand over the root before propagating a feed error: the root
            // line may have completed earlier in the same chunk, and a bad
            // later line must not retract an already-parsed value.
            let fed = scanner.feed(&chunk?);
            if let Some(root) = scanner.take_root() {
                trace!("root line complete");
                if let Some(tx) = root_tx.take() {
                    let _ = tx.send(Ok(root));
                }
            }
            fed?;
        }
        Ok(())
    }
    .await;

    match result {
        Err(err) => {
            debug!("decode failed: {err}");
            scanner.registry.fail_all(Value::simple_error(err.to_string()));
            if let Some(tx) = root_tx.take() {
                let _ = tx.send(Err(err));
            }
        }
        Ok(()) => {
            if let Some(tx) = root_tx.take() {
                let _ = tx.send(Err(DecodeError::PrematureEnd(PREMATURE_ROOT.to_owned())));
            }
            scanner
                .registry
                .fail_all(Value::simple_error(PREMATURE_DEFERRED));
        }
    }
}

// --- SCANNER STATE ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Expecting the start of a token.
    Unknown,
    /// Accumulating a numeric token.
    Number,
    /// Inside a quoted string.
    Text,
    /// Accumulating the id prefix of a resolution line.
    ResolutionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubMode {
    None,
    /// The next string is an object key.
    ObjectKey,
    /// Digits form a back-reference id.
    Reference,
    /// The next string is an RFC 3339 instant.
    Date,
    /// The next string is a URL.
    Url,
    /// The next string is a symbol key.
    SymbolKey,
    /// Digits form a big integer.
    BigInt,
    /// Digits form a promise id.
    PromiseId,
    /// Digits form an async-sequence id.
    IterableId,
    /// Digits form a byte-stream id.
    StreamId,
    /// Between a resolution id and its status character.
    ResolutionStatus,
    /// The next string is base64 for this buffer kind.
    Buffer(BufferKind),
}

enum Slot {
    /// An open plain composite being filled in place.
    Value(Value),
    /// An open staged composite, materialized at its closing bracket.
    Staged(Staged),
    /// A parsed object key awaiting its value.
    Key(String),
    /// The id prefix of a resolution line.
    DeferredId(u64),
    /// The status of a resolution line: true for success.
    Status(bool),
}

enum Staged {
    Set { handle: SetValue, items: Vec<Value> },
    Map { handle: MapValue, items: Vec<Value> },
    Regex { slot: u64, items: Vec<Value> },
    FormData { slot: u64, items: Vec<Value> },
    Plugin { slot: u64, items: Vec<Value> },
    Error { handle: ErrorValue, fields: Vec<(String, Value)> },
    Blob { slot: u64, fields: Vec<(String, Value)> },
    File { slot: u64, fields: Vec<(String, Value)> },
}

impl Staged {
    fn items_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Self::Set { items, .. }
            | Self::Map { items, .. }
            | Self::Regex { items, .. }
            | Self::FormData { items, .. }
            | Self::Plugin { items, .. } => Some(items),
            _ => None,
        }
    }

    fn fields_mut(&mut self) -> Option<&mut Vec<(String, Value)>> {
        match self {
            Self::Error { fields, .. } | Self::Blob { fields, .. } | Self::File { fields, .. } => {
                Some(fields)
            }
            _ => None,
        }
    }

    fn is_object_like(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Blob { .. } | Self::File { .. })
    }
}

enum Step {
    Consumed,
    Reprocess,
}

struct Scanner {
    mode: Mode,
    sub: SubMode,
    stack: Vec<Slot>,
    buffer: String,
    /// Characters still to swallow from a multi-character literal.
    skip: usize,
    trailing_backslashes: usize,
    has_escapes: bool,
    refs: IndexTable,
    registry: DeferredRegistry,
    root: Option<Value>,
    root_done: bool,
    plugins: PluginRegistry,
    unknown_tags: UnknownTagPolicy,
}

impl Scanner {
    fn new(options: DecodeOptions) -> Self {
        Self {
            mode: Mode::Unknown,
            sub: SubMode::None,
            stack: Vec::new(),
            buffer: String::new(),
            skip: 0,
            trailing_backslashes: 0,
            has_escapes: false,
            refs: IndexTable::default(),
            registry: DeferredRegistry::default(),
            root: None,
            root_done: false,
            plugins: options.plugins,
            unknown_tags: options.unknown_tags,
        }
    }

    /// Feeds one chunk. Chunk boundaries are invisible to the grammar.
    fn feed(&mut self, chunk: &str) -> DecodeResult<()> {
        for c in chunk.chars() {
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            loop {
                match self.step(c)? {
                    Step::Consumed => break,
                    Step::Reprocess => continue,
                }
            }
        }
        Ok(())
    }

    fn take_root(&mut self) -> Option<Value> {
        let root = self.root.take();
        if root.is_some() {
            self.root_done = true;
        }
        root
    }

    fn step(&mut self, c: char) -> DecodeResult<Step> {
        match self.mode {
            Mode::Unknown => self.step_unknown(c),
            Mode::Number | Mode::ResolutionId => self.step_numeric(c),
            Mode::Text => self.step_text(c),
        }
    }

    // --- TOKEN DISPATCH ---

    fn step_unknown(&mut self, c: char) -> DecodeResult<Step> {
        match c {
            ',' => {
                let wants_key = match self.stack.last() {
                    Some(Slot::Value(Value::Object(_))) => true,
                    Some(Slot::Staged(staged)) => staged.is_object_like(),
                    _ => false,
                };
                self.sub = if wants_key {
                    SubMode::ObjectKey
                } else {
                    SubMode::None
                };
            }
            '\n' => {
                if self.sub == SubMode::ResolutionStatus {
                    // Bare resolution line: sequence completion (or a
                    // payload-less promise resolution).
                    match self.stack.pop() {
                        Some(Slot::DeferredId(id)) => self.registry.complete(id)?,
                        _ => {
                            return Err(DecodeError::Syntax(
                                "malformed resolution line".to_owned(),
                            ))
                        }
                    }
                    self.sub = SubMode::None;
                }
                self.mode = Mode::ResolutionId;
                self.buffer.clear();
            }

            '{' => {
                let object = ObjectValue::new();
                self.refs.register(Value::Object(object.clone()));
                self.stack.push(Slot::Value(Value::Object(object)));
                self.sub = SubMode::ObjectKey;
            }
            '}' => self.close_object()?,
            '[' => {
                let array = ArrayValue::new();
                self.refs.register(Value::Array(array.clone()));
                self.stack.push(Slot::Value(Value::Array(array)));
            }
            ']' => self.close_list()?,

            c if c == wire::TAG_SET => {
                let handle = SetValue::new();
                self.refs.register(Value::Set(handle.clone()));
                self.stack.push(Slot::Staged(Staged::Set {
                    handle,
                    items: Vec::new(),
                }));
                self.skip = 1;
            }
            c if c == wire::TAG_MAP => {
                let handle = MapValue::new();
                self.refs.register(Value::Map(handle.clone()));
                self.stack.push(Slot::Staged(Staged::Map {
                    handle,
                    items: Vec::new(),
                }));
                self.skip = 1;
            }
            c if c == wire::TAG_REGEX => {
                let slot = self.refs.register(Value::Undefined);
                self.stack.push(Slot::Staged(Staged::Regex {
                    slot,
                    items: Vec::new(),
                }));
                self.skip = 1;
            }
            c if c == wire::TAG_PLUGIN => {
                let slot = self.refs.register(Value::Undefined);
                self.stack.push(Slot::Staged(Staged::Plugin {
                    slot,
                    items: Vec::new(),
                }));
                self.skip = 1;
            }
            c if c == wire::TAG_FORM_DATA => {
                let slot = self.refs.register(Value::Undefined);
                self.stack.push(Slot::Staged(Staged::FormData {
                    slot,
                    items: Vec::new(),
                }));
                self.skip = 1;
            }
            c if c == wire::TAG_ERROR => {
                let handle = ErrorValue::placeholder();
                self.refs.register(Value::Error(handle.clone()));
                self.stack.push(Slot::Staged(Staged::Error {
                    handle,
                    fields: Vec::new(),
                }));
                self.sub = SubMode::ObjectKey;
                self.skip = 1;
            }
            c if c == wire::TAG_BLOB => {
                let slot = self.refs.register(Value::Undefined);
                self.stack.push(Slot::Staged(Staged::Blob {
                    slot,
                    fields: Vec::new(),
                }));
                self.sub = SubMode::ObjectKey;
                self.skip = 1;
            }
            c if c == wire::TAG_FILE => {
                let slot = self.refs.register(Value::Undefined);
                self.stack.push(Slot::Staged(Staged::File {
                    slot,
                    fields: Vec::new(),
                }));
                self.sub = SubMode::ObjectKey;
                self.skip = 1;
            }

            '"' => {
                self.mode = Mode::Text;
                self.buffer.clear();
                self.trailing_backslashes = 0;
                self.has_escapes = false;
            }

            c if c == wire::TAG_REFERENCE => self.sub = SubMode::Reference,
            c if c == wire::TAG_DATE => self.sub = SubMode::Date,
            c if c == wire::TAG_URL => self.sub = SubMode::Url,
            c if c == wire::TAG_SYMBOL => self.sub = SubMode::SymbolKey,
            c if c == wire::TAG_BIGINT => self.sub = SubMode::BigInt,
            c if c == wire::TAG_PROMISE => self.sub = SubMode::PromiseId,
            c if c == wire::TAG_ASYNC_ITERABLE => self.sub = SubMode::IterableId,
            c if c == wire::TAG_BYTE_STREAM => self.sub = SubMode::StreamId,

            c if c == wire::STATUS_SUCCESS => {
                if self.sub != SubMode::ResolutionStatus {
                    return Err(DecodeError::Syntax("unexpected character ':'".to_owned()));
                }
                self.stack.push(Slot::Status(true));
            }
            c if c == wire::STATUS_FAILURE => {
                if self.sub != SubMode::ResolutionStatus {
                    return Err(DecodeError::Syntax("unexpected character '!'".to_owned()));
                }
                self.stack.push(Slot::Status(false));
            }

            'u' => {
                self.skip = wire::LIT_UNDEFINED.len() - 1;
                self.sub = SubMode::None;
                self.release(Value::Undefined)?;
            }
            'n' => {
                self.skip = wire::LIT_NULL.len() - 1;
                self.sub = SubMode::None;
                self.release(Value::Null)?;
            }
            't' => {
                self.skip = wire::LIT_TRUE.len() - 1;
                self.sub = SubMode::None;
                self.release(Value::Bool(true))?;
            }
            'f' => {
                self.skip = wire::LIT_FALSE.len() - 1;
                self.sub = SubMode::None;
                self.release(Value::Bool(false))?;
            }
            'N' => {
                self.skip = wire::LIT_NAN.len() - 1;
                self.sub = SubMode::None;
                self.release(Value::Number(f64::NAN))?;
            }
            c if c == wire::LIT_INFINITY => {
                self.sub = SubMode::None;
                self.release(Value::Number(f64::INFINITY))?;
            }
            c if c == wire::LIT_NEG_INFINITY => {
                self.sub = SubMode::None;
                self.release(Value::Number(f64::NEG_INFINITY))?;
            }
            c if c == wire::LIT_NEG_ZERO => {
                self.sub = SubMode::None;
                self.release(Value::Number(-0.0))?;
            }

            '-' | '.' | '0'..='9' => {
                self.mode = Mode::Number;
                self.buffer.clear();
                self.buffer.push(c);
            }

            'A' => self.sub = SubMode::Buffer(BufferKind::ArrayBuffer),
            'O' => self.sub = SubMode::Buffer(BufferKind::Int8),
            'o' => self.sub = SubMode::Buffer(BufferKind::Uint8),
            'C' => self.sub = SubMode::Buffer(BufferKind::Uint8Clamped),
            'L' => self.sub = SubMode::Buffer(BufferKind::Int16),
            'l' => self.sub = SubMode::Buffer(BufferKind::Uint16),
            'G' => self.sub = SubMode::Buffer(BufferKind::Int32),
            'g' => self.sub = SubMode::Buffer(BufferKind::Uint32),
            'H' => self.sub = SubMode::Buffer(BufferKind::Float32),
            'h' => self.sub = SubMode::Buffer(BufferKind::Float64),
            'J' => self.sub = SubMode::Buffer(BufferKind::BigInt64),
            'j' => self.sub = SubMode::Buffer(BufferKind::BigUint64),
            'V' => self.sub = SubMode::Buffer(BufferKind::DataView),

            other => {
                return Err(DecodeError::Syntax(format!(
                    "unexpected character {other:?}"
                )))
            }
        }
        Ok(Step::Consumed)
    }

    // --- NUMERIC TOKENS ---

    fn step_numeric(&mut self, c: char) -> DecodeResult<Step> {
        if matches!(c, '-' | '.' | '0'..='9') {
            self.buffer.push(c);
            return Ok(Step::Consumed);
        }

        if self.mode == Mode::ResolutionId {
            let id = self
                .buffer
                .parse::<u64>()
                .map_err(|_| DecodeError::Syntax(format!("bad resolution id {:?}", self.buffer)))?;
            self.stack.push(Slot::DeferredId(id));
            self.buffer.clear();
            self.mode = Mode::Unknown;
            self.sub = SubMode::ResolutionStatus;
            return Ok(Step::Reprocess);
        }

        let value = match self.sub {
            SubMode::PromiseId => {
                let id = self.parse_deferred_id()?;
                Value::Promise(self.registry.promise(id)?)
            }
            SubMode::IterableId => {
                let id = self.parse_deferred_id()?;
                Value::AsyncIterable(self.registry.sequence(id)?)
            }
            SubMode::StreamId => {
                let id = self.parse_deferred_id()?;
                Value::ByteStream(self.registry.sequence(id)?)
            }
            SubMode::Reference => {
                let id = self.parse_deferred_id()?;
                self.refs
                    .get(id)
                    .ok_or(DecodeError::UnknownReference(id))?
            }
            SubMode::BigInt => Value::BigInt(
                BigIntValue::new(self.buffer.as_str())
                    .ok_or_else(|| DecodeError::Syntax(format!("bad bigint {:?}", self.buffer)))?,
            ),
            _ => Value::Number(self.buffer.parse::<f64>().map_err(|_| {
                DecodeError::Syntax(format!("bad number {:?}", self.buffer))
            })?),
        };

        self.buffer.clear();
        self.mode = Mode::Unknown;
        self.sub = SubMode::None;
        self.release(value)?;
        Ok(Step::Reprocess)
    }

    fn parse_deferred_id(&self) -> DecodeResult<u64> {
        self.buffer
            .parse::<u64>()
            .map_err(|_| DecodeError::Syntax(format!("bad id {:?}", self.buffer)))
    }

    // --- STRINGS ---

    fn step_text(&mut self, c: char) -> DecodeResult<Step> {
        if c == '"' && self.trailing_backslashes % 2 == 0 {
            return self.finish_text();
        }
        self.buffer.push(c);
        if c == '\\' {
            self.trailing_backslashes += 1;
            self.has_escapes = true;
        } else {
            self.trailing_backslashes = 0;
        }
        Ok(Step::Consumed)
    }

    fn finish_text(&mut self) -> DecodeResult<Step> {
        let raw = std::mem::take(&mut self.buffer);
        let text = if self.has_escapes {
            serde_json::from_str::<String>(&format!("\"{raw}\""))
                .map_err(|e| DecodeError::Syntax(format!("bad string escape: {e}")))?
        } else {
            raw
        };
        self.mode = Mode::Unknown;

        if self.sub == SubMode::ObjectKey {
            self.stack.push(Slot::Key(text));
            self.sub = SubMode::None;
            // Swallow the ':' between key and value.
            self.skip = 1;
            return Ok(Step::Consumed);
        }

        let sub = self.sub;
        self.sub = SubMode::None;
        let value = match sub {
            SubMode::Date => {
                let instant = time::OffsetDateTime::parse(
                    &text,
                    &time::format_description::well_known::Rfc3339,
                )
                .map_err(|e| DecodeError::Syntax(format!("bad instant {text:?}: {e}")))?;
                let value = Value::Date(DateValue::new(instant));
                self.refs.register(value.clone());
                value
            }
            SubMode::Url => {
                let value = Value::Url(UrlValue::new(text));
                self.refs.register(value.clone());
                value
            }
            SubMode::SymbolKey => Value::Symbol(text),
            SubMode::Buffer(kind) => {
                let data = BASE64
                    .decode(text.as_bytes())
                    .map_err(|e| DecodeError::Syntax(format!("bad base64: {e}")))?;
                let value = Value::Buffer(BufferValue::new(kind, Bytes::from(data)));
                self.refs.register(value.clone());
                value
            }
            _ => Value::String(text),
        };
        self.release(value)?;
        Ok(Step::Consumed)
    }

    // --- COMPOSITE CLOSING ---

    fn close_object(&mut self) -> DecodeResult<()> {
        match self.stack.pop() {
            Some(Slot::Value(Value::Object(object))) => self.release(Value::Object(object)),
            Some(Slot::Staged(Staged::Error { handle, fields })) => {
                handle.fill(error_parts(fields));
                self.release(Value::Error(handle))
            }
            Some(Slot::Staged(Staged::Blob { slot, mut fields })) => {
                let (content, size, content_type) = blob_fields(&mut fields)?;
                let value = Value::Blob(BlobValue::from_parts(content, size, content_type));
                self.refs.patch(slot, value.clone());
                self.release(value)
            }
            Some(Slot::Staged(Staged::File { slot, mut fields })) => {
                let (content, size, content_type) = blob_fields(&mut fields)?;
                let name = match take_field(&mut fields, "name") {
                    Some(Value::String(name)) => name,
                    _ => String::new(),
                };
                let last_modified = match take_field(&mut fields, "lastModified") {
                    Some(Value::Number(n)) => n,
                    _ => 0.0,
                };
                let value = Value::File(FileValue::from_parts(
                    content,
                    size,
                    content_type,
                    name,
                    last_modified,
                ));
                self.refs.patch(slot, value.clone());
                self.release(value)
            }
            _ => Err(DecodeError::Syntax("unexpected '}'".to_owned())),
        }
    }

    fn close_list(&mut self) -> DecodeResult<()> {
        match self.stack.pop() {
            Some(Slot::Value(Value::Array(array))) => self.release(Value::Array(array)),
            Some(Slot::Staged(Staged::Set { handle, items })) => {
                for item in items {
                    handle.add(item);
                }
                self.release(Value::Set(handle))
            }
            Some(Slot::Staged(Staged::Map { handle, items })) => {
                for entry in items {
                    let (key, value) = pair(entry)?;
                    handle.set(key, value);
                }
                self.release(Value::Map(handle))
            }
            Some(Slot::Staged(Staged::Regex { slot, items })) => {
                let value = match (items.first(), items.get(1), items.len()) {
                    (Some(Value::String(source)), Some(Value::String(flags)), 2) => {
                        Value::Regex(RegexValue::new(source.clone(), flags.clone()))
                    }
                    _ => {
                        return Err(DecodeError::Syntax("malformed pattern".to_owned()));
                    }
                };
                self.refs.patch(slot, value.clone());
                self.release(value)
            }
            Some(Slot::Staged(Staged::FormData { slot, items })) => {
                let form = FormDataValue::new();
                for entry in items {
                    let (name, value) = pair(entry)?;
                    let Value::String(name) = name else {
                        return Err(DecodeError::Syntax(
                            "form-data entry name must be a string".to_owned(),
                        ));
                    };
                    form.append(name, value);
                }
                let value = Value::FormData(form);
                self.refs.patch(slot, value.clone());
                self.release(value)
            }
            Some(Slot::Staged(Staged::Plugin { slot, mut items })) => {
                if items.is_empty() {
                    return Err(DecodeError::Syntax("empty plugin form".to_owned()));
                }
                let args = items.split_off(1);
                let Some(Value::String(tag)) = items.pop() else {
                    return Err(DecodeError::Syntax(
                        "plugin tag must be a string".to_owned(),
                    ));
                };
                let value = match self.plugins.decode_tagged(&tag, &args) {
                    Some(value) => value,
                    None => match self.unknown_tags {
                        UnknownTagPolicy::Undefined => Value::Undefined,
                        UnknownTagPolicy::Error => return Err(DecodeError::UnknownTag(tag)),
                    },
                };
                self.refs.patch(slot, value.clone());
                self.release(value)
            }
            _ => Err(DecodeError::Syntax("unexpected ']'".to_owned())),
        }
    }

    // --- VALUE RELEASE ---

    /// Hands a completed value to whatever is waiting for it: the enclosing
    /// composite, the pending object key, the resolution-line status, or the
    /// root slot.
    fn release(&mut self, value: Value) -> DecodeResult<()> {
        match self.stack.last_mut() {
            None => {
                if self.root.is_some() || self.root_done {
                    return Err(DecodeError::Syntax("unexpected root value".to_owned()));
                }
                self.root = Some(value);
                Ok(())
            }
            Some(Slot::Value(Value::Array(array))) => {
                array.push(value);
                Ok(())
            }
            Some(Slot::Staged(staged)) => match staged.items_mut() {
                Some(items) => {
                    items.push(value);
                    Ok(())
                }
                None => Err(DecodeError::Syntax(
                    "field value without a key".to_owned(),
                )),
            },
            Some(Slot::Key(_)) => {
                let key = match self.stack.pop() {
                    Some(Slot::Key(key)) => key,
                    _ => return Err(DecodeError::Syntax("invalid parse state".to_owned())),
                };
                match self.stack.last_mut() {
                    Some(Slot::Value(Value::Object(object))) => {
                        object.set(key, value);
                        Ok(())
                    }
                    Some(Slot::Staged(staged)) => match staged.fields_mut() {
                        Some(fields) => {
                            fields.push((key, value));
                            Ok(())
                        }
                        None => Err(DecodeError::Syntax("invalid parse state".to_owned())),
                    },
                    _ => Err(DecodeError::Syntax("invalid parse state".to_owned())),
                }
            }
            Some(Slot::Status(_)) => {
                let success = match self.stack.pop() {
                    Some(Slot::Status(success)) => success,
                    _ => return Err(DecodeError::Syntax("invalid parse state".to_owned())),
                };
                match self.stack.pop() {
                    Some(Slot::DeferredId(id)) => self.registry.resolve(id, success, value),
                    _ => Err(DecodeError::Syntax("invalid parse state".to_owned())),
                }
            }
            _ => Err(DecodeError::Syntax("invalid parse state".to_owned())),
        }
    }
}

// --- FIELD HELPERS ---

fn take_field(fields: &mut Vec<(String, Value)>, key: &str) -> Option<Value> {
    let index = fields.iter().position(|(k, _)| k == key)?;
    Some(fields.remove(index).1)
}

fn pair(entry: Value) -> DecodeResult<(Value, Value)> {
    if let Value::Array(array) = entry {
        let items = array.items();
        if let [key, value] = items.as_slice() {
            return Ok((key.clone(), value.clone()));
        }
    }
    Err(DecodeError::Syntax("malformed entry pair".to_owned()))
}

fn error_parts(mut fields: Vec<(String, Value)>) -> ErrorParts {
    let name = match take_field(&mut fields, "name") {
        Some(Value::String(name)) => name,
        _ => "Error".to_owned(),
    };
    let message = match take_field(&mut fields, "message") {
        Some(Value::String(message)) => message,
        _ => String::new(),
    };
    let stack = match take_field(&mut fields, "stack") {
        Some(Value::String(stack)) => Some(stack),
        _ => None,
    };
    let cause = match take_field(&mut fields, "cause") {
        None | Some(Value::Undefined) => None,
        Some(cause) => Some(cause),
    };
    ErrorParts {
        name,
        message,
        stack,
        cause,
    }
}

fn blob_fields(
    fields: &mut Vec<(String, Value)>,
) -> DecodeResult<(crate::deferred::PromiseValue, u64, String)> {
    let content = match take_field(fields, "promise") {
        Some(Value::Promise(p)) => p,
        _ => return Err(DecodeError::Syntax("blob without content".to_owned())),
    };
    let size = match take_field(fields, "size") {
        Some(Value::Number(n)) if n >= 0.0 => n as u64,
        _ => 0,
    };
    let content_type = match take_field(fields, "type") {
        Some(Value::String(t)) => t,
        _ => String::new(),
    };
    Ok((content, size, content_type))
}
