//! The value graph model.
//!
//! `Value` is a closed enum covering every kind the wire grammar can carry.
//! Composite kinds hold `Arc`-backed handles, so cloning a `Value` is cheap
//! and two clones of the same handle share identity. The encoder keys its
//! reference table on that identity, which is what lets shared substructure
//! and cycles survive a round trip.
//!
//! Graphs may be arbitrarily deep. Dropping a uniquely-owned container drains
//! its children through an explicit worklist instead of recursing, so a
//! 100k-deep chain cannot overflow the stack on destruction.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::deferred::{IterableValue, PromiseValue};

// --- VALUE ENUM ---

/// A decoded or to-be-encoded value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The undefined value.
    #[default]
    Undefined,
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A double-precision float. NaN, both infinities and negative zero are
    /// all representable and survive the wire.
    Number(f64),
    /// An arbitrary-precision integer, carried in decimal text form.
    BigInt(BigIntValue),
    /// A UTF-8 string.
    String(String),
    /// An interned symbol, identified by its string key.
    Symbol(String),
    /// An instant in time.
    Date(DateValue),
    /// A regular-expression-like pattern (source and flags, not compiled).
    Regex(RegexValue),
    /// A URL.
    Url(UrlValue),
    /// A binary buffer together with the view kind it was created as.
    Buffer(BufferValue),
    /// An immutable binary payload with a MIME type, delivered asynchronously.
    Blob(BlobValue),
    /// A [`Blob`](Value::Blob) with a file name and modification time.
    File(FileValue),
    /// An ordered multi-map of string names to string or blob values.
    FormData(FormDataValue),
    /// An error object: name, message, optional stack and cause.
    Error(ErrorValue),
    /// An ordered sequence of values.
    Array(ArrayValue),
    /// An insertion-ordered string-keyed record.
    Object(ObjectValue),
    /// An insertion-ordered set.
    Set(SetValue),
    /// An insertion-ordered key-value map with arbitrary keys.
    Map(MapValue),
    /// A value that is not available yet.
    Promise(PromiseValue),
    /// An ordered async sequence of values.
    AsyncIterable(IterableValue),
    /// A pull-based stream of chunks. Same machinery as
    /// [`AsyncIterable`](Value::AsyncIterable), distinct wire tag.
    ByteStream(IterableValue),
    /// A caller-defined value only a plugin knows how to encode.
    Opaque(OpaqueValue),
}

impl Value {
    /// The pointer identity used by the encode-side reference table.
    ///
    /// Only kinds that occupy a reference-table slot on the wire have one;
    /// primitives, deferred placeholders and opaque values return `None`.
    pub fn ref_identity(&self) -> Option<usize> {
        match self {
            Self::Date(v) => Some(Arc::as_ptr(&v.0) as usize),
            Self::Regex(v) => Some(Arc::as_ptr(&v.0) as usize),
            Self::Url(v) => Some(Arc::as_ptr(&v.0) as usize),
            Self::Buffer(v) => Some(Arc::as_ptr(&v.0) as usize),
            Self::Blob(v) => Some(Arc::as_ptr(&v.0) as usize),
            Self::File(v) => Some(Arc::as_ptr(&v.0) as usize),
            Self::FormData(v) => Some(Arc::as_ptr(&v.0) as usize),
            Self::Error(v) => Some(Arc::as_ptr(&v.0) as usize),
            Self::Array(v) => Some(Arc::as_ptr(&v.0) as usize),
            Self::Object(v) => Some(Arc::as_ptr(&v.0) as usize),
            Self::Set(v) => Some(Arc::as_ptr(&v.0) as usize),
            Self::Map(v) => Some(Arc::as_ptr(&v.0) as usize),
            _ => None,
        }
    }

    /// Builds a plain error value with the default `"Error"` name.
    pub fn simple_error(message: impl Into<std::string::String>) -> Self {
        Self::Error(ErrorValue::new("Error", message))
    }

    /// Returns the string content if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the float content if this is a number value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// True for the undefined value.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(ArrayValue::from_vec(v))
    }
}

// Structural equality. Numbers compare like `Object.is`: NaN equals NaN and
// positive zero differs from negative zero. Deferred and opaque kinds compare
// by handle identity since their contents are unknowable without awaiting.
// Deep comparison of a cyclic graph does not terminate; compare identities
// via `ref_identity` when cycles are possible.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::String(a), Self::String(b)) | (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => *a.0 == *b.0,
            (Self::Regex(a), Self::Regex(b)) => {
                a.0.source == b.0.source && a.0.flags == b.0.flags
            }
            (Self::Url(a), Self::Url(b)) => *a.0 == *b.0,
            (Self::Buffer(a), Self::Buffer(b)) => {
                a.0.kind == b.0.kind && a.0.data == b.0.data
            }
            (Self::Blob(a), Self::Blob(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Self::File(a), Self::File(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Self::FormData(a), Self::FormData(b)) => {
                Arc::ptr_eq(&a.0, &b.0) || *a.0.lock() == *b.0.lock()
            }
            (Self::Error(a), Self::Error(b)) => {
                Arc::ptr_eq(&a.0, &b.0) || *a.0.lock() == *b.0.lock()
            }
            (Self::Array(a), Self::Array(b)) => {
                Arc::ptr_eq(&a.0, &b.0) || *a.0.lock() == *b.0.lock()
            }
            (Self::Object(a), Self::Object(b)) => {
                Arc::ptr_eq(&a.0, &b.0) || *a.0.lock() == *b.0.lock()
            }
            (Self::Set(a), Self::Set(b)) => {
                Arc::ptr_eq(&a.0, &b.0) || *a.0.lock() == *b.0.lock()
            }
            (Self::Map(a), Self::Map(b)) => {
                Arc::ptr_eq(&a.0, &b.0) || *a.0.lock() == *b.0.lock()
            }
            (Self::Promise(a), Self::Promise(b)) => a.identity() == b.identity(),
            (Self::AsyncIterable(a), Self::AsyncIterable(b))
            | (Self::ByteStream(a), Self::ByteStream(b)) => a.identity() == b.identity(),
            (Self::Opaque(a), Self::Opaque(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            _ => false,
        }
    }
}

// --- SCALAR-LIKE KINDS ---

/// An arbitrary-precision integer in decimal text form.
///
/// No big-integer arithmetic is provided; the codec only needs the textual
/// representation, which is exactly what travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigIntValue(String);

impl BigIntValue {
    /// Validates and wraps a decimal integer string (optional leading `-`).
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        let digits = text.strip_prefix('-').unwrap_or(&text);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self(text))
    }

    /// The decimal text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for BigIntValue {
    fn from(v: i64) -> Self {
        Self(v.to_string())
    }
}

impl From<u64> for BigIntValue {
    fn from(v: u64) -> Self {
        Self(v.to_string())
    }
}

impl From<i128> for BigIntValue {
    fn from(v: i128) -> Self {
        Self(v.to_string())
    }
}

impl fmt::Display for BigIntValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An instant, RFC 3339 on the wire.
#[derive(Debug, Clone)]
pub struct DateValue(pub(crate) Arc<OffsetDateTime>);

impl DateValue {
    /// Wraps an instant.
    pub fn new(instant: OffsetDateTime) -> Self {
        Self(Arc::new(instant))
    }

    /// The wrapped instant.
    pub fn instant(&self) -> OffsetDateTime {
        *self.0
    }
}

/// A pattern with source and flags, carried uncompiled.
#[derive(Debug, Clone)]
pub struct RegexValue(pub(crate) Arc<RegexParts>);

#[derive(Debug)]
pub(crate) struct RegexParts {
    pub source: String,
    pub flags: String,
}

impl RegexValue {
    /// Builds a pattern from source and flags.
    pub fn new(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Self(Arc::new(RegexParts {
            source: source.into(),
            flags: flags.into(),
        }))
    }

    /// The pattern source.
    pub fn source(&self) -> &str {
        &self.0.source
    }

    /// The pattern flags.
    pub fn flags(&self) -> &str {
        &self.0.flags
    }
}

/// A URL, kept as its serialized form.
#[derive(Debug, Clone)]
pub struct UrlValue(pub(crate) Arc<String>);

impl UrlValue {
    /// Wraps a URL string.
    pub fn new(url: impl Into<String>) -> Self {
        Self(Arc::new(url.into()))
    }

    /// The URL text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// --- BINARY KINDS ---

/// The view kind a binary buffer was created as.
///
/// The kind only affects the wire tag; the payload is always the raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// A raw, viewless buffer.
    ArrayBuffer,
    /// Signed 8-bit view.
    Int8,
    /// Unsigned 8-bit view.
    Uint8,
    /// Clamped unsigned 8-bit view.
    Uint8Clamped,
    /// Signed 16-bit view.
    Int16,
    /// Unsigned 16-bit view.
    Uint16,
    /// Signed 32-bit view.
    Int32,
    /// Unsigned 32-bit view.
    Uint32,
    /// 32-bit float view.
    Float32,
    /// 64-bit float view.
    Float64,
    /// Signed 64-bit view.
    BigInt64,
    /// Unsigned 64-bit view.
    BigUint64,
    /// Byte-offset data view.
    DataView,
}

impl BufferKind {
    /// The wire tag for this kind.
    pub(crate) fn tag(self) -> char {
        use crate::wire;
        match self {
            Self::ArrayBuffer => wire::TAG_ARRAY_BUFFER,
            Self::Int8 => wire::TAG_INT8,
            Self::Uint8 => wire::TAG_UINT8,
            Self::Uint8Clamped => wire::TAG_UINT8_CLAMPED,
            Self::Int16 => wire::TAG_INT16,
            Self::Uint16 => wire::TAG_UINT16,
            Self::Int32 => wire::TAG_INT32,
            Self::Uint32 => wire::TAG_UINT32,
            Self::Float32 => wire::TAG_FLOAT32,
            Self::Float64 => wire::TAG_FLOAT64,
            Self::BigInt64 => wire::TAG_BIGINT64,
            Self::BigUint64 => wire::TAG_BIGUINT64,
            Self::DataView => wire::TAG_DATA_VIEW,
        }
    }
}

/// A binary buffer.
#[derive(Debug, Clone)]
pub struct BufferValue(pub(crate) Arc<BufferParts>);

#[derive(Debug)]
pub(crate) struct BufferParts {
    pub kind: BufferKind,
    pub data: Bytes,
}

impl BufferValue {
    /// Wraps raw bytes as a buffer of the given view kind.
    pub fn new(kind: BufferKind, data: impl Into<Bytes>) -> Self {
        Self(Arc::new(BufferParts {
            kind,
            data: data.into(),
        }))
    }

    /// The view kind.
    pub fn kind(&self) -> BufferKind {
        self.0.kind
    }

    /// The raw bytes.
    pub fn data(&self) -> &Bytes {
        &self.0.data
    }
}

/// An immutable binary payload with a MIME type.
///
/// The content travels as a separate resolution line, so it is held behind a
/// promise; [`BlobValue::bytes`] awaits it. Blobs built locally with
/// [`BlobValue::from_bytes`] hold an already-settled promise.
#[derive(Debug, Clone)]
pub struct BlobValue(pub(crate) Arc<BlobParts>);

#[derive(Debug)]
pub(crate) struct BlobParts {
    pub content: PromiseValue,
    pub size: u64,
    pub content_type: String,
}

impl BlobValue {
    /// Builds a blob from in-memory bytes.
    pub fn from_bytes(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        let content = PromiseValue::resolved(Value::Buffer(BufferValue::new(
            BufferKind::ArrayBuffer,
            data,
        )));
        Self(Arc::new(BlobParts {
            content,
            size,
            content_type: content_type.into(),
        }))
    }

    pub(crate) fn from_parts(content: PromiseValue, size: u64, content_type: String) -> Self {
        Self(Arc::new(BlobParts {
            content,
            size,
            content_type,
        }))
    }

    /// The byte length.
    pub fn size(&self) -> u64 {
        self.0.size
    }

    /// The MIME type.
    pub fn content_type(&self) -> &str {
        &self.0.content_type
    }

    /// The promise carrying the content buffer.
    pub fn content(&self) -> &PromiseValue {
        &self.0.content
    }

    /// Awaits the content and extracts its bytes.
    ///
    /// Fails with the rejection value if the content promise failed, or with
    /// a plain error if it settled to something that is not a buffer.
    pub async fn bytes(&self) -> Result<Bytes, Value> {
        match self.0.content.wait().await? {
            Value::Buffer(buf) => Ok(buf.data().clone()),
            _ => Err(Value::simple_error("blob content was not binary")),
        }
    }
}

/// A blob with a file name and modification time.
#[derive(Debug, Clone)]
pub struct FileValue(pub(crate) Arc<FileParts>);

#[derive(Debug)]
pub(crate) struct FileParts {
    pub content: PromiseValue,
    pub size: u64,
    pub content_type: String,
    pub name: String,
    pub last_modified_ms: f64,
}

impl FileValue {
    /// Builds a file from in-memory bytes.
    pub fn from_bytes(
        data: impl Into<Bytes>,
        content_type: impl Into<String>,
        name: impl Into<String>,
        last_modified_ms: f64,
    ) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        let content = PromiseValue::resolved(Value::Buffer(BufferValue::new(
            BufferKind::ArrayBuffer,
            data,
        )));
        Self(Arc::new(FileParts {
            content,
            size,
            content_type: content_type.into(),
            name: name.into(),
            last_modified_ms,
        }))
    }

    pub(crate) fn from_parts(
        content: PromiseValue,
        size: u64,
        content_type: String,
        name: String,
        last_modified_ms: f64,
    ) -> Self {
        Self(Arc::new(FileParts {
            content,
            size,
            content_type,
            name,
            last_modified_ms,
        }))
    }

    /// The file name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The byte length.
    pub fn size(&self) -> u64 {
        self.0.size
    }

    /// The MIME type.
    pub fn content_type(&self) -> &str {
        &self.0.content_type
    }

    /// Modification time in milliseconds since the epoch.
    pub fn last_modified_ms(&self) -> f64 {
        self.0.last_modified_ms
    }

    /// The promise carrying the content buffer.
    pub fn content(&self) -> &PromiseValue {
        &self.0.content
    }

    /// Awaits the content and extracts its bytes.
    pub async fn bytes(&self) -> Result<Bytes, Value> {
        match self.0.content.wait().await? {
            Value::Buffer(buf) => Ok(buf.data().clone()),
            _ => Err(Value::simple_error("file content was not binary")),
        }
    }
}

/// An ordered multi-map of string names to values. Duplicate names are kept.
#[derive(Debug, Clone, Default)]
pub struct FormDataValue(pub(crate) Arc<Mutex<Vec<(String, Value)>>>);

impl FormDataValue {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a name-value entry.
    pub fn append(&self, name: impl Into<String>, value: Value) {
        self.0.lock().push((name.into(), value));
    }

    /// Snapshot of all entries in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0.lock().clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// True when no entries exist.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

// --- ERROR KIND ---

/// An error object.
///
/// Mutable behind its handle so a decoded placeholder can be filled in once
/// all fields have parsed, which keeps self-referential causes sound.
#[derive(Debug, Clone)]
pub struct ErrorValue(pub(crate) Arc<Mutex<ErrorParts>>);

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ErrorParts {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub cause: Option<Value>,
}

impl ErrorValue {
    /// Builds an error with a name and message.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self(Arc::new(Mutex::new(ErrorParts {
            name: name.into(),
            message: message.into(),
            stack: None,
            cause: None,
        })))
    }

    pub(crate) fn placeholder() -> Self {
        Self(Arc::new(Mutex::new(ErrorParts::default())))
    }

    pub(crate) fn fill(&self, parts: ErrorParts) {
        *self.0.lock() = parts;
    }

    /// The error name (class).
    pub fn name(&self) -> String {
        self.0.lock().name.clone()
    }

    /// The error message.
    pub fn message(&self) -> String {
        self.0.lock().message.clone()
    }

    /// The stack trace, when one was captured and not redacted.
    pub fn stack(&self) -> Option<String> {
        self.0.lock().stack.clone()
    }

    /// The chained cause, when present.
    pub fn cause(&self) -> Option<Value> {
        self.0.lock().cause.clone()
    }

    /// Attaches a stack trace.
    pub fn set_stack(&self, stack: impl Into<String>) {
        self.0.lock().stack = Some(stack.into());
    }

    /// Attaches a cause.
    pub fn set_cause(&self, cause: Value) {
        self.0.lock().cause = Some(cause);
    }
}

// --- CONTAINER KINDS ---

/// An ordered sequence of values.
#[derive(Debug, Clone, Default)]
pub struct ArrayValue(pub(crate) Arc<Mutex<Vec<Value>>>);

impl ArrayValue {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing vector.
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Arc::new(Mutex::new(items)))
    }

    /// Appends a value.
    pub fn push(&self, value: Value) {
        self.0.lock().push(value);
    }

    /// The value at an index, if present.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.lock().get(index).cloned()
    }

    /// Snapshot of all items.
    pub fn items(&self) -> Vec<Value> {
        self.0.lock().clone()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// True when no items exist.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// An insertion-ordered string-keyed record.
#[derive(Debug, Clone, Default)]
pub struct ObjectValue(pub(crate) Arc<Mutex<Vec<(String, Value)>>>);

impl ObjectValue {
    /// Creates an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key. An existing key is overwritten in place, keeping its
    /// original position; a new key is appended.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut entries = self.0.lock();
        if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            entries.push((key, value));
        }
    }

    /// The value stored under a key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Snapshot of all entries in key insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0.lock().clone()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// True when no keys exist.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// An insertion-ordered set.
///
/// Membership uses [`Value`] equality, which diverges on cyclic members; a
/// set containing a cycle should be built with distinct handles only.
#[derive(Debug, Clone, Default)]
pub struct SetValue(pub(crate) Arc<Mutex<Vec<Value>>>);

impl SetValue {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value unless an equal one is already present.
    pub fn add(&self, value: Value) {
        let mut items = self.0.lock();
        if !items.iter().any(|v| *v == value) {
            items.push(value);
        }
    }

    /// Snapshot of all members in insertion order.
    pub fn items(&self) -> Vec<Value> {
        self.0.lock().clone()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// True when no members exist.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// An insertion-ordered map with arbitrary keys.
#[derive(Debug, Clone, Default)]
pub struct MapValue(pub(crate) Arc<Mutex<Vec<(Value, Value)>>>);

impl MapValue {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key, overwriting an equal existing key in place.
    pub fn set(&self, key: Value, value: Value) {
        let mut entries = self.0.lock();
        if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            entries.push((key, value));
        }
    }

    /// The value stored under an equal key.
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.0
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Snapshot of all entries in key insertion order.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.0.lock().clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// True when no entries exist.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

// --- OPAQUE KIND ---

/// A caller-defined value carried through the graph untyped.
///
/// The encoder never inspects the payload itself; a registered encode plugin
/// must claim it, otherwise encoding fails.
#[derive(Clone)]
pub struct OpaqueValue {
    pub(crate) inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl OpaqueValue {
    /// Wraps an arbitrary value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// True when the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.as_ref().is::<T>()
    }

    /// Borrows the payload as a `T`, if it is one.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.as_ref().downcast_ref::<T>()
    }

    /// The compile-time name of the wrapped type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

// --- STACK-SAFE DESTRUCTION ---

// When a container handle drops its last reference, children are moved into
// an explicit worklist and emptied iteratively. By the time each child value
// itself drops at the end of a loop iteration its own cells are already
// drained, so the recursive part of its destructor is O(1).
fn drain_children(value: &Value, work: &mut Vec<Value>) {
    match value {
        Value::Array(a) if Arc::strong_count(&a.0) == 1 => {
            work.append(&mut a.0.lock());
        }
        Value::Set(s) if Arc::strong_count(&s.0) == 1 => {
            work.append(&mut s.0.lock());
        }
        Value::Object(o) if Arc::strong_count(&o.0) == 1 => {
            work.extend(o.0.lock().drain(..).map(|(_, v)| v));
        }
        Value::Map(m) if Arc::strong_count(&m.0) == 1 => {
            for (k, v) in m.0.lock().drain(..) {
                work.push(k);
                work.push(v);
            }
        }
        Value::FormData(fd) if Arc::strong_count(&fd.0) == 1 => {
            work.extend(fd.0.lock().drain(..).map(|(_, v)| v));
        }
        Value::Error(e) if Arc::strong_count(&e.0) == 1 => {
            if let Some(cause) = e.0.lock().cause.take() {
                work.push(cause);
            }
        }
        _ => {}
    }
}

fn deep_drain(mut work: Vec<Value>) {
    while let Some(value) = work.pop() {
        drain_children(&value, &mut work);
    }
}

macro_rules! container_drop {
    ($ty:ident, |$cell:ident| $seed:expr) => {
        impl Drop for $ty {
            fn drop(&mut self) {
                if Arc::strong_count(&self.0) != 1 {
                    return;
                }
                let $cell = &self.0;
                let seed: Vec<Value> = $seed;
                deep_drain(seed);
            }
        }
    };
}

container_drop!(ArrayValue, |cell| std::mem::take(&mut *cell.lock()));
container_drop!(SetValue, |cell| std::mem::take(&mut *cell.lock()));
container_drop!(ObjectValue, |cell| cell
    .lock()
    .drain(..)
    .map(|(_, v)| v)
    .collect());
container_drop!(FormDataValue, |cell| cell
    .lock()
    .drain(..)
    .map(|(_, v)| v)
    .collect());
container_drop!(MapValue, |cell| cell
    .lock()
    .drain(..)
    .flat_map(|(k, v)| [k, v])
    .collect());

impl Drop for ErrorValue {
    fn drop(&mut self) {
        if Arc::strong_count(&self.0) != 1 {
            return;
        }
        if let Some(cause) = self.0.lock().cause.take() {
            deep_drain(vec![cause]);
        }
    }
}
