//! The wire grammar shared by encoder and decoder.
//!
//! A wire stream is a sequence of `\n`-terminated UTF-8 text lines. The first
//! line carries the root value; every later line is a *resolution line*
//! `<id><status><payload>` settling one previously-emitted deferred id.
//!
//! Values are written with single-character type tags so the decoder can
//! dispatch on the first character of every token. Composite values that open
//! with `[` or `{` are closed by the matching bracket; everything else is a
//! self-delimiting literal.

/// Tag for a deferred future placeholder, followed by its id.
pub const TAG_PROMISE: char = '$';
/// Tag for an async sequence placeholder, followed by its id.
pub const TAG_ASYNC_ITERABLE: char = '*';
/// Tag for a pull-based chunk stream placeholder, followed by its id.
pub const TAG_BYTE_STREAM: char = 'R';
/// Tag for a back-reference into the reference table.
pub const TAG_REFERENCE: char = '@';

/// Tag for a date/instant, followed by an RFC 3339 string.
pub const TAG_DATE: char = 'D';
/// Tag for a URL, followed by a quoted string.
pub const TAG_URL: char = 'U';
/// Tag for an interned symbol, followed by its quoted key.
pub const TAG_SYMBOL: char = 's';
/// Tag for an arbitrary-precision integer, followed by bare decimal digits.
pub const TAG_BIGINT: char = 'b';

/// Tag for a regular-expression-like pattern (`r["source","flags"]`).
pub const TAG_REGEX: char = 'r';
/// Tag for a set (`S[...]`).
pub const TAG_SET: char = 'S';
/// Tag for a map (`M[[k,v],...]`).
pub const TAG_MAP: char = 'M';
/// Tag for a multi-valued field collection (`F[[name,value],...]`).
pub const TAG_FORM_DATA: char = 'F';
/// Tag for a plugin-encoded value (`P["tag",...args]`).
pub const TAG_PLUGIN: char = 'P';

/// Tag for an error object (`E{...}`).
pub const TAG_ERROR: char = 'E';
/// Tag for a blob (`K{...}`).
pub const TAG_BLOB: char = 'K';
/// Tag for a file (`k{...}`).
pub const TAG_FILE: char = 'k';

/// Tag for a raw binary buffer, followed by quoted base64.
pub const TAG_ARRAY_BUFFER: char = 'A';
/// Tag for an `i8` view.
pub const TAG_INT8: char = 'O';
/// Tag for a `u8` view.
pub const TAG_UINT8: char = 'o';
/// Tag for a clamped `u8` view.
pub const TAG_UINT8_CLAMPED: char = 'C';
/// Tag for an `i16` view.
pub const TAG_INT16: char = 'L';
/// Tag for a `u16` view.
pub const TAG_UINT16: char = 'l';
/// Tag for an `i32` view.
pub const TAG_INT32: char = 'G';
/// Tag for a `u32` view.
pub const TAG_UINT32: char = 'g';
/// Tag for an `f32` view.
pub const TAG_FLOAT32: char = 'H';
/// Tag for an `f64` view.
pub const TAG_FLOAT64: char = 'h';
/// Tag for an `i64` view.
pub const TAG_BIGINT64: char = 'J';
/// Tag for a `u64` view.
pub const TAG_BIGUINT64: char = 'j';
/// Tag for an untyped byte-offset view.
pub const TAG_DATA_VIEW: char = 'V';

/// Status character on a resolution line carrying a success payload.
pub const STATUS_SUCCESS: char = ':';
/// Status character on a resolution line carrying a failure payload.
pub const STATUS_FAILURE: char = '!';

/// Literal keyword for the undefined value.
pub const LIT_UNDEFINED: &str = "undefined";
/// Literal keyword for null.
pub const LIT_NULL: &str = "null";
/// Literal keyword for true.
pub const LIT_TRUE: &str = "true";
/// Literal keyword for false.
pub const LIT_FALSE: &str = "false";
/// Literal keyword for a not-a-number float.
pub const LIT_NAN: &str = "NaN";
/// Single-character literal for positive infinity.
pub const LIT_INFINITY: char = 'I';
/// Single-character literal for negative infinity.
pub const LIT_NEG_INFINITY: char = 'i';
/// Single-character literal for negative zero.
pub const LIT_NEG_ZERO: char = 'z';

/// Replacement text written for redacted error messages.
pub const REDACTED: &str = "<redacted>";
