//! Centralized error handling for fluxcode.
//!
//! Both error types are `Clone`: a single failure (for example a malformed
//! resolution line) must be fanned out to the root future and to every still
//! pending deferred value, so errors are shared rather than consumed.
//!
//! The library never panics. All failure conditions are propagated through
//! `Result`, enforced by `#![deny(clippy::panic)]` and
//! `#![deny(clippy::unwrap_used)]` at the crate root.

use std::fmt;

/// A specialized `Result` for encoding operations.
pub type EncodeResult<T> = std::result::Result<T, EncodeError>;

/// A specialized `Result` for decoding operations.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Failures raised while encoding a value graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// An opaque value reached the encoder and no registered plugin claimed it.
    ///
    /// This is a deliberate hard error: silently dropping a value the caller
    /// handed us would lose type identity without any signal.
    UnsupportedValue(String),

    /// The cancellation token fired. No further resolution lines are emitted
    /// and in-flight sources are abandoned.
    Cancelled,

    /// Logic error inside the encoder. Should not occur; please report it with
    /// a reproduction case.
    Internal(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedValue(what) => {
                write!(f, "cannot encode value without a matching plugin: {what}")
            }
            Self::Cancelled => write!(f, "encode was cancelled"),
            Self::Internal(msg) => write!(f, "internal encoder error: {msg}"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Failures raised while decoding a wire stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Malformed wire syntax: an unexpected character for the current parse
    /// mode, an unknown type tag, or an unparsable literal.
    Syntax(String),

    /// A back-reference pointed at a table index that was never assigned.
    UnknownReference(u64),

    /// A resolution line carried an id that no placeholder in the root line
    /// (or in an earlier resolution payload) ever introduced.
    UnknownDeferredId(u64),

    /// A plugin-tagged value was decoded under the strict unknown-tag policy
    /// and no registered plugin recognized the tag.
    UnknownTag(String),

    /// The transport ended before the root value finished parsing, or before
    /// every referenced deferred id was resolved.
    PrematureEnd(String),

    /// The underlying chunk source failed.
    Transport(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(msg) => write!(f, "syntax error: {msg}"),
            Self::UnknownReference(id) => write!(f, "unknown back-reference @{id}"),
            Self::UnknownDeferredId(id) => {
                write!(f, "resolution line for unknown deferred id {id}")
            }
            Self::UnknownTag(tag) => write!(f, "no plugin matched tag {tag:?}"),
            Self::PrematureEnd(msg) => write!(f, "{msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
