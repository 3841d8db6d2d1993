//! # fluxcode
//!
//! A streaming codec for rich, cyclic, still-resolving value graphs over a
//! line-oriented text wire.
//!
//! ## Overview
//!
//! Most serializers assume the data is finished before encoding starts.
//! fluxcode does not: a graph may contain promises that have not settled and
//! async sequences that are still producing, and encoding begins immediately
//! anyway. The receiver gets a usable root value as soon as the first line
//! arrives, with live placeholders in every position whose content is still
//! in flight; each later wire line settles one of them.
//!
//! ### Key Features
//!
//! *   **Progressive delivery:** The root value decodes from the first line.
//!     Deferred positions resolve in completion order, not declaration order.
//! *   **Identity and cycles:** Shared substructure is encoded once and
//!     back-referenced; cyclic graphs round-trip with their aliasing intact.
//! *   **Rich value model:** Beyond JSON — dates, URLs, symbols, big
//!     integers, patterns, binary buffers in thirteen view kinds, sets, maps,
//!     errors, blobs, files and form data all have first-class wire forms.
//! *   **Bounded stack:** Encoding walks an explicit frame stack and decoding
//!     keeps its parse state on the heap, so graph depth is limited by
//!     memory, not by recursion.
//! *   **Pull-based encoding:** Nothing is encoded ahead of consumer demand;
//!     a slow transport applies backpressure all the way to the sources.
//! *   **Extensible:** Plugin pairs teach both sides caller-defined kinds
//!     through an explicit, process-local registry.
//!
//! ## Wire model
//!
//! The output is a sequence of newline-terminated UTF-8 lines:
//!
//! ```text
//! {"profile":$0,"feed":*1}      root line: the value, with placeholders
//! 0:{"name":"Ada"}              resolution: promise 0 succeeded
//! 1:{"post":1}                  resolution: sequence 1 yielded an item
//! 1                             resolution: sequence 1 completed
//! ```
//!
//! Every value token opens with a single tag character, so the decoder
//! dispatches on one character and never needs lookahead; chunk boundaries
//! may fall anywhere, including inside a multi-byte literal.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fluxcode::{decode, encode, DecodeOptions, EncodeOptions, Value};
//! use futures::StreamExt;
//!
//! let stream = encode(value, EncodeOptions::default());
//! // feed `stream` lines into a transport ...
//!
//! let root = decode(lines, DecodeOptions::default()).await?;
//! if let Value::Promise(p) = root {
//!     let settled = p.wait().await;
//! }
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **No unsafe code**, enforced by lint.
//! * **No panics:** all failure paths return [`EncodeError`] or
//!   [`DecodeError`] (enforced by clippy lints).
//! * **Redaction by default:** error values are scrubbed of names, messages
//!   and stacks unless explicitly configured otherwise.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod decode;
pub mod encode;
pub mod error;
pub mod plugin;
pub mod value;
pub mod wire;

// --- INTERNAL IMPLEMENTATION MODULES ---
mod deferred;
mod refs;

// --- RE-EXPORTS ---

pub use decode::{decode, DecodeOptions, UnknownTagPolicy};
pub use deferred::{IterableValue, PromiseValue};
pub use encode::{encode, encode_to_string, EncodeOptions, EncodeStream, ErrorRedaction};
pub use error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
pub use plugin::{DecodePlugin, EncodePlugin, PluginRegistry, TaggedValue};
pub use value::{
    ArrayValue, BigIntValue, BlobValue, BufferKind, BufferValue, DateValue, ErrorValue,
    FileValue, FormDataValue, MapValue, ObjectValue, OpaqueValue, RegexValue, SetValue, UrlValue,
    Value,
};
