//! Encoding: iterative graph walk plus the async resolution scheduler.
//!
//! `encode` returns a pull-based stream of complete wire lines. The first
//! poll walks the root graph with an explicit frame stack (no recursion, so
//! depth is bounded by memory, not the call stack) and yields the root line.
//! Every deferred value discovered along the way registers a source; the
//! scheduler then races all pending sources and emits one resolution line per
//! settlement, re-arming sequences after each yield, until everything has
//! drained or the cancellation token fires.
//!
//! Nothing is encoded ahead of consumer demand: all work happens inside
//! `poll_next`.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{BoxStream, FuturesUnordered, Stream, StreamExt};
use log::trace;
use tokio_util::sync::CancellationToken;

use crate::deferred::{Outcome, PromiseValue};
use crate::error::{EncodeError, EncodeResult};
use crate::plugin::PluginRegistry;
use crate::refs::{DeferredIds, IdentityTable};
use crate::value::{ArrayValue, Value};
use crate::wire;

// --- OPTIONS ---

/// What happens to error names, messages and stacks on the wire.
///
/// Redaction is the default: errors routinely carry internals (paths, SQL,
/// addresses) that must not reach an untrusted peer. The cause chain is
/// passed through either way, since causes are explicit values the caller
/// attached rather than free-form diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ErrorRedaction {
    /// Replace the message with `<redacted>`, the name with `Error`, and drop
    /// the stack.
    #[default]
    Redacted,
    /// Like [`Redacted`](Self::Redacted) with a caller-chosen marker text.
    Custom(String),
    /// Send errors verbatim. Only for trusted consumers.
    Off,
}

/// Options for [`encode`].
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// Plugins consulted for opaque values.
    pub plugins: PluginRegistry,
    /// Error redaction policy.
    pub redact_errors: ErrorRedaction,
    /// Cooperative cancellation. When the token fires the stream yields one
    /// [`EncodeError::Cancelled`] item and ends; in-flight sources are
    /// abandoned unresolved.
    pub cancel: Option<CancellationToken>,
}

/// Encodes a value graph into a stream of wire lines.
pub fn encode(value: Value, options: EncodeOptions) -> EncodeStream {
    EncodeStream {
        root: Some(value),
        walker: Walker {
            refs: IdentityTable::default(),
            deferred: DeferredIds::default(),
            plugins: options.plugins,
            redaction: options.redact_errors,
            pending: Vec::new(),
        },
        tasks: FuturesUnordered::new(),
        queue: VecDeque::new(),
        cancel_wait: options.cancel.map(|t| t.cancelled_owned().boxed()),
        failed: None,
        done: false,
    }
}

/// Encodes a value graph and gathers every line into one string.
///
/// Convenience for transports that buffer whole payloads; waits for all
/// deferred values to settle.
pub async fn encode_to_string(value: Value, options: EncodeOptions) -> EncodeResult<String> {
    let mut stream = encode(value, options);
    let mut out = String::new();
    while let Some(line) = stream.next().await {
        out.push_str(&line?);
    }
    Ok(out)
}

// --- SCHEDULER ---

enum SourceEvent {
    Promise {
        id: u64,
        outcome: Outcome,
    },
    Yielded {
        id: u64,
        item: Result<Value, Value>,
        rest: BoxStream<'static, Result<Value, Value>>,
    },
    SequenceDone {
        id: u64,
    },
}

/// A deferred source discovered during a walk, not yet armed.
pub(crate) enum NewSource {
    Promise {
        id: u64,
        promise: PromiseValue,
    },
    Sequence {
        id: u64,
        source: BoxStream<'static, Result<Value, Value>>,
    },
}

/// The line stream produced by [`encode`].
pub struct EncodeStream {
    root: Option<Value>,
    walker: Walker,
    tasks: FuturesUnordered<BoxFuture<'static, SourceEvent>>,
    queue: VecDeque<String>,
    cancel_wait: Option<BoxFuture<'static, ()>>,
    failed: Option<EncodeError>,
    done: bool,
}

impl EncodeStream {
    fn arm_pending(&mut self) {
        for source in self.walker.pending.drain(..) {
            match source {
                NewSource::Promise { id, promise } => {
                    let outcome = promise.outcome();
                    self.tasks.push(
                        async move {
                            SourceEvent::Promise {
                                id,
                                outcome: outcome.await,
                            }
                        }
                        .boxed(),
                    );
                }
                NewSource::Sequence { id, source } => {
                    self.tasks.push(sequence_step(id, source));
                }
            }
        }
    }

    fn emit_resolution(&mut self, id: u64, status: char, value: &Value) {
        match self.walker.encode_line(value) {
            Ok(text) => {
                self.queue.push_back(format!("{id}{status}{text}\n"));
                self.arm_pending();
            }
            Err(err) => self.failed = Some(err),
        }
    }

    fn handle_event(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Promise { id, outcome } => {
                trace!("promise {id} settled");
                match outcome {
                    Outcome::Success(v) => self.emit_resolution(id, wire::STATUS_SUCCESS, &v),
                    Outcome::Failure(v) => self.emit_resolution(id, wire::STATUS_FAILURE, &v),
                }
            }
            SourceEvent::Yielded { id, item, rest } => match item {
                Ok(v) => {
                    self.emit_resolution(id, wire::STATUS_SUCCESS, &v);
                    if self.failed.is_none() {
                        self.tasks.push(sequence_step(id, rest));
                    }
                }
                // A failure terminates the sequence; no further pulls.
                Err(v) => self.emit_resolution(id, wire::STATUS_FAILURE, &v),
            },
            SourceEvent::SequenceDone { id } => {
                trace!("sequence {id} completed");
                self.queue.push_back(format!("{id}\n"));
            }
        }
    }
}

fn sequence_step(
    id: u64,
    source: BoxStream<'static, Result<Value, Value>>,
) -> BoxFuture<'static, SourceEvent> {
    async move {
        let (item, rest) = source.into_future().await;
        match item {
            Some(item) => SourceEvent::Yielded { id, item, rest },
            None => SourceEvent::SequenceDone { id },
        }
    }
    .boxed()
}

impl Stream for EncodeStream {
    type Item = EncodeResult<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.done {
                return Poll::Ready(None);
            }
            if let Some(err) = this.failed.take() {
                this.done = true;
                return Poll::Ready(Some(Err(err)));
            }
            if let Some(line) = this.queue.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }
            if let Some(root) = this.root.take() {
                match this.walker.encode_line(&root) {
                    Ok(text) => {
                        this.queue.push_back(format!("{text}\n"));
                        this.arm_pending();
                    }
                    Err(err) => this.failed = Some(err),
                }
                continue;
            }
            if let Some(cancel) = this.cancel_wait.as_mut() {
                if cancel.as_mut().poll(cx).is_ready() {
                    this.failed = Some(EncodeError::Cancelled);
                    continue;
                }
            }
            match Pin::new(&mut this.tasks).poll_next(cx) {
                Poll::Ready(Some(event)) => {
                    this.handle_event(event);
                }
                Poll::Ready(None) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// --- WALKER ---

enum Frame {
    Encode { prefix: String, value: Value },
    Append(&'static str),
}

/// Per-encode state: the reference tables live as long as the stream so a
/// value resolved on a later line can back-reference the root line.
struct Walker {
    refs: IdentityTable,
    deferred: DeferredIds,
    plugins: PluginRegistry,
    redaction: ErrorRedaction,
    pending: Vec<NewSource>,
}

impl Walker {
    /// Encodes one value into one wire line (without the terminator).
    fn encode_line(&mut self, value: &Value) -> EncodeResult<String> {
        let mut out = String::new();
        let mut stack = vec![Frame::Encode {
            prefix: String::new(),
            value: value.clone(),
        }];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Append(text) => out.push_str(text),
                Frame::Encode { prefix, value } => {
                    out.push_str(&prefix);
                    self.encode_one(&value, &mut out, &mut stack)?;
                }
            }
        }
        Ok(out)
    }

    fn encode_one(
        &mut self,
        value: &Value,
        out: &mut String,
        stack: &mut Vec<Frame>,
    ) -> EncodeResult<()> {
        match value {
            Value::Undefined => out.push_str(wire::LIT_UNDEFINED),
            Value::Null => out.push_str(wire::LIT_NULL),
            Value::Bool(true) => out.push_str(wire::LIT_TRUE),
            Value::Bool(false) => out.push_str(wire::LIT_FALSE),
            Value::Number(n) => push_number(*n, out),
            Value::BigInt(b) => {
                out.push(wire::TAG_BIGINT);
                out.push_str(b.as_str());
            }
            Value::String(s) => out.push_str(&json_quote(s)?),
            Value::Symbol(key) => {
                out.push(wire::TAG_SYMBOL);
                out.push_str(&json_quote(key)?);
            }

            Value::Promise(p) => {
                let identity = p.identity();
                let id = match self.deferred.lookup(identity) {
                    Some(id) => id,
                    None => {
                        let id = self.deferred.assign(identity, value);
                        self.pending.push(NewSource::Promise {
                            id,
                            promise: p.clone(),
                        });
                        id
                    }
                };
                out.push(wire::TAG_PROMISE);
                out.push_str(&id.to_string());
            }
            Value::AsyncIterable(seq) => {
                self.encode_sequence(seq, wire::TAG_ASYNC_ITERABLE, value, out);
            }
            Value::ByteStream(seq) => {
                self.encode_sequence(seq, wire::TAG_BYTE_STREAM, value, out);
            }

            Value::Opaque(opaque) => match self.plugins.encode_opaque(opaque) {
                Some(tagged) => {
                    let mut items = Vec::with_capacity(tagged.args.len() + 1);
                    items.push(Value::String(tagged.tag));
                    items.extend(tagged.args);
                    stack.push(Frame::Encode {
                        prefix: wire::TAG_PLUGIN.to_string(),
                        value: Value::Array(ArrayValue::from_vec(items)),
                    });
                }
                None => {
                    return Err(EncodeError::UnsupportedValue(opaque.type_name().to_owned()))
                }
            },

            // Everything below occupies a reference-table slot.
            _ => {
                let identity = match value.ref_identity() {
                    Some(id) => id,
                    None => {
                        return Err(EncodeError::Internal(
                            "value kind missing from dispatch".to_owned(),
                        ))
                    }
                };
                if let Some(id) = self.refs.lookup(identity) {
                    out.push(wire::TAG_REFERENCE);
                    out.push_str(&id.to_string());
                    return Ok(());
                }
                self.refs.assign(identity, value);
                self.encode_referenced(value, out, stack)?;
            }
        }
        Ok(())
    }

    fn encode_sequence(
        &mut self,
        seq: &crate::deferred::IterableValue,
        tag: char,
        value: &Value,
        out: &mut String,
    ) {
        let identity = seq.identity();
        let id = match self.deferred.lookup(identity) {
            Some(id) => id,
            None => {
                let id = self.deferred.assign(identity, value);
                self.pending.push(NewSource::Sequence {
                    id,
                    source: seq.event_source(),
                });
                id
            }
        };
        out.push(tag);
        out.push_str(&id.to_string());
    }

    fn encode_referenced(
        &mut self,
        value: &Value,
        out: &mut String,
        stack: &mut Vec<Frame>,
    ) -> EncodeResult<()> {
        match value {
            Value::Date(date) => {
                let text = date
                    .instant()
                    .format(&time::format_description::well_known::Rfc3339)
                    .map_err(|e| EncodeError::Internal(e.to_string()))?;
                out.push(wire::TAG_DATE);
                out.push('"');
                out.push_str(&text);
                out.push('"');
            }
            Value::Regex(re) => {
                out.push(wire::TAG_REGEX);
                out.push('[');
                out.push_str(&json_quote(re.source())?);
                out.push(',');
                out.push_str(&json_quote(re.flags())?);
                out.push(']');
            }
            Value::Url(url) => {
                out.push(wire::TAG_URL);
                out.push_str(&json_quote(url.as_str())?);
            }
            Value::Buffer(buf) => {
                out.push(buf.kind().tag());
                out.push('"');
                out.push_str(&BASE64.encode(buf.data()));
                out.push('"');
            }

            Value::Array(arr) => {
                out.push('[');
                push_items(stack, arr.items());
            }
            Value::Set(set) => {
                out.push(wire::TAG_SET);
                out.push('[');
                push_items(stack, set.items());
            }
            Value::Map(map) => {
                out.push(wire::TAG_MAP);
                out.push('[');
                let pairs = map
                    .entries()
                    .into_iter()
                    .map(|(k, v)| Value::Array(ArrayValue::from_vec(vec![k, v])))
                    .collect();
                push_items(stack, pairs);
            }
            Value::FormData(form) => {
                out.push(wire::TAG_FORM_DATA);
                out.push('[');
                let pairs = form
                    .entries()
                    .into_iter()
                    .map(|(name, v)| {
                        Value::Array(ArrayValue::from_vec(vec![Value::String(name), v]))
                    })
                    .collect();
                push_items(stack, pairs);
            }
            Value::Object(obj) => {
                out.push('{');
                push_fields(stack, obj.entries())?;
            }

            Value::Error(err) => {
                let redact = !matches!(self.redaction, ErrorRedaction::Off);
                let marker = match &self.redaction {
                    ErrorRedaction::Custom(text) => text.clone(),
                    _ => wire::REDACTED.to_owned(),
                };
                let fields = vec![
                    (
                        "name".to_owned(),
                        Value::String(if redact { "Error".to_owned() } else { err.name() }),
                    ),
                    (
                        "message".to_owned(),
                        Value::String(if redact { marker } else { err.message() }),
                    ),
                    (
                        "stack".to_owned(),
                        match err.stack().filter(|_| !redact) {
                            Some(stack) => Value::String(stack),
                            None => Value::Undefined,
                        },
                    ),
                    (
                        "cause".to_owned(),
                        err.cause().unwrap_or(Value::Undefined),
                    ),
                ];
                out.push(wire::TAG_ERROR);
                out.push('{');
                push_fields(stack, fields)?;
            }
            Value::Blob(blob) => {
                let fields = vec![
                    (
                        "promise".to_owned(),
                        Value::Promise(blob.content().clone()),
                    ),
                    ("size".to_owned(), Value::Number(blob.size() as f64)),
                    (
                        "type".to_owned(),
                        Value::String(blob.content_type().to_owned()),
                    ),
                ];
                out.push(wire::TAG_BLOB);
                out.push('{');
                push_fields(stack, fields)?;
            }
            Value::File(file) => {
                let fields = vec![
                    (
                        "promise".to_owned(),
                        Value::Promise(file.content().clone()),
                    ),
                    ("size".to_owned(), Value::Number(file.size() as f64)),
                    (
                        "type".to_owned(),
                        Value::String(file.content_type().to_owned()),
                    ),
                    ("name".to_owned(), Value::String(file.name().to_owned())),
                    (
                        "lastModified".to_owned(),
                        Value::Number(file.last_modified_ms()),
                    ),
                ];
                out.push(wire::TAG_FILE);
                out.push('{');
                push_fields(stack, fields)?;
            }

            _ => {
                return Err(EncodeError::Internal(
                    "value kind missing from dispatch".to_owned(),
                ))
            }
        }
        Ok(())
    }
}

// Children are pushed in reverse so they pop in order; the closing bracket
// goes underneath them.
fn push_items(stack: &mut Vec<Frame>, items: Vec<Value>) {
    stack.push(Frame::Append("]"));
    for (i, item) in items.into_iter().enumerate().rev() {
        stack.push(Frame::Encode {
            prefix: if i == 0 { String::new() } else { ",".to_owned() },
            value: item,
        });
    }
}

fn push_fields(stack: &mut Vec<Frame>, fields: Vec<(String, Value)>) -> EncodeResult<()> {
    stack.push(Frame::Append("}"));
    let mut frames = Vec::with_capacity(fields.len());
    for (i, (key, value)) in fields.into_iter().enumerate() {
        let comma = if i == 0 { "" } else { "," };
        frames.push(Frame::Encode {
            prefix: format!("{comma}{}:", json_quote(&key)?),
            value,
        });
    }
    stack.extend(frames.into_iter().rev());
    Ok(())
}

fn push_number(n: f64, out: &mut String) {
    if n.is_nan() {
        out.push_str(wire::LIT_NAN);
    } else if n == f64::INFINITY {
        out.push(wire::LIT_INFINITY);
    } else if n == f64::NEG_INFINITY {
        out.push(wire::LIT_NEG_INFINITY);
    } else if n.to_bits() == (-0.0f64).to_bits() {
        out.push(wire::LIT_NEG_ZERO);
    } else {
        // `Display` for f64 never produces exponent notation, which keeps
        // the output inside the decoder's number alphabet.
        out.push_str(&n.to_string());
    }
}

fn json_quote(s: &str) -> EncodeResult<String> {
    serde_json::to_string(s).map_err(|e| EncodeError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_line(value: Value) -> String {
        let mut walker = Walker {
            refs: IdentityTable::default(),
            deferred: DeferredIds::default(),
            plugins: PluginRegistry::new(),
            redaction: ErrorRedaction::Off,
            pending: Vec::new(),
        };
        walker.encode_line(&value).expect("encodable")
    }

    #[test]
    fn scalars_use_wire_literals() {
        assert_eq!(sync_line(Value::Undefined), "undefined");
        assert_eq!(sync_line(Value::Null), "null");
        assert_eq!(sync_line(Value::Bool(true)), "true");
        assert_eq!(sync_line(Value::Number(f64::NAN)), "NaN");
        assert_eq!(sync_line(Value::Number(f64::INFINITY)), "I");
        assert_eq!(sync_line(Value::Number(-0.0)), "z");
        assert_eq!(sync_line(Value::Number(10.5)), "10.5");
        assert_eq!(sync_line(Value::Number(3.0)), "3");
    }

    #[test]
    fn strings_are_json_escaped() {
        assert_eq!(sync_line(Value::String("a\"b\n".into())), r#""a\"b\n""#);
    }

    #[test]
    fn shared_child_becomes_back_reference() {
        let shared = ArrayValue::from_vec(vec![Value::Number(1.0)]);
        let outer = ArrayValue::from_vec(vec![
            Value::Array(shared.clone()),
            Value::Array(shared),
        ]);
        assert_eq!(sync_line(Value::Array(outer)), "[[1],@1]");
    }

    #[test]
    fn cycle_encodes_as_reference_to_self() {
        let obj = crate::value::ObjectValue::new();
        obj.set("me", Value::Object(obj.clone()));
        assert_eq!(sync_line(Value::Object(obj)), r#"{"me":@0}"#);
    }

    #[test]
    fn map_entries_are_pair_arrays() {
        let map = crate::value::MapValue::new();
        map.set(Value::String("k".into()), Value::Number(1.0));
        assert_eq!(sync_line(Value::Map(map)), r#"M[["k",1]]"#);
    }
}
