//! Deferred values: promises, async sequences, and the decode-side registry.
//!
//! A deferred value appears in the graph as a placeholder and settles later,
//! when its resolution line arrives (decode) or when its backing future or
//! stream produces (encode). Handles are cheap clones of a shared core; every
//! clone observes the same settlement.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::channel::{mpsc, oneshot};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::error::{DecodeError, DecodeResult};
use crate::value::Value;

/// Message used when the transport ends while deferred values are pending.
pub(crate) const PREMATURE_DEFERRED: &str = "Stream ended before promise was resolved";
/// Message used when the transport ends before the root line completes.
pub(crate) const PREMATURE_ROOT: &str = "Stream ended before root value was parsed";

// --- PROMISE ---

/// How a promise settled. Success and failure both carry a full [`Value`], so
/// a rejection can be a structured error object, not just a message.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Success(Value),
    Failure(Value),
}

impl From<Result<Value, Value>> for Outcome {
    fn from(res: Result<Value, Value>) -> Self {
        match res {
            Ok(v) => Self::Success(v),
            Err(v) => Self::Failure(v),
        }
    }
}

impl From<Outcome> for Result<Value, Value> {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success(v) => Ok(v),
            Outcome::Failure(v) => Err(v),
        }
    }
}

struct PromiseInner {
    outcome: Shared<BoxFuture<'static, Outcome>>,
    settle: parking_lot::Mutex<Option<oneshot::Sender<Outcome>>>,
}

/// A value that is not available yet.
///
/// Settles exactly once; later settle attempts are ignored. Any number of
/// clones may [`wait`](PromiseValue::wait) concurrently.
#[derive(Clone)]
pub struct PromiseValue(Arc<PromiseInner>);

impl PromiseValue {
    /// A promise already settled with a success value.
    pub fn resolved(value: Value) -> Self {
        Self(Arc::new(PromiseInner {
            outcome: future::ready(Outcome::Success(value)).boxed().shared(),
            settle: parking_lot::Mutex::new(None),
        }))
    }

    /// A promise already settled with a failure value.
    pub fn rejected(value: Value) -> Self {
        Self(Arc::new(PromiseInner {
            outcome: future::ready(Outcome::Failure(value)).boxed().shared(),
            settle: parking_lot::Mutex::new(None),
        }))
    }

    /// A promise backed by a future.
    pub fn from_future<F>(future: F) -> Self
    where
        F: std::future::Future<Output = Result<Value, Value>> + Send + 'static,
    {
        Self(Arc::new(PromiseInner {
            outcome: future.map(Outcome::from).boxed().shared(),
            settle: parking_lot::Mutex::new(None),
        }))
    }

    /// A promise to be settled externally via [`settle`](Self::settle).
    ///
    /// Teardown of unsettled promises is the registry's job: when the
    /// transport stops early, [`DeferredRegistry::fail_all`] settles every
    /// pending entry with the premature-end error.
    pub(crate) fn pending() -> Self {
        let (tx, rx) = oneshot::channel::<Outcome>();
        let outcome = rx
            .map(|res| {
                res.unwrap_or_else(|_| Outcome::Failure(Value::simple_error(PREMATURE_DEFERRED)))
            })
            .boxed()
            .shared();
        Self(Arc::new(PromiseInner {
            outcome,
            settle: parking_lot::Mutex::new(Some(tx)),
        }))
    }

    /// Settles the promise. No-op when already settled.
    pub(crate) fn settle(&self, outcome: Outcome) {
        if let Some(tx) = self.0.settle.lock().take() {
            let _ = tx.send(outcome);
        }
    }

    /// The shared settlement future, for the encode scheduler.
    pub(crate) fn outcome(&self) -> Shared<BoxFuture<'static, Outcome>> {
        self.0.outcome.clone()
    }

    /// Waits for settlement.
    pub async fn wait(&self) -> Result<Value, Value> {
        self.0.outcome.clone().await.into()
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl fmt::Debug for PromiseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseValue")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

// --- ASYNC SEQUENCE ---

/// An event fed into a decode-created sequence.
#[derive(Debug)]
pub(crate) enum SequenceEvent {
    Item(Value),
    Done,
    Failed(Value),
}

enum ConsumeState {
    /// Source stream not yet claimed.
    Unstarted,
    /// Items are pulled straight from the caller-provided stream.
    Direct(BoxStream<'static, Result<Value, Value>>),
    /// Items arrive over a channel fed by the decode driver.
    Channel(mpsc::UnboundedReceiver<SequenceEvent>),
    Finished,
}

struct IterableInner {
    source: parking_lot::Mutex<Option<BoxStream<'static, Result<Value, Value>>>>,
    feed: parking_lot::Mutex<Option<mpsc::UnboundedSender<SequenceEvent>>>,
    state: tokio::sync::Mutex<ConsumeState>,
}

/// An ordered asynchronous sequence of values.
///
/// Backs both the async-iterable and byte-stream kinds. Yields items in
/// order; ends with either completion or a single failure value. Consumption
/// is serialized across clones, so two consumers never see the same item.
#[derive(Clone)]
pub struct IterableValue(Arc<IterableInner>);

impl IterableValue {
    /// A sequence backed by a stream of yield/failure items.
    pub fn from_stream<S>(source: S) -> Self
    where
        S: Stream<Item = Result<Value, Value>> + Send + 'static,
    {
        Self(Arc::new(IterableInner {
            source: parking_lot::Mutex::new(Some(source.boxed())),
            feed: parking_lot::Mutex::new(None),
            state: tokio::sync::Mutex::new(ConsumeState::Unstarted),
        }))
    }

    /// A sequence over a fixed list of items.
    pub fn from_items(items: Vec<Value>) -> Self {
        Self::from_stream(stream::iter(items.into_iter().map(Ok)))
    }

    /// A sequence to be fed externally by the decode driver.
    pub(crate) fn pending() -> Self {
        let (tx, rx) = mpsc::unbounded();
        Self(Arc::new(IterableInner {
            source: parking_lot::Mutex::new(None),
            feed: parking_lot::Mutex::new(Some(tx)),
            state: tokio::sync::Mutex::new(ConsumeState::Channel(rx)),
        }))
    }

    /// Feeds one item. No-op after the sequence terminated.
    pub(crate) fn push_item(&self, value: Value) {
        if let Some(tx) = &*self.0.feed.lock() {
            let _ = tx.unbounded_send(SequenceEvent::Item(value));
        }
    }

    /// Terminates the sequence successfully. No-op when already terminated.
    pub(crate) fn finish(&self) {
        if let Some(tx) = self.0.feed.lock().take() {
            let _ = tx.unbounded_send(SequenceEvent::Done);
        }
    }

    /// Terminates the sequence with a failure. No-op when already terminated.
    pub(crate) fn fail(&self, error: Value) {
        if let Some(tx) = self.0.feed.lock().take() {
            let _ = tx.unbounded_send(SequenceEvent::Failed(error));
        }
    }

    /// Pulls the next item: `Some(Ok(_))` per yield, `Some(Err(_))` once on
    /// failure, `None` after the end.
    pub async fn next(&self) -> Option<Result<Value, Value>> {
        let mut state = self.0.state.lock().await;
        loop {
            match &mut *state {
                ConsumeState::Unstarted => {
                    let taken = self.0.source.lock().take();
                    *state = match taken {
                        Some(source) => ConsumeState::Direct(source),
                        None => ConsumeState::Finished,
                    };
                }
                ConsumeState::Direct(source) => {
                    let item = source.next().await;
                    if item.is_none() {
                        *state = ConsumeState::Finished;
                    }
                    return item;
                }
                ConsumeState::Channel(rx) => {
                    let event = rx.next().await;
                    return match event {
                        Some(SequenceEvent::Item(v)) => Some(Ok(v)),
                        Some(SequenceEvent::Done) => {
                            *state = ConsumeState::Finished;
                            None
                        }
                        Some(SequenceEvent::Failed(e)) => {
                            *state = ConsumeState::Finished;
                            Some(Err(e))
                        }
                        // Feeder vanished without terminating.
                        None => {
                            *state = ConsumeState::Finished;
                            Some(Err(Value::simple_error(PREMATURE_DEFERRED)))
                        }
                    };
                }
                ConsumeState::Finished => return None,
            }
        }
    }

    /// Adapts the sequence into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Value, Value>> + Send + 'static {
        stream::unfold(self, |seq| async move {
            let item = seq.next().await?;
            Some((item, seq))
        })
    }

    /// Claims the event stream for the encode scheduler: the original source
    /// when untouched, otherwise a pull adapter over [`next`](Self::next).
    pub(crate) fn event_source(&self) -> BoxStream<'static, Result<Value, Value>> {
        if let Some(source) = self.0.source.lock().take() {
            return source;
        }
        self.clone().into_stream().boxed()
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl fmt::Debug for IterableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterableValue")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

// --- DECODE-SIDE REGISTRY ---

pub(crate) enum DeferredEntry {
    Promise(PromiseValue),
    Sequence(IterableValue),
}

/// Maps wire deferred ids to their live placeholders during a decode.
///
/// Promise entries stay registered after settling, so a later back-occurrence
/// of the same id hands out the already-settled promise. Sequence entries are
/// removed by their completion line.
#[derive(Default)]
pub(crate) struct DeferredRegistry {
    entries: HashMap<u64, DeferredEntry>,
}

impl DeferredRegistry {
    /// The promise registered under `id`, created pending on first sight.
    pub fn promise(&mut self, id: u64) -> DecodeResult<PromiseValue> {
        match self
            .entries
            .entry(id)
            .or_insert_with(|| DeferredEntry::Promise(PromiseValue::pending()))
        {
            DeferredEntry::Promise(p) => Ok(p.clone()),
            DeferredEntry::Sequence(_) => Err(DecodeError::Syntax(format!(
                "deferred id {id} reused with a different kind"
            ))),
        }
    }

    /// The sequence registered under `id`, created pending on first sight.
    pub fn sequence(&mut self, id: u64) -> DecodeResult<IterableValue> {
        match self
            .entries
            .entry(id)
            .or_insert_with(|| DeferredEntry::Sequence(IterableValue::pending()))
        {
            DeferredEntry::Sequence(s) => Ok(s.clone()),
            DeferredEntry::Promise(_) => Err(DecodeError::Syntax(format!(
                "deferred id {id} reused with a different kind"
            ))),
        }
    }

    /// Applies a payload-carrying resolution line.
    pub fn resolve(&mut self, id: u64, success: bool, value: Value) -> DecodeResult<()> {
        match self.entries.get(&id) {
            Some(DeferredEntry::Promise(p)) => {
                p.settle(if success {
                    Outcome::Success(value)
                } else {
                    Outcome::Failure(value)
                });
                Ok(())
            }
            Some(DeferredEntry::Sequence(s)) => {
                if success {
                    s.push_item(value);
                } else {
                    s.fail(value);
                }
                Ok(())
            }
            None => Err(DecodeError::UnknownDeferredId(id)),
        }
    }

    /// Applies a bare completion line.
    ///
    /// Ends a sequence; settles a promise with undefined, which is what a
    /// payload-less resolution of a promise id means.
    pub fn complete(&mut self, id: u64) -> DecodeResult<()> {
        match self.entries.remove(&id) {
            Some(DeferredEntry::Sequence(s)) => {
                s.finish();
                Ok(())
            }
            Some(DeferredEntry::Promise(p)) => {
                p.settle(Outcome::Success(Value::Undefined));
                Ok(())
            }
            None => Err(DecodeError::UnknownDeferredId(id)),
        }
    }

    /// Fails every registered entry. Settled promises ignore this.
    pub fn fail_all(&mut self, error: Value) {
        for entry in self.entries.values() {
            match entry {
                DeferredEntry::Promise(p) => p.settle(Outcome::Failure(error.clone())),
                DeferredEntry::Sequence(s) => s.fail(error.clone()),
            }
        }
        self.entries.clear();
    }
}
