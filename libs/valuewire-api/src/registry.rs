//! The Tag Registry (§4.1): maps a user type to a `(test, key, fold, unfold)`
//! quartet, in two flavors.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_core::Stream;
use serde_json::Value;

use crate::error::{StreamError, StreamResult};
use crate::handle::RawHandle;
use crate::node::Node;

type BoxAny = Box<dyn Any + Send>;
type TestFn = Arc<dyn Fn(&(dyn Any + Send)) -> bool + Send + Sync>;
type GuardFn = Arc<dyn Fn(&Value) -> StreamResult<()> + Send + Sync>;

/// One terminal or non-terminal event produced while draining a single-shot
/// producer.
pub enum SingleShotEvent {
    Fulfilled(Node),
    Rejected(Node),
}

/// One event produced while draining a multi-shot producer.
pub enum MultiShotEvent {
    Value(Node),
    Error(Node),
    End,
}

pub type SingleShotFuture = Pin<Box<dyn Future<Output = SingleShotEvent> + Send>>;
pub type MultiShotStream = Pin<Box<dyn Stream<Item = MultiShotEvent> + Send>>;

/// What an async tag's `unfold` hands back to the multiplexer: an event
/// source plus enough to label its rows.
pub enum PendingDrain {
    Single(SingleShotFuture),
    Multi(MultiShotStream),
}

/// Whether an async tag's producer is single-shot or multi-shot — fixed
/// per tag, since the wire shape of its terminator differs (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    Single,
    Multi,
}

/// A sync tag: pure value ↔ JSON-value, no wire event stream involved.
#[derive(Clone)]
pub struct SyncTagEntry {
    pub key: String,
    test: TestFn,
    serialize: Arc<dyn Fn(BoxAny) -> Node + Send + Sync>,
    deserialize: Arc<dyn Fn(Value) -> StreamResult<BoxAny> + Send + Sync>,
}

impl SyncTagEntry {
    pub fn new(
        key: impl Into<String>,
        test: impl Fn(&(dyn Any + Send)) -> bool + Send + Sync + 'static,
        serialize: impl Fn(BoxAny) -> Node + Send + Sync + 'static,
        deserialize: impl Fn(Value) -> StreamResult<BoxAny> + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            test: Arc::new(test),
            serialize: Arc::new(serialize),
            deserialize: Arc::new(deserialize),
        }
    }

    pub fn matches(&self, candidate: &(dyn Any + Send)) -> bool {
        (self.test)(candidate)
    }

    pub fn serialize(&self, value: BoxAny) -> Node {
        (self.serialize)(value)
    }

    pub fn deserialize(&self, payload: Value) -> StreamResult<BoxAny> {
        (self.deserialize)(payload)
    }
}

/// An async tag: value ↔ a stream of JSON-values keyed by path.
#[derive(Clone)]
pub struct AsyncTagEntry {
    pub key: String,
    pub kind: AsyncKind,
    test: TestFn,
    unfold: Arc<dyn Fn(BoxAny) -> PendingDrain + Send + Sync>,
    fold: Arc<dyn Fn(RawHandle) -> BoxAny + Send + Sync>,
}

impl AsyncTagEntry {
    pub fn new(
        key: impl Into<String>,
        kind: AsyncKind,
        test: impl Fn(&(dyn Any + Send)) -> bool + Send + Sync + 'static,
        unfold: impl Fn(BoxAny) -> PendingDrain + Send + Sync + 'static,
        fold: impl Fn(RawHandle) -> BoxAny + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            kind,
            test: Arc::new(test),
            unfold: Arc::new(unfold),
            fold: Arc::new(fold),
        }
    }

    pub fn matches(&self, candidate: &(dyn Any + Send)) -> bool {
        (self.test)(candidate)
    }

    /// Producer-side: turn the seed value into a continuation to be
    /// drained by the multiplexer.
    pub fn unfold(&self, value: BoxAny) -> PendingDrain {
        (self.unfold)(value)
    }

    /// Consumer-side: fold the generic raw handle the dispatcher
    /// materialized into the user-facing handle type this tag exposes.
    pub fn fold(&self, raw: RawHandle) -> BoxAny {
        (self.fold)(raw)
    }
}

#[derive(Clone)]
pub enum TagEntry {
    Sync(SyncTagEntry),
    Async(AsyncTagEntry),
}

impl TagEntry {
    pub fn key(&self) -> &str {
        match self {
            TagEntry::Sync(e) => &e.key,
            TagEntry::Async(e) => &e.key,
        }
    }

    fn matches(&self, candidate: &(dyn Any + Send)) -> bool {
        match self {
            TagEntry::Sync(e) => e.matches(candidate),
            TagEntry::Async(e) => e.matches(candidate),
        }
    }
}

/// The registry itself: an ordered list of entries plus the guards applied
/// to every folded/unfolded value.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Vec<TagEntry>,
    guards: Vec<GuardFn>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: TagEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    pub fn guard(
        &mut self,
        guard: impl Fn(&Value) -> StreamResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.guards.push(Arc::new(guard));
        self
    }

    /// First entry (registration order) whose `test` matches. `None` means
    /// the caller should raise `UnknownTag`.
    pub fn match_fold(&self, candidate: &(dyn Any + Send)) -> Option<&TagEntry> {
        self.entries.iter().find(|e| e.matches(candidate))
    }

    /// Strict lookup by wire key. Unknown key is a protocol violation on
    /// the consumer side.
    pub fn match_unfold(&self, key: &str) -> StreamResult<&TagEntry> {
        self.entries
            .iter()
            .find(|e| e.key() == key)
            .ok_or_else(|| StreamError::protocol(format!("unknown tag key '{key}'")))
    }

    pub fn apply_guards(&self, value: &Value) -> StreamResult<()> {
        for guard in &self.guards {
            guard(value)?;
        }
        Ok(())
    }
}
