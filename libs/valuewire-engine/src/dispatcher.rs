//! Dispatcher (§4.5): turns the head's placeholders into live handles, then
//! routes each tail row to the handle its id names. A row's own payload may
//! itself contain fresh placeholders — those are walked and materialized
//! before the row is delivered, so user code never observes a placeholder
//! that hasn't already become a handle.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use valuewire_api::{
    handle::RawHandle,
    node::Reconstructed,
    registry::{AsyncKind, Registry, TagEntry},
    wire::{self, row_kind, Placeholder},
    Id, MultiShotHandle, Nonce, SingleShotHandle, StreamError, StreamResult,
};

/// The producer-facing half of a materialized handle, kept so tail rows can
/// be routed to it by id.
enum RowSink {
    Single(valuewire_api::handle::SingleShotSettle),
    Multi(valuewire_api::handle::MultiShotSettle),
}

/// Owns the id→handle table. Per §5, this table is mutated only by the
/// Dispatcher, so a single owning task driving `materialize_head` and
/// `dispatch_row` in sequence needs no internal locking.
pub struct Dispatcher {
    registry: Registry,
    nonce: Option<Nonce>,
    handles: HashMap<Id, RowSink>,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self { registry, nonce: None, handles: HashMap::new() }
    }

    /// Parse the head object, learning the session's nonce, and replace every
    /// placeholder in its `json` value with a materialized handle or
    /// deserialized sync value.
    pub fn materialize_head(&mut self, head: &Value) -> StreamResult<Reconstructed> {
        let (json, nonce) = wire::decode_head_object(head)?;
        tracing::debug!(nonce = %nonce, "head materialized");
        let json = json.clone();
        self.nonce = Some(nonce);
        self.materialize_node(&json)
    }

    /// Route one tail row to the handle registered under its id, after
    /// recursively materializing any placeholders nested in its payload.
    /// Unknown id is a protocol violation: every open handle is interrupted
    /// and the fault is returned to the caller.
    pub async fn dispatch_row(&mut self, row: &Value) -> StreamResult<()> {
        let (id, event) = wire::decode_row(row)?;
        let (kind, payload) = wire::decode_event(event)?;
        let reconstructed_payload = match payload {
            Some(v) => Some(self.materialize_node(v)?),
            None => None,
        };

        let sink = match self.handles.remove(&id) {
            Some(sink) => sink,
            None => {
                self.interrupt_all().await;
                return Err(StreamError::protocol(format!(
                    "tail row references unknown id {id}"
                )));
            }
        };

        match sink {
            RowSink::Single(settle) => match kind {
                row_kind::VALUE_OR_FULFILLED => {
                    let value = reconstructed_payload
                        .ok_or_else(|| StreamError::protocol("fulfillment row missing payload"))?;
                    tracing::debug!(producer = id, "single-shot handle fulfilled");
                    settle.fulfill(value);
                }
                row_kind::ERROR_OR_REJECTED => {
                    let value = reconstructed_payload
                        .ok_or_else(|| StreamError::protocol("rejection row missing payload"))?;
                    tracing::debug!(producer = id, "single-shot handle rejected");
                    settle.reject(value);
                }
                other => {
                    return Err(StreamError::protocol(format!(
                        "single-shot row {id} has invalid kind {other}"
                    )))
                }
            },
            RowSink::Multi(settle) => match kind {
                row_kind::VALUE_OR_FULFILLED => {
                    let value = reconstructed_payload
                        .ok_or_else(|| StreamError::protocol("value row missing payload"))?;
                    let _ = settle.value(value).await;
                    self.handles.insert(id, RowSink::Multi(settle));
                }
                row_kind::ERROR_OR_REJECTED => {
                    let value = reconstructed_payload
                        .ok_or_else(|| StreamError::protocol("error row missing payload"))?;
                    tracing::warn!(producer = id, "multi-shot handle error-terminated");
                    let _ = settle.error(value).await;
                }
                row_kind::END => {
                    tracing::debug!(producer = id, "multi-shot handle ended");
                    settle.end().await;
                }
                other => {
                    return Err(StreamError::protocol(format!(
                        "multi-shot row {id} has invalid kind {other}"
                    )))
                }
            },
        }

        Ok(())
    }

    /// Transition every handle still open to interrupted, exactly once each,
    /// as required when the parser signals the stream ended unexpectedly or
    /// a protocol violation is raised.
    pub async fn interrupt_all(&mut self) {
        for (_, sink) in self.handles.drain() {
            match sink {
                RowSink::Single(settle) => settle.interrupt(),
                RowSink::Multi(settle) => settle.interrupt().await,
            }
        }
    }

    fn materialize_node(&mut self, value: &Value) -> StreamResult<Reconstructed> {
        if value.is_array() {
            let nonce = self
                .nonce
                .clone()
                .ok_or_else(|| StreamError::protocol("head not yet materialized"))?;
            if let Some((key, slot)) = wire::decode_placeholder_slot(value, &nonce) {
                let placeholder = self.classify_placeholder(key, slot)?;
                return self.materialize_placeholder(placeholder);
            }
        }

        Ok(match value {
            Value::Null => Reconstructed::Null,
            Value::Bool(b) => Reconstructed::Bool(*b),
            Value::Number(n) => Reconstructed::Number(n.clone()),
            Value::String(s) => Reconstructed::String(s.clone()),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.materialize_node(item)?);
                }
                Reconstructed::Array(out)
            }
            Value::Object(map) => {
                let mut out = Vec::with_capacity(map.len());
                for (k, v) in map {
                    out.push((k.clone(), self.materialize_node(v)?));
                }
                Reconstructed::Object(out)
            }
        })
    }

    /// Decide whether a placeholder slot is sync or async from the key's
    /// registered kind, not from the slot's JSON shape — a sync tag's own
    /// payload can be a bare non-negative integer and must not be mistaken
    /// for an async id.
    fn classify_placeholder(&self, key: String, slot: Value) -> StreamResult<Placeholder> {
        match self.registry.match_unfold(&key)? {
            TagEntry::Sync(_) => Ok(Placeholder::Sync { key, payload: slot }),
            TagEntry::Async(_) => {
                let id = slot.as_u64().ok_or_else(|| {
                    StreamError::protocol(format!(
                        "tag '{key}' is async but its placeholder id slot is not a non-negative integer"
                    ))
                })?;
                Ok(Placeholder::Async { key, id })
            }
        }
    }

    fn materialize_placeholder(&mut self, placeholder: Placeholder) -> StreamResult<Reconstructed> {
        match placeholder {
            Placeholder::Sync { key, payload } => {
                let sync_entry = match self.registry.match_unfold(&key)? {
                    TagEntry::Sync(e) => e.clone(),
                    TagEntry::Async(_) => {
                        return Err(StreamError::protocol(format!(
                            "tag '{key}' is async but a sync placeholder referenced it"
                        )))
                    }
                };
                let value = sync_entry.deserialize(payload)?;
                Ok(Reconstructed::Value(value))
            }
            Placeholder::Async { key, id } => {
                let async_entry = match self.registry.match_unfold(&key)? {
                    TagEntry::Async(e) => e.clone(),
                    TagEntry::Sync(_) => {
                        return Err(StreamError::protocol(format!(
                            "tag '{key}' is sync but an async placeholder referenced it"
                        )))
                    }
                };
                let raw = match async_entry.kind {
                    AsyncKind::Single => {
                        let (settle, handle) = SingleShotHandle::pair();
                        self.handles.insert(id, RowSink::Single(settle));
                        RawHandle::Single(Arc::new(handle))
                    }
                    AsyncKind::Multi => {
                        let (settle, handle) = MultiShotHandle::pair();
                        self.handles.insert(id, RowSink::Multi(settle));
                        RawHandle::Multi(Arc::new(handle))
                    }
                };
                tracing::debug!(producer = id, tag = %key, "handle materialized");
                Ok(Reconstructed::Value(async_entry.fold(raw)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valuewire_api::node::{reconstructed_into_plain_value, Node};
    use valuewire_api::registry::{AsyncTagEntry, SyncTagEntry};
    use valuewire_api::{Outcome, StreamError};

    fn registry_with_promise() -> Registry {
        let mut registry = Registry::new();
        registry.register(TagEntry::Async(AsyncTagEntry::new(
            "promise",
            AsyncKind::Single,
            |_v| false,
            |_v| unreachable!("the producer side is not exercised here"),
            |raw| match raw {
                RawHandle::Single(h) => Box::new(h) as Box<dyn std::any::Any + Send>,
                RawHandle::Multi(_) => unreachable!("promise is single-shot"),
            },
        )));
        registry
    }

    fn downcast_single(node: Reconstructed) -> Arc<SingleShotHandle> {
        match node {
            Reconstructed::Value(boxed) => *boxed.downcast::<Arc<SingleShotHandle>>().unwrap(),
            _ => panic!("expected a materialized handle"),
        }
    }

    #[test]
    fn materializes_async_placeholder_into_a_handle() {
        let registry = registry_with_promise();
        let nonce = Nonce::Str("__tson".into());
        let folded_root = serde_json::json!({"p": ["promise", 0, "__tson"]});
        let head = wire::encode_head_object(folded_root, &nonce);

        let mut dispatcher = Dispatcher::new(registry);
        let reconstructed = dispatcher.materialize_head(&head).unwrap();
        match reconstructed {
            Reconstructed::Object(fields) => {
                assert_eq!(fields.len(), 1);
                assert!(matches!(fields[0].1, Reconstructed::Value(_)));
            }
            _ => panic!("expected object"),
        }
        assert!(dispatcher.handles.contains_key(&0));
    }

    #[tokio::test]
    async fn dispatch_row_fulfills_the_matching_single_shot_handle() {
        let registry = registry_with_promise();
        let nonce = Nonce::Str("__tson".into());
        let folded_root = serde_json::json!(["promise", 0, "__tson"]);
        let head = wire::encode_head_object(folded_root, &nonce);

        let mut dispatcher = Dispatcher::new(registry);
        let reconstructed = dispatcher.materialize_head(&head).unwrap();
        let handle = downcast_single(reconstructed);

        let row = wire::encode_row(0, wire::encode_event(row_kind::VALUE_OR_FULFILLED, Some(Value::from(42))));
        dispatcher.dispatch_row(&row).await.unwrap();

        match handle.wait().await.unwrap() {
            Outcome::Fulfilled(v) => assert_eq!(reconstructed_into_plain_value(v).unwrap(), Value::from(42)),
            Outcome::Rejected(_) => panic!("expected fulfillment"),
        }
    }

    #[tokio::test]
    async fn unknown_id_interrupts_every_open_handle() {
        let registry = registry_with_promise();
        let nonce = Nonce::Str("__tson".into());
        let folded_root = serde_json::json!(["promise", 0, "__tson"]);
        let head = wire::encode_head_object(folded_root, &nonce);

        let mut dispatcher = Dispatcher::new(registry);
        let reconstructed = dispatcher.materialize_head(&head).unwrap();
        let handle = downcast_single(reconstructed);

        let bogus = wire::encode_row(99, wire::encode_event(row_kind::END, None));
        let err = dispatcher.dispatch_row(&bogus).await.unwrap_err();
        assert!(matches!(err, StreamError::ProtocolError(_)));

        assert!(matches!(handle.wait().await, Err(StreamError::StreamInterrupted)));
    }

    #[test]
    fn sync_tag_with_a_numeric_payload_is_not_misread_as_an_async_id() {
        let mut registry = Registry::new();
        registry.register(TagEntry::Sync(SyncTagEntry::new(
            "epoch",
            |_v| false,
            |_v| Node::from(0),
            |payload| {
                let seconds = payload
                    .as_u64()
                    .ok_or_else(|| StreamError::protocol("epoch payload must be an integer"))?;
                Ok(Box::new(seconds) as Box<dyn std::any::Any + Send>)
            },
        )));

        let nonce = Nonce::Str("__tson".into());
        let folded_root = serde_json::json!(["epoch", 1_700_000_000u64, "__tson"]);
        let head = wire::encode_head_object(folded_root, &nonce);

        let mut dispatcher = Dispatcher::new(registry);
        let reconstructed = dispatcher.materialize_head(&head).unwrap();

        match reconstructed {
            Reconstructed::Value(boxed) => {
                let seconds = *boxed.downcast::<u64>().unwrap();
                assert_eq!(seconds, 1_700_000_000u64);
            }
            _ => panic!("expected a materialized sync value, not a handle"),
        }
        assert!(dispatcher.handles.is_empty());
    }
}
