//! Head Encoder (§4.2): a depth-first rewrite of a `Node` tree into the
//! frame's head, replacing every tagged leaf with a placeholder and
//! collecting the async leaves' continuations for the multiplexer to
//! drain.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use valuewire_api::{
    node::{Node, Tagged},
    nonce::Nonce,
    registry::{PendingDrain, Registry, TagEntry},
    wire, Id, StreamError, StreamResult,
};

/// An async placeholder collected while walking the tree, ready to be
/// handed to the multiplexer.
pub struct PendingProducer {
    pub id: Id,
    pub key: String,
    pub drain: PendingDrain,
}

/// Hands out placeholder ids in depth-first encounter order. Shared between
/// the initial head encode and every producer the multiplexer later
/// discovers nested inside a drained value, so ids never collide.
#[derive(Default)]
pub(crate) struct IdAllocator(AtomicU64);

impl IdAllocator {
    pub(crate) fn next(&self) -> Id {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Encode a root value into the `{json, nonce}` head object and the list
/// of async producers still to be drained. Sync tags are resolved inline;
/// async tags become placeholders whose rows arrive later.
pub fn encode_head(
    root: Node,
    registry: &Registry,
    nonce: &Nonce,
    ids: &IdAllocator,
) -> StreamResult<(Value, Vec<PendingProducer>)> {
    let mut ancestors: Vec<*const ()> = Vec::new();
    let mut pending = Vec::new();
    let folded_root = encode_node(root, registry, nonce, ids, &mut ancestors, &mut pending, "$")?;
    Ok((wire::encode_head_object(folded_root, nonce), pending))
}

/// Encode one already-drained value (e.g. what a producer yielded) using
/// the same placeholder machinery as the initial head, continuing the
/// shared id sequence and starting with a fresh ancestor stack (a drained
/// value can't recursively contain the producer that produced it).
pub(crate) fn encode_drained_value(
    node: Node,
    registry: &Registry,
    nonce: &Nonce,
    ids: &IdAllocator,
    path: &str,
) -> StreamResult<(Value, Vec<PendingProducer>)> {
    let mut ancestors: Vec<*const ()> = Vec::new();
    let mut pending = Vec::new();
    let value = encode_node(node, registry, nonce, ids, &mut ancestors, &mut pending, path)?;
    Ok((value, pending))
}

fn encode_node(
    node: Node,
    registry: &Registry,
    nonce: &Nonce,
    ids: &IdAllocator,
    ancestors: &mut Vec<*const ()>,
    pending: &mut Vec<PendingProducer>,
    path: &str,
) -> StreamResult<Value> {
    match node {
        Node::Null => Ok(Value::Null),
        Node::Bool(b) => Ok(Value::Bool(b)),
        Node::Number(n) => Ok(Value::Number(n)),
        Node::String(s) => Ok(Value::String(s)),
        Node::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let child_path = format!("{path}[{i}]");
                out.push(encode_node(item, registry, nonce, ids, ancestors, pending, &child_path)?);
            }
            Ok(Value::Array(out))
        }
        Node::Object(fields) => {
            let mut map = serde_json::Map::with_capacity(fields.len());
            for (key, value) in fields {
                let child_path = format!("{path}.{key}");
                map.insert(
                    key,
                    encode_node(value, registry, nonce, ids, ancestors, pending, &child_path)?,
                );
            }
            Ok(Value::Object(map))
        }
        Node::Tagged(Tagged(boxed)) => {
            encode_tagged(boxed, registry, nonce, ids, ancestors, pending, path)
        }
    }
}

fn encode_tagged(
    boxed: Box<dyn Any + Send>,
    registry: &Registry,
    nonce: &Nonce,
    ids: &IdAllocator,
    ancestors: &mut Vec<*const ()>,
    pending: &mut Vec<PendingProducer>,
    path: &str,
) -> StreamResult<Value> {
    let identity: *const () = boxed.as_ref() as *const dyn Any as *const ();

    let entry = registry
        .match_fold(boxed.as_ref())
        .ok_or_else(|| StreamError::unknown_tag(path.to_string()))?;

    match entry {
        TagEntry::Sync(sync_entry) => {
            if ancestors.contains(&identity) {
                return Err(StreamError::RecursionDetected);
            }
            ancestors.push(identity);
            let produced = sync_entry.serialize(boxed);
            let key = sync_entry.key.clone();
            let result = encode_node(produced, registry, nonce, ids, ancestors, pending, path);
            ancestors.pop();
            let payload = result?;
            registry.apply_guards(&payload)?;
            Ok(wire::encode_sync_placeholder(&key, payload, nonce))
        }
        TagEntry::Async(async_entry) => {
            let id = ids.next();
            let key = async_entry.key.clone();
            let drain = async_entry.unfold(boxed);
            pending.push(PendingProducer { id, key: key.clone(), drain });
            Ok(wire::encode_async_placeholder(&key, id, nonce))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valuewire_api::nonce::uuid_nonce_source;
    use valuewire_api::registry::{AsyncKind, AsyncTagEntry, SyncTagEntry};

    struct Big(i64);
    struct Loop;

    fn registry_with_bigint() -> Registry {
        let mut registry = Registry::new();
        registry.register(TagEntry::Sync(SyncTagEntry::new(
            "bigint",
            |v| v.downcast_ref::<Big>().is_some(),
            |v| {
                let big = v.downcast::<Big>().unwrap();
                Node::from(big.0.to_string())
            },
            |_v| Err(StreamError::protocol("unused in this test")),
        )));
        registry
    }

    #[test]
    fn plain_tree_has_no_pending_producers() {
        let registry = Registry::new();
        let nonce = uuid_nonce_source()();
        let root = Node::object([("a", Node::from(1i64))]);
        let (head, pending) = encode_head(root, &registry, &nonce, &IdAllocator::default()).unwrap();
        assert_eq!(head["json"], serde_json::json!({"a": 1}));
        assert!(pending.is_empty());
    }

    #[test]
    fn sync_tag_resolves_to_inline_placeholder() {
        let registry = registry_with_bigint();
        let nonce = uuid_nonce_source()();
        let root = Node::tagged(Big(9000000000000000000));
        let (head, pending) = encode_head(root, &registry, &nonce, &IdAllocator::default()).unwrap();
        let arr = head["json"].as_array().unwrap();
        assert_eq!(arr[0], Value::String("bigint".into()));
        assert_eq!(arr[1], Value::String("9000000000000000000".into()));
        assert!(pending.is_empty());
    }

    struct Handle;

    #[test]
    fn async_tag_becomes_an_id_placeholder_and_queues_a_drain() {
        use std::future::ready;
        use valuewire_api::registry::SingleShotEvent;

        let mut registry = Registry::new();
        registry.register(TagEntry::Async(AsyncTagEntry::new(
            "promise",
            AsyncKind::Single,
            |v| v.downcast_ref::<Handle>().is_some(),
            |_v| PendingDrain::Single(Box::pin(ready(SingleShotEvent::Fulfilled(Node::from(1i64))))),
            |_raw| unreachable!("not exercised in this test"),
        )));
        let nonce = uuid_nonce_source()();
        let root = Node::tagged(Handle);
        let (head, pending) = encode_head(root, &registry, &nonce, &IdAllocator::default()).unwrap();
        let arr = head["json"].as_array().unwrap();
        assert_eq!(arr[0], Value::String("promise".into()));
        assert_eq!(arr[1], Value::Number(0.into()));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, 0);
        assert_eq!(pending[0].key, "promise");
    }

    #[test]
    fn unregistered_tagged_value_is_unknown_tag() {
        let registry = Registry::new();
        let nonce = uuid_nonce_source()();
        let root = Node::tagged(Loop);
        let err = encode_head(root, &registry, &nonce, &IdAllocator::default()).unwrap_err();
        assert!(matches!(err, StreamError::UnknownTag { .. }));
    }
}
