//! `Promise` — the built-in single-shot async tag. A host wraps any future
//! that eventually fulfills or rejects in a `Promise` and tags a `Node`
//! with it; the consumer gets back an `Arc<SingleShotHandle>`.

use std::any::Any;
use std::sync::Arc;

use valuewire_api::{
    handle::RawHandle,
    registry::{AsyncKind, AsyncTagEntry, PendingDrain, SingleShotEvent, SingleShotFuture, TagEntry},
    Node, SingleShotHandle,
};

pub const KEY: &str = "Promise";

/// Producer-side seed: a future that resolves to the promise's terminal
/// event. Tag a node with this, not with the future directly, so the
/// registry's `test` can recognize it unambiguously.
pub struct Promise(pub SingleShotFuture);

impl Promise {
    pub fn fulfilled_with(fut: impl std::future::Future<Output = Node> + Send + 'static) -> Self {
        Self(Box::pin(async move { SingleShotEvent::Fulfilled(fut.await) }))
    }

    pub fn rejected_with(fut: impl std::future::Future<Output = Node> + Send + 'static) -> Self {
        Self(Box::pin(async move { SingleShotEvent::Rejected(fut.await) }))
    }
}

/// The tag registry entry a host passes to `SessionConfig::register`.
pub fn entry() -> TagEntry {
    TagEntry::Async(AsyncTagEntry::new(
        KEY,
        AsyncKind::Single,
        |v: &(dyn Any + Send)| v.downcast_ref::<Promise>().is_some(),
        |v: Box<dyn Any + Send>| {
            let promise = v.downcast::<Promise>().expect("test already matched Promise");
            PendingDrain::Single(promise.0)
        },
        |raw: RawHandle| match raw {
            RawHandle::Single(handle) => Box::new(handle) as Box<dyn Any + Send>,
            RawHandle::Multi(_) => unreachable!("Promise is registered as single-shot"),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use valuewire_api::registry::Registry;

    #[test]
    fn entry_matches_only_promise_values() {
        let registry = {
            let mut r = Registry::new();
            r.register(entry());
            r
        };
        let promise: Box<dyn Any + Send> = Box::new(Promise::fulfilled_with(async { Node::from(1i64) }));
        assert!(registry.match_fold(promise.as_ref()).is_some());

        let other: Box<dyn Any + Send> = Box::new(42i64);
        assert!(registry.match_fold(other.as_ref()).is_none());
    }

    #[tokio::test]
    async fn unfold_drains_the_wrapped_future() {
        let promise = Promise::fulfilled_with(async { Node::from("done") });
        match promise.0.await {
            SingleShotEvent::Fulfilled(node) => assert!(matches!(node, Node::String(s) if s == "done")),
            SingleShotEvent::Rejected(_) => panic!("expected fulfillment"),
        }
    }

    #[tokio::test]
    async fn fold_exposes_a_single_shot_handle() {
        let (settle, handle) = SingleShotHandle::pair();
        let raw = RawHandle::Single(Arc::new(handle));
        let entry = match entry() {
            TagEntry::Async(e) => e,
            TagEntry::Sync(_) => unreachable!(),
        };
        let boxed = entry.fold(raw);
        let handle = boxed.downcast::<Arc<SingleShotHandle>>().unwrap();
        settle.fulfill(valuewire_api::Reconstructed::from(serde_json::json!(1)));
        assert!(handle.wait().await.is_ok());
    }
}
