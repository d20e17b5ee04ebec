//! `AsyncIter` — the built-in multi-shot async tag. A host wraps any
//! `Stream<Item = MultiShotEvent>` in an `AsyncIter` and tags a `Node` with
//! it; the consumer gets back an `Arc<MultiShotHandle>`.

use std::any::Any;
use std::sync::Arc;

use valuewire_api::{
    handle::RawHandle,
    registry::{AsyncKind, AsyncTagEntry, MultiShotStream, PendingDrain, TagEntry},
    MultiShotHandle,
};

pub const KEY: &str = "AsyncIter";

pub struct AsyncIter(pub MultiShotStream);

pub fn entry() -> TagEntry {
    TagEntry::Async(AsyncTagEntry::new(
        KEY,
        AsyncKind::Multi,
        |v: &(dyn Any + Send)| v.downcast_ref::<AsyncIter>().is_some(),
        |v: Box<dyn Any + Send>| {
            let iter = v.downcast::<AsyncIter>().expect("test already matched AsyncIter");
            PendingDrain::Multi(iter.0)
        },
        |raw: RawHandle| match raw {
            RawHandle::Multi(handle) => Box::new(handle) as Box<dyn Any + Send>,
            RawHandle::Single(_) => unreachable!("AsyncIter is registered as multi-shot"),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt as _;
    use valuewire_api::registry::{MultiShotEvent, Registry};
    use valuewire_api::Node;

    #[test]
    fn entry_matches_only_async_iter_values() {
        let mut registry = Registry::new();
        registry.register(entry());
        let stream: MultiShotStream = Box::pin(async_stream::stream! {
            yield MultiShotEvent::Value(Node::from(1i64));
            yield MultiShotEvent::End;
        });
        let iter: Box<dyn Any + Send> = Box::new(AsyncIter(stream));
        assert!(registry.match_fold(iter.as_ref()).is_some());

        let other: Box<dyn Any + Send> = Box::new(7i64);
        assert!(registry.match_fold(other.as_ref()).is_none());
    }

    #[tokio::test]
    async fn unfold_drains_the_wrapped_stream() {
        let stream: MultiShotStream = Box::pin(async_stream::stream! {
            yield MultiShotEvent::Value(Node::from(1i64));
            yield MultiShotEvent::Value(Node::from(2i64));
            yield MultiShotEvent::End;
        });
        let mut stream = AsyncIter(stream).0;
        let mut values = Vec::new();
        while let Some(event) = stream.next().await {
            match event {
                MultiShotEvent::Value(n) => values.push(n),
                MultiShotEvent::End => break,
                MultiShotEvent::Error(_) => panic!("unexpected error"),
            }
        }
        assert_eq!(values.len(), 2);
    }

    #[tokio::test]
    async fn fold_exposes_a_multi_shot_handle() {
        let (settle, handle) = MultiShotHandle::pair();
        let raw = RawHandle::Multi(Arc::new(handle));
        let entry = match entry() {
            TagEntry::Async(e) => e,
            TagEntry::Sync(_) => unreachable!(),
        };
        let boxed = entry.fold(raw);
        let handle = boxed.downcast::<Arc<MultiShotHandle>>().unwrap();
        settle.value(valuewire_api::Reconstructed::from(serde_json::json!(1))).await.unwrap();
        settle.end().await;
        assert!(matches!(handle.next().await, Some(valuewire_api::handle::Item::Value(_))));
        assert!(matches!(handle.next().await, Some(valuewire_api::handle::Item::Done)));
    }
}
