//! Stream Multiplexer (§4.3): drains every pending producer concurrently
//! and emits tail rows in arrival order, so one slow producer never blocks
//! another's progress (no head-of-line blocking). Per-producer order is
//! still FIFO — a multi-shot producer's values arrive in the order it
//! yielded them.

use futures_core::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use valuewire_api::{
    nonce::Nonce,
    registry::{MultiShotEvent, PendingDrain, Registry, SingleShotEvent},
    wire::{self, row_kind},
    Id, Node, StreamResult,
};

use crate::head::{encode_drained_value, IdAllocator};

/// One encoded tail row, ready to append to the frame's row list.
pub struct Row {
    pub value: serde_json::Value,
}

/// Bound on the multiplexer's row channel. A slow consumer applies
/// back-pressure to every producer equally rather than letting one run
/// unbounded ahead of the others.
const ROW_CHANNEL_CAPACITY: usize = 256;

/// Spawn one task per pending producer and merge their rows onto a single
/// channel as they arrive. Producers that themselves yield values
/// containing further tagged leaves have those leaves recursively unfolded
/// and spawned the same way, sharing the same id sequence.
pub fn drain_all(
    producers: Vec<crate::head::PendingProducer>,
    registry: Registry,
    nonce: Nonce,
    ids: std::sync::Arc<IdAllocator>,
) -> impl Stream<Item = StreamResult<Row>> {
    let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);

    for producer in producers {
        spawn_drain(producer.id, producer.key, producer.drain, registry.clone(), nonce.clone(), ids.clone(), tx.clone());
    }

    drop(tx);
    tokio_stream::wrappers::ReceiverStream::new(rx)
}

fn spawn_drain(
    id: Id,
    key: String,
    drain: PendingDrain,
    registry: Registry,
    nonce: Nonce,
    ids: std::sync::Arc<IdAllocator>,
    tx: mpsc::Sender<StreamResult<Row>>,
) {
    tokio::spawn(async move {
        tracing::debug!(producer = id, tag = %key, "producer draining");
        match drain {
            PendingDrain::Single(fut) => {
                let event = fut.await;
                let (kind, node) = match event {
                    SingleShotEvent::Fulfilled(n) => (row_kind::VALUE_OR_FULFILLED, n),
                    SingleShotEvent::Rejected(n) => (row_kind::ERROR_OR_REJECTED, n),
                };
                emit_event(id, kind, node, &registry, &nonce, &ids, &tx).await;
                tracing::debug!(producer = id, tag = %key, "single-shot producer closed");
            }
            PendingDrain::Multi(mut stream) => {
                while let Some(event) = stream.next().await {
                    match event {
                        MultiShotEvent::Value(n) => {
                            if !emit_event(id, row_kind::VALUE_OR_FULFILLED, n, &registry, &nonce, &ids, &tx).await {
                                return;
                            }
                        }
                        MultiShotEvent::Error(n) => {
                            tracing::warn!(producer = id, tag = %key, "producer error-terminated");
                            emit_event(id, row_kind::ERROR_OR_REJECTED, n, &registry, &nonce, &ids, &tx).await;
                            return;
                        }
                        MultiShotEvent::End => {
                            let row = wire::encode_row(id, wire::encode_event(row_kind::END, None));
                            let _ = tx.send(Ok(Row { value: row })).await;
                            tracing::debug!(producer = id, tag = %key, "multi-shot producer ended");
                            return;
                        }
                    }
                }
            }
        }
    });
}

/// Encode a single non-terminal value and emit its row; if the value
/// contains further async placeholders, spawn their drains too. Returns
/// `false` if encoding failed — an error-terminator row has been emitted
/// for this producer's id in place of the value, so its handle still
/// resolves instead of hanging, and siblings are unaffected.
async fn emit_event(
    id: Id,
    kind: u8,
    node: Node,
    registry: &Registry,
    nonce: &Nonce,
    ids: &std::sync::Arc<IdAllocator>,
    tx: &mpsc::Sender<StreamResult<Row>>,
) -> bool {
    let path = format!("$producer[{id}]");
    match encode_drained_value(node, registry, nonce, ids, &path) {
        Ok((value, nested)) => {
            for nested_producer in nested {
                spawn_drain(
                    nested_producer.id,
                    nested_producer.key,
                    nested_producer.drain,
                    registry.clone(),
                    nonce.clone(),
                    ids.clone(),
                    tx.clone(),
                );
            }
            let row = wire::encode_row(id, wire::encode_event(kind, Some(value)));
            let _ = tx.send(Ok(Row { value: row })).await;
            true
        }
        Err(e) => {
            tracing::warn!(producer = id, error = %e, "producer value failed to encode, terminating with an error row");
            let error_row = wire::encode_row(
                id,
                wire::encode_event(row_kind::ERROR_OR_REJECTED, Some(Value::String(e.to_string()))),
            );
            let _ = tx.send(Ok(Row { value: error_row })).await;
            false
        }
    }
}
