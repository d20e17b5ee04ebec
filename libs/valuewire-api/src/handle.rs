//! Consumer-side state machines (§4.6 Handle Runtime).
//!
//! A handle is what a placeholder turns into once the dispatcher
//! materializes it: something user code can await (single-shot) or poll
//! repeatedly (multi-shot), independent of how fast the wire delivers rows.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use crate::error::StreamError;
use crate::node::Reconstructed;

/// Bound on a multi-shot handle's internal queue. Purely a memory cap —
/// not observable on the wire, and producers are never made to wait on it
/// beyond ordinary channel back-pressure (§9, Backpressure).
pub const HANDLE_QUEUE_CAPACITY: usize = 64;

/// The terminal outcome of a single-shot producer.
#[derive(Debug)]
pub enum Outcome {
    Fulfilled(Reconstructed),
    Rejected(Reconstructed),
}

/// Consumer-side single-shot handle: `pending -> fulfilled(value) | rejected(error)`.
///
/// Exposes `wait()`, an async operation that suspends until terminal.
pub struct SingleShotHandle {
    rx: Mutex<Option<oneshot::Receiver<Outcome>>>,
}

/// The producer-facing half: whoever owns this can settle the handle
/// exactly once.
pub struct SingleShotSettle {
    tx: oneshot::Sender<Outcome>,
}

impl SingleShotHandle {
    pub fn pair() -> (SingleShotSettle, SingleShotHandle) {
        let (tx, rx) = oneshot::channel();
        (
            SingleShotSettle { tx },
            SingleShotHandle { rx: Mutex::new(Some(rx)) },
        )
    }

    /// Suspend until the producer settles, or the dispatcher interrupts
    /// the session.
    pub async fn wait(&self) -> Result<Outcome, StreamError> {
        let rx = self.rx.lock().unwrap().take();
        match rx {
            Some(rx) => rx.await.map_err(|_| StreamError::StreamInterrupted),
            // Already consumed by a previous call, or interrupted and
            // dropped without a value.
            None => Err(StreamError::StreamInterrupted),
        }
    }
}

impl SingleShotSettle {
    pub fn fulfill(self, value: Reconstructed) {
        let _ = self.tx.send(Outcome::Fulfilled(value));
    }

    pub fn reject(self, error: Reconstructed) {
        let _ = self.tx.send(Outcome::Rejected(error));
    }

    /// Drop the sender without settling — the receiver observes
    /// `StreamInterrupted` the way §4.6 requires.
    pub fn interrupt(self) {
        drop(self.tx);
    }
}

/// An item delivered to a multi-shot handle's consumer. `Done` and
/// `Interrupted` are the two distinct terminal states §4.6 requires kept
/// apart: a producer that ran to completion ends with `Done`, never
/// `Interrupted` — that variant is reserved for a session-level cut-off
/// (Invariant 5), not normal completion.
#[derive(Debug)]
pub enum Item {
    Value(Reconstructed),
    Error(Reconstructed),
    Done,
    Interrupted,
}

/// Consumer-side multi-shot handle: `open -> open* -> done | errored`.
///
/// Exposes `next()`, an async operation returning the next item or `None`
/// once the handle has reached a terminal state.
pub struct MultiShotHandle {
    rx: Mutex<mpsc::Receiver<Item>>,
    done: Mutex<bool>,
}

pub struct MultiShotSettle {
    tx: mpsc::Sender<Item>,
}

impl MultiShotHandle {
    pub fn pair() -> (MultiShotSettle, MultiShotHandle) {
        let (tx, rx) = mpsc::channel(HANDLE_QUEUE_CAPACITY);
        (
            MultiShotSettle { tx },
            MultiShotHandle { rx: Mutex::new(rx), done: Mutex::new(false) },
        )
    }

    /// Returns `None` once the sequence has reached `done` or `errored`
    /// and been fully drained; a terminal `Item` is returned exactly once
    /// before that.
    pub async fn next(&self) -> Option<Item> {
        if *self.done.lock().unwrap() {
            return None;
        }
        let mut rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        // `recv` is cancel-safe; holding the lock across `.await` is fine
        // because only one logical consumer drives a handle at a time —
        // the single-threaded cooperative model of §5.
        match rx_recv(&mut rx).await {
            Some(item) => {
                if matches!(item, Item::Error(_) | Item::Done | Item::Interrupted) {
                    *self.done.lock().unwrap() = true;
                }
                Some(item)
            }
            None => {
                *self.done.lock().unwrap() = true;
                None
            }
        }
    }
}

async fn rx_recv(rx: &mut mpsc::Receiver<Item>) -> Option<Item> {
    rx.recv().await
}

impl MultiShotSettle {
    pub async fn value(&self, v: Reconstructed) -> Result<(), ()> {
        self.tx.send(Item::Value(v)).await.map_err(|_| ())
    }

    pub async fn error(&self, e: Reconstructed) -> Result<(), ()> {
        self.tx.send(Item::Error(e)).await.map_err(|_| ())
    }

    pub async fn end(&self) {
        // An mpsc send failing here just means the consumer already
        // dropped the handle — nothing left to notify.
        let _ = self.tx.send(Item::Done).await;
    }

    pub async fn interrupt(&self) {
        let _ = self.tx.send(Item::Interrupted).await;
    }
}

/// Either handle kind, as materialized by the dispatcher and boxed for
/// delivery through `AsyncTagEntry::fold`.
pub enum RawHandle {
    Single(Arc<SingleShotHandle>),
    Multi(Arc<MultiShotHandle>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::reconstructed_into_plain_value;
    use serde_json::Value;

    #[tokio::test]
    async fn single_shot_fulfills() {
        let (settle, handle) = SingleShotHandle::pair();
        settle.fulfill(Reconstructed::from(Value::from(42)));
        match handle.wait().await.unwrap() {
            Outcome::Fulfilled(v) => assert_eq!(reconstructed_into_plain_value(v).unwrap(), Value::from(42)),
            Outcome::Rejected(_) => panic!("expected fulfillment"),
        }
    }

    #[tokio::test]
    async fn single_shot_drop_without_settle_interrupts() {
        let (settle, handle) = SingleShotHandle::pair();
        settle.interrupt();
        assert!(matches!(handle.wait().await, Err(StreamError::StreamInterrupted)));
    }

    #[tokio::test]
    async fn multi_shot_delivers_values_then_end() {
        let (settle, handle) = MultiShotHandle::pair();
        for i in 0..3 {
            settle.value(Reconstructed::from(Value::from(i))).await.unwrap();
        }
        settle.end().await;

        let mut collected = Vec::new();
        while let Some(item) = handle.next().await {
            match item {
                Item::Value(v) => collected.push(reconstructed_into_plain_value(v).unwrap()),
                Item::Done => break,
                Item::Interrupted => panic!("unexpected interruption"),
                Item::Error(_) => panic!("unexpected error"),
            }
        }
        assert_eq!(collected, vec![Value::from(0), Value::from(1), Value::from(2)]);
    }

    #[tokio::test]
    async fn multi_shot_surfaces_error_then_terminates() {
        let (settle, handle) = MultiShotHandle::pair();
        settle.value(Reconstructed::from(Value::from("item: 0"))).await.unwrap();
        settle.error(Reconstructed::from(Value::from("boom"))).await.unwrap();

        assert!(matches!(handle.next().await, Some(Item::Value(_))));
        assert!(matches!(handle.next().await, Some(Item::Error(_))));
        assert!(handle.next().await.is_none());
    }
}
