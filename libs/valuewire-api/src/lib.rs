//! Shared contract types for the value-wire protocol: the value model,
//! error taxonomy, nonce, handle runtime, tag registry, and wire shapes.
//! The encoder, multiplexer, parser and dispatcher that build on these
//! live in `valuewire-engine`.

pub mod error;
pub mod handle;
pub mod node;
pub mod nonce;
pub mod registry;
pub mod wire;

pub use error::{StreamError, StreamResult};
pub use handle::{
    Item, MultiShotHandle, MultiShotSettle, Outcome, RawHandle, SingleShotHandle,
    SingleShotSettle, HANDLE_QUEUE_CAPACITY,
};
pub use node::{node_into_plain_value, reconstructed_into_plain_value, Node, Reconstructed, Tagged};
pub use nonce::{random_scalar_nonce_source, uuid_nonce_source, Nonce, NonceSource};
pub use registry::{
    AsyncKind, AsyncTagEntry, MultiShotEvent, MultiShotStream, PendingDrain, Registry,
    SingleShotEvent, SingleShotFuture, SyncTagEntry, TagEntry,
};
pub use wire::{Id, Placeholder};
