//! Head encoder, stream multiplexer, stream parser, dispatcher and the
//! session wiring that ties them to the producer/consumer surface. Built on
//! the contract types in `valuewire-api`.

pub mod dispatcher;
pub mod error;
pub mod head;
pub mod multiplexer;
pub mod parser;
pub mod session;
pub mod sse;

pub use dispatcher::Dispatcher;
pub use error::EngineError;
pub use multiplexer::{drain_all, Row};
pub use parser::{Delivery, FrameDecoder, IncrementalParser};
pub use session::{Session, SessionConfig};
pub use sse::to_sse_stream;
