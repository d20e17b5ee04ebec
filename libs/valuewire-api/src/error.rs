//! The error taxonomy shared by every stage of the protocol.

use serde_json::Value;

/// A single protocol-level fault.
///
/// Each variant names the stage that can raise it; see the crate-level docs
/// for propagation rules (a fault in one producer never tears down its
/// siblings, a parser-level fault tears down every handle).
#[derive(Debug, thiserror::Error, Clone)]
pub enum StreamError {
    /// A value only matched an unregistered predicate. Producer-side,
    /// programmer error: the session aborts before any byte is emitted.
    #[error("unknown tag for value at {path}")]
    UnknownTag { path: String },

    /// A registered guard rejected a folded or unfolded value.
    #[error("guard rejected value: {message}")]
    GuardFailed { message: String, value: Value },

    /// The source chunk sequence ended before the outer array closed.
    #[error("stream ended unexpectedly")]
    StreamInterrupted,

    /// A row referenced an id the dispatcher never materialized, or the
    /// wire shape was otherwise malformed.
    #[error("protocol violation: {0}")]
    ProtocolError(String),

    /// A producer's own error terminator, delivered to the owning handle
    /// as a rejection or error-end. Never forwarded to `on_stream_error`.
    #[error("{0}")]
    UserFault(Value),

    /// A sync fold's output re-entered one of its own ancestor nodes.
    #[error("recursive value detected while folding")]
    RecursionDetected,
}

impl StreamError {
    pub fn unknown_tag(path: impl Into<String>) -> Self {
        Self::UnknownTag { path: path.into() }
    }

    pub fn guard_failed(message: impl Into<String>, value: Value) -> Self {
        Self::GuardFailed { message: message.into(), value }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError(message.into())
    }

    /// True for faults that should tear down every handle on a session
    /// (as opposed to `UserFault`, which is scoped to one producer).
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            StreamError::StreamInterrupted | StreamError::ProtocolError(_)
        )
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
