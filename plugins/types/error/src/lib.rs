//! `Error` — the built-in sync tag for typed application errors, so a
//! rejection or error-end carries more than a bare JSON value: a kind plus
//! a message, the way a host's own error enum usually shapes one.

use std::any::Any;

use valuewire_api::{
    registry::{SyncTagEntry, TagEntry},
    Node, StreamError,
};

pub const KEY: &str = "Error";

#[derive(Debug, Clone)]
pub struct TaggedError {
    pub kind: String,
    pub message: String,
}

impl TaggedError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into() }
    }
}

pub fn entry() -> TagEntry {
    TagEntry::Sync(SyncTagEntry::new(
        KEY,
        |v: &(dyn Any + Send)| v.downcast_ref::<TaggedError>().is_some(),
        |v: Box<dyn Any + Send>| {
            let e = v.downcast::<TaggedError>().expect("test already matched TaggedError");
            Node::object([("kind", Node::from(e.kind)), ("message", Node::from(e.message))])
        },
        |payload: serde_json::Value| {
            let obj = payload
                .as_object()
                .ok_or_else(|| StreamError::protocol("Error payload must be an object"))?;
            let kind = obj
                .get("kind")
                .and_then(|v| v.as_str())
                .ok_or_else(|| StreamError::protocol("Error payload missing 'kind'"))?
                .to_string();
            let message = obj
                .get("message")
                .and_then(|v| v.as_str())
                .ok_or_else(|| StreamError::protocol("Error payload missing 'message'"))?
                .to_string();
            Ok(Box::new(TaggedError { kind, message }) as Box<dyn Any + Send>)
        },
    ))
}
