//! `BigInt` — the built-in sync tag for arbitrary-precision integers, which
//! JSON numbers can't carry without precision loss. Folds to its decimal
//! string form; unfolds by parsing that string back.

use std::any::Any;
use std::str::FromStr;

use num_bigint::BigInt;
use valuewire_api::{
    registry::{SyncTagEntry, TagEntry},
    Node, StreamError,
};

pub const KEY: &str = "BigInt";

pub fn entry() -> TagEntry {
    TagEntry::Sync(SyncTagEntry::new(
        KEY,
        |v: &(dyn Any + Send)| v.downcast_ref::<BigInt>().is_some(),
        |v: Box<dyn Any + Send>| {
            let n = v.downcast::<BigInt>().expect("test already matched BigInt");
            Node::from(n.to_string())
        },
        |payload: serde_json::Value| {
            let s = payload
                .as_str()
                .ok_or_else(|| StreamError::protocol("BigInt payload must be a decimal string"))?;
            let n = BigInt::from_str(s)
                .map_err(|e| StreamError::protocol(format!("invalid BigInt literal '{s}': {e}")))?;
            Ok(Box::new(n) as Box<dyn Any + Send>)
        },
    ))
}
