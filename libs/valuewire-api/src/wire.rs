//! Wire-level shapes: the head/tail-row frame and the placeholder triples
//! embedded in the head (§3 DATA MODEL).
//!
//! A frame is a two-element JSON array: `[head, rows]`. `head` is
//! `{"json": <folded_root>, "nonce": <nonce>}`, where `folded_root` has
//! every tagged leaf rewritten into a placeholder triple
//! `[key, id_or_payload, nonce]`. `rows` is the list of tail events that
//! follow, each `[id, event]`.

use serde_json::Value;

use crate::error::{StreamError, StreamResult};
use crate::nonce::Nonce;

/// Identifies one async placeholder within a session. Assigned in
/// depth-first encounter order by the head encoder; never reused.
pub type Id = u64;

/// Row-kind discriminants shared by single-shot and multi-shot events.
/// `End` is only valid for multi-shot rows.
pub mod row_kind {
    pub const VALUE_OR_FULFILLED: u8 = 0;
    pub const ERROR_OR_REJECTED: u8 = 1;
    pub const END: u8 = 2;
}

/// A placeholder as it sits in the head, already split into its parts.
pub enum Placeholder {
    /// A sync tag's payload embedded directly: `[key, payload, nonce]`.
    Sync { key: String, payload: Value },
    /// An async tag's id, resolved later by a tail row: `[key, id, nonce]`.
    Async { key: String, id: Id },
}

/// Build the three-element placeholder array for a sync tag.
pub fn encode_sync_placeholder(key: &str, payload: Value, nonce: &Nonce) -> Value {
    Value::Array(vec![Value::String(key.to_string()), payload, nonce.to_value()])
}

/// Build the three-element placeholder array for an async tag.
pub fn encode_async_placeholder(key: &str, id: Id, nonce: &Nonce) -> Value {
    Value::Array(vec![
        Value::String(key.to_string()),
        Value::Number(id.into()),
        nonce.to_value(),
    ])
}

/// Recognize a candidate head value as a placeholder-shaped slot, given the
/// session's nonce. Returns `None` for any array that is not shaped like a
/// placeholder — the caller then treats it as ordinary user data.
///
/// Deliberately stops short of deciding sync vs async: the middle slot can be
/// a bare non-negative integer for either kind (an async id, or a sync tag
/// whose own payload happens to be a number), so that decision belongs to
/// whoever knows the key's registered kind, not to this shape check.
pub fn decode_placeholder_slot(candidate: &Value, nonce: &Nonce) -> Option<(String, Value)> {
    let items = candidate.as_array()?;
    if items.len() != 3 {
        return None;
    }
    let key = items[0].as_str()?;
    if !nonce.matches(&items[2]) {
        return None;
    }
    Some((key.to_string(), items[1].clone()))
}

/// Build the `{"json": .., "nonce": ..}` head object from an already-folded
/// root value.
pub fn encode_head_object(folded_root: Value, nonce: &Nonce) -> Value {
    let mut map = serde_json::Map::with_capacity(2);
    map.insert("json".to_string(), folded_root);
    map.insert("nonce".to_string(), nonce.to_value());
    Value::Object(map)
}

/// Split a head object into its folded root and nonce. The nonce is learned
/// here, not supplied in advance — a consumer has no notion of the session
/// nonce until it parses the head.
pub fn decode_head_object(head: &Value) -> StreamResult<(&Value, Nonce)> {
    let obj = head
        .as_object()
        .ok_or_else(|| StreamError::protocol("head must be a JSON object"))?;
    let json = obj
        .get("json")
        .ok_or_else(|| StreamError::protocol("head missing 'json' field"))?;
    let nonce_value = obj
        .get("nonce")
        .ok_or_else(|| StreamError::protocol("head missing 'nonce' field"))?;
    let nonce = match nonce_value {
        Value::String(s) => Nonce::Str(s.clone()),
        Value::Number(n) => Nonce::Int(
            n.as_i64()
                .ok_or_else(|| StreamError::protocol("nonce must be an integer or string"))?,
        ),
        _ => return Err(StreamError::protocol("nonce must be an integer or string")),
    };
    Ok((json, nonce))
}

/// Build a `[kind, payload]` or `[kind]` event for a tail row.
pub fn encode_event(kind: u8, payload: Option<Value>) -> Value {
    match payload {
        Some(v) => Value::Array(vec![Value::from(kind), v]),
        None => Value::Array(vec![Value::from(kind)]),
    }
}

/// Split a decoded event back into its kind and optional payload.
pub fn decode_event(event: &Value) -> StreamResult<(u8, Option<&Value>)> {
    let items = event
        .as_array()
        .ok_or_else(|| StreamError::protocol("row event must be an array"))?;
    let kind = items
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| StreamError::protocol("row event missing numeric kind"))?;
    let kind: u8 = kind
        .try_into()
        .map_err(|_| StreamError::protocol("row event kind out of range"))?;
    Ok((kind, items.get(1)))
}

/// One tail row as it sits in the frame's second element: `[id, event]`.
pub fn encode_row(id: Id, event: Value) -> Value {
    Value::Array(vec![Value::Number(id.into()), event])
}

/// Split a decoded row back into its id and event payload.
pub fn decode_row(row: &Value) -> StreamResult<(Id, &Value)> {
    let items = row
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| StreamError::protocol("tail row must be a 2-element array"))?;
    let id = items[0]
        .as_u64()
        .ok_or_else(|| StreamError::protocol("tail row id must be a non-negative integer"))?;
    Ok((id, &items[1]))
}

/// Assemble the full two-element frame from an already-built head object and
/// its accumulated rows.
pub fn encode_frame(head: Value, rows: Vec<Value>) -> Value {
    Value::Array(vec![head, Value::Array(rows)])
}

/// Split a fully-buffered frame back into head and rows. Used by callers
/// that already have the whole frame (e.g. tests); the incremental parser
/// works off raw bytes instead.
pub fn decode_frame(frame: &Value) -> StreamResult<(&Value, &[Value])> {
    let items = frame
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| StreamError::protocol("frame must be a 2-element array"))?;
    let rows = items[1]
        .as_array()
        .ok_or_else(|| StreamError::protocol("frame rows must be an array"))?;
    Ok((&items[0], rows))
}
