//! The producer-side value graph.
//!
//! JSON itself has no way to carry "this leaf is a bigint" or "this leaf is
//! still being produced". `Node` is JSON-shaped plus one extra leaf variant
//! that carries an opaque, type-erased candidate for the tag registry to
//! match against. Building a root value means composing plain nodes with
//! `Node::tagged(..)` wherever a registered type or a live producer sits.

use std::any::Any;
use std::fmt;

use serde_json::{Number, Value};

/// A value awaiting a registry match, type-erased so the registry can be
/// generic over every tag a host registers.
pub struct Tagged(pub Box<dyn Any + Send>);

impl Tagged {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Box::new(value))
    }
}

impl fmt::Debug for Tagged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tagged(..)")
    }
}

/// The producer-side value graph: JSON-shaped, with one opaque leaf.
#[derive(Debug)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Node>),
    Object(Vec<(String, Node)>),
    /// A candidate for the tag registry — a tagged scalar, or a live
    /// producer (single-shot or multi-shot).
    Tagged(Tagged),
}

impl Node {
    pub fn tagged<T: Any + Send>(value: T) -> Self {
        Node::Tagged(Tagged::new(value))
    }

    pub fn object(fields: impl IntoIterator<Item = (impl Into<String>, Node)>) -> Self {
        Node::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn array(items: impl IntoIterator<Item = Node>) -> Self {
        Node::Array(items.into_iter().collect())
    }
}

impl From<Value> for Node {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => Node::Number(n),
            Value::String(s) => Node::String(s),
            Value::Array(items) => Node::Array(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => {
                Node::Object(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::String(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::String(s)
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Node::Number(n.into())
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

/// Plain JSON values never carry a tagged leaf, so the conversion back is
/// infallible once every `Tagged` leaf in a tree has already been resolved
/// into a placeholder by the head encoder.
pub fn node_into_plain_value(node: Node) -> Option<Value> {
    Some(match node {
        Node::Null => Value::Null,
        Node::Bool(b) => Value::Bool(b),
        Node::Number(n) => Value::Number(n),
        Node::String(s) => Value::String(s),
        Node::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(node_into_plain_value(item)?);
            }
            Value::Array(out)
        }
        Node::Object(fields) => {
            let mut map = serde_json::Map::with_capacity(fields.len());
            for (k, v) in fields {
                map.insert(k, node_into_plain_value(v)?);
            }
            Value::Object(map)
        }
        Node::Tagged(_) => return None,
    })
}

/// The consumer-side counterpart of `Node`: JSON-shaped, with a leaf for
/// whatever the dispatcher materialized at that position — a deserialized
/// sync value, or a live handle, both type-erased the same way a tagged
/// producer-side leaf is.
pub enum Reconstructed {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Reconstructed>),
    Object(Vec<(String, Reconstructed)>),
    Value(Box<dyn Any + Send>),
}

impl fmt::Debug for Reconstructed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reconstructed::Null => f.write_str("Null"),
            Reconstructed::Bool(b) => write!(f, "Bool({b})"),
            Reconstructed::Number(n) => write!(f, "Number({n})"),
            Reconstructed::String(s) => write!(f, "String({s:?})"),
            Reconstructed::Array(items) => f.debug_list().entries(items).finish(),
            Reconstructed::Object(fields) => f.debug_map().entries(fields.iter().map(|(k, v)| (k, v))).finish(),
            Reconstructed::Value(_) => f.write_str("Value(..)"),
        }
    }
}

impl Reconstructed {
    pub fn value<T: Any + Send>(value: T) -> Self {
        Reconstructed::Value(Box::new(value))
    }
}

impl From<Value> for Reconstructed {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Reconstructed::Null,
            Value::Bool(b) => Reconstructed::Bool(b),
            Value::Number(n) => Reconstructed::Number(n),
            Value::String(s) => Reconstructed::String(s),
            Value::Array(items) => Reconstructed::Array(items.into_iter().map(Reconstructed::from).collect()),
            Value::Object(map) => {
                Reconstructed::Object(map.into_iter().map(|(k, v)| (k, Reconstructed::from(v))).collect())
            }
        }
    }
}

/// Plain JSON values never carry a `Value` leaf, so this fails only when a
/// live handle or deserialized sync value remains in the tree.
pub fn reconstructed_into_plain_value(node: Reconstructed) -> Option<Value> {
    Some(match node {
        Reconstructed::Null => Value::Null,
        Reconstructed::Bool(b) => Value::Bool(b),
        Reconstructed::Number(n) => Value::Number(n),
        Reconstructed::String(s) => Value::String(s),
        Reconstructed::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(reconstructed_into_plain_value(item)?);
            }
            Value::Array(out)
        }
        Reconstructed::Object(fields) => {
            let mut map = serde_json::Map::with_capacity(fields.len());
            for (k, v) in fields {
                map.insert(k, reconstructed_into_plain_value(v)?);
            }
            Value::Object(map)
        }
        Reconstructed::Value(_) => return None,
    })
}
