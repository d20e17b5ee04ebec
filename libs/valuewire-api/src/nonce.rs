//! The per-session marker stamped into every placeholder.

use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use serde_json::Value;

/// A scalar, unique per session, echoed by every tagged placeholder so a
/// consumer can distinguish protocol tuples from coincidental user data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Nonce {
    Str(String),
    Int(i64),
}

impl Nonce {
    pub fn to_value(&self) -> Value {
        match self {
            Nonce::Str(s) => Value::String(s.clone()),
            Nonce::Int(n) => Value::Number((*n).into()),
        }
    }

    /// Compare against a placeholder's trailing nonce slot as decoded off
    /// the wire.
    pub fn matches(&self, candidate: &Value) -> bool {
        match (self, candidate) {
            (Nonce::Str(s), Value::String(c)) => s == c,
            (Nonce::Int(n), Value::Number(c)) => c.as_i64() == Some(*n),
            _ => false,
        }
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nonce::Str(s) => f.write_str(s),
            Nonce::Int(n) => write!(f, "{n}"),
        }
    }
}

/// Produces a fresh nonce per session.
pub type NonceSource = Arc<dyn Fn() -> Nonce + Send + Sync>;

/// Default nonce source: a v4 UUID. Sessions that want a smaller wire
/// footprint can supply their own `NonceSource` (e.g. a counter, or the
/// `random_scalar_nonce` fallback below).
pub fn uuid_nonce_source() -> NonceSource {
    Arc::new(|| Nonce::Str(uuid::Uuid::new_v4().to_string()))
}

/// Fallback nonce source for hosts that would rather not depend on a UUID
/// generator: a random 63-bit scalar.
pub fn random_scalar_nonce_source() -> NonceSource {
    Arc::new(|| Nonce::Int((rand::thread_rng().next_u64() >> 1) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_nonce_matches_only_identical_string() {
        let nonce = Nonce::Str("__wire".to_string());
        assert!(nonce.matches(&Value::String("__wire".to_string())));
        assert!(!nonce.matches(&Value::String("other".to_string())));
        assert!(!nonce.matches(&Value::Number(1.into())));
    }

    #[test]
    fn uuid_source_produces_distinct_nonces() {
        let source = uuid_nonce_source();
        assert_ne!(source(), source());
    }
}
