//! Field values as seen by the comparator, index projections and hashing.
//!
//! A record exposes its foreign keys and scalar attributes as a `Vec<Value>`
//! in declaration order. The null key sentinel and `Value::Null` are the same
//! value: they compare equal, sort first, and hash to zero.

use std::cmp::Ordering;

use cfsec_types::{IdentityKey, Timestamp};
use serde::{Deserialize, Serialize};

use crate::field::FieldKind;

/// A single field value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    /// Absent value (or the null key sentinel).
    #[default]
    Null,
    /// Identity key reference.
    Key(IdentityKey),
    /// UTF-8 text.
    Text(String),
    /// 16-bit signed integer.
    SmallInt(i16),
    /// 32-bit signed integer.
    Integer(i32),
    Boolean(bool),
    Timestamp(Timestamp),
}

impl Value {
    /// Wraps a key, mapping the null sentinel to `Value::Null`.
    pub fn key(key: IdentityKey) -> Self {
        if key.is_null() {
            Value::Null
        } else {
            Value::Key(key)
        }
    }

    pub fn opt_key(key: Option<IdentityKey>) -> Self {
        key.map_or(Value::Null, Value::key)
    }

    pub fn opt_text(text: Option<&str>) -> Self {
        text.map_or(Value::Null, |t| Value::Text(t.to_string()))
    }

    pub fn opt_timestamp(ts: Option<Timestamp>) -> Self {
        ts.map_or(Value::Null, Value::Timestamp)
    }

    /// Returns true for `Null` and for the null key sentinel.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Key(key) => key.is_null(),
            _ => false,
        }
    }

    /// Returns the field kind this value belongs to, or `None` for null.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Value::Null => None,
            Value::Key(_) => Some(FieldKind::Key),
            Value::Text(_) => Some(FieldKind::Text),
            Value::SmallInt(_) => Some(FieldKind::SmallInt),
            Value::Integer(_) => Some(FieldKind::Integer),
            Value::Boolean(_) => Some(FieldKind::Boolean),
            Value::Timestamp(_) => Some(FieldKind::Timestamp),
        }
    }

    /// Compares two values of the same kind.
    ///
    /// Null sorts before every non-null value. Returns `None` when both
    /// values are non-null but of different kinds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Some(Ordering::Equal),
            (true, false) => return Some(Ordering::Less),
            (false, true) => return Some(Ordering::Greater),
            (false, false) => {}
        }
        match (self, other) {
            (Value::Key(a), Value::Key(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::SmallInt(a), Value::SmallInt(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order: same-kind values use [`Value::compare`], mixed kinds fall
    /// back to the kind rank.
    pub fn compare_total(&self, other: &Value) -> Ordering {
        self.compare(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }

    /// Per-field hash code. Null (and the null key) hash to zero.
    pub fn hash_code(&self) -> u32 {
        match self {
            Value::Null => 0,
            Value::Key(key) => key_hash(key),
            Value::Text(text) => text
                .chars()
                .fold(0u32, |h, c| h.wrapping_mul(31).wrapping_add(c as u32)),
            Value::SmallInt(v) => i32::from(*v) as u32,
            Value::Integer(v) => *v as u32,
            Value::Boolean(true) => 1231,
            Value::Boolean(false) => 1237,
            Value::Timestamp(ts) => timestamp_hash(*ts),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Key(_) => 1,
            Value::Text(_) => 2,
            Value::SmallInt(_) => 3,
            Value::Integer(_) => 4,
            Value::Boolean(_) => 5,
            Value::Timestamp(_) => 6,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl From<IdentityKey> for Value {
    fn from(key: IdentityKey) -> Self {
        Value::key(key)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Value::Timestamp(ts)
    }
}

/// Hash of a key. The null sentinel hashes to zero.
pub fn key_hash(key: &IdentityKey) -> u32 {
    key.as_bytes().chunks_exact(4).fold(0u32, |h, chunk| {
        let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h.wrapping_mul(31).wrapping_add(word)
    })
}

pub fn timestamp_hash(ts: Timestamp) -> u32 {
    let nanos = ts.as_nanos();
    (nanos ^ (nanos >> 32)) as u32
}
