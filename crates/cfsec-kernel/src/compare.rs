//! Structural comparator.
//!
//! Records and history rows compare against a closed set of shapes: another
//! record, a history row, a primary key, a history key, or an index key.
//! Full-record order is identity key, then the audit quad (created-by,
//! created-at, updated-by, updated-at), then foreign keys and scalars in
//! declaration order. The revision counter is not part of the order.
//!
//! Index-key shapes narrow the comparison to the indexed fields. That order
//! is intentionally coarser than the full order and is only used for
//! matching.

use std::cmp::Ordering;
use std::fmt;

use cfsec_types::{AuditStamp, IdentityKey};

use crate::entity::Entity;
use crate::error::{KernelError, Result};
use crate::history::{History, HistoryKey};
use crate::index::IndexKey;
use crate::value::{Value, key_hash, timestamp_hash};

const HASH_MASK: u32 = 0x7FFF_FFFF;

/// A value a record of type `E` can be compared against.
#[derive(Debug)]
pub enum Shape<'a, E> {
    Record(&'a E),
    History(&'a History<E>),
    PrimaryKey(&'a IdentityKey),
    HistoryKey(&'a HistoryKey),
    Index(&'a IndexKey),
}

impl<E> Clone for Shape<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Shape<'_, E> {}

impl<E> fmt::Display for Shape<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Record(_) => write!(f, "record"),
            Shape::History(_) => write!(f, "history"),
            Shape::PrimaryKey(_) => write!(f, "primary key"),
            Shape::HistoryKey(_) => write!(f, "history key"),
            Shape::Index(key) => write!(f, "index key {}.{}", key.entity(), key.name()),
        }
    }
}

// ============================================================================
// Full-record order
// ============================================================================

/// Total order over two records of one entity.
pub fn compare_records<E: Entity>(a: &E, b: &E) -> Ordering {
    a.pkey()
        .cmp(&b.pkey())
        .then_with(|| compare_audit(a.audit(), b.audit()))
        .then_with(|| compare_values(&a.values(), &b.values()))
}

/// History rows order by history key, then by the captured record.
pub fn compare_histories<E: Entity>(a: &History<E>, b: &History<E>) -> Ordering {
    a.key()
        .cmp(b.key())
        .then_with(|| compare_records(a.record(), b.record()))
}

fn compare_audit(a: &AuditStamp, b: &AuditStamp) -> Ordering {
    a.created_by
        .cmp(&b.created_by)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.updated_by.cmp(&b.updated_by))
        .then_with(|| a.updated_at.cmp(&b.updated_at))
}

fn compare_values(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.compare_total(y))
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn compare_index<E: Entity>(record: &E, key: &IndexKey) -> Result<Ordering> {
    if !key.is_for::<E>() {
        return Err(unsupported::<E>(&Shape::<E>::Index(key)));
    }
    let values = record.values();
    Ok(key
        .positions()
        .iter()
        .zip(key.values())
        .map(|(position, value)| values[*position].compare_total(value))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal))
}

fn unsupported<E: Entity>(shape: &Shape<'_, E>) -> KernelError {
    KernelError::UnsupportedShape {
        entity: E::NAME,
        shape: shape.to_string(),
    }
}

// ============================================================================
// Shape dispatch
// ============================================================================

/// Orders a record against a shape. `None` orders before the record.
pub fn record_cmp<E: Entity>(record: &E, other: Option<Shape<'_, E>>) -> Result<Ordering> {
    let Some(other) = other else {
        return Ok(Ordering::Greater);
    };
    match other {
        Shape::Record(that) => Ok(compare_records(record, that)),
        Shape::History(that) => Ok(compare_records(record, that.record())),
        Shape::PrimaryKey(key) => Ok(record.pkey().cmp(key)),
        Shape::Index(key) => compare_index(record, key),
        Shape::HistoryKey(_) => Err(unsupported(&other)),
    }
}

pub fn record_eq<E: Entity>(record: &E, other: Option<Shape<'_, E>>) -> bool {
    matches!(record_cmp(record, other), Ok(Ordering::Equal))
}

/// Orders a history row against a shape. `None` orders before the row.
pub fn history_cmp<E: Entity>(
    history: &History<E>,
    other: Option<Shape<'_, E>>,
) -> Result<Ordering> {
    let Some(other) = other else {
        return Ok(Ordering::Greater);
    };
    match other {
        Shape::History(that) => Ok(compare_histories(history, that)),
        Shape::Record(that) => Ok(compare_records(history.record(), that)),
        Shape::PrimaryKey(key) => Ok(history.entity_key().cmp(key)),
        Shape::HistoryKey(key) => Ok(history.key().cmp(key)),
        Shape::Index(key) => compare_index(history.record(), key),
    }
}

pub fn history_eq<E: Entity>(history: &History<E>, other: Option<Shape<'_, E>>) -> bool {
    matches!(history_cmp(history, other), Ok(Ordering::Equal))
}

// ============================================================================
// Hashing
// ============================================================================

/// Wrapping sum of the identity key, audit quad, foreign-key and scalar
/// hashes, masked to 31 bits.
pub fn record_hash<E: Entity>(record: &E) -> u32 {
    let audit = record.audit();
    let sum = [
        key_hash(&record.pkey()),
        key_hash(&audit.created_by),
        timestamp_hash(audit.created_at),
        key_hash(&audit.updated_by),
        timestamp_hash(audit.updated_at),
    ]
    .into_iter()
    .chain(record.values().iter().map(Value::hash_code))
    .fold(0u32, u32::wrapping_add);
    sum & HASH_MASK
}

pub fn history_hash<E: Entity>(history: &History<E>) -> u32 {
    let key = history.key();
    let sum = [
        record_hash(history.record()),
        key_hash(&key.audit_cluster_id),
        timestamp_hash(key.audit_stamp),
        u32::from(key.audit_action.code()),
        key_hash(&key.audit_session_id),
        key.revision.as_u32(),
    ]
    .into_iter()
    .fold(0u32, u32::wrapping_add);
    sum & HASH_MASK
}
