//! Kernel error taxonomy.
//!
//! Validation errors are raised before anything is mutated. Collision errors
//! mean "re-fetch and retry". Storage errors wrap whatever the storage
//! collaborator reported, tagged with the operation that failed.

use std::fmt;

use cfsec_types::{IdentityKey, Revision};
use thiserror::Error;

use crate::traits::StorageError;

/// Errors raised by records, the comparator, the registry and the controller.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A required argument was null (or the null key sentinel).
    #[error("{method}: argument {argument} must not be null")]
    NullArgument {
        method: &'static str,
        argument: &'static str,
    },

    /// A value exceeded its declared upper bound.
    #[error("{method}: argument {argument} value {actual} exceeds maximum {max}")]
    ArgumentOverflow {
        method: &'static str,
        argument: &'static str,
        actual: i64,
        max: i64,
    },

    /// A value fell below its declared lower bound.
    #[error("{method}: argument {argument} value {actual} is below minimum {min}")]
    ArgumentUnderflow {
        method: &'static str,
        argument: &'static str,
        actual: i64,
        min: i64,
    },

    /// A create/update precondition found a required field unset.
    #[error("{entity}::{operation}: required field {field} is missing")]
    MissingRequired {
        entity: &'static str,
        operation: &'static str,
        field: String,
    },

    /// Attempt to replace an already-assigned identity key.
    #[error("{entity} {current}: identity key cannot change once assigned")]
    ImmutableKey {
        entity: &'static str,
        current: IdentityKey,
    },

    /// A relationship key did not resolve to a live parent row.
    #[error("{entity}.{field}: no {parent} row with key {key}")]
    UnresolvedReference {
        entity: &'static str,
        field: &'static str,
        parent: &'static str,
        key: IdentityKey,
    },

    /// Update/delete targeted a missing row or carried a stale revision.
    #[error("{entity} {key}: collision detected ({reason})")]
    CollisionDetected {
        entity: &'static str,
        key: IdentityKey,
        reason: CollisionReason,
    },

    /// The comparator was asked to order against a shape outside its set.
    #[error("{entity}: unsupported comparison type {shape}")]
    UnsupportedShape {
        entity: &'static str,
        shape: String,
    },

    /// No index with this name exists on the entity.
    #[error("{entity}: unknown index {index}")]
    UnknownIndex { entity: &'static str, index: String },

    /// Index-key values do not fit the index definition.
    #[error("{entity}.{index}: {reason}")]
    InvalidIndexKey {
        entity: &'static str,
        index: &'static str,
        reason: String,
    },

    /// A relationship was resolved before the schema registry was wired.
    #[error("schema registry is not configured for {entity}")]
    NotConfigured { entity: &'static str },

    /// The storage collaborator failed.
    #[error("{entity}::{operation} failed: {source}")]
    Storage {
        entity: &'static str,
        operation: &'static str,
        #[source]
        source: StorageError,
    },
}

impl KernelError {
    /// Returns true for errors that callers should answer by re-fetching.
    pub fn is_collision(&self) -> bool {
        matches!(self, KernelError::CollisionDetected { .. })
    }

    /// Returns true for setter and precondition failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            KernelError::NullArgument { .. }
                | KernelError::ArgumentOverflow { .. }
                | KernelError::ArgumentUnderflow { .. }
                | KernelError::MissingRequired { .. }
                | KernelError::ImmutableKey { .. }
        )
    }
}

/// Why an update or delete was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionReason {
    /// No row exists under the primary key.
    Missing,
    /// The row exists but the caller's revision is out of date.
    Stale { expected: Revision, found: Revision },
}

impl fmt::Display for CollisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionReason::Missing => write!(f, "row does not exist"),
            CollisionReason::Stale { expected, found } => {
                write!(f, "caller holds revision {expected}, stored revision is {found}")
            }
        }
    }
}

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
