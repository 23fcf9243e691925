//! Seams to the outside world.
//!
//! The controller never talks to a concrete store or clock. It goes through
//! [`Table`], [`HistoryTable`] and [`Clock`], so production backends and test
//! doubles plug in the same way.

use std::sync::PoisonError;

use cfsec_types::{IdentityKey, Revision, Timestamp};

use crate::entity::Entity;
use crate::history::{History, HistoryKey};
use crate::index::IndexKey;

/// Errors reported by a storage backend.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("{entity} {key}: stored revision {found} does not match {expected}")]
    VersionConflict {
        entity: &'static str,
        key: IdentityKey,
        expected: Revision,
        found: Revision,
    },

    #[error("{entity}: unique index {index} already holds these values (row {existing})")]
    UniqueViolation {
        entity: &'static str,
        index: &'static str,
        existing: IdentityKey,
    },

    #[error("{entity}: cannot store a row with a null identity key")]
    NullKey { entity: &'static str },

    #[error("{entity}: history row {key:?} already recorded")]
    DuplicateHistory {
        entity: &'static str,
        key: HistoryKey,
    },

    #[error("storage lock poisoned: {0}")]
    Poisoned(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl<T> From<PoisonError<T>> for StorageError {
    fn from(err: PoisonError<T>) -> Self {
        StorageError::Poisoned(err.to_string())
    }
}

/// Outcome of [`Table::insert`].
#[derive(Debug, Clone)]
pub enum Inserted<E> {
    /// The row was stored at [`Revision::INITIAL`].
    Created(E),
    /// A row with the key was already stored. Nothing was written.
    Existing(E),
}

/// Per-entity row store.
///
/// Implementations must make every revision or existence check atomic with
/// the write it guards.
pub trait Table<E: Entity>: Send + Sync {
    fn find_by_key(&self, key: &IdentityKey) -> Result<Option<E>, StorageError>;

    fn exists_by_key(&self, key: &IdentityKey) -> Result<bool, StorageError> {
        Ok(self.find_by_key(key)?.is_some())
    }

    /// Stores a new row at [`Revision::INITIAL`], or hands back the row
    /// already stored under the key.
    fn insert(&self, record: E) -> Result<Inserted<E>, StorageError>;

    /// Inserts at [`Revision::INITIAL`] or updates with a compare-and-advance
    /// of the revision. Returns the stored image.
    fn save(&self, record: E) -> Result<E, StorageError>;

    /// Writes a prior image back, keeping its revision, if the stored row is
    /// still the one the caller wrote.
    ///
    /// `Some(revision)` requires the stored row to be at `revision`; `None`
    /// requires the key to be absent. Returns whether the image was written.
    fn restore(&self, record: E, expected: Option<Revision>) -> Result<bool, StorageError>;

    /// Removes a row, returning it if it existed.
    fn delete_by_key(&self, key: &IdentityKey) -> Result<Option<E>, StorageError>;

    /// Removes a row only if it is at `expected`.
    ///
    /// Returns `None` when no row exists. A different stored revision is a
    /// [`StorageError::VersionConflict`] and leaves the row in place.
    fn delete_if_revision(
        &self,
        key: &IdentityKey,
        expected: Revision,
    ) -> Result<Option<E>, StorageError>;

    /// Rows matching an index key, in key order.
    fn find_by_index(&self, key: &IndexKey) -> Result<Vec<E>, StorageError>;

    fn find_all(&self) -> Result<Vec<E>, StorageError>;

    /// Reads a row with an exclusive hold where the backend supports one.
    fn lock_by_key(&self, key: &IdentityKey) -> Result<Option<E>, StorageError>;
}

/// Append-only history store.
pub trait HistoryTable<E: Entity>: Send + Sync {
    /// Appends one row. A row with the same key is rejected.
    fn append(&self, history: History<E>) -> Result<(), StorageError>;

    fn find(&self, key: &HistoryKey) -> Result<Option<History<E>>, StorageError>;

    /// Every history row of one entity, oldest first.
    fn for_entity(&self, key: &IdentityKey) -> Result<Vec<History<E>>, StorageError>;
}

/// Source of audit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
