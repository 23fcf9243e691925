//! Concrete implementations of the storage and clock seams.
//!
//! `MemoryTable` and `MemoryHistory` keep rows in `RwLock`-guarded ordered
//! maps. They back the facade and the test suites. Durable storage is a
//! separate backend implementing the same traits.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use cfsec_types::{IdentityKey, Revision, Timestamp};
use tracing::{debug, trace};

use crate::compare::Shape;
use crate::entity::Entity;
use crate::history::{History, HistoryKey};
use crate::index::IndexKey;
use crate::traits::{Clock, HistoryTable, Inserted, StorageError, Table};

// ============================================================================
// Clock
// ============================================================================

/// Wall clock that never returns the same or an earlier timestamp twice.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = Timestamp::now().as_nanos();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Timestamp::from_nanos(next),
                Err(actual) => prev = actual,
            }
        }
    }
}

// ============================================================================
// Row storage
// ============================================================================

/// In-memory row store for one entity.
#[derive(Debug, Default)]
pub struct MemoryTable<E: Entity> {
    rows: RwLock<BTreeMap<IdentityKey, E>>,
}

impl<E: Entity> MemoryTable<E> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.rows.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.rows.read()?.is_empty())
    }

    fn check_unique(rows: &BTreeMap<IdentityKey, E>, record: &E) -> Result<(), StorageError> {
        for def in E::INDEXES.iter().filter(|def| def.unique) {
            let wanted = IndexKey::project(record, def.name)
                .map_err(|err| StorageError::Backend(err.to_string()))?;
            if wanted.has_null() {
                continue;
            }
            let clash = rows
                .values()
                .find(|row| row.pkey() != record.pkey() && row.shape_eq(Some(Shape::Index(&wanted))));
            if let Some(existing) = clash {
                return Err(StorageError::UniqueViolation {
                    entity: E::NAME,
                    index: def.name,
                    existing: existing.pkey(),
                });
            }
        }
        Ok(())
    }
}

impl<E: Entity> Table<E> for MemoryTable<E> {
    fn find_by_key(&self, key: &IdentityKey) -> Result<Option<E>, StorageError> {
        Ok(self.rows.read()?.get(key).cloned())
    }

    fn insert(&self, mut record: E) -> Result<Inserted<E>, StorageError> {
        let key = record.pkey();
        if key.is_null() {
            return Err(StorageError::NullKey { entity: E::NAME });
        }

        let mut rows = self.rows.write()?;
        if let Some(existing) = rows.get(&key) {
            return Ok(Inserted::Existing(existing.clone()));
        }
        Self::check_unique(&rows, &record)?;

        record.set_revision(Revision::INITIAL);
        trace!(entity = E::NAME, %key, "row inserted");
        rows.insert(key, record.clone());
        Ok(Inserted::Created(record))
    }

    fn save(&self, mut record: E) -> Result<E, StorageError> {
        let key = record.pkey();
        if key.is_null() {
            return Err(StorageError::NullKey { entity: E::NAME });
        }

        let mut rows = self.rows.write()?;
        Self::check_unique(&rows, &record)?;

        match rows.get(&key) {
            Some(stored) => {
                if stored.revision() != record.revision() {
                    return Err(StorageError::VersionConflict {
                        entity: E::NAME,
                        key,
                        expected: record.revision(),
                        found: stored.revision(),
                    });
                }
                record.set_revision(stored.revision().next());
            }
            None => record.set_revision(Revision::INITIAL),
        }

        trace!(entity = E::NAME, %key, revision = %record.revision(), "row saved");
        rows.insert(key, record.clone());
        Ok(record)
    }

    fn restore(&self, record: E, expected: Option<Revision>) -> Result<bool, StorageError> {
        let key = record.pkey();
        if key.is_null() {
            return Err(StorageError::NullKey { entity: E::NAME });
        }

        let mut rows = self.rows.write()?;
        let current = rows.get(&key).map(Entity::revision);
        if current != expected {
            debug!(entity = E::NAME, %key, ?current, ?expected, "row moved on; not restored");
            return Ok(false);
        }

        debug!(entity = E::NAME, %key, revision = %record.revision(), "row restored");
        rows.insert(key, record);
        Ok(true)
    }

    fn delete_by_key(&self, key: &IdentityKey) -> Result<Option<E>, StorageError> {
        let removed = self.rows.write()?.remove(key);
        if removed.is_some() {
            trace!(entity = E::NAME, %key, "row removed");
        }
        Ok(removed)
    }

    fn delete_if_revision(
        &self,
        key: &IdentityKey,
        expected: Revision,
    ) -> Result<Option<E>, StorageError> {
        let mut rows = self.rows.write()?;
        let Some(found) = rows.get(key).map(Entity::revision) else {
            return Ok(None);
        };
        if found != expected {
            return Err(StorageError::VersionConflict {
                entity: E::NAME,
                key: *key,
                expected,
                found,
            });
        }

        trace!(entity = E::NAME, %key, revision = %expected, "row removed");
        Ok(rows.remove(key))
    }

    fn find_by_index(&self, key: &IndexKey) -> Result<Vec<E>, StorageError> {
        if !key.is_for::<E>() {
            return Err(StorageError::Backend(format!(
                "index key {}.{} used against {}",
                key.entity(),
                key.name(),
                E::NAME
            )));
        }
        Ok(self
            .rows
            .read()?
            .values()
            .filter(|row| row.shape_eq(Some(Shape::Index(key))))
            .cloned()
            .collect())
    }

    fn find_all(&self) -> Result<Vec<E>, StorageError> {
        Ok(self.rows.read()?.values().cloned().collect())
    }

    // Takes the write lock for the read so no concurrent save can interleave.
    fn lock_by_key(&self, key: &IdentityKey) -> Result<Option<E>, StorageError> {
        Ok(self.rows.write()?.get(key).cloned())
    }
}

// ============================================================================
// History storage
// ============================================================================

/// In-memory append-only history store for one entity.
#[derive(Debug, Default)]
pub struct MemoryHistory<E: Entity> {
    rows: RwLock<BTreeMap<HistoryKey, History<E>>>,
}

impl<E: Entity> MemoryHistory<E> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.rows.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.rows.read()?.is_empty())
    }
}

impl<E: Entity> HistoryTable<E> for MemoryHistory<E> {
    fn append(&self, history: History<E>) -> Result<(), StorageError> {
        let key = *history.key();
        match self.rows.write()?.entry(key) {
            Entry::Occupied(_) => Err(StorageError::DuplicateHistory {
                entity: E::NAME,
                key,
            }),
            Entry::Vacant(slot) => {
                trace!(
                    entity = E::NAME,
                    key = %key.entity_key,
                    action = %key.audit_action,
                    revision = %key.revision,
                    "history appended"
                );
                slot.insert(history);
                Ok(())
            }
        }
    }

    fn find(&self, key: &HistoryKey) -> Result<Option<History<E>>, StorageError> {
        Ok(self.rows.read()?.get(key).cloned())
    }

    fn for_entity(&self, key: &IdentityKey) -> Result<Vec<History<E>>, StorageError> {
        let mut rows: Vec<History<E>> = self
            .rows
            .read()?
            .values()
            .filter(|history| history.entity_key() == *key)
            .cloned()
            .collect();
        rows.sort_by_key(|history| (history.key().audit_stamp, history.revision()));
        Ok(rows)
    }
}
