//! Revision/audit controller.
//!
//! One controller per entity type owns the create/update/delete protocol:
//! required-field validation, identity-key generation, audit stamping, the
//! optimistic revision check, and history emission. Row writes and history
//! appends go through the storage seams; if the history append fails the row
//! write is undone so storage never holds an unaudited change.

use std::sync::Arc;

use cfsec_types::{AuditAction, AuditEnvelope, AuditStamp, IdentityKey, Revision, Timestamp};
use tracing::{debug, error, info, warn};

use crate::entity::Entity;
use crate::error::{CollisionReason, KernelError, Result};
use crate::history::History;
use crate::index::IndexKey;
use crate::traits::{Clock, HistoryTable, Inserted, StorageError, Table};

// ============================================================================
// Context and options
// ============================================================================

/// Who is acting, and from where.
///
/// The cluster and session identify the audit envelope of history rows. The
/// user is written into the created-by/updated-by stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuditContext {
    pub cluster_id: IdentityKey,
    pub session_id: IdentityKey,
    pub user_id: IdentityKey,
}

impl AuditContext {
    pub fn new(cluster_id: IdentityKey, session_id: IdentityKey, user_id: IdentityKey) -> Self {
        Self {
            cluster_id,
            session_id,
            user_id,
        }
    }

    /// Context for startup seeding, before any session exists.
    pub fn system(cluster_id: IdentityKey) -> Self {
        Self {
            cluster_id,
            session_id: IdentityKey::NULL,
            user_id: IdentityKey::NULL,
        }
    }
}

/// Which actions append a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
    pub record_creates: bool,
    pub record_updates: bool,
    pub record_deletes: bool,
}

impl HistoryPolicy {
    pub fn records(&self, action: AuditAction) -> bool {
        match action {
            AuditAction::Create => self.record_creates,
            AuditAction::Update => self.record_updates,
            AuditAction::Delete => self.record_deletes,
        }
    }
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            record_creates: true,
            record_updates: true,
            record_deletes: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub history: HistoryPolicy,
    /// Generate an identity key when `create` receives a null one. When off,
    /// a null key fails validation.
    pub generate_missing_keys: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            history: HistoryPolicy::default(),
            generate_missing_keys: true,
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Create/update/delete protocol for one entity type.
pub struct Controller<E: Entity> {
    table: Arc<dyn Table<E>>,
    history: Arc<dyn HistoryTable<E>>,
    clock: Arc<dyn Clock>,
    options: ControllerOptions,
}

impl<E: Entity> Clone for Controller<E> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            history: Arc::clone(&self.history),
            clock: Arc::clone(&self.clock),
            options: self.options,
        }
    }
}

impl<E: Entity> std::fmt::Debug for Controller<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("entity", &E::NAME)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> Controller<E> {
    pub fn new(
        table: Arc<dyn Table<E>>,
        history: Arc<dyn HistoryTable<E>>,
        clock: Arc<dyn Clock>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            table,
            history,
            clock,
            options,
        }
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    pub fn table(&self) -> &Arc<dyn Table<E>> {
        &self.table
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Creates a row.
    ///
    /// A null identity key is replaced by a generated one. If a row with the
    /// key already exists it is returned unchanged and nothing is written.
    /// On success `record` holds the stored image; on failure it is put back
    /// exactly as it was passed in, so a generated key does not leak.
    pub fn create(&self, ctx: &AuditContext, record: &mut E) -> Result<E> {
        Self::check_required(record, "create")?;

        let original = record.clone();
        let generated = record.pkey().is_null();
        if generated {
            if !self.options.generate_missing_keys {
                return Err(KernelError::MissingRequired {
                    entity: E::NAME,
                    operation: "create",
                    field: "data.pkey".to_string(),
                });
            }
            record.set_pkey(IdentityKey::generate())?;
        }

        match self.insert(ctx, record) {
            Ok(stored) => {
                *record = stored.clone();
                Ok(stored)
            }
            Err(err) => {
                if generated {
                    debug!(entity = E::NAME, key = %record.pkey(), "rolling back generated key");
                }
                *record = original;
                Err(err)
            }
        }
    }

    fn insert(&self, ctx: &AuditContext, record: &mut E) -> Result<E> {
        let key = record.pkey();
        let now = self.clock.now();
        record.set_audit(AuditStamp::created(ctx.user_id, now));

        let stored = match self
            .table
            .insert(record.clone())
            .map_err(storage::<E>("create"))?
        {
            Inserted::Created(stored) => stored,
            Inserted::Existing(existing) => {
                warn!(
                    entity = E::NAME,
                    %key,
                    revision = %existing.revision(),
                    "create found an existing row; returning it unchanged"
                );
                return Ok(existing);
            }
        };

        if let Err(err) = self.append_history(ctx, &stored, AuditAction::Create, now) {
            error!(entity = E::NAME, %key, error = %err, "history append failed; removing created row");
            if let Err(undo) = self.table.delete_if_revision(&key, stored.revision()) {
                error!(entity = E::NAME, %key, error = %undo, "failed to remove created row");
            }
            return Err(err);
        }

        info!(entity = E::NAME, %key, revision = %stored.revision(), "created");
        Ok(stored)
    }

    /// Applies `record`'s foreign keys and scalars onto the stored row.
    ///
    /// The caller's revision must match the stored revision; otherwise the
    /// update is refused with a collision error and nothing is merged.
    pub fn update(&self, ctx: &AuditContext, record: &E) -> Result<E> {
        let key = Self::require_key(record, "update")?;
        Self::check_required(record, "update")?;

        let current = self.fetch_for_write(&key, record, "update")?;

        let mut merged = current.clone();
        merged.assign_from(record);
        let now = self.clock.now();
        merged.set_audit(current.audit().touched(ctx.user_id, now));

        let stored = self.table.save(merged).map_err(conflict::<E>("update"))?;

        if let Err(err) = self.append_history(ctx, &stored, AuditAction::Update, now) {
            error!(entity = E::NAME, %key, error = %err, "history append failed; restoring prior row");
            self.compensate(current, Some(stored.revision()));
            return Err(err);
        }

        info!(entity = E::NAME, %key, revision = %stored.revision(), "updated");
        Ok(stored)
    }

    /// Deletes the row `record` was read from, checking its revision.
    ///
    /// The check and the removal are one storage call, so a row updated after
    /// `record` was read is never removed.
    pub fn delete(&self, ctx: &AuditContext, record: &E) -> Result<()> {
        let key = Self::require_key(record, "delete")?;
        if self.remove(ctx, &key, Some(record.revision()))?.is_none() {
            warn!(entity = E::NAME, %key, "collision: row does not exist");
            return Err(KernelError::CollisionDetected {
                entity: E::NAME,
                key,
                reason: CollisionReason::Missing,
            });
        }
        Ok(())
    }

    /// Deletes the row with this key, if any. Returns whether a row was
    /// removed.
    pub fn delete_by_key(&self, ctx: &AuditContext, key: &IdentityKey) -> Result<bool> {
        Ok(self.remove(ctx, key, None)?.is_some())
    }

    /// Deletes every row matching an index key. Returns the number removed.
    pub fn delete_by_index(&self, ctx: &AuditContext, key: &IndexKey) -> Result<usize> {
        let rows = self.find_by_index(key)?;
        let mut removed = 0;
        for row in rows {
            if self.remove(ctx, &row.pkey(), None)?.is_some() {
                removed += 1;
            }
        }
        debug!(entity = E::NAME, index = key.name(), removed, "delete by index");
        Ok(removed)
    }

    fn remove(
        &self,
        ctx: &AuditContext,
        key: &IdentityKey,
        expected: Option<Revision>,
    ) -> Result<Option<E>> {
        let removed = match expected {
            Some(revision) => self
                .table
                .delete_if_revision(key, revision)
                .map_err(conflict::<E>("delete"))?,
            None => self
                .table
                .delete_by_key(key)
                .map_err(storage::<E>("delete"))?,
        };
        let Some(removed) = removed else {
            return Ok(None);
        };

        let now = self.clock.now();
        if let Err(err) = self.append_history(ctx, &removed, AuditAction::Delete, now) {
            error!(entity = E::NAME, %key, error = %err, "history append failed; restoring deleted row");
            self.compensate(removed, None);
            return Err(err);
        }

        info!(entity = E::NAME, %key, revision = %removed.revision(), "deleted");
        Ok(Some(removed))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn find(&self, key: &IdentityKey) -> Result<Option<E>> {
        debug!(entity = E::NAME, %key, "find");
        self.table.find_by_key(key).map_err(storage::<E>("find"))
    }

    pub fn find_all(&self) -> Result<Vec<E>> {
        debug!(entity = E::NAME, "find all");
        self.table.find_all().map_err(storage::<E>("find_all"))
    }

    pub fn find_by_index(&self, key: &IndexKey) -> Result<Vec<E>> {
        Self::check_index(key)?;
        debug!(entity = E::NAME, index = key.name(), "find by index");
        self.table
            .find_by_index(key)
            .map_err(storage::<E>("find_by_index"))
    }

    /// First row matching an index key. Intended for unique indexes.
    pub fn find_one_by_index(&self, key: &IndexKey) -> Result<Option<E>> {
        Ok(self.find_by_index(key)?.into_iter().next())
    }

    pub fn lock(&self, key: &IdentityKey) -> Result<Option<E>> {
        debug!(entity = E::NAME, %key, "lock");
        self.table.lock_by_key(key).map_err(storage::<E>("lock"))
    }

    /// Locks every row matching an index key. Rows deleted between the
    /// index scan and the lock are skipped.
    pub fn lock_by_index(&self, key: &IndexKey) -> Result<Vec<E>> {
        let mut locked = Vec::new();
        for row in self.find_by_index(key)? {
            if let Some(row) = self.lock(&row.pkey())? {
                locked.push(row);
            }
        }
        Ok(locked)
    }

    /// History rows of one record, oldest first.
    pub fn history(&self, key: &IdentityKey) -> Result<Vec<History<E>>> {
        self.history
            .for_entity(key)
            .map_err(storage::<E>("history"))
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn require_key(record: &E, operation: &'static str) -> Result<IdentityKey> {
        let key = record.pkey();
        if key.is_null() {
            return Err(KernelError::MissingRequired {
                entity: E::NAME,
                operation,
                field: "data.pkey".to_string(),
            });
        }
        Ok(key)
    }

    fn check_required(record: &E, operation: &'static str) -> Result<()> {
        match record.first_missing_required() {
            Some(field) => Err(KernelError::MissingRequired {
                entity: E::NAME,
                operation,
                field: format!("data.{}", field.attr),
            }),
            None => Ok(()),
        }
    }

    fn check_index(key: &IndexKey) -> Result<()> {
        if key.is_for::<E>() {
            Ok(())
        } else {
            Err(KernelError::InvalidIndexKey {
                entity: E::NAME,
                index: key.name(),
                reason: format!("index key belongs to {}", key.entity()),
            })
        }
    }

    /// Locks the stored row and checks the caller's revision against it.
    fn fetch_for_write(&self, key: &IdentityKey, record: &E, operation: &'static str) -> Result<E> {
        let Some(current) = self
            .table
            .lock_by_key(key)
            .map_err(storage::<E>(operation))?
        else {
            warn!(entity = E::NAME, %key, operation, "collision: row does not exist");
            return Err(KernelError::CollisionDetected {
                entity: E::NAME,
                key: *key,
                reason: CollisionReason::Missing,
            });
        };

        if current.revision() != record.revision() {
            warn!(
                entity = E::NAME,
                %key,
                operation,
                expected = %record.revision(),
                found = %current.revision(),
                "collision: stale revision"
            );
            return Err(KernelError::CollisionDetected {
                entity: E::NAME,
                key: *key,
                reason: CollisionReason::Stale {
                    expected: record.revision(),
                    found: current.revision(),
                },
            });
        }

        Ok(current)
    }

    fn append_history(
        &self,
        ctx: &AuditContext,
        record: &E,
        action: AuditAction,
        stamp: Timestamp,
    ) -> Result<()> {
        if !self.options.history.records(action) {
            return Ok(());
        }
        let envelope = AuditEnvelope {
            cluster_id: ctx.cluster_id,
            stamp,
            action,
            session_id: ctx.session_id,
        };
        self.history
            .append(History::capture(record).with_envelope(envelope))
            .map_err(storage::<E>("append_history"))
    }

    /// Puts `prior` back if the stored row is still our own write (`written`,
    /// or no row for a delete).
    fn compensate(&self, prior: E, written: Option<Revision>) {
        let key = prior.pkey();
        match self.table.restore(prior, written) {
            Ok(true) => debug!(entity = E::NAME, %key, "prior row restored"),
            Ok(false) => {
                error!(entity = E::NAME, %key, "row changed after our write; prior row not restored");
            }
            Err(err) => {
                error!(entity = E::NAME, %key, error = %err, "failed to restore prior row");
            }
        }
    }
}

fn storage<E: Entity>(operation: &'static str) -> impl Fn(StorageError) -> KernelError {
    move |source| KernelError::Storage {
        entity: E::NAME,
        operation,
        source,
    }
}

/// Like [`storage`], but a revision mismatch becomes a stale collision.
fn conflict<E: Entity>(operation: &'static str) -> impl Fn(StorageError) -> KernelError {
    move |err| match err {
        StorageError::VersionConflict {
            key,
            expected,
            found,
            ..
        } => {
            warn!(entity = E::NAME, %key, operation, %expected, %found, "collision: stale revision");
            KernelError::CollisionDetected {
                entity: E::NAME,
                key,
                reason: CollisionReason::Stale { expected, found },
            }
        }
        other => storage::<E>(operation)(other),
    }
}
