//! Append-only history rows.
//!
//! A history row is an immutable snapshot of a revisioned record taken at one
//! audited action. Its composite key carries the audit envelope, the revision
//! captured and the entity key, so successive actions on one record never
//! collide.

use std::cmp::Ordering;

use cfsec_types::{AuditAction, AuditEnvelope, IdentityKey, Revision, Timestamp};
use serde::{Deserialize, Serialize};

use crate::compare::{self, Shape};
use crate::entity::Entity;
use crate::error::Result;

/// Composite key of a history row.
///
/// Ordered by cluster, stamp, action, session, revision, then entity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HistoryKey {
    pub audit_cluster_id: IdentityKey,
    pub audit_stamp: Timestamp,
    pub audit_action: AuditAction,
    pub audit_session_id: IdentityKey,
    pub revision: Revision,
    pub entity_key: IdentityKey,
}

impl HistoryKey {
    pub fn new(envelope: AuditEnvelope, revision: Revision, entity_key: IdentityKey) -> Self {
        Self {
            audit_cluster_id: envelope.cluster_id,
            audit_stamp: envelope.stamp,
            audit_action: envelope.action,
            audit_session_id: envelope.session_id,
            revision,
            entity_key,
        }
    }

    pub fn envelope(&self) -> AuditEnvelope {
        AuditEnvelope {
            cluster_id: self.audit_cluster_id,
            stamp: self.audit_stamp,
            action: self.audit_action,
            session_id: self.audit_session_id,
        }
    }
}

/// Snapshot of one entity at one audited action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "E: Serialize", deserialize = "E: Deserialize<'de>"))]
pub struct History<E> {
    key: HistoryKey,
    record: E,
}

impl<E: Entity> History<E> {
    /// Copies the business fields of a live record.
    ///
    /// The envelope starts out empty; the controller fills it with
    /// [`History::with_envelope`].
    pub fn capture(record: &E) -> Self {
        let envelope = AuditEnvelope {
            cluster_id: IdentityKey::NULL,
            stamp: Timestamp::EPOCH,
            action: AuditAction::Create,
            session_id: IdentityKey::NULL,
        };
        Self {
            key: HistoryKey::new(envelope, record.revision(), record.pkey()),
            record: record.clone(),
        }
    }

    /// Applies the audit envelope.
    #[must_use]
    pub fn with_envelope(mut self, envelope: AuditEnvelope) -> Self {
        self.key = HistoryKey::new(envelope, self.key.revision, self.key.entity_key);
        self
    }

    pub fn key(&self) -> &HistoryKey {
        &self.key
    }

    pub fn record(&self) -> &E {
        &self.record
    }

    pub fn action(&self) -> AuditAction {
        self.key.audit_action
    }

    pub fn revision(&self) -> Revision {
        self.key.revision
    }

    pub fn entity_key(&self) -> IdentityKey {
        self.key.entity_key
    }

    pub fn into_record(self) -> E {
        self.record
    }

    pub fn shape_eq(&self, other: Option<Shape<'_, E>>) -> bool {
        compare::history_eq(self, other)
    }

    pub fn shape_cmp(&self, other: Option<Shape<'_, E>>) -> Result<Ordering> {
        compare::history_cmp(self, other)
    }

    pub fn structural_hash(&self) -> u32 {
        compare::history_hash(self)
    }
}

impl<E: Entity> PartialEq for History<E> {
    fn eq(&self, other: &Self) -> bool {
        compare::compare_histories(self, other).is_eq()
    }
}

impl<E: Entity> Eq for History<E> {}

impl<E: Entity> PartialOrd for History<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E: Entity> Ord for History<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        compare::compare_histories(self, other)
    }
}

impl<E: Entity> std::hash::Hash for History<E> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u32(self.structural_hash());
    }
}
