//! Session-scoped handle for audited operations.
//!
//! A `SessionHandle` carries one [`AuditContext`]. Every mutation made
//! through it is stamped with the handle's user and recorded in history
//! under the handle's cluster and session.

use cfsec_kernel::{AuditContext, Entity, History, IdentityKey, IndexKey, Value};
use cfsec_schema::SecSession;
use tracing::info;

use crate::cfsec::CfSec;
use crate::error::{CfSecError, Result};

/// Operations on any entity, acting as one session.
///
/// # Example
///
/// ```ignore
/// let session = db.login(cluster_id, &user, None)?;
///
/// let mut node = HostNode::new();
/// node.set_cluster_id(cluster_id)?;
/// node.set_description("primary")?;
/// node.set_host_name("node-1.example.org")?;
/// session.create(&mut node)?;
///
/// let nodes: Vec<HostNode> =
///     session.find_by_index("ClusterIdx", vec![Value::key(cluster_id)])?;
///
/// session.logout()?;
/// ```
#[derive(Clone)]
pub struct SessionHandle {
    db: CfSec,
    ctx: AuditContext,
}

impl SessionHandle {
    pub(crate) fn new(db: CfSec, ctx: AuditContext) -> Self {
        Self { db, ctx }
    }

    pub fn context(&self) -> &AuditContext {
        &self.ctx
    }

    pub fn cluster_id(&self) -> IdentityKey {
        self.ctx.cluster_id
    }

    pub fn session_id(&self) -> IdentityKey {
        self.ctx.session_id
    }

    pub fn user_id(&self) -> IdentityKey {
        self.ctx.user_id
    }

    /// Returns the owning `CfSec`.
    pub fn db(&self) -> &CfSec {
        &self.db
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Creates `record`. On success it holds the stored image.
    pub fn create<E: Entity>(&self, record: &mut E) -> Result<E> {
        Ok(self.db.controller::<E>()?.create(&self.ctx, record)?)
    }

    pub fn update<E: Entity>(&self, record: &E) -> Result<E> {
        Ok(self.db.controller::<E>()?.update(&self.ctx, record)?)
    }

    pub fn delete<E: Entity>(&self, record: &E) -> Result<()> {
        Ok(self.db.controller::<E>()?.delete(&self.ctx, record)?)
    }

    pub fn delete_by_key<E: Entity>(&self, key: &IdentityKey) -> Result<bool> {
        Ok(self.db.controller::<E>()?.delete_by_key(&self.ctx, key)?)
    }

    /// Deletes every row matching the index values.
    pub fn delete_by_index<E: Entity>(&self, index: &str, values: Vec<Value>) -> Result<usize> {
        let key = IndexKey::new::<E>(index, values)?;
        Ok(self.db.controller::<E>()?.delete_by_index(&self.ctx, &key)?)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn find<E: Entity>(&self, key: &IdentityKey) -> Result<Option<E>> {
        Ok(self.db.controller::<E>()?.find(key)?)
    }

    pub fn find_all<E: Entity>(&self) -> Result<Vec<E>> {
        Ok(self.db.controller::<E>()?.find_all()?)
    }

    pub fn find_by_index<E: Entity>(&self, index: &str, values: Vec<Value>) -> Result<Vec<E>> {
        let key = IndexKey::new::<E>(index, values)?;
        Ok(self.db.controller::<E>()?.find_by_index(&key)?)
    }

    pub fn find_one_by_index<E: Entity>(
        &self,
        index: &str,
        values: Vec<Value>,
    ) -> Result<Option<E>> {
        let key = IndexKey::new::<E>(index, values)?;
        Ok(self.db.controller::<E>()?.find_one_by_index(&key)?)
    }

    /// Reads a row for update while holding the table's write lock.
    pub fn lock<E: Entity>(&self, key: &IdentityKey) -> Result<Option<E>> {
        Ok(self.db.controller::<E>()?.lock(key)?)
    }

    /// Reads every row matching an index for update.
    pub fn lock_by_index<E: Entity>(&self, index: &str, values: Vec<Value>) -> Result<Vec<E>> {
        let key = IndexKey::new::<E>(index, values)?;
        Ok(self.db.controller::<E>()?.lock_by_index(&key)?)
    }

    pub fn history<E: Entity>(&self, key: &IdentityKey) -> Result<Vec<History<E>>> {
        Ok(self.db.controller::<E>()?.history(key)?)
    }

    // ------------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------------

    /// The `SecSession` row behind this handle, if it is still open.
    pub fn session_row(&self) -> Result<Option<SecSession>> {
        let row = self.find::<SecSession>(&self.ctx.session_id)?;
        Ok(row.filter(|session| session.finish().is_none()))
    }

    /// Stamps the session's finish time and consumes the handle.
    pub fn logout(self) -> Result<SecSession> {
        let mut session = self.session_row()?.ok_or(CfSecError::SessionClosed {
            session: self.ctx.session_id,
        })?;

        session.set_finish(Some(self.db.clock().now()));
        let stored = self.update(&session)?;

        info!(session = %stored.pkey(), "session closed");
        Ok(stored)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}
