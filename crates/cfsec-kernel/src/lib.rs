//! # cfsec-kernel: revisioned persistence engine for `CFSec`
//!
//! The kernel holds everything that is the same for every entity type:
//! field tables, the structural comparator, history rows, index-key
//! projections, the schema registry, the storage seams and the
//! revision/audit controller. Concrete entities are declared with
//! [`define_entity!`] in `cfsec-schema`.
//!
//! ## Key Principles
//!
//! - **Validate before mutating**: setters and controller preconditions fail
//!   without touching the record or storage
//! - **Revision as lock token**: every update carries the revision it was
//!   read at; storage advances it atomically with the write
//! - **Every change is audited**: create, update and delete append history
//!   rows, and a failed append undoes the row write
//! - **Explicit collaborators**: tables, history stores, clock and registry
//!   are passed in, never looked up globally
//!
//! ## Architecture
//!
//! - [`entity`]: the [`Entity`] trait and the `define_entity!` macro
//! - [`field`]: field and index tables, setter validation
//! - [`value`]: field values for comparison, indexing and hashing
//! - [`history`]: history rows and their composite key
//! - [`index`]: index-key projections
//! - [`compare`]: the structural comparator
//! - [`registry`]: entity type to table map used by foreign-key resolvers
//! - [`traits`]: `Table`, `HistoryTable` and `Clock` seams
//! - [`runtime`]: in-memory tables and the system clock
//! - [`controller`]: create/update/delete protocol
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cfsec_kernel::{AuditContext, Controller, ControllerOptions, MemoryHistory, MemoryTable, SystemClock};
//!
//! let controller = Controller::<HostNode>::new(
//!     Arc::new(MemoryTable::new()),
//!     Arc::new(MemoryHistory::new()),
//!     Arc::new(SystemClock::new()),
//!     ControllerOptions::default(),
//! );
//!
//! let mut node = HostNode::new();
//! node.set_cluster_id(cluster_key)?;
//! node.set_description("primary")?;
//! let stored = controller.create(&ctx, &mut node)?;
//! ```

pub mod compare;
pub mod controller;
pub mod entity;
pub mod error;
pub mod field;
pub mod history;
pub mod index;
pub mod registry;
pub mod runtime;
pub mod traits;
pub mod value;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use cfsec_types::{AuditAction, AuditEnvelope, AuditStamp, IdentityKey, Revision, Timestamp};
pub use compare::Shape;
pub use controller::{AuditContext, Controller, ControllerOptions, HistoryPolicy};
pub use entity::{Entity, ParentRef};
pub use error::{CollisionReason, KernelError, Result};
pub use field::{Bounds, FieldDef, FieldKind, IndexDef};
pub use history::{History, HistoryKey};
pub use index::IndexKey;
pub use registry::{Registry, RegistryBuilder};
pub use runtime::{MemoryHistory, MemoryTable, SystemClock};
pub use traits::{Clock, HistoryTable, Inserted, StorageError, Table};
pub use value::Value;
