//! # CFSec
//!
//! Audited, revisioned persistence core for cluster security data.
//!
//! Every row carries an identity key, a revision used as an optimistic lock
//! token, and an audit stamp. Every create, update and delete appends a
//! history row keyed by the acting cluster, session and revision.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            CfSec                             │
//! │  ┌───────────┐   ┌────────────┐   ┌───────────┐   ┌────────┐ │
//! │  │  Session  │ → │ Controller │ → │   Table   │ + │History │ │
//! │  │ (context) │   │(rev/audit) │   │ (rows)    │   │ (rows) │ │
//! │  └───────────┘   └────────────┘   └───────────┘   └────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use cfsec::{CfSec, CfSecConfig, SecUser};
//!
//! let db = CfSec::in_memory(CfSecConfig::default())?;
//! let cluster = db.bootstrap()?;
//!
//! let mut user = SecUser::new();
//! user.set_login_id("alice")?;
//! user.set_email_address("alice@example.org")?;
//! user.set_password_hash("$argon2id$...")?;
//! db.system(cluster.pkey()).create(&mut user)?;
//!
//! let session = db.login(cluster.pkey(), &user, Some("laptop"))?;
//! ```
//!
//! # Modules
//!
//! - **SDK Layer**: [`CfSec`], [`SessionHandle`]
//! - **Schema**: every entity type, re-exported from `cfsec-schema`
//! - **Kernel**: controller, comparator and storage seams from `cfsec-kernel`

mod cfsec;
mod error;
mod session;
pub mod telemetry;

// SDK Layer - Main API
pub use cfsec::{CfSec, controller_options};
pub use error::{CfSecError, Result};
pub use session::SessionHandle;

// Re-export configuration
pub use cfsec_config::{CfSecConfig, ConfigError, ConfigLoader};

// Re-export core types
pub use cfsec_types::{AuditAction, AuditEnvelope, AuditStamp, IdentityKey, Revision, Timestamp};

// Re-export kernel types
pub use cfsec_kernel::{
    AuditContext, Clock, CollisionReason, Controller, ControllerOptions, Entity, History,
    HistoryKey, HistoryPolicy, IndexKey, KernelError, Registry, Shape, StorageError, Value,
};

// Re-export the entity set
pub use cfsec_schema::{
    Cluster, HostNode, IsoCcy, IsoCtry, IsoLang, IsoTZone, SecGroup, SecGrpInc, SecGrpMemb,
    SecSession, SecUser, Service, ServiceType, TSecGroup, TSecGrpInc, TSecGrpMemb, Tenant,
};
