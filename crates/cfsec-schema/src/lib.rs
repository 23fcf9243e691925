//! # cfsec-schema: the CFSec entity set
//!
//! Every persisted type is declared here with [`cfsec_kernel::define_entity!`].
//! The macro generates the struct, validating setters, foreign-key resolvers
//! and linkers, the field and index tables, and the structural comparator
//! impls. Nothing in this crate knows about storage.
//!
//! Entities fall into four groups:
//!
//! - [`cluster`]: the cluster itself, its host nodes and services
//! - [`security`]: users, sessions and cluster-scoped groups
//! - [`tenant`]: tenants and tenant-scoped groups
//! - [`iso`]: ISO reference data (currencies, countries, languages, time zones)

pub mod cluster;
pub mod iso;
pub mod security;
pub mod tenant;


pub use cluster::{Cluster, HostNode, Service, ServiceType};
pub use iso::{IsoCcy, IsoCtry, IsoLang, IsoTZone};
pub use security::{SecGroup, SecGrpInc, SecGrpMemb, SecSession, SecUser};
pub use tenant::{TSecGroup, TSecGrpInc, TSecGrpMemb, Tenant};

/// Invokes `$callback!` with every entity type, parents before children.
///
/// Used to wire one table and one controller per entity without repeating
/// the list.
#[macro_export]
macro_rules! for_each_entity {
    ($callback:ident) => {
        $callback!(
            Cluster,
            HostNode,
            ServiceType,
            Service,
            SecUser,
            SecSession,
            SecGroup,
            SecGrpInc,
            SecGrpMemb,
            Tenant,
            TSecGroup,
            TSecGrpInc,
            TSecGrpMemb,
            IsoCcy,
            IsoCtry,
            IsoLang,
            IsoTZone
        );
    };
}

/// Entity names in wiring order.
pub const ENTITY_NAMES: &[&str] = &[
    "Cluster",
    "HostNode",
    "ServiceType",
    "Service",
    "SecUser",
    "SecSession",
    "SecGroup",
    "SecGrpInc",
    "SecGrpMemb",
    "Tenant",
    "TSecGroup",
    "TSecGrpInc",
    "TSecGrpMemb",
    "ISOCcy",
    "ISOCtry",
    "ISOLang",
    "ISOTZone",
];
