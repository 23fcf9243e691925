//! Tenants and their security groups.

use cfsec_kernel::define_entity;

use crate::cluster::Cluster;
use crate::security::SecUser;

define_entity! {
    /// A customer partition inside a cluster.
    pub struct Tenant("Tenant") {
        keys {
            required cluster_id: Cluster ["requiredClusterId"]
                => set_cluster_id, container_cluster, set_container_cluster;
        }
        scalars {
            tenant_name: Text(192) ["requiredTenantName"] => set_tenant_name;
        }
        indexes {
            index "ClusterIdx" => ["cluster_id"];
            unique "UNameIdx" => ["cluster_id", "tenant_name"];
        }
    }
}

define_entity! {
    /// A named group of users within one tenant.
    pub struct TSecGroup("TSecGroup") {
        keys {
            required tenant_id: Tenant ["requiredTenantId"]
                => set_tenant_id, container_tenant, set_container_tenant;
        }
        scalars {
            name: Text(64) ["requiredName"] => set_name;
            is_visible: Boolean() ["requiredIsVisible"] => set_is_visible;
        }
        indexes {
            index "TenantIdx" => ["tenant_id"];
            index "TenantVisIdx" => ["tenant_id", "is_visible"];
            unique "UNameIdx" => ["tenant_id", "name"];
        }
    }
}

define_entity! {
    /// Nests one tenant group inside another.
    pub struct TSecGrpInc("TSecGrpInc") {
        keys {
            required tenant_id: Tenant ["requiredTenantId"]
                => set_tenant_id, owner_tenant, set_owner_tenant;
            required tsec_group_id: TSecGroup ["requiredTSecGroupId"]
                => set_tsec_group_id, container_group, set_container_group;
            required include_group_id: TSecGroup ["requiredIncludeGroupId"]
                => set_include_group_id, parent_sub_group, set_parent_sub_group;
        }
        scalars {}
        indexes {
            index "TenantIdx" => ["tenant_id"];
            index "GroupIdx" => ["tenant_id", "tsec_group_id"];
            index "IncludeIdx" => ["tenant_id", "include_group_id"];
            unique "UIncludeIdx" => ["tenant_id", "tsec_group_id", "include_group_id"];
        }
    }
}

define_entity! {
    /// Places a user in a tenant group.
    pub struct TSecGrpMemb("TSecGrpMemb") {
        keys {
            required tenant_id: Tenant ["requiredTenantId"]
                => set_tenant_id, owner_tenant, set_owner_tenant;
            required tsec_group_id: TSecGroup ["requiredTSecGroupId"]
                => set_tsec_group_id, container_group, set_container_group;
            required sec_user_id: SecUser ["requiredSecUserId"]
                => set_sec_user_id, parent_user, set_parent_user;
        }
        scalars {}
        indexes {
            index "TenantIdx" => ["tenant_id"];
            index "GroupIdx" => ["tenant_id", "tsec_group_id"];
            index "UserIdx" => ["tenant_id", "sec_user_id"];
            unique "UUserIdx" => ["tenant_id", "tsec_group_id", "sec_user_id"];
        }
    }
}
