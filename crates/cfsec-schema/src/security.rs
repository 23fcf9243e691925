//! Users, sessions and cluster-scoped security groups.

use cfsec_kernel::define_entity;

use crate::cluster::Cluster;

define_entity! {
    /// A login identity. Users are global; group membership scopes them.
    pub struct SecUser("SecUser") {
        keys {}
        scalars {
            login_id: Text(32) ["requiredLoginId"] => set_login_id;
            email_address: Text(192) ["requiredEMailAddress"] => set_email_address;
            email_confirm_uuid: OptText(36) ["optionalEMailConfirmUuid"]
                => set_email_confirm_uuid;
            password_hash: Text(256) ["requiredPasswordHash"] => set_password_hash;
            password_reset_uuid: OptText(36) ["optionalPasswordResetUuid"]
                => set_password_reset_uuid;
        }
        indexes {
            unique "ULoginIdx" => ["login_id"];
            unique "UEMAddrIdx" => ["email_address"];
        }
    }
}

define_entity! {
    /// One login session, optionally acting on behalf of a proxy user.
    pub struct SecSession("SecSession") {
        keys {
            required sec_user_id: SecUser ["requiredSecUserId"]
                => set_sec_user_id, container_sec_user, set_container_sec_user;
            optional sec_proxy_id: SecUser ["optionalSecProxyId"]
                => set_sec_proxy_id, parent_sec_proxy, set_parent_sec_proxy;
        }
        scalars {
            sec_dev_name: OptText(127) ["optionalSecDevName"] => set_sec_dev_name;
            start: Timestamp() ["requiredStart"] => set_start;
            finish: OptTimestamp() ["optionalFinish"] => set_finish;
        }
        indexes {
            index "SecUserIdx" => ["sec_user_id"];
            index "SecDevIdx" => ["sec_user_id", "sec_dev_name"];
            unique "StartIdx" => ["sec_user_id", "start"];
            index "FinishIdx" => ["sec_user_id", "finish"];
            index "SecProxyIdx" => ["sec_proxy_id"];
        }
    }
}

define_entity! {
    /// A named group of users within one cluster.
    pub struct SecGroup("SecGroup") {
        keys {
            required cluster_id: Cluster ["requiredClusterId"]
                => set_cluster_id, container_cluster, set_container_cluster;
        }
        scalars {
            name: Text(64) ["requiredName"] => set_name;
            is_visible: Boolean() ["requiredIsVisible"] => set_is_visible;
        }
        indexes {
            index "ClusterIdx" => ["cluster_id"];
            index "ClusterVisIdx" => ["cluster_id", "is_visible"];
            unique "UNameIdx" => ["cluster_id", "name"];
        }
    }
}

define_entity! {
    /// Nests one cluster group inside another.
    pub struct SecGrpInc("SecGrpInc") {
        keys {
            required cluster_id: Cluster ["requiredClusterId"]
                => set_cluster_id, owner_cluster, set_owner_cluster;
            required sec_group_id: SecGroup ["requiredSecGroupId"]
                => set_sec_group_id, container_group, set_container_group;
            required include_group_id: SecGroup ["requiredIncludeGroupId"]
                => set_include_group_id, parent_sub_group, set_parent_sub_group;
        }
        scalars {}
        indexes {
            index "ClusterIdx" => ["cluster_id"];
            index "GroupIdx" => ["cluster_id", "sec_group_id"];
            index "IncludeIdx" => ["cluster_id", "include_group_id"];
            unique "UIncludeIdx" => ["cluster_id", "sec_group_id", "include_group_id"];
        }
    }
}

define_entity! {
    /// Places a user in a cluster group.
    pub struct SecGrpMemb("SecGrpMemb") {
        keys {
            required cluster_id: Cluster ["requiredClusterId"]
                => set_cluster_id, owner_cluster, set_owner_cluster;
            required sec_group_id: SecGroup ["requiredSecGroupId"]
                => set_sec_group_id, container_group, set_container_group;
            required sec_user_id: SecUser ["requiredSecUserId"]
                => set_sec_user_id, parent_user, set_parent_user;
        }
        scalars {}
        indexes {
            index "ClusterIdx" => ["cluster_id"];
            index "GroupIdx" => ["cluster_id", "sec_group_id"];
            index "UserIdx" => ["cluster_id", "sec_user_id"];
            unique "UUserIdx" => ["cluster_id", "sec_group_id", "sec_user_id"];
        }
    }
}
