//! Cluster topology: the cluster, its hosts, service types and services.

use cfsec_kernel::define_entity;

define_entity! {
    /// A named deployment. Owns hosts, services, security groups and tenants.
    pub struct Cluster("Cluster") {
        keys {}
        scalars {
            full_dom_name: Text(192) ["requiredFullDomName"] => set_full_dom_name;
            description: Text(128) ["requiredDescription"] => set_description;
        }
        indexes {
            unique "UDomNameIdx" => ["full_dom_name"];
            unique "UDescrIdx" => ["description"];
        }
    }
}

define_entity! {
    /// A machine participating in a cluster.
    pub struct HostNode("HostNode") {
        keys {
            required cluster_id: Cluster ["requiredClusterId"]
                => set_cluster_id, container_cluster, set_container_cluster;
        }
        scalars {
            description: Text(255) ["requiredDescription"] => set_description;
            host_name: Text(192) ["requiredHostName"] => set_host_name;
        }
        indexes {
            index "ClusterIdx" => ["cluster_id"];
            unique "UDescrIdx" => ["cluster_id", "description"];
            unique "HostNameIdx" => ["cluster_id", "host_name"];
        }
    }
}

define_entity! {
    /// A kind of service a host can run.
    pub struct ServiceType("ServiceType") {
        keys {}
        scalars {
            description: Text(64) ["requiredDescription"] => set_description;
        }
        indexes {
            unique "UDescrIdx" => ["description"];
        }
    }
}

define_entity! {
    /// A service of one type listening on one host port.
    pub struct Service("Service") {
        keys {
            required cluster_id: Cluster ["requiredClusterId"]
                => set_cluster_id, owner_cluster, set_owner_cluster;
            required host_node_id: HostNode ["requiredHostNodeId"]
                => set_host_node_id, container_host, set_container_host;
            required service_type_id: ServiceType ["requiredServiceTypeId"]
                => set_service_type_id, parent_service_type, set_parent_service_type;
        }
        scalars {
            host_port: SmallInt(0, 32767) ["requiredHostPort"] => set_host_port;
        }
        indexes {
            index "ClusterIdx" => ["cluster_id"];
            index "HostIdx" => ["cluster_id", "host_node_id"];
            index "TypeIdx" => ["service_type_id"];
            unique "UTypeIdx" => ["cluster_id", "host_node_id", "service_type_id"];
            unique "UHostPortIdx" => ["cluster_id", "host_node_id", "host_port"];
        }
    }
}
