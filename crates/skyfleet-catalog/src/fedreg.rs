//! Federation registry wire types
//!
//! Records as returned by the registry with `with_conn=true`, i.e. with
//! their relationships expanded inline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroup {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub slas: Vec<Sla>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sla {
    pub uid: String,
    pub doc_uuid: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub provider: Provider,
    #[serde(default)]
    pub quotas: Vec<Quota>,
    #[serde(default)]
    pub networks: Vec<Network>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub flavors: Vec<Flavor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub uid: String,
    pub name: String,
    /// Backend kind, e.g. "openstack" or "kubernetes"
    #[serde(rename = "type")]
    pub provider_type: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub support_emails: Vec<String>,
    #[serde(default)]
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub identity_services: Vec<IdentityService>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityService {
    pub uid: String,
    pub endpoint: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRef {
    pub uid: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub uid: String,
    pub name: String,
    pub endpoint: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub region: Option<RegionRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub uid: String,
    #[serde(default)]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub proxy_host: Option<String>,
    #[serde(default)]
    pub proxy_user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub uid: String,
    #[serde(default)]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub os_type: Option<String>,
    #[serde(default)]
    pub os_distro: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub gpu_driver: bool,
    #[serde(default)]
    pub cuda_support: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flavor {
    pub uid: String,
    #[serde(default)]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub ram: u64,
    #[serde(default)]
    pub vcpus: u32,
    #[serde(default)]
    pub disk: u64,
    #[serde(default)]
    pub gpus: u32,
    #[serde(default)]
    pub gpu_vendor: Option<String>,
    #[serde(default)]
    pub gpu_model: Option<String>,
    #[serde(default)]
    pub infiniband: bool,
}

/// Quota attached to a project's service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quota {
    pub uid: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Ceiling applies to each user rather than the whole group
    #[serde(default)]
    pub per_user: bool,
    /// Point-in-time usage snapshot, not an allocation
    #[serde(default)]
    pub usage: bool,
    pub service: Service,
    #[serde(flatten)]
    pub limits: QuotaLimits,
}

/// Quota dimensions by quota kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QuotaLimits {
    Compute {
        #[serde(default)]
        cores: Option<u64>,
        #[serde(default)]
        instances: Option<u64>,
        #[serde(default)]
        ram: Option<u64>,
    },
    BlockStorage {
        #[serde(default)]
        gigabytes: Option<u64>,
        #[serde(default)]
        per_volume_gigabytes: Option<u64>,
        #[serde(default)]
        volumes: Option<u64>,
    },
    Network {
        #[serde(default)]
        public_ips: Option<u64>,
        #[serde(default)]
        networks: Option<u64>,
        #[serde(default)]
        ports: Option<u64>,
        #[serde(default)]
        security_groups: Option<u64>,
        #[serde(default)]
        security_group_rules: Option<u64>,
    },
    ObjectStore {
        #[serde(default)]
        bytes: Option<u64>,
        #[serde(default)]
        containers: Option<u64>,
        #[serde(default)]
        objects: Option<u64>,
    },
    #[serde(other)]
    Unknown,
}

impl QuotaLimits {
    /// Restriction dimensions carried by this quota, unset ones omitted
    pub fn restriction_fields(&self) -> Vec<(&'static str, u64)> {
        let fields: Vec<(&'static str, Option<u64>)> = match self {
            QuotaLimits::Compute {
                cores,
                instances,
                ram,
            } => vec![("cores", *cores), ("instances", *instances), ("ram", *ram)],
            QuotaLimits::BlockStorage {
                gigabytes,
                per_volume_gigabytes,
                volumes,
            } => vec![
                ("gigabytes", *gigabytes),
                ("per_volume_gigabytes", *per_volume_gigabytes),
                ("volumes", *volumes),
            ],
            QuotaLimits::Network {
                public_ips,
                networks,
                ports,
                security_groups,
                security_group_rules,
            } => vec![
                ("public_ips", *public_ips),
                ("networks", *networks),
                ("ports", *ports),
                ("security_groups", *security_groups),
                ("security_group_rules", *security_group_rules),
            ],
            QuotaLimits::ObjectStore {
                bytes,
                containers,
                objects,
            } => vec![
                ("bytes", *bytes),
                ("containers", *containers),
                ("objects", *objects),
            ],
            QuotaLimits::Unknown => Vec::new(),
        };
        fields
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect()
    }
}
