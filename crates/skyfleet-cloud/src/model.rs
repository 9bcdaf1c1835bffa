//! Normalized catalog model
//!
//! Provider capability snapshots as consumed by ranking. The catalog crate
//! builds these from federation-registry records; nothing here knows about
//! the wire format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::CloudError;

/// Kind of cloud service a provider exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    Compute,
    BlockStorage,
    Network,
    ObjectStore,
    Identity,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Compute => "compute",
            ServiceType::BlockStorage => "block-storage",
            ServiceType::Network => "network",
            ServiceType::ObjectStore => "object-store",
            ServiceType::Identity => "identity",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = CloudError;

    /// Accepts `block-storage`, `block_storage` and `BLOCK_STORAGE` alike
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace('-', "_").to_ascii_uppercase().as_str() {
            "COMPUTE" => Ok(ServiceType::Compute),
            "BLOCK_STORAGE" => Ok(ServiceType::BlockStorage),
            "NETWORK" => Ok(ServiceType::Network),
            "OBJECT_STORE" => Ok(ServiceType::ObjectStore),
            "IDENTITY" => Ok(ServiceType::Identity),
            _ => Err(CloudError::Resolution(format!("unknown service type: {s}"))),
        }
    }
}

/// VM image offered by a compute service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
    pub architecture: Option<String>,
    pub os_type: Option<String>,
    pub os_distro: Option<String>,
    pub os_version: Option<String>,
    pub gpu_driver: bool,
    pub cuda_support: bool,
}

/// Instance size offered by a compute service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
    /// RAM in MiB
    pub ram: f64,
    pub vcpus: u32,
    /// Root disk in GiB
    pub disk: f64,
    pub gpus: u32,
    pub gpu_vendor: Option<String>,
    pub gpu_model: Option<String>,
    pub infiniband: bool,
}

/// Compute-only attachments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeDetails {
    pub images: Vec<Image>,
    pub flavors: Vec<Flavor>,
    /// Shared default network
    pub public_network: Option<String>,
    /// Non-shared default network
    pub private_network: Option<String>,
    pub private_network_proxy_host: Option<String>,
    pub private_network_proxy_user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceDetails {
    Compute(ComputeDetails),
    Plain,
}

/// A concrete service offered by one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudService {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub service_type: ServiceType,
    pub provider_id: String,
    /// Provisioning backend kind (e.g. "openstack", "kubernetes")
    pub provider_type: String,
    pub public: bool,
    /// Project / tenant name on the provider
    pub tenant: String,
    pub region: String,
    pub hostname: Option<String>,
    pub details: ServiceDetails,
}

impl CloudService {
    pub fn compute(&self) -> Option<&ComputeDetails> {
        match &self.details {
            ServiceDetails::Compute(details) => Some(details),
            ServiceDetails::Plain => None,
        }
    }

    /// Endpoint record persisted on a deployment once this service is chosen
    pub fn to_endpoint(&self) -> CloudProviderEndpoint {
        CloudProviderEndpoint {
            provider_id: self.provider_id.clone(),
            provider_type: self.provider_type.clone(),
            service_id: self.id.clone(),
            service_type: self.service_type,
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            tenant: self.tenant.clone(),
        }
    }
}

/// Capability snapshot of a single provider, scoped to one user group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub provider_id: String,
    pub provider_name: String,
    /// Services indexed by service id
    pub services: BTreeMap<String, CloudService>,
}

impl ProviderCapabilities {
    pub fn services_of(&self, service_type: ServiceType) -> impl Iterator<Item = &CloudService> {
        self.services
            .values()
            .filter(move |s| s.service_type == service_type)
    }
}

/// A ranked offering eligible for a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateService {
    pub provider_id: String,
    pub provider_name: String,
    /// Service of the primary requested type
    pub service: CloudService,
    /// Services of the other requested types on the same provider
    pub companions: Vec<CloudService>,
    pub score: f64,
}

impl CandidateService {
    pub fn to_endpoint(&self) -> CloudProviderEndpoint {
        self.service.to_endpoint()
    }
}

impl std::fmt::Display for CandidateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} (score {})", self.provider_id, self.service.id, self.score)
    }
}

/// Where a deployment lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudProviderEndpoint {
    pub provider_id: String,
    pub provider_type: String,
    pub service_id: String,
    pub service_type: ServiceType,
    pub endpoint: String,
    pub region: String,
    pub tenant: String,
}

impl std::fmt::Display for CloudProviderEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({})", self.provider_id, self.service_id, self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_parsing_normalizes_separators() {
        assert_eq!("compute".parse::<ServiceType>().unwrap(), ServiceType::Compute);
        assert_eq!(
            "block-storage".parse::<ServiceType>().unwrap(),
            ServiceType::BlockStorage
        );
        assert_eq!(
            "OBJECT_STORE".parse::<ServiceType>().unwrap(),
            ServiceType::ObjectStore
        );
        assert!("dns".parse::<ServiceType>().is_err());
    }

    #[test]
    fn test_service_type_serde_is_kebab_case() {
        let json = serde_json::to_string(&ServiceType::ObjectStore).unwrap();
        assert_eq!(json, "\"object-store\"");
        assert_eq!(ServiceType::BlockStorage.to_string(), "block-storage");
    }
}
