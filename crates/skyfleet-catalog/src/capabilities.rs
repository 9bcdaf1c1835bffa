//! Provider capability snapshots built from a project record

use crate::error::{CatalogError, Result};
use crate::fedreg::{self, Project};
use skyfleet_cloud::{
    CloudService, ComputeDetails, Flavor, Image, ProviderCapabilities, ServiceDetails,
    ServiceType,
};
use std::collections::BTreeMap;

fn default_networks(project: &Project) -> ComputeDetails {
    project
        .networks
        .iter()
        .filter(|n| n.is_default)
        .fold(ComputeDetails::default(), |mut details, network| {
            if network.is_shared {
                details.public_network = Some(network.name.clone());
            } else {
                details.private_network = Some(network.name.clone());
                details.private_network_proxy_host = network.proxy_host.clone();
                details.private_network_proxy_user = network.proxy_user.clone();
            }
            details
        })
}

fn image(image: &fedreg::Image) -> Image {
    Image {
        id: image.uid.clone(),
        name: image.name.clone(),
        architecture: image.architecture.clone(),
        os_type: image.os_type.clone(),
        os_distro: image.os_distro.clone(),
        os_version: image.os_version.clone(),
        gpu_driver: image.gpu_driver,
        cuda_support: image.cuda_support,
    }
}

fn flavor(flavor: &fedreg::Flavor) -> Flavor {
    Flavor {
        id: flavor.uid.clone(),
        name: flavor.name.clone(),
        ram: flavor.ram as f64,
        vcpus: flavor.vcpus,
        disk: flavor.disk as f64,
        gpus: flavor.gpus,
        gpu_vendor: flavor.gpu_vendor.clone(),
        gpu_model: flavor.gpu_model.clone(),
        infiniband: flavor.infiniband,
    }
}

/// Identity endpoint of the region a service lives in
fn region_endpoint<'a>(project: &'a Project, service: &fedreg::Service) -> Result<(&'a str, &'a str)> {
    let region_name = service
        .region
        .as_ref()
        .map(|r| r.name.as_str())
        .ok_or_else(|| {
            CatalogError::InvalidRecord(format!("service {} has no region", service.uid))
        })?;

    let region = project
        .provider
        .regions
        .iter()
        .find(|r| r.name == region_name)
        .ok_or_else(|| {
            CatalogError::MissingRecord(format!(
                "region {} of service {} is not listed by provider {}",
                region_name, service.uid, project.provider.uid
            ))
        })?;

    let identity = region.identity_services.first().ok_or_else(|| {
        CatalogError::MissingRecord(format!(
            "region {} of provider {} has no identity service",
            region.name, project.provider.uid
        ))
    })?;

    Ok((region.name.as_str(), identity.endpoint.as_str()))
}

fn hostname(endpoint: &str) -> Option<String> {
    match reqwest::Url::parse(endpoint) {
        Ok(url) => url.host_str().map(str::to_string),
        Err(e) => {
            tracing::warn!(endpoint, error = %e, "Unparsable identity endpoint");
            None
        }
    }
}

/// Fold a project into the provider's capability snapshot
///
/// Usage and per-user quotas are skipped. Compute services carry the
/// project's images, flavors and default networks.
pub fn build_capabilities(project: &Project) -> Result<ProviderCapabilities> {
    let compute = ComputeDetails {
        images: project.images.iter().map(image).collect(),
        flavors: project.flavors.iter().map(flavor).collect(),
        ..default_networks(project)
    };

    let services = project
        .quotas
        .iter()
        .filter(|q| !q.usage && !q.per_user)
        .try_fold(
            BTreeMap::new(),
            |mut services: BTreeMap<String, CloudService>, quota| -> Result<_> {
                let service = &quota.service;
                let Ok(service_type) = service.service_type.parse::<ServiceType>() else {
                    tracing::warn!(
                        service = %service.uid,
                        service_type = %service.service_type,
                        "Skipping service of unrecognized type"
                    );
                    return Ok(services);
                };

                let (region, endpoint) = region_endpoint(project, service)?;
                let details = match service_type {
                    ServiceType::Compute => ServiceDetails::Compute(compute.clone()),
                    _ => ServiceDetails::Plain,
                };

                services.insert(
                    service.uid.clone(),
                    CloudService {
                        id: service.uid.clone(),
                        name: service.name.clone(),
                        endpoint: endpoint.to_string(),
                        service_type,
                        provider_id: project.provider.uid.clone(),
                        provider_type: project.provider.provider_type.clone(),
                        public: project.provider.is_public,
                        tenant: project.name.clone(),
                        region: region.to_string(),
                        hostname: hostname(endpoint),
                        details,
                    },
                );
                Ok(services)
            },
        )?;

    Ok(ProviderCapabilities {
        provider_id: project.provider.uid.clone(),
        provider_name: project.provider.name.clone(),
        services,
    })
}
