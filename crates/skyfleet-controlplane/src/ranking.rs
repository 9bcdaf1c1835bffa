//! Provider ranking and selection

use crate::iterator::CandidateIterator;
use skyfleet_catalog::{PreferenceModel, Resolve};
use skyfleet_cloud::{
    CandidateService, CloudError, CloudService, ProviderCapabilities, Result, ServiceType, TokenId,
};

/// Minimal capability requirements a service must meet to be a candidate
pub trait CandidateFilter: Send + Sync {
    fn accepts(&self, service: &CloudService) -> bool;
}

/// Compute services must offer at least one image and one flavor
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalCapabilities;

impl CandidateFilter for MinimalCapabilities {
    fn accepts(&self, service: &CloudService) -> bool {
        match service.service_type {
            ServiceType::Compute => service
                .compute()
                .is_some_and(|c| !c.images.is_empty() && !c.flavors.is_empty()),
            _ => true,
        }
    }
}

fn eligible<'a>(
    preferences: &'a PreferenceModel,
    capabilities: &'a ProviderCapabilities,
    service_type: ServiceType,
    filter: &'a dyn CandidateFilter,
) -> impl Iterator<Item = &'a CloudService> {
    capabilities
        .services_of(service_type)
        .filter(move |s| preferences.accepts_service(service_type, &s.id) && filter.accepts(s))
}

fn describe(requested: &[ServiceType]) -> String {
    requested
        .iter()
        .map(ServiceType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Companion services of the non-primary types, one per type
fn companions(
    preferences: &PreferenceModel,
    capabilities: &ProviderCapabilities,
    others: &[ServiceType],
    filter: &dyn CandidateFilter,
) -> Option<Vec<CloudService>> {
    others
        .iter()
        .map(|t| eligible(preferences, capabilities, *t, filter).next().cloned())
        .collect()
}

/// Sum of the provider's weights over every requested type
///
/// `None` when the provider has no priority for one of the types.
fn score(preferences: &PreferenceModel, provider_id: &str, requested: &[ServiceType]) -> Option<f64> {
    requested
        .iter()
        .map(|t| preferences.provider_weight(provider_id, *t))
        .sum()
}

/// Order every eligible offering by descending score
///
/// The first requested type is the primary one: each of its accepted
/// services on a qualifying provider becomes a candidate. A provider
/// qualifies when it has a priority and an accepted service for every
/// requested type. Ties break on provider id, then service id.
pub fn rank_candidates(
    preferences: &PreferenceModel,
    capabilities: &[ProviderCapabilities],
    requested: &[ServiceType],
    filter: &dyn CandidateFilter,
) -> Result<Vec<CandidateService>> {
    let (primary, others) = requested
        .split_first()
        .ok_or_else(|| CloudError::Selection("no service type requested".to_string()))?;

    let mut candidates = Vec::new();
    for caps in capabilities {
        let Some(score) = score(preferences, &caps.provider_id, requested) else {
            tracing::debug!(provider = %caps.provider_id, "Provider lacks a priority for a requested type");
            continue;
        };
        let Some(companions) = companions(preferences, caps, others, filter) else {
            tracing::debug!(provider = %caps.provider_id, "Provider lacks a companion service");
            continue;
        };

        candidates.extend(
            eligible(preferences, caps, *primary, filter).map(|service| CandidateService {
                provider_id: caps.provider_id.clone(),
                provider_name: caps.provider_name.clone(),
                service: service.clone(),
                companions: companions.clone(),
                score,
            }),
        );
    }

    if candidates.is_empty() {
        return Err(CloudError::Selection(format!(
            "no provider satisfies the requested service types ({}) for user group {}",
            describe(requested),
            preferences.user_group_name
        )));
    }

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.provider_id.cmp(&b.provider_id))
            .then_with(|| a.service.id.cmp(&b.service.id))
    });
    Ok(candidates)
}

/// Candidate for an already chosen service, without re-ranking
pub fn pin_candidate(
    preferences: &PreferenceModel,
    capabilities: &ProviderCapabilities,
    requested: &[ServiceType],
    service_id: &str,
) -> Result<CandidateService> {
    let service = capabilities.services.get(service_id).ok_or_else(|| {
        CloudError::Resolution(format!(
            "service {} is no longer offered by provider {}",
            service_id, capabilities.provider_id
        ))
    })?;

    let companions = requested
        .iter()
        .filter(|t| **t != service.service_type)
        .filter_map(|t| capabilities.services_of(*t).find(|s| preferences.accepts_service(*t, &s.id)))
        .cloned()
        .collect();

    Ok(CandidateService {
        provider_id: capabilities.provider_id.clone(),
        provider_name: capabilities.provider_name.clone(),
        service: service.clone(),
        companions,
        score: score(preferences, &capabilities.provider_id, requested).unwrap_or_default(),
    })
}

/// Capability snapshots of every provider preferred for the primary type
///
/// A provider whose snapshot cannot be resolved is skipped; when none can
/// be resolved the first resolution error is returned.
pub async fn resolve_snapshots(
    resolver: &dyn Resolve,
    preferences: &PreferenceModel,
    primary: ServiceType,
    identity: Option<&TokenId>,
) -> Result<Vec<ProviderCapabilities>> {
    let mut snapshots = Vec::new();
    let mut first_error = None;

    for provider in preferences.providers_for(primary) {
        match resolver
            .resolve_provider_capabilities(provider, &preferences.user_group_id, identity)
            .await
        {
            Ok(caps) => snapshots.push(caps),
            Err(e) => {
                tracing::warn!(provider, error = %e, "Skipping provider");
                first_error.get_or_insert(e);
            }
        }
    }

    match (snapshots.is_empty(), first_error) {
        (true, Some(e)) => Err(e),
        _ => Ok(snapshots),
    }
}

/// Resolve, rank and wrap the result in an iterator
#[tracing::instrument(skip(resolver, filter, identity))]
pub async fn select(
    resolver: &dyn Resolve,
    identity: Option<&TokenId>,
    user_group: Option<&str>,
    requested: &[ServiceType],
    filter: &dyn CandidateFilter,
) -> Result<CandidateIterator> {
    let primary = *requested
        .first()
        .ok_or_else(|| CloudError::Selection("no service type requested".to_string()))?;

    let preferences = resolver.resolve_preferences(identity, user_group).await?;
    let snapshots = resolve_snapshots(resolver, &preferences, primary, identity).await?;
    let ranked = rank_candidates(&preferences, &snapshots, requested, filter)?;

    tracing::info!(
        candidates = ranked.len(),
        first = %ranked[0],
        "Ranked cloud providers"
    );
    CandidateIterator::new(ranked)
}
