//! Preference model built from a user group's SLAs

use crate::fedreg::{Quota, UserGroup};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use skyfleet_cloud::ServiceType;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Weight assigned to priorities without an override
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Priority weights applied while folding
#[derive(Debug, Clone)]
pub struct Weights {
    pub default_weight: f64,
    /// provider id -> weight
    pub overrides: HashMap<String, f64>,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            default_weight: DEFAULT_WEIGHT,
            overrides: HashMap::new(),
        }
    }
}

impl Weights {
    pub fn with_override(mut self, provider_id: impl Into<String>, weight: f64) -> Self {
        self.overrides.insert(provider_id.into(), weight);
        self
    }

    pub fn weight_for(&self, provider_id: &str) -> f64 {
        self.overrides
            .get(provider_id)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

impl From<&skyfleet_config::RankingConfig> for Weights {
    fn from(config: &skyfleet_config::RankingConfig) -> Self {
        Self {
            default_weight: config.default_weight,
            overrides: config.weights.clone(),
        }
    }
}

/// One weighted (provider, service) preference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Priority {
    pub sla_id: String,
    pub service_id: String,
    pub provider_id: String,
    pub weight: f64,
}

/// Guaranteed/limit bounds for one quota dimension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Restriction {
    pub total_guaranteed: Option<u64>,
    pub total_limit: Option<u64>,
    pub user_guaranteed: Option<u64>,
    pub user_limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRestrictions {
    pub service_id: String,
    pub service_type: ServiceType,
    /// Quota dimension -> bounds
    pub targets: BTreeMap<String, Restriction>,
}

/// Restrictions granted by one SLA on one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaRestrictions {
    pub sla_id: String,
    pub provider_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub services: Vec<ServiceRestrictions>,
}

/// Per-user-group preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceModel {
    pub user_group_id: String,
    pub user_group_name: String,
    pub priorities: BTreeMap<ServiceType, Vec<Priority>>,
    pub slas: Vec<SlaRestrictions>,
}

impl PreferenceModel {
    pub fn priorities_for(&self, service_type: ServiceType) -> &[Priority] {
        self.priorities
            .get(&service_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Weight of a provider for a service type; the highest of its priorities
    pub fn provider_weight(&self, provider_id: &str, service_type: ServiceType) -> Option<f64> {
        self.priorities_for(service_type)
            .iter()
            .filter(|p| p.provider_id == provider_id)
            .map(|p| p.weight)
            .reduce(f64::max)
    }

    pub fn accepts_service(&self, service_type: ServiceType, service_id: &str) -> bool {
        self.priorities_for(service_type)
            .iter()
            .any(|p| p.service_id == service_id)
    }

    /// Providers with at least one priority for `service_type`, sorted
    pub fn providers_for(&self, service_type: ServiceType) -> Vec<&str> {
        let mut providers: Vec<&str> = self
            .priorities_for(service_type)
            .iter()
            .map(|p| p.provider_id.as_str())
            .collect();
        providers.sort_unstable();
        providers.dedup();
        providers
    }

    pub fn restrictions_for(&self, service_id: &str) -> impl Iterator<Item = &ServiceRestrictions> {
        self.slas
            .iter()
            .flat_map(|sla| sla.services.iter())
            .filter(move |s| s.service_id == service_id)
    }
}

fn service_type_of(quota: &Quota) -> Option<ServiceType> {
    match quota.service.service_type.parse() {
        Ok(service_type) => Some(service_type),
        Err(_) => {
            tracing::warn!(
                service = %quota.service.uid,
                service_type = %quota.service.service_type,
                "Skipping quota for unrecognized service type"
            );
            None
        }
    }
}

/// Fold a user group's SLAs into its preference model
///
/// Usage snapshots never contribute. Per-user quotas only contribute
/// restriction bounds, never priorities, and each service yields at most
/// one priority.
pub fn build_preferences(user_group: &UserGroup, weights: &Weights) -> PreferenceModel {
    let mut seen_services = HashSet::new();
    let mut priorities: BTreeMap<ServiceType, Vec<Priority>> = BTreeMap::new();
    let mut slas = Vec::new();

    for sla in &user_group.slas {
        for project in &sla.projects {
            let mut services: BTreeMap<String, ServiceRestrictions> = BTreeMap::new();

            for quota in project.quotas.iter().filter(|q| !q.usage) {
                let Some(service_type) = service_type_of(quota) else {
                    continue;
                };
                let service_id = &quota.service.uid;

                if !quota.per_user && seen_services.insert(service_id.clone()) {
                    priorities.entry(service_type).or_default().push(Priority {
                        sla_id: sla.uid.clone(),
                        service_id: service_id.clone(),
                        provider_id: project.provider.uid.clone(),
                        weight: weights.weight_for(&project.provider.uid),
                    });
                }

                let entry = services
                    .entry(service_id.clone())
                    .or_insert_with(|| ServiceRestrictions {
                        service_id: service_id.clone(),
                        service_type,
                        targets: BTreeMap::new(),
                    });
                for (field, value) in quota.limits.restriction_fields() {
                    let restriction = entry.targets.entry(field.to_string()).or_default();
                    if quota.per_user {
                        restriction.user_guaranteed = Some(value);
                        restriction.user_limit = Some(value);
                    } else {
                        restriction.total_guaranteed = Some(value);
                        restriction.total_limit = Some(value);
                    }
                }
            }

            slas.push(SlaRestrictions {
                sla_id: sla.uid.clone(),
                provider_id: project.provider.uid.clone(),
                start_date: sla.start_date,
                end_date: sla.end_date,
                services: services.into_values().collect(),
            });
        }
    }

    PreferenceModel {
        user_group_id: user_group.uid.clone(),
        user_group_name: user_group.name.clone(),
        priorities,
        slas,
    }
}
