use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use skyfleet_catalog::{CatalogResolver, FederationRegistry, Resolve, Weights};
use skyfleet_cloud::{AuthError, CallExecutor, CloudError, ServiceType, TokenId, TokenProvider};
use skyfleet_config::CatalogConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ISSUER: &str = "https://iam.example.org/";

#[derive(Default)]
struct Registry {
    user_groups: Value,
    projects: Value,
    fail_with: Option<StatusCode>,
    queries: Mutex<Vec<HashMap<String, String>>>,
    requests: AtomicUsize,
}

impl Registry {
    fn reply(
        &self,
        headers: &HeaderMap,
        query: HashMap<String, String>,
        body: &Value,
    ) -> Result<Json<Value>, StatusCode> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query);
        if let Some(status) = self.fail_with {
            return Err(status);
        }
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer fresh") => Ok(Json(body.clone())),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }
}

async fn user_groups(
    State(registry): State<Arc<Registry>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    registry.reply(&headers, query, &registry.user_groups)
}

async fn projects(
    State(registry): State<Arc<Registry>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    registry.reply(&headers, query, &registry.projects)
}

/// Hands out a stale token until refreshed
#[derive(Default)]
struct StaleThenFresh {
    refreshes: AtomicUsize,
}

#[async_trait]
impl TokenProvider for StaleThenFresh {
    async fn access_token(&self, _id: &TokenId) -> Result<String, AuthError> {
        Ok("stale".to_string())
    }

    async fn refresh(&self, _id: &TokenId) -> Result<String, AuthError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok("fresh".to_string())
    }
}

async fn serve(registry: Arc<Registry>) -> String {
    let app = Router::new()
        .route("/api/v1/user_groups/", get(user_groups))
        .route("/api/v1/projects/", get(projects))
        .with_state(registry);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/v1")
}

fn resolver(url: String, tokens: Arc<StaleThenFresh>) -> CatalogResolver {
    let config = CatalogConfig {
        url,
        ..Default::default()
    };
    let registry = FederationRegistry::new(&config, CallExecutor::new(tokens)).unwrap();
    CatalogResolver::new(registry, Weights::default())
}

fn identity() -> TokenId {
    TokenId::new(ISSUER, "alice").with_organisation("group-a")
}

fn compute_quota(service: &str, region: &str) -> Value {
    json!({
        "uid": format!("q-{service}"),
        "type": "compute",
        "cores": 8,
        "service": {
            "uid": service,
            "name": service,
            "endpoint": "https://nova.example.org",
            "type": "compute",
            "region": {"uid": "r1", "name": region}
        }
    })
}

fn project() -> Value {
    json!({
        "uid": "proj-1",
        "name": "tenant-a",
        "provider": {
            "uid": "p1",
            "name": "Provider One",
            "type": "openstack",
            "regions": [{
                "uid": "r1",
                "name": "RegionOne",
                "identity_services": [{"uid": "k1", "endpoint": "https://keystone.example.org/v3"}]
            }]
        },
        "images": [{"uid": "i1", "name": "ubuntu"}],
        "flavors": [{"uid": "f1", "name": "small", "ram": 1024, "vcpus": 1, "disk": 10}],
        "quotas": [compute_quota("nova-1", "RegionOne")]
    })
}

#[tokio::test]
async fn test_preferences_survive_expired_token() {
    let registry = Arc::new(Registry {
        user_groups: json!([{
            "uid": "ug-1",
            "name": "group-a",
            "slas": [{
                "uid": "sla-1",
                "doc_uuid": "doc-1",
                "start_date": "2024-01-01",
                "end_date": "2030-01-01",
                "projects": [project()]
            }]
        }]),
        ..Default::default()
    });
    let tokens = Arc::new(StaleThenFresh::default());
    let resolver = resolver(serve(registry.clone()).await, tokens.clone());

    let model = resolver
        .resolve_preferences(Some(&identity()), None)
        .await
        .unwrap();

    assert_eq!(model.user_group_id, "ug-1");
    assert_eq!(model.providers_for(ServiceType::Compute), vec!["p1"]);
    assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(registry.requests.load(Ordering::SeqCst), 2);

    let queries = registry.queries.lock().unwrap();
    let query = &queries[0];
    assert_eq!(query["with_conn"], "true");
    assert_eq!(query["name"], "group-a");
    assert_eq!(query["idp_endpoint"], ISSUER);
    assert_eq!(query["provider_status"], "active");
}

#[tokio::test]
async fn test_capabilities_for_provider() {
    let registry = Arc::new(Registry {
        projects: json!([project()]),
        ..Default::default()
    });
    let tokens = Arc::new(StaleThenFresh::default());
    let resolver = resolver(serve(registry.clone()).await, tokens);

    let caps = resolver
        .resolve_provider_capabilities("p1", "ug-1", Some(&identity()))
        .await
        .unwrap();

    assert_eq!(caps.provider_name, "Provider One");
    let nova = &caps.services["nova-1"];
    assert_eq!(nova.hostname.as_deref(), Some("keystone.example.org"));
    assert_eq!(nova.compute().unwrap().flavors.len(), 1);

    let queries = registry.queries.lock().unwrap();
    assert_eq!(queries[0]["user_group_uid"], "ug-1");
    assert_eq!(queries[0]["provider_uid"], "p1");
}

#[tokio::test]
async fn test_missing_user_group_is_resolution_error() {
    let registry = Arc::new(Registry {
        user_groups: json!([]),
        ..Default::default()
    });
    let resolver = resolver(serve(registry).await, Arc::new(StaleThenFresh::default()));

    let err = resolver
        .resolve_preferences(Some(&identity()), Some("nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Resolution(msg) if msg.contains("nobody")));
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let registry = Arc::new(Registry {
        fail_with: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..Default::default()
    });
    let tokens = Arc::new(StaleThenFresh::default());
    let resolver = resolver(serve(registry.clone()).await, tokens.clone());

    let err = resolver
        .resolve_provider_capabilities("p1", "ug-1", Some(&identity()))
        .await
        .unwrap_err();

    assert!(matches!(err, CloudError::Resolution(msg) if msg.contains("500")));
    assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 0);
    assert_eq!(registry.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_region_fails_provider() {
    let mut broken = project();
    broken["quotas"] = json!([compute_quota("nova-2", "Atlantis")]);
    let registry = Arc::new(Registry {
        projects: json!([broken]),
        ..Default::default()
    });
    let resolver = resolver(serve(registry).await, Arc::new(StaleThenFresh::default()));

    let err = resolver
        .resolve_provider_capabilities("p1", "ug-1", Some(&identity()))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Resolution(msg) if msg.contains("Atlantis")));
}
