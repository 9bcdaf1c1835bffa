//! Federation registry HTTP client
//!
//! One `reqwest::Client` is built from configuration and shared by every
//! request. Requests go through the [`CallExecutor`] so an expired bearer
//! token is refreshed once.

use crate::error::{CatalogError, Result};
use crate::fedreg::{Project, UserGroup};
use serde::de::DeserializeOwned;
use skyfleet_cloud::{CallExecutor, TokenId};
use skyfleet_config::CatalogConfig;
use std::time::Duration;

/// Build the HTTP client used for catalog requests
pub fn build_http_client(config: &CatalogConfig) -> Result<reqwest::Client> {
    let mut builder =
        reqwest::Client::builder().timeout(Duration::from_secs(config.request_timeout_secs));

    if config.insecure_skip_tls_verify {
        tracing::warn!(
            url = %config.url,
            "TLS certificate and hostname verification disabled for the catalog"
        );
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder.build()?)
}

/// Federation registry client
#[derive(Clone)]
pub struct FederationRegistry {
    client: reqwest::Client,
    base_url: String,
    user_groups_path: String,
    projects_path: String,
    executor: CallExecutor,
}

impl FederationRegistry {
    pub fn new(config: &CatalogConfig, executor: CallExecutor) -> Result<Self> {
        let client = build_http_client(config)?;
        Ok(Self::with_client(client, config, executor))
    }

    /// Use an already configured client
    pub fn with_client(client: reqwest::Client, config: &CatalogConfig, executor: CallExecutor) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            user_groups_path: config.user_groups_path.clone(),
            projects_path: config.projects_path.clone(),
            executor,
        }
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<reqwest::Url> {
        let raw = format!("{}{}", self.base_url, path);
        reqwest::Url::parse_with_params(&raw, params)
            .map_err(|e| CatalogError::InvalidUrl(format!("{raw}: {e}")))
    }

    /// User groups matching `name` on the issuer's identity provider
    pub async fn user_groups(
        &self,
        identity: Option<&TokenId>,
        name: &str,
    ) -> Result<Vec<UserGroup>> {
        let mut params = vec![("with_conn", "true"), ("name", name)];
        if let Some(id) = identity {
            params.push(("idp_endpoint", id.issuer.as_str()));
        }
        params.push(("provider_status", "active"));

        let url = self.url(&self.user_groups_path, &params)?;
        self.get_json(identity, url).await
    }

    /// Projects of a user group on one provider
    pub async fn projects(
        &self,
        identity: Option<&TokenId>,
        user_group_id: &str,
        provider_id: &str,
    ) -> Result<Vec<Project>> {
        let url = self.url(
            &self.projects_path,
            &[
                ("with_conn", "true"),
                ("user_group_uid", user_group_id),
                ("provider_uid", provider_id),
            ],
        )?;
        self.get_json(identity, url).await
    }

    async fn get_json<T>(&self, identity: Option<&TokenId>, url: reqwest::Url) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        tracing::debug!(%url, "Querying federation registry");

        self.executor
            .execute_with_client(
                identity,
                |token| {
                    let mut request = self.client.get(url.clone());
                    if let Some(token) = token {
                        request = request.bearer_auth(token);
                    }
                    let url = url.to_string();
                    async move {
                        let response = request.send().await?;
                        let status = response.status();

                        if status == reqwest::StatusCode::UNAUTHORIZED {
                            return Err(CatalogError::Unauthorized { url });
                        }
                        if !status.is_success() {
                            let body = response.text().await.unwrap_or_default();
                            return Err(CatalogError::Status {
                                url,
                                status: status.as_u16(),
                                body,
                            });
                        }

                        Ok(response.json::<T>().await?)
                    }
                },
                |result| matches!(result, Err(CatalogError::Unauthorized { .. })),
            )
            .await
    }
}
