//! OAuth2 client-credentials token provider

use async_trait::async_trait;
use serde::Deserialize;
use skyfleet_cloud::{AuthError, TokenId, TokenProvider};
use skyfleet_config::IdentityConfig;
use tokio::sync::{Mutex, OnceCell};

const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

#[derive(Debug, Deserialize)]
struct Discovery {
    token_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Issues tokens with the client-credentials grant
///
/// The token endpoint is taken from configuration or discovered from the
/// issuer on first use. The last token is cached until a refresh.
///
/// These are the orchestrator's own service credentials, not per-user
/// tokens: every [`TokenId`] of the configured issuer is served the same
/// cached token, whatever its subject. Identities of another issuer are
/// rejected.
pub struct ClientCredentials {
    client: reqwest::Client,
    issuer: Option<String>,
    client_id: String,
    client_secret: String,
    scopes: String,
    token_endpoint: OnceCell<String>,
    cached: Mutex<Option<String>>,
}

impl ClientCredentials {
    pub fn new(client: reqwest::Client, config: &IdentityConfig) -> Result<Self, AuthError> {
        let (Some(client_id), Some(client_secret)) = (&config.client_id, &config.client_secret)
        else {
            return Err(AuthError::MissingCredentials(
                "identity.client_id and identity.client_secret".to_string(),
            ));
        };
        if config.issuer.is_none() && config.token_endpoint.is_none() {
            return Err(AuthError::MissingCredentials(
                "identity.issuer or identity.token_endpoint".to_string(),
            ));
        }

        let token_endpoint = OnceCell::new();
        if let Some(endpoint) = &config.token_endpoint {
            let _ = token_endpoint.set(endpoint.clone());
        }

        Ok(Self {
            client,
            issuer: config.issuer.clone(),
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            scopes: config.scopes.clone(),
            token_endpoint,
            cached: Mutex::new(None),
        })
    }

    async fn token_endpoint(&self) -> Result<&str, AuthError> {
        self.token_endpoint
            .get_or_try_init(|| async {
                let issuer = self.issuer.as_deref().ok_or_else(|| {
                    AuthError::MissingCredentials("identity.issuer".to_string())
                })?;
                let separator = if issuer.ends_with('/') { "" } else { "/" };
                let url = format!("{issuer}{separator}{DISCOVERY_PATH}");

                tracing::debug!(%url, "Discovering token endpoint");
                let discovery: Discovery = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| AuthError::TokenRequest(format!("discovery failed: {e}")))?
                    .json()
                    .await
                    .map_err(|e| AuthError::TokenRequest(format!("invalid discovery document: {e}")))?;
                Ok::<_, AuthError>(discovery.token_endpoint)
            })
            .await
            .map(String::as_str)
    }

    async fn request_token(&self) -> Result<String, AuthError> {
        let endpoint = self.token_endpoint().await?;

        let response: TokenResponse = self
            .client
            .post(endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", self.scopes.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::TokenRequest(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::TokenRequest(format!("invalid token response: {e}")))?;

        tracing::debug!(client_id = %self.client_id, "Obtained access token");
        Ok(response.access_token)
    }

    fn check_issuer(&self, id: &TokenId) -> Result<(), AuthError> {
        match &self.issuer {
            Some(issuer) if issuer.trim_end_matches('/') != id.issuer.trim_end_matches('/') => {
                Err(AuthError::MissingCredentials(id.to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    async fn access_token(&self, id: &TokenId) -> Result<String, AuthError> {
        self.check_issuer(id)?;
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.request_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn refresh(&self, id: &TokenId) -> Result<String, AuthError> {
        self.check_issuer(id)?;
        let mut cached = self.cached.lock().await;
        let token = self
            .request_token()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;
        *cached = Some(token.clone());
        Ok(token)
    }
}
