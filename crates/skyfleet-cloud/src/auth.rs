//! Credential-refreshing call executor
//!
//! Every outbound authenticated call goes through [`CallExecutor`]. A call
//! rejected for an expired credential is retried exactly once after a single
//! token refresh; anything else propagates untouched.

use crate::error::AuthError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Reference to the identity a call is made on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId {
    /// Issuer URL of the identity provider
    pub issuer: String,
    pub subject: String,
    /// Organisation (user group) carried by the identity, if any
    pub organisation: Option<String>,
}

impl TokenId {
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
            organisation: None,
        }
    }

    pub fn with_organisation(mut self, organisation: impl Into<String>) -> Self {
        self.organisation = Some(organisation.into());
        self
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.subject, self.issuer)
    }
}

/// Source of access tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current access token for `id`
    async fn access_token(&self, id: &TokenId) -> Result<String, AuthError>;

    /// Obtain a fresh access token, discarding any cached one
    async fn refresh(&self, id: &TokenId) -> Result<String, AuthError>;
}

/// Wraps outbound calls with one-shot credential refresh
#[derive(Clone, Default)]
pub struct CallExecutor {
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl CallExecutor {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            tokens: Some(tokens),
        }
    }

    /// Executor without a token source; every call is anonymous
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Run `action` with the current bearer token for `identity`
    ///
    /// `action` receives `None` for anonymous calls. When `is_auth_failure`
    /// flags the outcome, the token is refreshed once and `action` is retried
    /// once; the retry's outcome is returned as-is.
    pub async fn execute_with_client<T, E, F, Fut, P>(
        &self,
        identity: Option<&TokenId>,
        mut action: F,
        is_auth_failure: P,
    ) -> Result<T, E>
    where
        F: FnMut(Option<String>) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        P: Fn(&Result<T, E>) -> bool + Send,
        E: From<AuthError>,
    {
        let authenticated = match (identity, &self.tokens) {
            (Some(id), Some(tokens)) => Some((id, tokens)),
            (Some(id), None) => {
                return Err(AuthError::MissingCredentials(id.to_string()).into());
            }
            (None, _) => None,
        };

        let token = match authenticated {
            Some((id, tokens)) => Some(tokens.access_token(id).await?),
            None => None,
        };

        let first = action(token).await;
        if !is_auth_failure(&first) {
            return first;
        }

        let Some((id, tokens)) = authenticated else {
            return first;
        };

        tracing::debug!(identity = %id, "Access token rejected, refreshing once");
        let refreshed = tokens.refresh(id).await?;
        action(Some(refreshed)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    enum CallError {
        Unauthorized,
        Unavailable,
        Auth(String),
    }

    impl From<AuthError> for CallError {
        fn from(err: AuthError) -> Self {
            CallError::Auth(err.to_string())
        }
    }

    #[derive(Default)]
    struct CountingTokens {
        refreshes: AtomicUsize,
        fail_refresh: bool,
    }

    #[async_trait]
    impl TokenProvider for CountingTokens {
        async fn access_token(&self, _id: &TokenId) -> Result<String, AuthError> {
            Ok(format!("token-{}", self.refreshes.load(Ordering::SeqCst)))
        }

        async fn refresh(&self, _id: &TokenId) -> Result<String, AuthError> {
            if self.fail_refresh {
                return Err(AuthError::RefreshFailed("revoked".into()));
            }
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{n}"))
        }
    }

    fn identity() -> TokenId {
        TokenId::new("https://iam.example.org", "alice")
    }

    fn unauthorized(result: &Result<String, CallError>) -> bool {
        matches!(result, Err(CallError::Unauthorized))
    }

    #[tokio::test]
    async fn test_refreshes_at_most_once() {
        let tokens = Arc::new(CountingTokens::default());
        let executor = CallExecutor::new(tokens.clone());
        let calls = AtomicUsize::new(0);

        let result: Result<String, CallError> = executor
            .execute_with_client(
                Some(&identity()),
                |_token| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(CallError::Unauthorized) }
                },
                unauthorized,
            )
            .await;

        assert_eq!(result, Err(CallError::Unauthorized));
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_uses_refreshed_token() {
        let tokens = Arc::new(CountingTokens::default());
        let executor = CallExecutor::new(tokens.clone());

        let result = executor
            .execute_with_client(
                Some(&identity()),
                |token| async move {
                    match token.as_deref() {
                        Some("token-1") => Ok("ok".to_string()),
                        _ => Err(CallError::Unauthorized),
                    }
                },
                unauthorized,
            )
            .await;

        assert_eq!(result, Ok("ok".to_string()));
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let tokens = Arc::new(CountingTokens::default());
        let executor = CallExecutor::new(tokens.clone());
        let calls = AtomicUsize::new(0);

        let result: Result<String, CallError> = executor
            .execute_with_client(
                Some(&identity()),
                |_token| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(CallError::Unavailable) }
                },
                unauthorized,
            )
            .await;

        assert_eq!(result, Err(CallError::Unavailable));
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_anonymous_call_is_never_refreshed() {
        let tokens = Arc::new(CountingTokens::default());
        let executor = CallExecutor::new(tokens.clone());

        let result: Result<String, CallError> = executor
            .execute_with_client(
                None,
                |token| async move {
                    assert!(token.is_none());
                    Err(CallError::Unauthorized)
                },
                unauthorized,
            )
            .await;

        assert_eq!(result, Err(CallError::Unauthorized));
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_propagates() {
        let tokens = Arc::new(CountingTokens {
            fail_refresh: true,
            ..Default::default()
        });
        let executor = CallExecutor::new(tokens);

        let result: Result<String, CallError> = executor
            .execute_with_client(
                Some(&identity()),
                |_token| async { Err(CallError::Unauthorized) },
                unauthorized,
            )
            .await;

        assert!(matches!(result, Err(CallError::Auth(msg)) if msg.contains("revoked")));
    }

    #[tokio::test]
    async fn test_identity_without_token_source() {
        let executor = CallExecutor::anonymous();

        let result: Result<String, CallError> = executor
            .execute_with_client(
                Some(&identity()),
                |_token| async { Ok("unreachable".to_string()) },
                unauthorized,
            )
            .await;

        assert!(matches!(result, Err(CallError::Auth(_))));
    }
}
