//! Skyfleet configuration
//!
//! Locates and loads the orchestrator configuration file (`skyfleet.yaml`).
//! Every section has defaults, so a file only needs to carry what differs.

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable used to point at a configuration file directly
pub const CONFIG_PATH_ENV: &str = "SKYFLEET_CONFIG_PATH";

/// Project-local files, most specific first
const LOCAL_FILES: [&str; 3] = [
    "skyfleet.local.yaml",
    "skyfleet.yaml",
    ".skyfleet/skyfleet.yaml",
];

/// Get the Skyfleet configuration directory (`~/.config/skyfleet`)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("skyfleet");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Find the configuration file
///
/// `SKYFLEET_CONFIG_PATH` wins, then the project-local files in the
/// current directory, then `~/.config/skyfleet/skyfleet.yaml`.
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    let global = dirs::config_dir().map(|dir| dir.join("skyfleet").join("skyfleet.yaml"));

    LOCAL_FILES
        .iter()
        .map(|file| current_dir.join(file))
        .chain(global)
        .find(|path| path.is_file())
        .ok_or(ConfigError::ConfigFileNotFound)
}

/// Top-level orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub identity: IdentityConfig,
    pub ranking: RankingConfig,
    pub workflow: WorkflowConfig,
    pub store: StoreConfig,
    pub s3: S3Config,
}

impl Config {
    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate(path)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Discover and load the configuration file
    pub fn discover() -> Result<Self> {
        let path = find_config_file()?;
        Self::load(path)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        };

        if self.catalog.url.trim().is_empty() {
            return Err(invalid("catalog.url must not be empty".to_string()));
        }
        if self.catalog.request_timeout_secs == 0 {
            return Err(invalid(
                "catalog.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        let default_weight = self.ranking.default_weight;
        if !default_weight.is_finite() || default_weight < 0.0 {
            return Err(invalid(format!(
                "ranking.default_weight must be a non-negative number, got {default_weight}"
            )));
        }
        if let Some((provider, weight)) = self
            .ranking
            .weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(invalid(format!(
                "ranking weight for provider {provider} must be a non-negative number, got {weight}"
            )));
        }
        Ok(())
    }
}

/// Catalog (federation registry) endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the federation registry API
    pub url: String,
    /// Path of the user-group listing
    pub user_groups_path: String,
    /// Path of the project listing
    pub projects_path: String,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Disable TLS certificate and hostname verification
    pub insecure_skip_tls_verify: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/api/v1".to_string(),
            user_groups_path: "/user_groups/".to_string(),
            projects_path: "/projects/".to_string(),
            request_timeout_secs: 30,
            insecure_skip_tls_verify: false,
        }
    }
}

/// OAuth2 client used to obtain access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Issuer URL; the token endpoint is discovered from it when not set
    pub issuer: Option<String>,
    pub token_endpoint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            token_endpoint: None,
            client_id: None,
            client_secret: None,
            scopes: "openid profile email offline_access".to_string(),
        }
    }
}

/// Provider ranking knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Weight assigned to every priority entry unless overridden
    pub default_weight: f64,
    /// Per-provider weight overrides (provider id -> weight)
    pub weights: HashMap<String, f64>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            default_weight: 1.0,
            weights: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Wall-clock budget for a deployment run when the request sets none
    pub default_timeout_mins: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_timeout_mins: 14_400,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the deployment state file; in-memory when unset
    pub state_dir: Option<PathBuf>,
}

/// Static credentials for S3-compatible endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub region: String,
    /// Endpoint host -> credentials
    pub credentials: HashMap<String, S3Credentials>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            credentials: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: String,
}
