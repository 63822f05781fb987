use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration (automation sidecar records)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("issuetree.db")
}

/// Issue tracker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    /// Tracker backend type
    pub backend: TrackerBackend,
    /// GitHub-specific configuration (required when backend = "github")
    #[serde(default)]
    pub github: Option<GitHubConfig>,
}

/// Available tracker backends
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackerBackend {
    Github,
}

/// GitHub Issues configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Personal access token. Falls back to `GITHUB_TOKEN` when unset.
    #[serde(default)]
    pub token: Option<String>,
    /// REST API base URL (default: https://api.github.com)
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Web base URL used for ticket links (default: https://github.com)
    #[serde(default = "default_web_url")]
    pub web_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

impl GitHubConfig {
    /// Config for a repository with every optional field defaulted.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            token: None,
            api_url: default_api_url(),
            web_url: default_web_url(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_web_url() -> String {
    "https://github.com".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// Automation defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutomationConfig {
    /// Estimate recorded when a run is started without one (minutes)
    #[serde(default = "default_estimated_minutes")]
    pub default_estimated_minutes: u32,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            default_estimated_minutes: default_estimated_minutes(),
        }
    }
}

fn default_estimated_minutes() -> u32 {
    30
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tracker: SanitizedTrackerConfig,
    pub automation: AutomationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTrackerConfig {
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<SanitizedGitHubConfig>,
}

/// Sanitized GitHub config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGitHubConfig {
    pub owner: String,
    pub repo: String,
    pub api_url: String,
    pub web_url: String,
    pub token_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            tracker: SanitizedTrackerConfig {
                backend: match config.tracker.backend {
                    TrackerBackend::Github => "github".to_string(),
                },
                github: config.tracker.github.as_ref().map(|g| SanitizedGitHubConfig {
                    owner: g.owner.clone(),
                    repo: g.repo.clone(),
                    api_url: g.api_url.clone(),
                    web_url: g.web_url.clone(),
                    token_configured: g.token.as_ref().is_some_and(|t| !t.is_empty()),
                    timeout_secs: g.timeout_secs,
                }),
            },
            automation: config.automation.clone(),
        }
    }
}
