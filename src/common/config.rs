//! Configuration file handling

use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Where the system under test lives
    #[serde(default)]
    pub target: TargetConfig,

    /// Named identities scenarios can act as
    #[serde(default)]
    pub roles: BTreeMap<String, RoleConfig>,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Run settings
    #[serde(default)]
    pub run: RunConfig,

    /// File upload policy of the system under test
    #[serde(default)]
    pub upload: UploadPolicy,

    /// Browser settings for UI scenarios
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Base URLs for the API and the storefront UI
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Base URL for HTTP scenarios
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base URL for UI scenarios (navigation paths are relative to it)
    #[serde(default = "default_ui_base_url")]
    pub ui_base_url: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ui_base_url: default_ui_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8091".to_string()
}

fn default_ui_base_url() -> String {
    "http://localhost:4200".to_string()
}

/// A role: its capabilities and how it authenticates
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RoleConfig {
    /// Capabilities granted by this role (e.g. "manage_catalog")
    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    /// Static bearer token
    pub token: Option<String>,

    /// Environment variable holding a bearer token
    pub token_env: Option<String>,

    /// Session cookie
    pub cookie: Option<CookieConfig>,

    /// HTTP basic credentials
    pub basic: Option<BasicConfig>,
}

/// Session cookie credential
#[derive(Debug, Deserialize, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub value: String,
}

/// HTTP basic credential
#[derive(Debug, Deserialize, Clone)]
pub struct BasicConfig {
    pub username: String,
    pub password: Option<String>,
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Whole-exchange timeout for one HTTP request
    #[serde(default = "default_request_secs")]
    pub request_secs: u64,

    /// Default budget for UI wait conditions
    #[serde(default = "default_ui_wait_ms")]
    pub ui_wait_ms: u64,

    /// Interval between UI condition polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_secs: default_request_secs(),
            ui_wait_ms: default_ui_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_request_secs() -> u64 {
    30
}
fn default_ui_wait_ms() -> u64 {
    5000
}
fn default_poll_interval_ms() -> u64 {
    100
}

/// Run settings
#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Maximum number of scenarios in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Browser engine used by the Playwright bridge
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        }
    }
}

/// Browser settings
#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    /// Browser engine
    #[serde(default)]
    pub engine: BrowserEngine,

    /// Run without a visible window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Node.js executable that hosts Playwright
    #[serde(default = "default_node")]
    pub node: PathBuf,

    /// Seconds to wait for the browser to come up
    #[serde(default = "default_launch_secs")]
    pub launch_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngine::default(),
            headless: default_headless(),
            node: default_node(),
            launch_secs: default_launch_secs(),
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_node() -> PathBuf {
    PathBuf::from("node")
}

fn default_launch_secs() -> u64 {
    30
}

/// Upload policy of the system under test.
///
/// This is data about the external system; the runner only uses it to
/// warn about attachments whose extension falls outside the set.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct UploadPolicy {
    /// Accepted file extensions, lowercase without dot. Empty means unknown.
    #[serde(default, deserialize_with = "extension_set")]
    pub allowed_extensions: BTreeSet<String>,
}

/// Normalize configured extensions: `".PDF"` and `"pdf"` are the same entry
fn extension_set<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect())
}

impl UploadPolicy {
    /// Whether the policy declares this filename's extension acceptable.
    ///
    /// Returns None when the policy does not list any extensions.
    pub fn allows_filename(&self, filename: &str) -> Option<bool> {
        if self.allowed_extensions.is_empty() {
            return None;
        }
        let ext = Path::new(filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Some(self.allowed_extensions.contains(&ext))
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.run.concurrency == 0 {
            return Err(super::Error::Config(
                "run.concurrency must be at least 1".to_string(),
            ));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(super::Error::Config(
                "timeouts.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
