use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{OrganizerError, Result};
use crate::query::SearchQuery;

/// Default output filename template
pub const DEFAULT_NAME_PATTERN: &str = "{date}_{id}_{subject}_{original_filename}";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// How the authorization code is obtained on first run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthFlow {
    /// Local listener receives the browser redirect
    #[default]
    LocalCallback,
    /// User copies the code from the browser into the terminal
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_credentials")]
    pub credentials: PathBuf,
    #[serde(default = "default_token_cache")]
    pub token_cache: PathBuf,
    #[serde(default)]
    pub flow: AuthFlow,
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
    #[serde(default = "default_authorization_timeout_secs")]
    pub authorization_timeout_secs: u64,
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials: default_credentials(),
            token_cache: default_token_cache(),
            flow: AuthFlow::default(),
            callback_port: default_callback_port(),
            authorization_timeout_secs: default_authorization_timeout_secs(),
            open_browser: default_open_browser(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_name_pattern")]
    pub name_pattern: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            name_pattern: default_name_pattern(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_credentials() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_token_cache() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_callback_port() -> u16 {
    8085
}

fn default_authorization_timeout_secs() -> u64 {
    300
}

fn default_open_browser() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_name_pattern() -> String {
    DEFAULT_NAME_PATTERN.to_string()
}

fn default_user_id() -> String {
    "me".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            OrganizerError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            OrganizerError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.auth.callback_port == 0 {
            return Err(OrganizerError::ConfigError(
                "auth.callback_port must be a fixed, non-zero port".to_string(),
            ));
        }
        if self.auth.authorization_timeout_secs == 0 {
            return Err(OrganizerError::ConfigError(
                "auth.authorization_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.download.name_pattern.trim().is_empty() {
            return Err(OrganizerError::ConfigError(
                "download.name_pattern cannot be empty".to_string(),
            ));
        }
        if self.download.output_dir.as_os_str().is_empty() {
            return Err(OrganizerError::ConfigError(
                "download.output_dir cannot be empty".to_string(),
            ));
        }

        if self.client.user_id.is_empty() {
            return Err(OrganizerError::ConfigError(
                "client.user_id cannot be empty".to_string(),
            ));
        }
        // Gmail caps messages.list at 500 results per page
        if self.client.page_size == 0 || self.client.page_size > 500 {
            return Err(OrganizerError::ConfigError(
                "client.page_size must be between 1 and 500".to_string(),
            ));
        }
        if self.client.request_timeout_secs == 0 {
            return Err(OrganizerError::ConfigError(
                "client.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}

/// Authorization settings resolved for one run
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub credentials: PathBuf,
    pub token_cache: PathBuf,
    pub flow: AuthFlow,
    pub callback_port: u16,
    pub authorization_timeout: Duration,
    pub open_browser: bool,
}

impl From<&AuthConfig> for AuthSettings {
    fn from(config: &AuthConfig) -> Self {
        Self {
            credentials: config.credentials.clone(),
            token_cache: config.token_cache.clone(),
            flow: config.flow,
            callback_port: config.callback_port,
            authorization_timeout: Duration::from_secs(config.authorization_timeout_secs),
            open_browser: config.open_browser,
        }
    }
}

/// Gmail request settings resolved for one run
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub user_id: String,
    pub page_size: u32,
    pub request_timeout: Duration,
}

impl From<&ClientConfig> for ClientSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            user_id: config.user_id.clone(),
            page_size: config.page_size,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

/// Everything one invocation needs, built once at startup
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub auth: AuthSettings,
    pub client: ClientSettings,
    pub output_dir: PathBuf,
    pub name_pattern: String,
    pub query: SearchQuery,
}

impl RunSettings {
    pub fn from_config(config: &Config, query: SearchQuery) -> Self {
        Self {
            auth: AuthSettings::from(&config.auth),
            client: ClientSettings::from(&config.client),
            output_dir: config.download.output_dir.clone(),
            name_pattern: config.download.name_pattern.clone(),
            query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.auth.credentials, PathBuf::from("credentials.json"));
        assert_eq!(config.auth.token_cache, PathBuf::from("token.json"));
        assert_eq!(config.auth.flow, AuthFlow::LocalCallback);
        assert_eq!(config.auth.callback_port, 8085);
        assert!(config.auth.open_browser);

        assert_eq!(config.download.output_dir, PathBuf::from("output"));
        assert_eq!(config.download.name_pattern, DEFAULT_NAME_PATTERN);

        assert_eq!(config.client.user_id, "me");
        assert_eq!(config.client.page_size, 100);
        assert_eq!(config.client.request_timeout_secs, 60);
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_port() {
        let mut config = Config::default();
        config.auth.callback_port = 0;
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("callback_port"));
    }

    #[test]
    fn test_config_validation_empty_pattern() {
        let mut config = Config::default();
        config.download.name_pattern = "   ".to_string();
        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("name_pattern cannot be empty"));
    }

    #[test]
    fn test_config_validation_page_size_bounds() {
        let mut config = Config::default();

        config.client.page_size = 0;
        assert!(config.validate().is_err());

        config.client.page_size = 501;
        assert!(config.validate().is_err());

        config.client.page_size = 1;
        assert!(config.validate().is_ok());

        config.client.page_size = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeouts() {
        let mut config = Config::default();
        config.client.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.auth.authorization_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_serialized_defaults_load_back() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = Config::default();
        config.auth.flow = AuthFlow::Manual;
        config.download.name_pattern = "{id}".to_string();
        tokio::fs::write(path, toml::to_string_pretty(&config).unwrap())
            .await
            .unwrap();

        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.auth.flow, AuthFlow::Manual);
        assert_eq!(loaded.download.name_pattern, "{id}");
        assert_eq!(loaded.client.page_size, config.client.page_size);
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let path = Path::new("/tmp/nonexistent-pdf-organizer-config-12345.toml");
        let config = Config::load(path).await.unwrap();
        assert_eq!(config.download.output_dir, PathBuf::from("output"));
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(temp_file.path()).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn test_config_partial_with_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let partial_config = r#"
[auth]
flow = "manual"

[download]
output_dir = "reports"
"#;
        tokio::fs::write(temp_file.path(), partial_config).await.unwrap();

        let config = Config::load(temp_file.path()).await.unwrap();

        assert_eq!(config.auth.flow, AuthFlow::Manual);
        assert_eq!(config.download.output_dir, PathBuf::from("reports"));
        assert_eq!(config.auth.callback_port, 8085);
        assert_eq!(config.download.name_pattern, DEFAULT_NAME_PATTERN);
    }

    #[test]
    fn test_run_settings_from_config() {
        let config = Config::default();
        let settings = RunSettings::from_config(&config, SearchQuery::pdf_attachments(None));

        assert_eq!(settings.auth.authorization_timeout, Duration::from_secs(300));
        assert_eq!(settings.client.request_timeout, Duration::from_secs(60));
        assert_eq!(settings.output_dir, PathBuf::from("output"));
        assert_eq!(settings.query.as_str(), "has:attachment filename:pdf");
    }
}
