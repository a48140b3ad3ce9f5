//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::Result;
use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API key for the hosted identity service
    #[serde(default)]
    pub api_key: String,

    /// OAuth client credentials for Google sign-in
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Local port the OAuth callback listener binds to.
    ///
    /// This must match the redirect URI registered with the provider, so it
    /// is a deployment constant rather than something to tune per run. Only
    /// one TableHop instance can run a Google login at a time on one machine.
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,

    /// How long to wait for the user to finish the browser consent step
    #[serde(default = "default_consent_timeout")]
    pub consent_timeout_secs: u64,

    /// Directory holding locally stored user profiles
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// OAuth client credentials issued by the provider console
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,
}

fn default_callback_port() -> u16 {
    crate::auth::DEFAULT_CALLBACK_PORT
}

fn default_consent_timeout() -> u64 {
    120
}

fn default_data_dir() -> PathBuf {
    config_dir().join("data")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            oauth: OAuthConfig::default(),
            callback_port: default_callback_port(),
            consent_timeout_secs: default_consent_timeout(),
            data_dir: default_data_dir(),
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tablehop")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from file
pub fn load() -> Result<Config> {
    let path = config_path();

    if !path.exists() {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Run 'tablehop setup' first.",
            path
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    let path = config_path();

    // Create parent directory
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(())
}

/// Interactively collect credentials and write the initial config
pub fn setup() -> Result<()> {
    use inquire::Text;

    let mut config = Config::default();

    config.oauth.client_id = Text::new("Google OAuth client id:").prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    config.oauth.client_secret = Text::new("Google OAuth client secret:").prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    config.api_key = Text::new("Identity service API key:").prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    std::fs::create_dir_all(&config.data_dir)?;
    save(&config)?;

    Ok(())
}
