use blogpush_core::github::{DEFAULT_API_URL, DEFAULT_WEB_HOST};
use blogpush_core::images::LOCAL_SEGMENT;
use blogpush_core::publish::PublisherConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 4000)
    pub port: u16,
    /// Directory holding relayed images (default: ./uploads)
    pub upload_dir: PathBuf,
    /// Public URL of this server, used to resolve relative image links
    /// (default: http://localhost:4000)
    pub public_base_url: String,
    /// Token used when a request carries no bearer token
    pub github_token: Option<String>,
    /// GitHub REST API root (default: https://api.github.com)
    pub github_api_url: String,
    /// Host of permanent image URLs (default: github.com)
    pub github_web_host: String,
    /// CORS allowed origins (comma-separated); empty allows any origin
    pub cors_origins: Vec<String>,
    /// How long relayed images live (default: 600 seconds)
    pub upload_ttl: Duration,
    /// Largest accepted image upload in bytes (default: 20 MiB)
    pub max_upload_bytes: usize,
    /// Refuse updates whose revision marker is stale (default: true)
    pub verify_revision: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            upload_dir: PathBuf::from("./uploads"),
            public_base_url: "http://localhost:4000".to_string(),
            github_token: None,
            github_api_url: DEFAULT_API_URL.to_string(),
            github_web_host: DEFAULT_WEB_HOST.to_string(),
            cors_origins: Vec::new(),
            upload_ttl: Duration::from_secs(600),
            max_upload_bytes: 20 * 1024 * 1024,
            verify_revision: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = match env::var("PORT") {
            Ok(port) => port.trim().parse().map_err(|_| ConfigError::InvalidPort)?,
            Err(_) => defaults.port,
        };

        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_dir);

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.public_base_url);

        let github_token = env::var("GITHUB_PAT")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let github_api_url =
            env::var("GITHUB_API_URL").unwrap_or(defaults.github_api_url);
        let github_web_host =
            env::var("GITHUB_WEB_HOST").unwrap_or(defaults.github_web_host);

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let upload_ttl = env::var("UPLOAD_TTL_SECS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.upload_ttl);

        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.max_upload_bytes);

        let verify_revision = env::var("VERIFY_REVISION")
            .map(|v| !v.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(defaults.verify_revision);

        Ok(Config {
            host,
            port,
            upload_dir,
            public_base_url,
            github_token,
            github_api_url,
            github_web_host,
            cors_origins,
            upload_ttl,
            max_upload_bytes,
            verify_revision,
        })
    }

    /// Get the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if a fallback GitHub token is configured
    pub fn has_fallback_token(&self) -> bool {
        self.github_token.is_some()
    }

    /// Settings for the publish pipeline
    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            fallback_token: self.github_token.clone(),
            web_host: self.github_web_host.clone(),
            local_segment: LOCAL_SEGMENT.to_string(),
            relay_base_url: Some(self.public_base_url.clone()),
            verify_revision: self.verify_revision,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "Invalid PORT environment variable"),
        }
    }
}

impl std::error::Error for ConfigError {}
