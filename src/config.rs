//! Application configuration loaded from environment variables.
//!
//! Values are read once at startup; `.env` is honored for local development.

use std::env;
use std::str::FromStr;

use crate::models::user::DEFAULT_HOURLY_RATE;

/// Which `ProjectStore` implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local store; data is lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL (CORS origin and base of public share links)
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// OAuth client ID that Google ID tokens must be issued for
    pub google_client_id: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Rate for users who do not supply one at first sign-in
    pub default_hourly_rate: f64,
    /// Currency label shown in reports
    pub currency: String,
    pub store_backend: StoreBackend,
    /// Count the open interval of running tasks in reports
    pub report_include_running: bool,
    /// Hosts allowed to originate sign-in requests
    pub authorized_domains: Vec<String>,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            google_client_id: "test-client-id.apps.googleusercontent.com".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            default_hourly_rate: DEFAULT_HOURLY_RATE,
            currency: "LKR".to_string(),
            store_backend: StoreBackend::Memory,
            report_include_running: false,
            authorized_domains: default_authorized_domains("http://localhost:5173"),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let frontend_url = env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();

        let default_hourly_rate = match env::var("DEFAULT_HOURLY_RATE") {
            Ok(raw) => {
                let rate: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("DEFAULT_HOURLY_RATE", raw.clone()))?;
                if !crate::billing::is_valid_rate(rate) {
                    return Err(ConfigError::Invalid("DEFAULT_HOURLY_RATE", raw));
                }
                rate
            }
            Err(_) => DEFAULT_HOURLY_RATE,
        };

        let authorized_domains = match env::var("AUTHORIZED_DOMAINS") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            _ => default_authorized_domains(&frontend_url),
        };

        Ok(Self {
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_ID"))?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            default_hourly_rate,
            currency: env::var("CURRENCY").unwrap_or_else(|_| "LKR".to_string()),
            store_backend: env::var("STORE_BACKEND")
                .map(|v| v.parse::<StoreBackend>())
                .unwrap_or(Ok(StoreBackend::Firestore))?,
            report_include_running: env::var("REPORT_INCLUDE_RUNNING")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            authorized_domains,
            frontend_url,
        })
    }

    /// Public URL of a user's read-only report.
    pub fn share_url(&self, share_id: &str) -> String {
        format!("{}/user-report/{}", self.frontend_url, share_id)
    }

    /// Whether an `Origin` header value belongs to an authorized domain.
    pub fn is_authorized_origin(&self, origin: &str) -> bool {
        origin_host(origin)
            .map(|host| self.authorized_domains.iter().any(|d| *d == host))
            .unwrap_or(false)
    }
}

/// Host part of an origin such as `https://app.example.com:8443`.
fn origin_host(origin: &str) -> Option<String> {
    let rest = origin.split_once("://").map(|(_, r)| r).unwrap_or(origin);
    let authority = rest.split('/').next()?;
    let host = authority.rsplit_once(':').map(|(h, _)| h).unwrap_or(authority);
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

fn default_authorized_domains(frontend_url: &str) -> Vec<String> {
    let mut domains = vec!["localhost".to_string(), "127.0.0.1".to_string()];
    if let Some(host) = origin_host(frontend_url) {
        if !domains.contains(&host) {
            domains.push(host);
        }
    }
    domains
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("GOOGLE_CLIENT_ID", "client.apps.googleusercontent.com");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("FRONTEND_URL", "https://time.example.com/");
        env::set_var("STORE_BACKEND", "memory");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.google_client_id, "client.apps.googleusercontent.com");
        assert_eq!(config.frontend_url, "https://time.example.com");
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.port, 8080);
        assert!(config
            .authorized_domains
            .contains(&"time.example.com".to_string()));
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("Firestore".parse::<StoreBackend>().unwrap(), StoreBackend::Firestore);
        assert_eq!(" memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_authorized_origin() {
        let config = Config::test_default();
        assert!(config.is_authorized_origin("http://localhost:5173"));
        assert!(config.is_authorized_origin("http://127.0.0.1:3000"));
        assert!(!config.is_authorized_origin("https://evil.example.com"));
        assert!(!config.is_authorized_origin(""));
    }

    #[test]
    fn test_share_url() {
        let config = Config::test_default();
        assert_eq!(
            config.share_url("abc123xyz0"),
            "http://localhost:5173/user-report/abc123xyz0"
        );
    }
}
