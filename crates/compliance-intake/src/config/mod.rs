use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_UPLOAD_BASE_URL: &str = "http://127.0.0.1:3000/storage";
const DEVELOPMENT_SIGNING_SECRET: &str = "development-upload-signing-secret";
const DEVELOPMENT_API_TOKENS: &str = "dev-token:demo";
const DEFAULT_MAX_HOST_COUNTRIES: usize = 30;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub auth: AuthConfig,
    pub intake: IntakeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let raw_tokens = match env::var("APP_API_TOKENS") {
            Ok(value) => value,
            Err(_) if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingSetting("APP_API_TOKENS"))
            }
            Err(_) => DEVELOPMENT_API_TOKENS.to_string(),
        };
        let auth = AuthConfig::parse(&raw_tokens)?;

        let signing_secret = match env::var("APP_UPLOAD_SIGNING_SECRET") {
            Ok(value) if !value.trim().is_empty() => value,
            _ if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingSetting("APP_UPLOAD_SIGNING_SECRET"))
            }
            _ => DEVELOPMENT_SIGNING_SECRET.to_string(),
        };

        let upload_base_url = env::var("APP_UPLOAD_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_UPLOAD_BASE_URL.to_string());

        let max_host_countries = match env::var("APP_MAX_HOST_COUNTRIES") {
            Ok(value) => value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|max| *max > 0)
                .ok_or(ConfigError::InvalidMaxHostCountries)?,
            Err(_) => DEFAULT_MAX_HOST_COUNTRIES,
        };

        let schema_path = env::var("APP_SCHEMA_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            auth,
            intake: IntakeConfig {
                upload_base_url,
                signing_secret,
                max_host_countries,
                schema_path,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Bearer tokens and the tenants each one may act for.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub tokens: BTreeMap<String, BTreeSet<String>>,
}

impl AuthConfig {
    /// Parse `token:tenant` pairs separated by commas. A token may appear more than once.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut tokens: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (token, tenant) = entry
                .split_once(':')
                .map(|(token, tenant)| (token.trim(), tenant.trim()))
                .filter(|(token, tenant)| !token.is_empty() && !tenant.is_empty())
                .ok_or_else(|| ConfigError::InvalidApiToken(entry.to_string()))?;
            tokens
                .entry(token.to_string())
                .or_default()
                .insert(tenant.to_string());
        }

        if tokens.is_empty() {
            return Err(ConfigError::MissingSetting("APP_API_TOKENS"));
        }

        Ok(Self { tokens })
    }
}

/// Knobs for schema loading and pre-signed upload issuance.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub upload_base_url: String,
    pub signing_secret: String,
    pub max_host_countries: usize,
    pub schema_path: Option<PathBuf>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            upload_base_url: DEFAULT_UPLOAD_BASE_URL.to_string(),
            signing_secret: DEVELOPMENT_SIGNING_SECRET.to_string(),
            max_host_countries: DEFAULT_MAX_HOST_COUNTRIES,
            schema_path: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidApiToken(String),
    InvalidMaxHostCountries,
    MissingSetting(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidApiToken(entry) => {
                write!(f, "APP_API_TOKENS entry '{entry}' must look like token:tenant")
            }
            ConfigError::InvalidMaxHostCountries => {
                write!(f, "APP_MAX_HOST_COUNTRIES must be a positive integer")
            }
            ConfigError::MissingSetting(name) => write!(f, "{name} must be set"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidApiToken(_)
            | ConfigError::InvalidMaxHostCountries
            | ConfigError::MissingSetting(_) => None,
        }
    }
}
