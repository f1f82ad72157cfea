use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::review::evaluations::{ConsensusConfig, WeightingConfig};
use crate::workflows::review::mutation::RetryPolicy;

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
    pub review: ReviewConfig,
    pub access: AccessConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            review: ReviewConfig::from_env()?,
            access: AccessConfig::from_env(),
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

/// Tunables for the review engine: write retries, reviewer weighting and
/// consensus classification boundaries.
#[derive(Debug, Clone, Default)]
pub struct ReviewConfig {
    pub retry: RetryPolicy,
    pub weighting: WeightingConfig,
    pub consensus: ConsensusConfig,
}

impl ReviewConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let retry = RetryPolicy::new(
            env_or("REVIEW_RETRY_ATTEMPTS", defaults.retry.max_attempts())?,
            Duration::from_millis(env_or(
                "REVIEW_RETRY_BACKOFF_MS",
                defaults.retry.backoff().as_millis() as u64,
            )?),
        );

        let consensus = ConsensusConfig {
            strong_threshold: env_or("REVIEW_STRONG_THRESHOLD", defaults.consensus.strong_threshold)?,
            midpoint: env_or("REVIEW_MIDPOINT", defaults.consensus.midpoint)?,
            low_spread: env_or("REVIEW_LOW_SPREAD", defaults.consensus.low_spread)?,
            high_spread: env_or("REVIEW_HIGH_SPREAD", defaults.consensus.high_spread)?,
            min_reviewers: env_or("REVIEW_MIN_REVIEWERS", defaults.consensus.min_reviewers)?,
            ..defaults.consensus
        };

        Ok(Self {
            retry,
            weighting: defaults.weighting,
            consensus,
        })
    }
}

/// Static role assignments used when no external identity provider is wired in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessConfig {
    pub admins: Vec<String>,
    pub reviewers: Vec<String>,
}

impl AccessConfig {
    fn from_env() -> Self {
        Self {
            admins: env_list("REVIEW_ADMIN_IDS"),
            reviewers: env_list("REVIEW_REVIEWER_IDS"),
        }
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key }),
        Err(_) => Ok(default),
    }
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key } => write!(f, "{key} could not be parsed"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
