//! Runtime configuration for report submission and sync.
//!
//! Values are read from environment variables (a `.env` file is loaded
//! by the binary before [`SyncConfig::from_env`] runs) and validated once
//! at startup. Everything downstream treats the config as read-only.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use validator::{Validate, ValidationError};

use crate::error::CoreError;
use crate::retention::{DEFAULT_RETENTION_DAYS, MAX_RETENTION_DAYS};

/// HTTP method used by the connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Get,
    Head,
}

impl ProbeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMethod::Get => "GET",
            ProbeMethod::Head => "HEAD",
        }
    }
}

impl FromStr for ProbeMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(ProbeMethod::Get),
            "HEAD" => Ok(ProbeMethod::Head),
            other => Err(CoreError::Validation(format!(
                "Unsupported probe method: '{other}'. Valid methods: GET, HEAD"
            ))),
        }
    }
}

/// Connectivity probe settings.
#[derive(Debug, Clone, Validate)]
pub struct ProbeConfig {
    #[validate(url)]
    pub url: String,
    pub method: ProbeMethod,
    #[validate(range(min = 100, max = 599))]
    pub expected_status: u16,
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: "https://www.google.com/generate_204".into(),
            method: ProbeMethod::Head,
            expected_status: 204,
            timeout_ms: 5_000,
        }
    }
}

/// Exponential backoff between connectivity re-checks while a report
/// waits for the network.
#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "validate_backoff"))]
pub struct BackoffConfig {
    #[validate(range(min = 1))]
    pub initial_delay_ms: u64,
    #[validate(range(min = 1))]
    pub max_delay_ms: u64,
    #[validate(range(min = 1.0))]
    pub multiplier: f64,
}

impl BackoffConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// The delay after `current`, clamped to the maximum.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay())
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

fn validate_backoff(config: &BackoffConfig) -> Result<(), ValidationError> {
    if config.max_delay_ms < config.initial_delay_ms {
        return Err(ValidationError::new("max_delay_below_initial_delay"));
    }
    Ok(())
}

/// Top-level configuration.
#[derive(Debug, Clone, Validate)]
pub struct SyncConfig {
    /// SQLite database location.
    pub database_url: String,
    /// Base URL of the report API, without trailing slash.
    #[validate(url)]
    pub api_base_url: String,
    /// Deadline for the data submission call.
    #[validate(range(min = 1))]
    pub submit_timeout_ms: u64,
    /// Deadline for uploading a report's photo.
    #[validate(range(min = 1))]
    pub photo_upload_timeout_ms: u64,
    /// Deadline for each infrastructure fetch or push request.
    #[validate(range(min = 1))]
    pub infrastructure_timeout_ms: u64,
    #[validate(nested)]
    pub probe: ProbeConfig,
    #[validate(nested)]
    pub network_retry: BackoffConfig,
    /// Days a successful report is kept before the retention sweep.
    #[validate(range(min = 0, max = MAX_RETENTION_DAYS))]
    pub retention_days: i64,
    /// Directory staged report photos are moved into.
    pub photo_dir: PathBuf,
}

impl SyncConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                                |
    /// |----------------------------|----------------------------------------|
    /// | `DATABASE_URL`             | `sqlite://fieldsync.db`                |
    /// | `API_BASE_URL`             | `http://localhost:8080/api/v1`         |
    /// | `SUBMIT_TIMEOUT_MS`        | `30000`                                |
    /// | `PHOTO_UPLOAD_TIMEOUT_MS`  | `120000`                               |
    /// | `INFRASTRUCTURE_TIMEOUT_MS`| `30000`                                |
    /// | `PROBE_URL`                | `https://www.google.com/generate_204`  |
    /// | `PROBE_METHOD`             | `HEAD`                                 |
    /// | `PROBE_EXPECTED_STATUS`    | `204`                                  |
    /// | `PROBE_TIMEOUT_MS`         | `5000`                                 |
    /// | `NETWORK_RETRY_INITIAL_MS` | `2000`                                 |
    /// | `NETWORK_RETRY_MAX_MS`     | `60000`                                |
    /// | `REPORT_RETENTION_DAYS`    | `30`                                   |
    /// | `PHOTO_DIR`                | `photos`                               |
    pub fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();

        let config = Self {
            database_url: env_or("DATABASE_URL", defaults.database_url)?,
            api_base_url: env_or::<String>("API_BASE_URL", defaults.api_base_url)?
                .trim_end_matches('/')
                .to_string(),
            submit_timeout_ms: env_or("SUBMIT_TIMEOUT_MS", defaults.submit_timeout_ms)?,
            photo_upload_timeout_ms: env_or(
                "PHOTO_UPLOAD_TIMEOUT_MS",
                defaults.photo_upload_timeout_ms,
            )?,
            infrastructure_timeout_ms: env_or(
                "INFRASTRUCTURE_TIMEOUT_MS",
                defaults.infrastructure_timeout_ms,
            )?,
            probe: ProbeConfig {
                url: env_or("PROBE_URL", defaults.probe.url)?,
                method: env_or("PROBE_METHOD", defaults.probe.method)?,
                expected_status: env_or("PROBE_EXPECTED_STATUS", defaults.probe.expected_status)?,
                timeout_ms: env_or("PROBE_TIMEOUT_MS", defaults.probe.timeout_ms)?,
            },
            network_retry: BackoffConfig {
                initial_delay_ms: env_or(
                    "NETWORK_RETRY_INITIAL_MS",
                    defaults.network_retry.initial_delay_ms,
                )?,
                max_delay_ms: env_or("NETWORK_RETRY_MAX_MS", defaults.network_retry.max_delay_ms)?,
                multiplier: defaults.network_retry.multiplier,
            },
            retention_days: env_or("REPORT_RETENTION_DAYS", defaults.retention_days)?,
            photo_dir: env_or("PHOTO_DIR", defaults.photo_dir)?,
        };

        config
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        Ok(config)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn photo_upload_timeout(&self) -> Duration {
        Duration::from_millis(self.photo_upload_timeout_ms)
    }

    pub fn infrastructure_timeout(&self) -> Duration {
        Duration::from_millis(self.infrastructure_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://fieldsync.db".into(),
            api_base_url: "http://localhost:8080/api/v1".into(),
            submit_timeout_ms: 30_000,
            photo_upload_timeout_ms: 120_000,
            infrastructure_timeout_ms: 30_000,
            probe: ProbeConfig::default(),
            network_retry: BackoffConfig::default(),
            retention_days: DEFAULT_RETENTION_DAYS,
            photo_dir: PathBuf::from("photos"),
        }
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T, CoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CoreError::Validation(format!("{key} is invalid: {e}"))),
        Err(_) => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
