//! Configuration types, built from environment variables.
//!
//! Each config has a `from_env()` constructor plus a `from_lookup()` variant
//! taking an injectable lookup function so tests never have to mutate the
//! process environment.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default AMQP broker URL (local RabbitMQ, default vhost).
pub const DEFAULT_BROKER_URL: &str = "amqp://localhost:5672/%2f";

/// Filter thresholds: a record passes only if both of its numeric fields
/// are strictly greater than these.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub life_expectancy: f64,
    pub gdp_per_capita: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        // 2020 worldwide averages from the source dataset.
        Self {
            life_expectancy: 72.72,
            gdp_per_capita: 10881.0,
        }
    }
}

/// Producer role configuration.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// AMQP broker URL.
    pub broker_url: String,
    /// Source dataset CSV.
    pub input_path: PathBuf,
    /// Normalized intermediate record set, also the consumer's region
    /// discovery input.
    pub intermediate_path: PathBuf,
    /// Fixed delay between successive publishes (throughput cap).
    pub publish_delay: Duration,
}

impl ProducerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let delay_secs = parse_or_default(&lookup, "REGIONFAN_PUBLISH_DELAY_SECS", 3u64)?;
        Ok(Self {
            broker_url: lookup("REGIONFAN_BROKER_URL")
                .unwrap_or_else(|| DEFAULT_BROKER_URL.to_string()),
            input_path: lookup("REGIONFAN_INPUT_CSV")
                .unwrap_or_else(|| "Life-Expectancy-Data-Updated.csv".to_string())
                .into(),
            intermediate_path: lookup("REGIONFAN_INTERMEDIATE_CSV")
                .unwrap_or_else(|| "intermediate_file.csv".to_string())
                .into(),
            publish_delay: Duration::from_secs(delay_secs),
        })
    }
}

/// Consumer role configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// AMQP broker URL.
    pub broker_url: String,
    /// Intermediate record set used for region discovery.
    pub intermediate_path: PathBuf,
    /// Directory for per-region output files.
    pub output_dir: PathBuf,
    /// Filter thresholds.
    pub thresholds: Thresholds,
}

impl ConsumerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Thresholds::default();
        let thresholds = Thresholds {
            life_expectancy: parse_or_default(
                &lookup,
                "REGIONFAN_LIFE_EXPECTANCY_MIN",
                defaults.life_expectancy,
            )?,
            gdp_per_capita: parse_or_default(
                &lookup,
                "REGIONFAN_GDP_PER_CAPITA_MIN",
                defaults.gdp_per_capita,
            )?,
        };
        Ok(Self {
            broker_url: lookup("REGIONFAN_BROKER_URL")
                .unwrap_or_else(|| DEFAULT_BROKER_URL.to_string()),
            intermediate_path: lookup("REGIONFAN_INTERMEDIATE_CSV")
                .unwrap_or_else(|| "intermediate_file.csv".to_string())
                .into(),
            output_dir: lookup("REGIONFAN_OUTPUT_DIR")
                .unwrap_or_else(|| "output".to_string())
                .into(),
            thresholds,
        })
    }
}

/// SMTP configuration for the shutdown notification emails.
///
/// Sender, recipient, and password are required; missing any of them is a
/// startup-fatal condition for the consumer role.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_address: String,
    pub to_address: String,
    pub username: String,
    pub password: SecretString,
}

impl SmtpConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let from_address = require(&lookup, "EMAIL_FROM")?;
        let to_address = require(&lookup, "EMAIL_TO")?;
        let password = SecretString::from(require(&lookup, "EMAIL_PASSWORD")?);
        let username = lookup("EMAIL_USERNAME").unwrap_or_else(|| from_address.clone());
        let port = parse_or_default(&lookup, "EMAIL_SMTP_PORT", 587u16)?;

        Ok(Self {
            host: lookup("EMAIL_SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            port,
            from_address,
            to_address,
            username,
            password,
        })
    }
}

fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or_default<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
