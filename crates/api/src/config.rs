//! Application configuration loaded from environment variables.

use std::time::Duration;

use chrono::TimeDelta;
use fulfillment::{DispatchConfig, RetryPolicy, ShiprocketClient};
use notifications::{JobConfig, ResendMailer};
use thiserror::Error;

/// Configuration problems found at startup.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server and job configuration.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: PostgreSQL; the server falls back to memory without it
/// - `SHIPROCKET_API_TOKEN` (required), `SHIPROCKET_BASE_URL`
/// - `RESEND_API_KEY` (required), `RESEND_BASE_URL`, `MAIL_FROM`, `OPS_ALERT_EMAIL`
/// - `DISPATCH_CONCURRENCY`, `DISPATCH_TIMEOUT_SECS`, `DISPATCH_MAX_ATTEMPTS`
/// - `ABANDONED_CART_MINUTES`, `REVIEW_REQUEST_DAYS`, `SLA_HOURS`,
///   `VENDOR_COMMISSION_PERCENT`
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub shiprocket_api_token: String,
    pub shiprocket_base_url: String,
    pub resend_api_key: String,
    pub resend_base_url: String,
    pub mail_from: String,
    pub ops_alert_email: Option<String>,
    pub dispatch_concurrency: usize,
    pub dispatch_timeout_secs: u64,
    pub dispatch_max_attempts: u32,
    pub abandoned_cart_minutes: i64,
    pub review_request_days: i64,
    pub sla_hours: i64,
    pub vendor_commission_percent: u32,
}

const DEFAULT_MAIL_FROM: &str = "Marketplace <orders@marketplace.local>";

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected text or json".to_string(),
                });
            }
        };

        let dispatch_concurrency = parse(&get, "DISPATCH_CONCURRENCY", 4usize)?;
        if dispatch_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "DISPATCH_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&get, "PORT", 3000)?,
            log_level: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_format,
            database_url: get("DATABASE_URL"),
            shiprocket_api_token: required("SHIPROCKET_API_TOKEN")?,
            shiprocket_base_url: get("SHIPROCKET_BASE_URL")
                .unwrap_or_else(|| ShiprocketClient::DEFAULT_BASE_URL.to_string()),
            resend_api_key: required("RESEND_API_KEY")?,
            resend_base_url: get("RESEND_BASE_URL")
                .unwrap_or_else(|| ResendMailer::DEFAULT_BASE_URL.to_string()),
            mail_from: get("MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
            ops_alert_email: get("OPS_ALERT_EMAIL"),
            dispatch_concurrency,
            dispatch_timeout_secs: parse(&get, "DISPATCH_TIMEOUT_SECS", 30)?,
            dispatch_max_attempts: parse(&get, "DISPATCH_MAX_ATTEMPTS", 3)?,
            abandoned_cart_minutes: parse(&get, "ABANDONED_CART_MINUTES", 60)?,
            review_request_days: parse(&get, "REVIEW_REQUEST_DAYS", 7)?,
            sla_hours: parse(&get, "SLA_HOURS", 48)?,
            vendor_commission_percent: parse(&get, "VENDOR_COMMISSION_PERCENT", 10)?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            max_concurrency: self.dispatch_concurrency,
            call_timeout: Duration::from_secs(self.dispatch_timeout_secs),
            retry: RetryPolicy::default().with_max_attempts(self.dispatch_max_attempts),
        }
    }

    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            abandoned_cart_after: TimeDelta::minutes(self.abandoned_cart_minutes),
            review_request_after: TimeDelta::days(self.review_request_days),
            sla: TimeDelta::hours(self.sla_hours),
            commission_percent: self.vendor_commission_percent,
        }
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("SHIPROCKET_API_TOKEN", "sr-token"),
        ("RESEND_API_KEY", "re_key"),
    ];

    #[test]
    fn test_default_values() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.database_url, None);
        assert_eq!(config.shiprocket_base_url, "https://apiv2.shiprocket.in");
        assert_eq!(config.resend_base_url, "https://api.resend.com");
        assert_eq!(config.ops_alert_email, None);
        assert_eq!(config.dispatch_concurrency, 4);
        assert_eq!(config.dispatch_timeout_secs, 30);
        assert_eq!(config.dispatch_max_attempts, 3);
        assert_eq!(config.abandoned_cart_minutes, 60);
        assert_eq!(config.review_request_days, 7);
        assert_eq!(config.sla_hours, 48);
        assert_eq!(config.vendor_commission_percent, 10);
    }

    #[test]
    fn test_missing_required_keys() {
        assert_eq!(load(&[]), Err(ConfigError::Missing("SHIPROCKET_API_TOKEN")));
        assert_eq!(
            load(&[("SHIPROCKET_API_TOKEN", "t"), ("RESEND_API_KEY", "  ")]),
            Err(ConfigError::Missing("RESEND_API_KEY"))
        );
    }

    #[test]
    fn test_invalid_numbers() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "eighty"));
        assert!(matches!(load(&pairs), Err(ConfigError::Invalid { key: "PORT", .. })));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DISPATCH_CONCURRENCY", "0"));
        assert!(matches!(
            load(&pairs),
            Err(ConfigError::Invalid { key: "DISPATCH_CONCURRENCY", .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("LOG_FORMAT", "yaml"));
        assert!(matches!(load(&pairs), Err(ConfigError::Invalid { key: "LOG_FORMAT", .. })));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "json"),
            ("DATABASE_URL", "postgres://localhost/marketplace"),
            ("OPS_ALERT_EMAIL", "ops@marketplace.in"),
            ("DISPATCH_CONCURRENCY", "1"),
            ("DISPATCH_TIMEOUT_SECS", "5"),
            ("DISPATCH_MAX_ATTEMPTS", "5"),
            ("SLA_HOURS", "24"),
        ]);
        let config = load(&pairs).unwrap();

        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/marketplace"));
        assert_eq!(config.ops_alert_email.as_deref(), Some("ops@marketplace.in"));

        let dispatch = config.dispatch_config();
        assert_eq!(dispatch.max_concurrency, 1);
        assert_eq!(dispatch.call_timeout, Duration::from_secs(5));
        assert_eq!(dispatch.retry.max_attempts, 5);

        assert_eq!(config.job_config().sla, TimeDelta::hours(24));
    }
}
