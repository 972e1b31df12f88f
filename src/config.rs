//! Application settings, layered from config files and `OLIVE__*` variables.

use std::time::Duration;

use ::config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::utils::{CircuitBreakerConfig, RetryPolicy};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub scylla: ScyllaSettings,
    #[serde(default)]
    pub redpanda: RedpandaSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub orders: OrderSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScyllaSettings {
    #[serde(default = "default_known_nodes")]
    pub known_nodes: Vec<String>,
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,
}

fn default_known_nodes() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}

fn default_keyspace() -> String {
    "olive_orders".to_string()
}

fn default_replication_factor() -> u32 {
    1
}

impl Default for ScyllaSettings {
    fn default() -> Self {
        Self {
            known_nodes: default_known_nodes(),
            keyspace: default_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedpandaSettings {
    #[serde(default = "default_brokers")]
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
}

fn default_brokers() -> String {
    "127.0.0.1:9092".to_string()
}

fn default_topic() -> String {
    "olive.orders".to_string()
}

fn default_message_timeout_ms() -> u64 {
    5000
}

impl Default for RedpandaSettings {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topic: default_topic(),
            message_timeout_ms: default_message_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

/// Checkout and listing rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSettings {
    /// Largest accepted gap between the client's unit price and the catalog
    /// price, in cents.
    #[serde(default = "default_price_tolerance_cents")]
    pub price_tolerance_cents: u32,
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

fn default_price_tolerance_cents() -> u32 {
    1
}

fn default_page_size() -> u64 {
    10
}

fn default_max_page_size() -> u64 {
    100
}

impl OrderSettings {
    pub fn price_tolerance(&self) -> Decimal {
        Decimal::new(i64::from(self.price_tolerance_cents), 2)
    }
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            price_tolerance_cents: default_price_tolerance_cents(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Write notifications to the log only.
    Log,
    /// Publish to Redpanda; needs the `redpanda` feature.
    Redpanda,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_sink")]
    pub sink: SinkKind,
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: u32,
    #[serde(default = "default_breaker_open_secs")]
    pub breaker_open_secs: u64,
    #[serde(default = "default_breaker_success_threshold")]
    pub breaker_success_threshold: u32,
}

fn default_sink() -> SinkKind {
    SinkKind::Log
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    5000
}

fn default_breaker_failure_threshold() -> u32 {
    5
}

fn default_breaker_open_secs() -> u64 {
    30
}

fn default_breaker_success_threshold() -> u32 {
    2
}

impl NotificationSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            multiplier: 2.0,
        }
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            open_timeout: Duration::from_secs(self.breaker_open_secs),
            success_threshold: self.breaker_success_threshold,
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            sink: default_sink(),
            retry_max_attempts: default_retry_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            breaker_failure_threshold: default_breaker_failure_threshold(),
            breaker_open_secs: default_breaker_open_secs(),
            breaker_success_threshold: default_breaker_success_threshold(),
        }
    }
}

impl Settings {
    /// Load settings from `config/default`, `config/{RUN_MODE}` and
    /// `config/local` (all optional), then `OLIVE__SECTION__KEY` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = std::env::var("OLIVE_CONFIG_DIR").unwrap_or_else(|_| "config".into());

        Config::builder()
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            .add_source(File::with_name(&format!("{config_dir}/{run_mode}")).required(false))
            .add_source(File::with_name(&format!("{config_dir}/local")).required(false))
            .add_source(
                Environment::with_prefix("OLIVE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::FileFormat;
    use rust_decimal_macros::dec;

    fn from_toml(toml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.scylla.keyspace, "olive_orders");
        assert_eq!(settings.orders.price_tolerance(), dec!(0.01));
        assert_eq!(settings.orders.default_page_size, 10);
        assert_eq!(settings.orders.max_page_size, 100);
        assert_eq!(settings.notifications.sink, SinkKind::Log);
    }

    #[test]
    fn test_empty_source_yields_defaults() {
        assert_eq!(from_toml(""), Settings::default());
    }

    #[test]
    fn test_partial_override() {
        let settings = from_toml(
            r#"
            [orders]
            price_tolerance_cents = 5

            [notifications]
            sink = "redpanda"
            retry_max_attempts = 1
            "#,
        );

        assert_eq!(settings.orders.price_tolerance(), dec!(0.05));
        assert_eq!(settings.orders.max_page_size, 100);
        assert_eq!(settings.notifications.sink, SinkKind::Redpanda);
        assert_eq!(settings.notifications.retry_policy().max_attempts, 1);
        assert_eq!(settings.scylla.known_nodes, vec!["127.0.0.1:9042".to_string()]);
    }

    #[test]
    fn test_breaker_config_from_settings() {
        let breaker = NotificationSettings::default().breaker_config();
        assert_eq!(breaker.open_timeout, Duration::from_secs(30));
        assert_eq!(breaker.failure_threshold, 5);
    }
}
