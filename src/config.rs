use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_OVERDUE_SWEEP_INTERVAL_SECS: u64 = 3600;

/// M-Pesa gateway configuration.
///
/// Credentials are per-deployment; the STK flow is disabled entirely when
/// `enabled` is false so a till can run cash-only.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct MpesaConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Daraja API base URL (sandbox or production)
    #[serde(default = "default_mpesa_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub consumer_key: String,

    #[serde(default)]
    pub consumer_secret: String,

    /// Business short code the STK push bills against
    #[serde(default)]
    pub shortcode: String,

    /// Lipa na M-Pesa online passkey
    #[serde(default)]
    pub passkey: String,

    /// Publicly reachable URL the gateway posts callbacks to
    #[serde(default)]
    pub callback_url: String,
}

fn default_mpesa_base_url() -> String {
    "https://sandbox.safaricom.co.ke".to_string()
}

impl Default for MpesaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_mpesa_base_url(),
            consumer_key: String::new(),
            consumer_secret: String::new(),
            shortcode: String::new(),
            passkey: String::new(),
            callback_url: String::new(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment: development, test or production
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON (recommended in production)
    #[serde(default)]
    pub log_json: bool,

    /// Run embedded migrations on startup
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// VAT rate applied when a tenant has no settings row (fraction, e.g. 0.16)
    #[serde(default = "default_vat_rate")]
    pub default_vat_rate: Decimal,

    /// Whether selling prices include VAT by default
    #[serde(default = "default_true")]
    pub default_tax_inclusive: bool,

    /// Cashier commission share of sale profit (fraction, e.g. 0.15)
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,

    /// How often the overdue-credit sweep runs
    #[serde(default = "default_sweep_interval")]
    pub overdue_sweep_interval_secs: u64,

    #[serde(default)]
    #[validate]
    pub mpesa: MpesaConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_vat_rate() -> Decimal {
    // Kenyan standard VAT
    Decimal::new(16, 2)
}

fn default_commission_rate() -> Decimal {
    Decimal::new(15, 2)
}

fn default_sweep_interval() -> u64 {
    DEFAULT_OVERDUE_SWEEP_INTERVAL_SECS
}

impl AppConfig {
    /// Minimal constructor used by tests and tools that bypass file loading.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            default_vat_rate: default_vat_rate(),
            default_tax_inclusive: true,
            commission_rate: default_commission_rate(),
            overdue_sweep_interval_secs: default_sweep_interval(),
            mpesa: MpesaConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loads configuration from layered sources: `config/default.toml`, an
/// environment-specific file, then `DUKAPOS_*` environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = std::env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder()
        .set_default("environment", run_env.clone())?
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(Environment::with_prefix("DUKAPOS").separator("__"));

    // Fall back to a local SQLite file when nothing is configured, so a
    // fresh checkout starts without ceremony.
    if !Path::new(CONFIG_DIR).exists() && std::env::var("DUKAPOS_DATABASE_URL").is_err() {
        builder = builder.set_default("database_url", "sqlite://dukapos.db?mode=rwc")?;
    }

    let cfg: AppConfig = builder.build()?.try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    info!(environment = %cfg.environment, "configuration loaded");
    Ok(cfg)
}

/// Installs the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        );
        assert!(cfg.auto_migrate);
        assert_eq!(cfg.default_vat_rate, Decimal::new(16, 2));
        assert!(!cfg.is_production());
        assert_eq!(cfg.server_addr(), "127.0.0.1:8080");
    }
}
