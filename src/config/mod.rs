use crate::models::{HistoryRange, Interval, StatementFrequency};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// Market-data provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_chart_base_url")]
    pub chart_base_url: String,

    #[serde(default = "default_timeseries_base_url")]
    pub timeseries_base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries on top of the first attempt; transient failures only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Memoization of provider answers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Zero disables caching.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

/// What the dashboard shows and where it is written
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DashboardConfig {
    #[serde(default = "default_ticker")]
    pub default_ticker: String,

    #[serde(default)]
    pub range: HistoryRange,

    #[serde(default)]
    pub interval: Interval,

    /// Statement plotted in the financials chart.
    #[serde(default)]
    pub statement: StatementFrequency,

    #[serde(default = "default_news_base_url")]
    pub news_base_url: String,

    #[serde(default = "default_output")]
    pub output: PathBuf,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_chart_base_url() -> String {
    "https://query1.finance.yahoo.com/v8/finance/chart".to_string()
}
fn default_timeseries_base_url() -> String {
    "https://query2.finance.yahoo.com/ws/fundamentals-timeseries/v1/finance/timeseries".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
        .to_string()
}
fn default_ttl_secs() -> u64 {
    3600
}
fn default_ticker() -> String {
    "AAPL".to_string()
}
fn default_news_base_url() -> String {
    "https://www.bloomberg.com/search".to_string()
}
fn default_output() -> PathBuf {
    PathBuf::from("dashboard.html")
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            chart_base_url: default_chart_base_url(),
            timeseries_base_url: default_timeseries_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_ticker: default_ticker(),
            range: HistoryRange::default(),
            interval: Interval::default(),
            statement: StatementFrequency::default(),
            news_base_url: default_news_base_url(),
            output: default_output(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("DASHBOARD").separator("__"))
            .build()?;

        Ok(Self::from_config(cfg))
    }

    fn from_config(cfg: config::Config) -> Self {
        cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Invalid configuration ({}), falling back to defaults", e);
            AppConfig::default()
        })
    }
}
