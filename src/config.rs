use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

use crate::{error::ArbitrageError, exchange::registry};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub exchanges: HashMap<String, ExchangeConfig>,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExchangeConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_connection_type")]
    pub connection_type: String,
    pub base_url: Option<String>,
    pub taker_fee: Option<String>,
    pub maker_fee: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub interval_seconds: u64,
    pub top_n: usize,
    pub fetch_timeout_ms: u64,
    pub cycle_deadline_ms: u64,
    pub max_concurrent_fetches: usize,
    pub quote_currencies: Vec<String>,
    pub max_symbols: Option<usize>,
    pub min_spread_percentage: Option<String>,
    pub preferred_networks: Vec<String>,
    pub withdrawal_cache_ttl_seconds: u64,
    pub recent_window_minutes: i64,
    pub maintenance_every_cycles: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
            top_n: 20,
            fetch_timeout_ms: 10_000,
            cycle_deadline_ms: 30_000,
            max_concurrent_fetches: 16,
            quote_currencies: vec!["USDT".to_string()],
            max_symbols: None,
            min_spread_percentage: None,
            preferred_networks: Vec::new(),
            withdrawal_cache_ttl_seconds: 600,
            recent_window_minutes: 60,
            maintenance_every_cycles: 100,
        }
    }
}

impl AnalyzerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_millis(self.cycle_deadline_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL. Without one, opportunities are kept in memory only.
    pub url: Option<String>,
    pub max_connections: u32,
    pub retention_days: i64,
    pub max_records: Option<i64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            retention_days: 7,
            max_records: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3031".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BroadcastConfig {
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_connection_type() -> String {
    "rest".to_string()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let mut settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("SPOTARB").separator("__"));

        // Override database URL from environment if present
        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            settings = settings.set_override("database.url", db_url)?;
        }

        let config: Config = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Startup validation. This is the only place a configuration error is fatal.
    pub fn validate(&self) -> Result<(), ArbitrageError> {
        for id in self.exchanges.keys() {
            if !registry::is_supported(id) {
                return Err(ArbitrageError::Configuration(format!(
                    "unsupported exchange id '{}' (supported: {})",
                    id,
                    registry::supported_ids().join(", ")
                )));
            }
        }

        let active = self.active_exchange_ids();
        if active.len() < 2 {
            return Err(ArbitrageError::Configuration(format!(
                "at least two active exchanges are required, found {}",
                active.len()
            )));
        }

        if self.analyzer.top_n == 0 {
            return Err(ArbitrageError::Configuration("analyzer.top_n must be at least 1".into()));
        }
        if self.analyzer.max_concurrent_fetches == 0 {
            return Err(ArbitrageError::Configuration(
                "analyzer.max_concurrent_fetches must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Active exchange ids in a stable order.
    pub fn active_exchange_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .exchanges
            .iter()
            .filter(|(_, exchange)| exchange.is_active)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
