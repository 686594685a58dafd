//! Providers selectable by exchange id.

use anyhow::Result;
use reqwest::Client;
use std::sync::Arc;

use crate::{
    config::ExchangeConfig,
    error::ArbitrageError,
    exchange::{BinanceClient, BybitClient, ExchangeClient, KucoinClient},
};

type ClientFactory = fn(&str, ExchangeConfig, Client) -> Result<Arc<dyn ExchangeClient>>;

struct Provider {
    id: &'static str,
    name: &'static str,
    factory: ClientFactory,
}

const PROVIDERS: &[Provider] = &[
    Provider {
        id: "binance",
        name: "Binance",
        factory: build_binance,
    },
    Provider {
        id: "bybit",
        name: "Bybit",
        factory: build_bybit,
    },
    Provider {
        id: "kucoin",
        name: "KuCoin",
        factory: build_kucoin,
    },
];

fn build_binance(id: &str, config: ExchangeConfig, http: Client) -> Result<Arc<dyn ExchangeClient>> {
    Ok(Arc::new(BinanceClient::new(id, config, http)?))
}

fn build_bybit(id: &str, config: ExchangeConfig, http: Client) -> Result<Arc<dyn ExchangeClient>> {
    Ok(Arc::new(BybitClient::new(id, config, http)?))
}

fn build_kucoin(id: &str, config: ExchangeConfig, http: Client) -> Result<Arc<dyn ExchangeClient>> {
    Ok(Arc::new(KucoinClient::new(id, config, http)?))
}

fn provider(id: &str) -> Option<&'static Provider> {
    PROVIDERS.iter().find(|p| p.id == id)
}

pub fn is_supported(id: &str) -> bool {
    provider(id).is_some()
}

pub fn supported_ids() -> Vec<&'static str> {
    PROVIDERS.iter().map(|p| p.id).collect()
}

pub fn default_name(id: &str) -> Option<&'static str> {
    provider(id).map(|p| p.name)
}

pub fn create_client(
    id: &str,
    config: ExchangeConfig,
    http: Client,
) -> Result<Arc<dyn ExchangeClient>, ArbitrageError> {
    let provider = provider(id)
        .ok_or_else(|| ArbitrageError::Configuration(format!("unsupported exchange id '{}'", id)))?;

    (provider.factory)(id, config, http)
        .map_err(|e| ArbitrageError::Configuration(format!("failed to build {} client: {}", id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::create_test_exchange_config;

    #[test]
    fn test_supported_ids() {
        assert_eq!(supported_ids(), vec!["binance", "bybit", "kucoin"]);
        assert!(is_supported("kucoin"));
        assert!(!is_supported("ftx"));
        assert_eq!(default_name("bybit"), Some("Bybit"));
    }

    #[test]
    fn test_create_client() {
        let client = create_client("binance", create_test_exchange_config("Binance"), Client::new()).unwrap();
        assert_eq!(client.id(), "binance");
        assert_eq!(client.name(), "Binance");
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let result = create_client("ftx", create_test_exchange_config("FTX"), Client::new());
        assert!(matches!(result, Err(ArbitrageError::Configuration(_))));
    }
}
