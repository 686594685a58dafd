use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{
    config::ExchangeConfig,
    exchange::{base_url, configured_fee, parse_decimal, sign_hex, traits::*},
    types::{MarketInfo, Symbol, WithdrawalNetwork},
};

const DEFAULT_BASE_URL: &str = "https://api.binance.com";

pub struct BinanceClient {
    id: String,
    config: ExchangeConfig,
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    is_spot_trading_allowed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTickerResponse {
    bid_price: String,
    ask_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinConfig {
    coin: String,
    #[serde(default)]
    network_list: Vec<CoinNetwork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinNetwork {
    network: String,
    withdraw_fee: String,
    withdraw_enable: bool,
    deposit_enable: bool,
}

impl BinanceClient {
    pub fn new(id: &str, config: ExchangeConfig, http: Client) -> Result<Self> {
        let base_url = base_url(&config.base_url, DEFAULT_BASE_URL);
        Ok(Self {
            id: id.to_string(),
            config,
            http,
            base_url,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Binance request {} failed: {}", path, e))?
            .error_for_status()
            .map_err(|e| anyhow!("Binance request {} rejected: {}", path, e))?;

        response
            .json::<T>()
            .await
            .map_err(|e| anyhow!("Binance response {} could not be decoded: {}", path, e))
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn load_markets(&self) -> Result<Vec<MarketInfo>> {
        let info: ExchangeInfo = self.get_json("/api/v3/exchangeInfo").await?;
        let taker_fee = configured_fee(&self.config.taker_fee);
        let maker_fee = configured_fee(&self.config.maker_fee);

        let markets: Vec<MarketInfo> = info
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING" && s.is_spot_trading_allowed)
            .map(|s| MarketInfo {
                symbol: Symbol::new(&s.base_asset, &s.quote_asset),
                native_symbol: s.symbol,
                taker_fee: taker_fee.clone(),
                maker_fee: maker_fee.clone(),
            })
            .collect();

        debug!("Binance listed {} spot markets", markets.len());
        Ok(markets)
    }

    async fn fetch_ticker(&self, market: &MarketInfo) -> Result<BookTicker> {
        let path = format!("/api/v3/ticker/bookTicker?symbol={}", market.native_symbol);
        let ticker: BookTickerResponse = self.get_json(&path).await?;

        Ok(BookTicker {
            bid: parse_decimal(&ticker.bid_price, "bidPrice")?,
            ask: parse_decimal(&ticker.ask_price, "askPrice")?,
        })
    }

    async fn fetch_withdrawal_networks(&self, currency: &str) -> Result<Vec<WithdrawalNetwork>> {
        let (api_key, api_secret) = match (&self.config.api_key, &self.config.api_secret) {
            (Some(key), Some(secret)) => (key, secret),
            _ => return Err(anyhow!("Binance withdrawal networks require api credentials")),
        };

        let query = format!("timestamp={}", Utc::now().timestamp_millis());
        let signature = sign_hex(api_secret, &query)?;
        let url = format!(
            "{}/sapi/v1/capital/config/getall?{}&signature={}",
            self.base_url, query, signature
        );

        let coins: Vec<CoinConfig> = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await
            .map_err(|e| anyhow!("Binance coin config request failed: {}", e))?
            .error_for_status()
            .map_err(|e| anyhow!("Binance coin config rejected: {}", e))?
            .json()
            .await
            .map_err(|e| anyhow!("Binance coin config could not be decoded: {}", e))?;

        let coin = coins
            .into_iter()
            .find(|c| c.coin.eq_ignore_ascii_case(currency))
            .ok_or_else(|| anyhow!("Binance does not list currency {}", currency))?;

        coin.network_list
            .into_iter()
            .map(|n| {
                Ok(WithdrawalNetwork {
                    fee: parse_decimal(&n.withdraw_fee, "withdrawFee")?,
                    network: n.network,
                    active: n.deposit_enable,
                    withdraw_enabled: n.withdraw_enable,
                })
            })
            .collect()
    }

    async fn health_check(&self) -> Result<()> {
        debug!("Performing Binance health check");
        let _: serde_json::Value = self
            .get_json("/api/v3/ping")
            .await
            .map_err(|e| anyhow!("Binance health check failed: {}", e))?;
        Ok(())
    }
}
