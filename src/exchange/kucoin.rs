use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{
    config::ExchangeConfig,
    exchange::{base_url, configured_fee, parse_decimal, traits::*},
    types::{MarketInfo, Symbol, WithdrawalNetwork},
};

const DEFAULT_BASE_URL: &str = "https://api.kucoin.com";

pub struct KucoinClient {
    id: String,
    config: ExchangeConfig,
    http: Client,
    base_url: String,
}

/// Every KuCoin response is wrapped in `{ code, data }`; `200000` means success.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    data: Option<T>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    base_currency: String,
    quote_currency: String,
    enable_trading: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Level1 {
    best_bid: Option<String>,
    best_ask: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrencyDetail {
    #[serde(default)]
    chains: Vec<Chain>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Chain {
    chain_name: String,
    withdrawal_min_fee: Option<String>,
    is_withdraw_enabled: bool,
    is_deposit_enabled: bool,
}

impl KucoinClient {
    pub fn new(id: &str, config: ExchangeConfig, http: Client) -> Result<Self> {
        let base_url = base_url(&config.base_url, DEFAULT_BASE_URL);
        Ok(Self {
            id: id.to_string(),
            config,
            http,
            base_url,
        })
    }

    async fn get_data<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let envelope: Envelope<T> = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("KuCoin request {} failed: {}", path, e))?
            .error_for_status()
            .map_err(|e| anyhow!("KuCoin request {} rejected: {}", path, e))?
            .json()
            .await
            .map_err(|e| anyhow!("KuCoin response {} could not be decoded: {}", path, e))?;

        if envelope.code != "200000" {
            return Err(anyhow!(
                "KuCoin error {} on {}: {}",
                envelope.code,
                path,
                envelope.msg.unwrap_or_default()
            ));
        }
        envelope
            .data
            .ok_or_else(|| anyhow!("KuCoin returned no data for {}", path))
    }
}

#[async_trait]
impl ExchangeClient for KucoinClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn load_markets(&self) -> Result<Vec<MarketInfo>> {
        let symbols: Vec<SymbolInfo> = self.get_data("/api/v2/symbols").await?;
        let taker_fee = configured_fee(&self.config.taker_fee);
        let maker_fee = configured_fee(&self.config.maker_fee);

        let markets: Vec<MarketInfo> = symbols
            .into_iter()
            .filter(|s| s.enable_trading)
            .map(|s| MarketInfo {
                symbol: Symbol::new(&s.base_currency, &s.quote_currency),
                native_symbol: s.symbol,
                taker_fee: taker_fee.clone(),
                maker_fee: maker_fee.clone(),
            })
            .collect();

        debug!("KuCoin listed {} spot markets", markets.len());
        Ok(markets)
    }

    async fn fetch_ticker(&self, market: &MarketInfo) -> Result<BookTicker> {
        let path = format!("/api/v1/market/orderbook/level1?symbol={}", market.native_symbol);
        let level1: Level1 = self.get_data(&path).await?;

        let bid = level1.best_bid.ok_or_else(|| anyhow!("KuCoin has no bid for {}", market.native_symbol))?;
        let ask = level1.best_ask.ok_or_else(|| anyhow!("KuCoin has no ask for {}", market.native_symbol))?;

        Ok(BookTicker {
            bid: parse_decimal(&bid, "bestBid")?,
            ask: parse_decimal(&ask, "bestAsk")?,
        })
    }

    async fn fetch_withdrawal_networks(&self, currency: &str) -> Result<Vec<WithdrawalNetwork>> {
        let path = format!("/api/v3/currencies/{}", currency.to_uppercase());
        let detail: CurrencyDetail = self.get_data(&path).await?;

        detail
            .chains
            .into_iter()
            .map(|chain| {
                let fee = chain
                    .withdrawal_min_fee
                    .ok_or_else(|| anyhow!("KuCoin chain {} has no withdrawal fee", chain.chain_name))?;
                Ok(WithdrawalNetwork {
                    fee: parse_decimal(&fee, "withdrawalMinFee")?,
                    network: chain.chain_name,
                    active: chain.is_deposit_enabled,
                    withdraw_enabled: chain.is_withdraw_enabled,
                })
            })
            .collect()
    }

    async fn health_check(&self) -> Result<()> {
        debug!("Performing KuCoin health check");
        let _: i64 = self
            .get_data("/api/v1/timestamp")
            .await
            .map_err(|e| anyhow!("KuCoin health check failed: {}", e))?;
        Ok(())
    }
}
