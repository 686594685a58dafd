use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::debug;

use crate::{
    config::ExchangeConfig,
    exchange::{base_url, configured_fee, parse_decimal, sign_hex, traits::*},
    types::{MarketInfo, Symbol, WithdrawalNetwork},
};

const DEFAULT_BASE_URL: &str = "https://api.bybit.com";
const RECV_WINDOW: &str = "5000";

pub struct BybitClient {
    id: String,
    config: ExchangeConfig,
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instrument {
    symbol: String,
    base_coin: String,
    quote_coin: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
    bid1_price: String,
    ask1_price: String,
}

#[derive(Debug, Deserialize)]
struct CoinRows {
    #[serde(default)]
    rows: Vec<CoinInfo>,
}

#[derive(Debug, Deserialize)]
struct CoinInfo {
    coin: String,
    #[serde(default)]
    chains: Vec<CoinChain>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinChain {
    chain: String,
    withdraw_fee: String,
    chain_withdraw: String,
    chain_deposit: String,
}

impl BybitClient {
    pub fn new(id: &str, config: ExchangeConfig, http: Client) -> Result<Self> {
        let base_url = base_url(&config.base_url, DEFAULT_BASE_URL);
        Ok(Self {
            id: id.to_string(),
            config,
            http,
            base_url,
        })
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> Result<T> {
        let envelope: Envelope<T> = request
            .send()
            .await
            .map_err(|e| anyhow!("Bybit request {} failed: {}", path, e))?
            .error_for_status()
            .map_err(|e| anyhow!("Bybit request {} rejected: {}", path, e))?
            .json()
            .await
            .map_err(|e| anyhow!("Bybit response {} could not be decoded: {}", path, e))?;

        if envelope.ret_code != 0 {
            return Err(anyhow!("Bybit error {} on {}: {}", envelope.ret_code, path, envelope.ret_msg));
        }
        envelope
            .result
            .ok_or_else(|| anyhow!("Bybit returned no result for {}", path))
    }

    async fn get_public<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.http.get(&url), path).await
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn load_markets(&self) -> Result<Vec<MarketInfo>> {
        let instruments: ListResult<Instrument> = self
            .get_public("/v5/market/instruments-info?category=spot")
            .await?;
        let taker_fee = configured_fee(&self.config.taker_fee);
        let maker_fee = configured_fee(&self.config.maker_fee);

        let markets: Vec<MarketInfo> = instruments
            .list
            .into_iter()
            .filter(|i| i.status == "Trading")
            .map(|i| MarketInfo {
                symbol: Symbol::new(&i.base_coin, &i.quote_coin),
                native_symbol: i.symbol,
                taker_fee: taker_fee.clone(),
                maker_fee: maker_fee.clone(),
            })
            .collect();

        debug!("Bybit listed {} spot markets", markets.len());
        Ok(markets)
    }

    async fn fetch_ticker(&self, market: &MarketInfo) -> Result<BookTicker> {
        let path = format!("/v5/market/tickers?category=spot&symbol={}", market.native_symbol);
        let tickers: ListResult<Ticker> = self.get_public(&path).await?;
        let ticker = tickers
            .list
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Bybit returned no ticker for {}", market.native_symbol))?;

        Ok(BookTicker {
            bid: parse_decimal(&ticker.bid1_price, "bid1Price")?,
            ask: parse_decimal(&ticker.ask1_price, "ask1Price")?,
        })
    }

    async fn fetch_withdrawal_networks(&self, currency: &str) -> Result<Vec<WithdrawalNetwork>> {
        let (api_key, api_secret) = match (&self.config.api_key, &self.config.api_secret) {
            (Some(key), Some(secret)) => (key, secret),
            _ => return Err(anyhow!("Bybit withdrawal networks require api credentials")),
        };

        let query = format!("coin={}", currency.to_uppercase());
        let path = format!("/v5/asset/coin/query-info?{}", query);
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sign_hex(api_secret, &format!("{}{}{}{}", timestamp, api_key, RECV_WINDOW, query))?;

        let request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("X-BAPI-API-KEY", api_key)
            .header("X-BAPI-TIMESTAMP", &timestamp)
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", signature);
        let coins: CoinRows = self.send(request, &path).await?;

        let coin = coins
            .rows
            .into_iter()
            .find(|c| c.coin.eq_ignore_ascii_case(currency))
            .ok_or_else(|| anyhow!("Bybit does not list currency {}", currency))?;

        coin.chains
            .into_iter()
            .map(|chain| {
                Ok(WithdrawalNetwork {
                    fee: parse_decimal(&chain.withdraw_fee, "withdrawFee")?,
                    network: chain.chain,
                    active: chain.chain_deposit == "1",
                    withdraw_enabled: chain.chain_withdraw == "1",
                })
            })
            .collect()
    }

    async fn health_check(&self) -> Result<()> {
        debug!("Performing Bybit health check");
        let _: serde_json::Value = self
            .get_public("/v5/market/time")
            .await
            .map_err(|e| anyhow!("Bybit health check failed: {}", e))?;
        Ok(())
    }
}
