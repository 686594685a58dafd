//! Scriptable in-process exchange used by tests across the crate.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::{
    collections::{HashMap, HashSet},
    str::FromStr,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use crate::{
    exchange::traits::{BookTicker, ExchangeClient},
    types::{MarketInfo, Symbol, WithdrawalNetwork},
};

pub struct FakeExchange {
    id: String,
    name: String,
    taker_fee: Option<BigDecimal>,
    maker_fee: Option<BigDecimal>,
    tickers: HashMap<String, BookTicker>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    networks: HashMap<String, Vec<WithdrawalNetwork>>,
    load_delay: Duration,
    offline: AtomicBool,
    pub load_calls: AtomicUsize,
    pub network_calls: AtomicUsize,
}

pub fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

impl FakeExchange {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_uppercase(),
            taker_fee: Some(dec("0.001")),
            maker_fee: Some(dec("0.001")),
            tickers: HashMap::new(),
            delays: HashMap::new(),
            failing: HashSet::new(),
            networks: HashMap::new(),
            load_delay: Duration::from_millis(0),
            offline: AtomicBool::new(false),
            load_calls: AtomicUsize::new(0),
            network_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_quote(mut self, symbol: &str, bid: &str, ask: &str) -> Self {
        self.tickers.insert(
            symbol.to_string(),
            BookTicker {
                bid: dec(bid),
                ask: dec(ask),
            },
        );
        self
    }

    pub fn with_delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.insert(symbol.to_string(), delay);
        self
    }

    pub fn with_failure(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    pub fn with_fees(mut self, taker: Option<&str>, maker: Option<&str>) -> Self {
        self.taker_fee = taker.map(dec);
        self.maker_fee = maker.map(dec);
        self
    }

    pub fn with_networks(mut self, currency: &str, networks: Vec<WithdrawalNetwork>) -> Self {
        self.networks.insert(currency.to_string(), networks);
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Every ticker request fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

pub fn network(name: &str, fee: &str, active: bool, withdraw_enabled: bool) -> WithdrawalNetwork {
    WithdrawalNetwork {
        network: name.to_string(),
        fee: dec(fee),
        active,
        withdraw_enabled,
    }
}

#[async_trait]
impl ExchangeClient for FakeExchange {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn load_markets(&self) -> Result<Vec<MarketInfo>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }

        let mut symbols: Vec<&String> = self.tickers.keys().chain(self.failing.iter()).collect();
        symbols.sort();
        symbols.dedup();

        Ok(symbols
            .into_iter()
            .filter_map(|id| Symbol::parse(id))
            .map(|symbol| MarketInfo {
                native_symbol: symbol.id.replace('/', ""),
                symbol,
                taker_fee: self.taker_fee.clone(),
                maker_fee: self.maker_fee.clone(),
            })
            .collect())
    }

    async fn fetch_ticker(&self, market: &MarketInfo) -> Result<BookTicker> {
        if let Some(delay) = self.delays.get(&market.symbol.id) {
            tokio::time::sleep(*delay).await;
        }
        if self.offline.load(Ordering::SeqCst) || self.failing.contains(&market.symbol.id) {
            return Err(anyhow!("connection reset by {}", self.id));
        }
        self.tickers
            .get(&market.symbol.id)
            .cloned()
            .ok_or_else(|| anyhow!("no ticker for {}", market.symbol.id))
    }

    async fn fetch_withdrawal_networks(&self, currency: &str) -> Result<Vec<WithdrawalNetwork>> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        self.networks
            .get(currency)
            .cloned()
            .ok_or_else(|| anyhow!("{} does not list {}", self.id, currency))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
