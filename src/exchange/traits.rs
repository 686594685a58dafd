use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::types::{MarketInfo, WithdrawalNetwork};

#[derive(Debug, Clone, PartialEq)]
pub struct BookTicker {
    pub bid: BigDecimal,
    pub ask: BigDecimal,
}

/// Market-data capabilities every exchange provider exposes.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    async fn load_markets(&self) -> Result<Vec<MarketInfo>>;

    async fn fetch_ticker(&self, market: &MarketInfo) -> Result<BookTicker>;

    async fn fetch_withdrawal_networks(&self, currency: &str) -> Result<Vec<WithdrawalNetwork>>;

    async fn health_check(&self) -> Result<()>;
}
