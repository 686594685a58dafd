pub mod binance;
pub mod bybit;
#[cfg(test)]
pub(crate) mod fake;
pub mod kucoin;
pub mod network_cache;
pub mod pool;
pub mod registry;
pub mod traits;

pub use binance::BinanceClient;
pub use bybit::BybitClient;
pub use kucoin::KucoinClient;
pub use network_cache::NetworkFeeCache;
pub use pool::{ExchangeAdapterPool, ExchangeStatus, SymbolFetchOutcome};
pub use traits::*;

use anyhow::{anyhow, Result};
use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;

pub(crate) fn parse_decimal(value: &str, field: &str) -> Result<BigDecimal> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("empty {} in exchange response", field));
    }
    BigDecimal::from_str(trimmed).map_err(|e| anyhow!("invalid {} '{}': {}", field, trimmed, e))
}

/// Fee rates come from configuration; none of the public endpoints expose them.
pub(crate) fn configured_fee(value: &Option<String>) -> Option<BigDecimal> {
    value.as_deref().and_then(|v| BigDecimal::from_str(v.trim()).ok())
}

pub(crate) fn sign_hex(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("invalid api secret: {}", e))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub(crate) fn base_url(configured: &Option<String>, default: &str) -> String {
    configured
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}
