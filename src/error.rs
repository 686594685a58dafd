use thiserror::Error;

/// Failure taxonomy for the opportunity pipeline.
///
/// Only `Configuration` is ever fatal, and only during startup validation.
/// Everything else is contained at the smallest scope (one exchange, one
/// symbol, one write) and logged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArbitrageError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transient fetch failure on {exchange_id} for {symbol}: {reason}")]
    TransientFetch {
        exchange_id: String,
        symbol: String,
        reason: String,
    },

    #[error("missing market data: {0}")]
    DataIntegrity(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl ArbitrageError {
    pub fn transient(exchange_id: &str, symbol: &str, reason: impl ToString) -> Self {
        Self::TransientFetch {
            exchange_id: exchange_id.to_string(),
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type ArbResult<T> = std::result::Result<T, ArbitrageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_error_message() {
        let err = ArbitrageError::transient("binance", "BTC/USDT", "timed out after 10000ms");
        assert_eq!(
            err.to_string(),
            "transient fetch failure on binance for BTC/USDT: timed out after 10000ms"
        );
        assert!(matches!(err, ArbitrageError::TransientFetch { ref exchange_id, .. } if exchange_id == "binance"));
    }
}
