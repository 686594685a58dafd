use anyhow::{anyhow, Result};
use bigdecimal::BigDecimal;
use std::str::FromStr;
use tracing::debug;

use crate::types::{percentage_difference, ExchangeQuote, QuoteSide, SpreadCandidate, Symbol};

/// Finds the cheapest place to buy and the dearest place to sell one symbol.
///
/// Pure and independent per symbol.
#[derive(Debug, Clone, Default)]
pub struct SpreadAnalyzer {
    min_spread_percentage: Option<BigDecimal>,
}

impl SpreadAnalyzer {
    pub fn new(min_spread_percentage: Option<&str>) -> Result<Self> {
        let min_spread_percentage = min_spread_percentage
            .map(|value| {
                BigDecimal::from_str(value.trim()).map_err(|e| anyhow!("Invalid min_spread_percentage: {}", e))
            })
            .transpose()?;

        Ok(Self { min_spread_percentage })
    }

    pub fn analyze(&self, symbol: &Symbol, quotes: &[ExchangeQuote]) -> Option<SpreadCandidate> {
        let zero = BigDecimal::from(0);

        let mut exchanges: Vec<&str> = quotes.iter().map(|q| q.exchange_id.as_str()).collect();
        exchanges.sort_unstable();
        exchanges.dedup();
        if exchanges.len() < 2 {
            debug!("{}: fewer than two exchanges quoted", symbol.id);
            return None;
        }

        let buy = extreme(quotes.iter().filter(|q| q.ask_price > zero), |q| &q.ask_price, |candidate, best| {
            candidate < best
        })?;
        let sell = extreme(quotes.iter().filter(|q| q.bid_price > zero), |q| &q.bid_price, |candidate, best| {
            candidate > best
        })?;

        if buy.exchange_id == sell.exchange_id {
            debug!("{}: {} holds both extremes, no spread", symbol.id, buy.exchange_id);
            return None;
        }

        let percentage = percentage_difference(&buy.ask_price, &sell.bid_price)?;

        if let Some(threshold) = &self.min_spread_percentage {
            if percentage < *threshold {
                return None;
            }
        }

        Some(SpreadCandidate {
            symbol: symbol.clone(),
            exchange_min: QuoteSide {
                exchange_id: buy.exchange_id.clone(),
                price: buy.ask_price.clone(),
            },
            exchange_max: QuoteSide {
                exchange_id: sell.exchange_id.clone(),
                price: sell.bid_price.clone(),
            },
            percentage_difference: percentage,
        })
    }
}

/// Picks the quote whose price wins `better`; equal prices go to the
/// lexicographically smallest exchange id.
fn extreme<'a, I, P, B>(quotes: I, price: P, better: B) -> Option<&'a ExchangeQuote>
where
    I: Iterator<Item = &'a ExchangeQuote>,
    P: Fn(&ExchangeQuote) -> &BigDecimal,
    B: Fn(&BigDecimal, &BigDecimal) -> bool,
{
    quotes.fold(None, |best: Option<&ExchangeQuote>, quote| match best {
        None => Some(quote),
        Some(current) => {
            let (candidate_price, best_price) = (price(quote), price(current));
            if better(candidate_price, best_price)
                || (candidate_price == best_price && quote.exchange_id < current.exchange_id)
            {
                Some(quote)
            } else {
                Some(current)
            }
        }
    })
}
