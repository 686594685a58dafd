use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::types::{MarketInfo, Symbol};

/// A symbol together with the exchanges that list it.
#[derive(Debug, Clone, PartialEq)]
pub struct UniverseEntry {
    pub symbol: Symbol,
    pub exchange_ids: Vec<String>,
}

/// Merges per-exchange market listings into the set of symbols worth
/// fetching: those listed by at least two exchanges.
pub struct UniverseBuilder {
    quote_currencies: BTreeSet<String>,
    max_symbols: Option<usize>,
}

impl UniverseBuilder {
    pub fn new(quote_currencies: &[String], max_symbols: Option<usize>) -> Self {
        Self {
            quote_currencies: quote_currencies.iter().map(|q| q.trim().to_uppercase()).collect(),
            max_symbols,
        }
    }

    pub fn build<'a, I>(&self, listings: I) -> Vec<UniverseEntry>
    where
        I: IntoIterator<Item = (&'a str, &'a [MarketInfo])>,
    {
        let mut listed: BTreeMap<Symbol, BTreeSet<String>> = BTreeMap::new();

        for (exchange_id, markets) in listings {
            for market in markets {
                if !self.accepts_quote(&market.symbol.quote) {
                    continue;
                }
                listed
                    .entry(market.symbol.clone())
                    .or_default()
                    .insert(exchange_id.to_string());
            }
        }

        let total = listed.len();
        let mut entries: Vec<UniverseEntry> = listed
            .into_iter()
            .filter(|(_, exchanges)| exchanges.len() >= 2)
            .map(|(symbol, exchanges)| UniverseEntry {
                symbol,
                exchange_ids: exchanges.into_iter().collect(),
            })
            .collect();

        debug!("{} of {} symbols are listed on two or more exchanges", entries.len(), total);

        if let Some(limit) = self.max_symbols {
            if entries.len() > limit {
                // Widest coverage first, then alphabetical, so the cut is stable.
                entries.sort_by(|a, b| {
                    b.exchange_ids
                        .len()
                        .cmp(&a.exchange_ids.len())
                        .then_with(|| a.symbol.id.cmp(&b.symbol.id))
                });
                entries.truncate(limit);
                entries.sort_by(|a, b| a.symbol.id.cmp(&b.symbol.id));
                info!("Symbol universe capped at {} symbols", limit);
            }
        }

        entries
    }

    fn accepts_quote(&self, quote: &str) -> bool {
        self.quote_currencies.is_empty() || self.quote_currencies.contains(quote)
    }
}
