use tracing::{debug, warn};

use crate::{
    error::{ArbResult, ArbitrageError},
    exchange::ExchangeAdapterPool,
    types::{ExchangePrice, MaxSideFees, MinSideFees, Opportunity, SpreadCandidate, WithdrawalNetwork},
};

/// Attaches trading fees for both sides and the cheapest withdrawal network on
/// the buy side. Every failure here degrades to null fields.
pub struct FeeEnricher {
    preferred_networks: Vec<String>,
}

impl FeeEnricher {
    pub fn new(preferred_networks: &[String]) -> Self {
        Self {
            preferred_networks: preferred_networks.iter().map(|n| n.trim().to_uppercase()).collect(),
        }
    }

    pub async fn enrich(&self, pool: &ExchangeAdapterPool, candidate: &SpreadCandidate) -> Opportunity {
        let symbol = &candidate.symbol;
        let min_id = &candidate.exchange_min.exchange_id;
        let max_id = &candidate.exchange_max.exchange_id;

        let mut fees_min = MinSideFees::default();
        match pool.cached_market(min_id, &symbol.id) {
            Ok(market) => {
                fees_min.taker_fee = market.taker_fee;
                fees_min.maker_fee = market.maker_fee;
            }
            Err(e) => warn!("Fee data missing for {}: {}", symbol.id, e),
        }

        match self.withdrawal_network(pool, min_id, &symbol.base).await {
            Ok(network) => {
                fees_min.withdrawal_fee_asset = Some(network.fee);
                fees_min.withdrawal_network = Some(network.network);
            }
            Err(e) => warn!("Withdrawal data missing for {}: {}", symbol.id, e),
        }

        let fees_max = match pool.cached_market(max_id, &symbol.id) {
            Ok(market) => MaxSideFees {
                taker_fee: market.taker_fee,
                maker_fee: market.maker_fee,
            },
            Err(e) => {
                warn!("Fee data missing for {}: {}", symbol.id, e);
                MaxSideFees::default()
            }
        };

        if fees_min.taker_fee.is_none() || fees_max.taker_fee.is_none() {
            debug!("{} emitted with partial trading fees", symbol.id);
        }

        Opportunity::new(
            symbol,
            ExchangePrice {
                id: min_id.clone(),
                name: exchange_name(pool, min_id),
                price: candidate.exchange_min.price.clone(),
            },
            ExchangePrice {
                id: max_id.clone(),
                name: exchange_name(pool, max_id),
                price: candidate.exchange_max.price.clone(),
            },
            candidate.percentage_difference.clone(),
            fees_min,
            fees_max,
        )
    }

    async fn withdrawal_network(
        &self,
        pool: &ExchangeAdapterPool,
        exchange_id: &str,
        currency: &str,
    ) -> ArbResult<WithdrawalNetwork> {
        let networks = pool.fetch_withdrawal_networks(exchange_id, currency).await?;
        self.select_withdrawal_network(&networks).cloned().ok_or_else(|| {
            ArbitrageError::DataIntegrity(format!(
                "no active withdrawal network for {} on {}",
                currency, exchange_id
            ))
        })
    }

    /// Cheapest usable network. When any usable network is preferred, only the
    /// preferred ones compete. Equal fees go to the alphabetically first name.
    pub fn select_withdrawal_network<'a>(&self, networks: &'a [WithdrawalNetwork]) -> Option<&'a WithdrawalNetwork> {
        let usable: Vec<&WithdrawalNetwork> = networks.iter().filter(|n| n.is_usable()).collect();

        let preferred: Vec<&WithdrawalNetwork> = usable
            .iter()
            .copied()
            .filter(|n| self.preferred_networks.contains(&n.network.to_uppercase()))
            .collect();

        let candidates = if preferred.is_empty() { usable } else { preferred };

        candidates
            .into_iter()
            .min_by(|a, b| a.fee.cmp(&b.fee).then_with(|| a.network.cmp(&b.network)))
    }
}

fn exchange_name(pool: &ExchangeAdapterPool, exchange_id: &str) -> String {
    pool.exchange_name(exchange_id).unwrap_or(exchange_id).to_string()
}
