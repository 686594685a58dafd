use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::{ExchangePrice, MaxSideFees, MinSideFees, Opportunity};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OpportunityRow {
    pub id: Uuid,
    pub symbol: String,
    pub symbol_name: String,
    pub exchange_min_id: String,
    pub exchange_min_name: String,
    pub exchange_min_price: BigDecimal,
    pub exchange_max_id: String,
    pub exchange_max_name: String,
    pub exchange_max_price: BigDecimal,
    pub percentage_difference: BigDecimal,
    pub min_taker_fee: Option<BigDecimal>,
    pub min_maker_fee: Option<BigDecimal>,
    pub min_withdrawal_fee: Option<BigDecimal>,
    pub min_withdrawal_network: Option<String>,
    pub max_taker_fee: Option<BigDecimal>,
    pub max_maker_fee: Option<BigDecimal>,
    pub computed_at: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
}

/// What a prune pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub expired: u64,
    pub over_cap: u64,
}

impl PruneReport {
    pub fn total(&self) -> u64 {
        self.expired + self.over_cap
    }
}

impl From<&Opportunity> for OpportunityRow {
    fn from(opportunity: &Opportunity) -> Self {
        Self {
            id: opportunity.id,
            symbol: opportunity.symbol.clone(),
            symbol_name: opportunity.symbol_name.clone(),
            exchange_min_id: opportunity.exchange_min.id.clone(),
            exchange_min_name: opportunity.exchange_min.name.clone(),
            exchange_min_price: opportunity.exchange_min.price.clone(),
            exchange_max_id: opportunity.exchange_max.id.clone(),
            exchange_max_name: opportunity.exchange_max.name.clone(),
            exchange_max_price: opportunity.exchange_max.price.clone(),
            percentage_difference: opportunity.percentage_difference.clone(),
            min_taker_fee: opportunity.fees_min.taker_fee.clone(),
            min_maker_fee: opportunity.fees_min.maker_fee.clone(),
            min_withdrawal_fee: opportunity.fees_min.withdrawal_fee_asset.clone(),
            min_withdrawal_network: opportunity.fees_min.withdrawal_network.clone(),
            max_taker_fee: opportunity.fees_max.taker_fee.clone(),
            max_maker_fee: opportunity.fees_max.maker_fee.clone(),
            computed_at: opportunity.computed_at,
            created_at: None,
        }
    }
}

impl From<OpportunityRow> for Opportunity {
    fn from(row: OpportunityRow) -> Self {
        Self {
            id: row.id,
            symbol: row.symbol,
            symbol_name: row.symbol_name,
            exchange_min: ExchangePrice {
                id: row.exchange_min_id,
                name: row.exchange_min_name,
                price: row.exchange_min_price,
            },
            exchange_max: ExchangePrice {
                id: row.exchange_max_id,
                name: row.exchange_max_name,
                price: row.exchange_max_price,
            },
            percentage_difference: row.percentage_difference,
            fees_min: MinSideFees {
                taker_fee: row.min_taker_fee,
                maker_fee: row.min_maker_fee,
                withdrawal_fee_asset: row.min_withdrawal_fee,
                withdrawal_network: row.min_withdrawal_network,
            },
            fees_max: MaxSideFees {
                taker_fee: row.max_taker_fee,
                maker_fee: row.max_maker_fee,
            },
            computed_at: row.computed_at,
        }
    }
}
