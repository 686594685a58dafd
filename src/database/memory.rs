use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{
    database::{
        models::PruneReport,
        store::{OpportunityStore, RetentionPolicy},
    },
    error::ArbResult,
    types::Opportunity,
};

/// Process-local store used when no database URL is configured.
pub struct MemoryOpportunityStore {
    // Kept in append order.
    records: RwLock<Vec<Opportunity>>,
    recent_window: Duration,
}

impl MemoryOpportunityStore {
    pub fn new(recent_window: Duration) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            recent_window,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl OpportunityStore for MemoryOpportunityStore {
    async fn append(&self, opportunity: &Opportunity) -> ArbResult<()> {
        self.records.write().await.push(opportunity.clone());
        Ok(())
    }

    async fn query_recent_top_n(&self, limit: usize) -> ArbResult<Vec<Opportunity>> {
        let cutoff = Utc::now() - self.recent_window;
        let records = self.records.read().await;

        let mut latest: HashMap<&str, &Opportunity> = HashMap::new();
        for opportunity in records.iter().filter(|o| o.computed_at >= cutoff) {
            let entry = latest.entry(opportunity.symbol.as_str()).or_insert(opportunity);
            if opportunity.computed_at >= entry.computed_at {
                *entry = opportunity;
            }
        }

        let mut result: Vec<Opportunity> = latest.into_values().cloned().collect();
        result.sort_by(|a, b| {
            b.percentage_difference
                .cmp(&a.percentage_difference)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        result.truncate(limit);
        Ok(result)
    }

    async fn query_by_id(&self, id: Uuid) -> ArbResult<Option<Opportunity>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|o| o.id == id).cloned())
    }

    async fn prune(&self, retention: &RetentionPolicy) -> ArbResult<PruneReport> {
        let cutoff = Utc::now() - retention.max_age;
        let mut records = self.records.write().await;

        let before = records.len();
        records.retain(|o| o.computed_at >= cutoff);
        let expired = (before - records.len()) as u64;

        let mut over_cap = 0;
        if let Some(cap) = retention.max_records {
            let cap = cap as usize;
            if records.len() > cap {
                records.sort_by(|a, b| a.computed_at.cmp(&b.computed_at));
                let excess = records.len() - cap;
                records.drain(..excess);
                over_cap = excess as u64;
            }
        }

        let report = PruneReport { expired, over_cap };
        if report.total() > 0 {
            debug!("Pruned {} in-memory opportunities", report.total());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{percentage_difference, ExchangePrice, MaxSideFees, MinSideFees, Symbol};
    use bigdecimal::BigDecimal;

    fn create_test_opportunity(base: &str, max: i32) -> Opportunity {
        let min = BigDecimal::from(100);
        let max = BigDecimal::from(max);
        Opportunity::new(
            &Symbol::new(base, "USDT"),
            ExchangePrice { id: "a".into(), name: "A".into(), price: min.clone() },
            ExchangePrice { id: "b".into(), name: "B".into(), price: max.clone() },
            percentage_difference(&min, &max).unwrap(),
            MinSideFees::default(),
            MaxSideFees::default(),
        )
    }

    #[tokio::test]
    async fn test_append_and_query_by_id_round_trip() {
        let store = MemoryOpportunityStore::new(Duration::minutes(60));
        let opportunity = create_test_opportunity("X", 102);
        store.append(&opportunity).await.unwrap();

        let loaded = store.query_by_id(opportunity.id).await.unwrap().unwrap();
        assert_eq!(loaded, opportunity);
        assert!(store.query_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_top_n_is_distinct_by_symbol() {
        let store = MemoryOpportunityStore::new(Duration::minutes(60));
        store.append(&create_test_opportunity("X", 110)).await.unwrap();
        store.append(&create_test_opportunity("Y", 103)).await.unwrap();
        let newer_x = create_test_opportunity("X", 101);
        store.append(&newer_x).await.unwrap();

        let recent = store.query_recent_top_n(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].symbol, "Y/USDT");
        assert_eq!(recent[1].id, newer_x.id);

        assert_eq!(store.query_recent_top_n(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_prune_by_age_and_cap() {
        let store = MemoryOpportunityStore::new(Duration::minutes(60));
        let mut old = create_test_opportunity("OLD", 102);
        old.computed_at = Utc::now() - Duration::days(30);
        store.append(&old).await.unwrap();
        for base in ["A", "B", "C"] {
            store.append(&create_test_opportunity(base, 102)).await.unwrap();
        }

        let report = store.prune(&RetentionPolicy::new(7, Some(2))).await.unwrap();
        assert_eq!(report, PruneReport { expired: 1, over_cap: 1 });
        assert_eq!(store.len().await, 2);
    }
}
