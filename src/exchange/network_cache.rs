use std::{collections::HashMap, time::Duration};
use tokio::{sync::RwLock, time::Instant};
use tracing::debug;

use crate::types::WithdrawalNetwork;

struct CachedNetworks {
    networks: Vec<WithdrawalNetwork>,
    fetched_at: Instant,
}

/// Withdrawal networks per (exchange, currency), kept for a fixed time so
/// consecutive cycles do not refetch them.
pub struct NetworkFeeCache {
    entries: RwLock<HashMap<String, CachedNetworks>>,
    ttl: Duration,
}

impl NetworkFeeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn get(&self, exchange_id: &str, currency: &str) -> Option<Vec<WithdrawalNetwork>> {
        let entries = self.entries.read().await;
        let cached = entries.get(&Self::cache_key(exchange_id, currency))?;

        if cached.fetched_at.elapsed() < self.ttl {
            Some(cached.networks.clone())
        } else {
            None
        }
    }

    pub async fn insert(&self, exchange_id: &str, currency: &str, networks: Vec<WithdrawalNetwork>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            Self::cache_key(exchange_id, currency),
            CachedNetworks {
                networks,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drops expired entries.
    pub async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, cached| cached.fetched_at.elapsed() < ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!("Evicted {} expired withdrawal network entries", evicted);
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    fn cache_key(exchange_id: &str, currency: &str) -> String {
        format!("{}_{}", exchange_id, currency.to_uppercase())
    }
}
