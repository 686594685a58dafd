use async_trait::async_trait;
use chrono::Duration;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    database::models::PruneReport,
    error::ArbResult,
    types::Opportunity,
};

/// How long persisted opportunities are kept, and optionally how many.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub max_records: Option<i64>,
}

impl RetentionPolicy {
    pub fn new(retention_days: i64, max_records: Option<i64>) -> Self {
        Self {
            max_age: Duration::days(retention_days.max(1)),
            max_records: max_records.filter(|cap| *cap > 0),
        }
    }
}

/// Append-only history of computed opportunities.
#[async_trait]
pub trait OpportunityStore: Send + Sync {
    async fn append(&self, opportunity: &Opportunity) -> ArbResult<()>;

    /// Latest record per symbol inside the recent window, best spread first.
    async fn query_recent_top_n(&self, limit: usize) -> ArbResult<Vec<Opportunity>>;

    async fn query_by_id(&self, id: Uuid) -> ArbResult<Option<Opportunity>>;

    async fn prune(&self, retention: &RetentionPolicy) -> ArbResult<PruneReport>;
}

/// Appends with a single retry. The second failure is logged and returned;
/// callers carry on with the cycle either way.
pub async fn append_with_retry(store: &dyn OpportunityStore, opportunity: &Opportunity) -> ArbResult<()> {
    match store.append(opportunity).await {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!("Persisting {} failed, retrying once: {}", opportunity.id, first);
            store.append(opportunity).await.map_err(|second| {
                error!("Persisting {} failed after retry: {}", opportunity.id, second);
                second
            })
        }
    }
}
