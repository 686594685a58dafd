use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::types::{Opportunity, OpportunityEvent, SpreadCandidate};

/// The ranked output of one cycle. Replaced wholesale, never edited.
#[derive(Debug, Clone, Serialize)]
pub struct RankedSnapshot {
    pub cycle: u64,
    pub generated_at: Option<DateTime<Utc>>,
    pub opportunities: Vec<Opportunity>,
}

impl RankedSnapshot {
    pub fn empty() -> Self {
        Self {
            cycle: 0,
            generated_at: None,
            opportunities: Vec::new(),
        }
    }

    pub fn events(&self) -> Vec<OpportunityEvent> {
        self.opportunities.iter().map(OpportunityEvent::from).collect()
    }

    pub fn len(&self) -> usize {
        self.opportunities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opportunities.is_empty()
    }
}

pub struct Ranker {
    top_n: usize,
}

impl Ranker {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    /// Full re-sort of this cycle's opportunities: spread descending, then
    /// symbol ascending.
    pub fn rank(&self, cycle: u64, mut opportunities: Vec<Opportunity>) -> RankedSnapshot {
        opportunities.sort_by(|a, b| {
            b.percentage_difference
                .cmp(&a.percentage_difference)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        opportunities.truncate(self.top_n);

        RankedSnapshot {
            cycle,
            generated_at: Some(Utc::now()),
            opportunities,
        }
    }

    /// Drops candidates that cannot make the top N. Enrichment never changes
    /// the spread, so the final ranking is the same as without the cut.
    pub fn shortlist(&self, mut candidates: Vec<SpreadCandidate>) -> Vec<SpreadCandidate> {
        candidates.sort_by(|a, b| {
            b.percentage_difference
                .cmp(&a.percentage_difference)
                .then_with(|| a.symbol.id.cmp(&b.symbol.id))
        });
        candidates.truncate(self.top_n);
        candidates
    }
}

/// Shared read access to the latest snapshot. The scheduler is the only writer.
#[derive(Clone)]
pub struct SnapshotHandle {
    current: Arc<ArcSwap<RankedSnapshot>>,
}

impl SnapshotHandle {
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(RankedSnapshot::empty())),
        }
    }

    pub fn load(&self) -> Arc<RankedSnapshot> {
        self.current.load_full()
    }

    pub(crate) fn publish(&self, snapshot: RankedSnapshot) -> Arc<RankedSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.store(snapshot.clone());
        snapshot
    }
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self::new()
    }
}
