use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    database::{
        models::{OpportunityRow, PruneReport},
        store::{OpportunityStore, RetentionPolicy},
    },
    error::{ArbResult, ArbitrageError},
    types::Opportunity,
};

pub struct OpportunityRepository {
    pool: PgPool,
    recent_window: Duration,
}

impl OpportunityRepository {
    pub fn new(pool: PgPool, recent_window: Duration) -> Self {
        Self { pool, recent_window }
    }
}

fn persistence(context: &str, e: sqlx::Error) -> ArbitrageError {
    ArbitrageError::Persistence(format!("{}: {}", context, e))
}

#[async_trait]
impl OpportunityStore for OpportunityRepository {
    async fn append(&self, opportunity: &Opportunity) -> ArbResult<()> {
        let row = OpportunityRow::from(opportunity);

        sqlx::query(
            r#"
            INSERT INTO spot_opportunities (
                id, symbol, symbol_name,
                exchange_min_id, exchange_min_name, exchange_min_price,
                exchange_max_id, exchange_max_name, exchange_max_price,
                percentage_difference,
                min_taker_fee, min_maker_fee, min_withdrawal_fee, min_withdrawal_network,
                max_taker_fee, max_maker_fee,
                computed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(&row.id)
        .bind(&row.symbol)
        .bind(&row.symbol_name)
        .bind(&row.exchange_min_id)
        .bind(&row.exchange_min_name)
        .bind(&row.exchange_min_price)
        .bind(&row.exchange_max_id)
        .bind(&row.exchange_max_name)
        .bind(&row.exchange_max_price)
        .bind(&row.percentage_difference)
        .bind(&row.min_taker_fee)
        .bind(&row.min_maker_fee)
        .bind(&row.min_withdrawal_fee)
        .bind(&row.min_withdrawal_network)
        .bind(&row.max_taker_fee)
        .bind(&row.max_maker_fee)
        .bind(&row.computed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| persistence("Failed to save opportunity", e))?;

        debug!("Saved opportunity {} for {}", opportunity.id, opportunity.symbol);
        Ok(())
    }

    async fn query_recent_top_n(&self, limit: usize) -> ArbResult<Vec<Opportunity>> {
        let since = Utc::now() - self.recent_window;

        let rows = sqlx::query_as::<_, OpportunityRow>(
            r#"
            SELECT * FROM (
                SELECT DISTINCT ON (symbol) *
                FROM spot_opportunities
                WHERE computed_at >= $1
                ORDER BY symbol, computed_at DESC
            ) latest
            ORDER BY percentage_difference DESC, symbol ASC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("Failed to fetch recent opportunities", e))?;

        Ok(rows.into_iter().map(Opportunity::from).collect())
    }

    async fn query_by_id(&self, id: Uuid) -> ArbResult<Option<Opportunity>> {
        let row = sqlx::query_as::<_, OpportunityRow>("SELECT * FROM spot_opportunities WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| persistence("Failed to fetch opportunity", e))?;

        Ok(row.map(Opportunity::from))
    }

    async fn prune(&self, retention: &RetentionPolicy) -> ArbResult<PruneReport> {
        let cutoff = Utc::now() - retention.max_age;

        let expired = sqlx::query("DELETE FROM spot_opportunities WHERE computed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| persistence("Failed to delete expired opportunities", e))?
            .rows_affected();

        let over_cap = match retention.max_records {
            Some(cap) => sqlx::query(
                r#"
                DELETE FROM spot_opportunities
                WHERE id IN (
                    SELECT id FROM spot_opportunities
                    ORDER BY computed_at DESC
                    OFFSET $1
                )
                "#,
            )
            .bind(cap)
            .execute(&self.pool)
            .await
            .map_err(|e| persistence("Failed to cap stored opportunities", e))?
            .rows_affected(),
            None => 0,
        };

        let report = PruneReport { expired, over_cap };
        if report.total() > 0 {
            info!(
                "Pruned {} expired and {} over-cap opportunities",
                report.expired, report.over_cap
            );
        }
        Ok(report)
    }
}
