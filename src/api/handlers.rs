use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    api::{ApiError, AppState},
    bot::{CycleMetrics, CycleState, TriggerOutcome},
    exchange::{registry, ExchangeStatus},
    types::OpportunityEvent,
};

/// Upper bound for `/spot/recent`.
const MAX_RECENT_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfiguredExchange {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub supported: bool,
    pub connection_type: String,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: TriggerOutcome,
    pub state: CycleState,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.snapshot.load();
    Json(json!({
        "status": "ok",
        "state": state.scheduler.state(),
        "last_cycle": snapshot.cycle,
        "last_cycle_at": snapshot.generated_at,
        "subscribers": state.broadcaster.subscriber_count(),
    }))
}

/// Configured exchanges plus every supported provider left unconfigured,
/// sorted by display name.
pub async fn configured_exchanges(State(state): State<AppState>) -> Json<Vec<ConfiguredExchange>> {
    let mut exchanges: Vec<ConfiguredExchange> = state
        .exchanges
        .iter()
        .map(|(id, config)| ConfiguredExchange {
            id: id.clone(),
            name: config.name.clone(),
            is_active: config.is_active,
            supported: registry::is_supported(id),
            connection_type: config.connection_type.clone(),
        })
        .collect();

    for id in registry::supported_ids() {
        if !state.exchanges.contains_key(id) {
            exchanges.push(ConfiguredExchange {
                id: id.to_string(),
                name: registry::default_name(id).unwrap_or(id).to_string(),
                is_active: false,
                supported: true,
                connection_type: "rest".to_string(),
            });
        }
    }

    exchanges.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then_with(|| a.id.cmp(&b.id)));
    Json(exchanges)
}

pub async fn exchange_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExchangeStatus>, ApiError> {
    Ok(Json(state.pool.exchange_status(&id).await?))
}

pub async fn trigger_analyzer(State(state): State<AppState>) -> Response {
    let outcome = state.scheduler.trigger();
    let status = match outcome {
        TriggerOutcome::Queued | TriggerOutcome::AlreadyPending => StatusCode::ACCEPTED,
        TriggerOutcome::Stopped => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = TriggerResponse {
        status: outcome,
        state: state.scheduler.state(),
    };
    (status, Json(body)).into_response()
}

/// The last successfully ranked snapshot, whatever happened since.
pub async fn top_opportunities(State(state): State<AppState>) -> Json<Vec<OpportunityEvent>> {
    Json(state.snapshot.load().events())
}

pub async fn opportunity_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    Ok(match state.store.query_by_id(id).await? {
        Some(opportunity) => Json(OpportunityEvent::from(&opportunity)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("opportunity {} not found", id) })),
        )
            .into_response(),
    })
}

/// Catch-up for subscribers that missed live events.
pub async fn recent_opportunities(
    State(state): State<AppState>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<OpportunityEvent>>, ApiError> {
    let limit = params.limit.unwrap_or(state.default_limit).clamp(1, MAX_RECENT_LIMIT);
    let opportunities = state.store.query_recent_top_n(limit).await?;
    Ok(Json(opportunities.iter().map(OpportunityEvent::from).collect()))
}

pub async fn metrics(State(state): State<AppState>) -> Json<CycleMetrics> {
    Json(state.metrics.read().await.clone())
}
