//! Thin HTTP and WebSocket surface over the detector.
//!
//! Reads come from the latest ranked snapshot or the opportunity store; the
//! only write is the on-demand cycle trigger.

pub mod handlers;
pub mod stream;

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    arbitrage::SnapshotHandle,
    bot::{Broadcaster, CycleMetrics, SchedulerHandle},
    config::ExchangeConfig,
    database::OpportunityStore,
    error::ArbitrageError,
    exchange::ExchangeAdapterPool,
};

#[derive(Clone)]
pub struct AppState {
    pub exchanges: Arc<HashMap<String, ExchangeConfig>>,
    pub pool: Arc<ExchangeAdapterPool>,
    pub store: Arc<dyn OpportunityStore>,
    pub snapshot: SnapshotHandle,
    pub scheduler: SchedulerHandle,
    pub broadcaster: Broadcaster,
    pub metrics: Arc<RwLock<CycleMetrics>>,
    pub default_limit: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/configured-exchanges", get(handlers::configured_exchanges))
        .route("/exchange-status/:id", get(handlers::exchange_status))
        .route("/spot/analyzer", post(handlers::trigger_analyzer))
        .route("/spot/top-opportunities", get(handlers::top_opportunities))
        .route("/spot/opportunities/:id", get(handlers::opportunity_by_id))
        .route("/spot/recent", get(handlers::recent_opportunities))
        .route("/spot/metrics", get(handlers::metrics))
        .route("/spot/stream", get(stream::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(bind_address: &str, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("API server listening on {}", bind_address);

    axum::serve(listener, router(state)).await.context("Server error")?;
    Ok(())
}

/// Maps component errors onto HTTP statuses. Unreachable exchanges never
/// surface as a 5xx; they are reported in the body of a 200 instead.
pub struct ApiError(ArbitrageError);

impl From<ArbitrageError> for ApiError {
    fn from(error: ArbitrageError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ArbitrageError::Configuration(_) => StatusCode::NOT_FOUND,
            ArbitrageError::TransientFetch { .. } | ArbitrageError::DataIntegrity(_) => StatusCode::OK,
            ArbitrageError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
