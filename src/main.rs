use anyhow::Result;
use spot_arbitrage_detector::{
    api::{self, AppState},
    bot::{scheduler_channel, Broadcaster, SpotArbitrageBot},
    config::Config,
    database::{DatabaseConnection, MemoryOpportunityStore, OpportunityRepository, OpportunityStore},
    exchange::ExchangeAdapterPool,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting spot arbitrage opportunity detector");

    // Load and validate configuration; an unknown exchange id stops us here.
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        "Configuration loaded: {} active exchanges",
        config.active_exchange_ids().len()
    );

    let pool = Arc::new(ExchangeAdapterPool::from_config(&config)?);
    let recent_window = chrono::Duration::minutes(config.analyzer.recent_window_minutes);

    let mut database = None;
    let store: Arc<dyn OpportunityStore> = match &config.database.url {
        Some(url) => {
            let connection = DatabaseConnection::new(url, config.database.max_connections).await?;
            connection.run_migrations().await?;
            let repository = OpportunityRepository::new(connection.pool().clone(), recent_window);
            database = Some(connection);
            Arc::new(repository)
        }
        None => {
            warn!("No database URL configured, opportunities are kept in memory only");
            Arc::new(MemoryOpportunityStore::new(recent_window))
        }
    };

    let broadcaster = Broadcaster::new(config.broadcast.channel_capacity);
    let bot = SpotArbitrageBot::new(&config, pool.clone(), store.clone(), broadcaster.clone()).map_err(|e| {
        error!("Failed to initialize detector: {}", e);
        e
    })?;

    let (scheduler, control) = scheduler_channel();
    let state = AppState {
        exchanges: Arc::new(config.exchanges.clone()),
        pool,
        store,
        snapshot: bot.snapshot_handle(),
        scheduler: scheduler.clone(),
        broadcaster,
        metrics: bot.metrics(),
        default_limit: config.analyzer.top_n,
    };

    let mut detector = tokio::spawn(bot.run(control));
    let bind_address = config.api.bind_address.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = api::serve(&bind_address, state).await {
            error!("API server error: {}", e);
        }
    });

    // Handle graceful shutdown
    tokio::select! {
        result = &mut detector => {
            if let Err(e) = result {
                error!("Detector task ended unexpectedly: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            scheduler.stop();
            if let Err(e) = detector.await {
                error!("Detector task failed during shutdown: {}", e);
            }
        }
    }

    server.abort();
    if let Some(connection) = database {
        connection.close().await;
    }

    info!("Spot arbitrage detector shutdown complete");
    Ok(())
}
