use anyhow::Result;
use futures::{future::join_all, stream, stream::FuturesUnordered, StreamExt};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::{
    sync::RwLock,
    time::{interval, timeout_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    arbitrage::{FeeEnricher, Ranker, SnapshotHandle, SpreadAnalyzer, UniverseBuilder, UniverseEntry},
    bot::{
        broadcaster::Broadcaster,
        metrics::{CycleMetrics, CycleSummary},
        persistence::PersistenceWriter,
        scheduler::{CycleState, SchedulerControl, Wake},
    },
    config::Config,
    database::{OpportunityStore, RetentionPolicy},
    exchange::{ExchangeAdapterPool, SymbolFetchOutcome},
    types::{ExchangeQuote, MarketInfo, Opportunity, SpreadCandidate, Symbol},
};

/// Ranked batches allowed to queue behind a slow store.
const PERSIST_BACKLOG: usize = 8;

#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub interval: Duration,
    pub cycle_deadline: Duration,
    pub max_concurrent_fetches: usize,
    pub maintenance_every_cycles: u64,
    pub retention: RetentionPolicy,
}

impl CycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.analyzer.interval(),
            cycle_deadline: config.analyzer.cycle_deadline(),
            max_concurrent_fetches: config.analyzer.max_concurrent_fetches.max(1),
            maintenance_every_cycles: config.analyzer.maintenance_every_cycles.max(1),
            retention: RetentionPolicy::new(config.database.retention_days, config.database.max_records),
        }
    }
}

/// Quotes gathered for one cycle, grouped by symbol.
struct FetchedQuotes {
    by_symbol: Vec<(Symbol, Vec<SymbolFetchOutcome>)>,
    missing: usize,
}

/// Drives the detection cycle. The only writer of the ranked snapshot.
pub struct SpotArbitrageBot {
    settings: CycleSettings,
    pool: Arc<ExchangeAdapterPool>,
    universe_builder: UniverseBuilder,
    spread_analyzer: SpreadAnalyzer,
    fee_enricher: Arc<FeeEnricher>,
    ranker: Ranker,
    store: Arc<dyn OpportunityStore>,
    persistence: PersistenceWriter,
    broadcaster: Broadcaster,
    snapshot: SnapshotHandle,
    metrics: Arc<RwLock<CycleMetrics>>,
    cycle_count: u64,
}

impl SpotArbitrageBot {
    /// Must be called inside a tokio runtime: the persistence writer is
    /// spawned here.
    pub fn new(
        config: &Config,
        pool: Arc<ExchangeAdapterPool>,
        store: Arc<dyn OpportunityStore>,
        broadcaster: Broadcaster,
    ) -> Result<Self> {
        info!("Initializing spot arbitrage detector");

        let analyzer = &config.analyzer;
        let spread_analyzer = SpreadAnalyzer::new(analyzer.min_spread_percentage.as_deref())?;
        let metrics = Arc::new(RwLock::new(CycleMetrics::new()));

        Ok(Self {
            settings: CycleSettings::from_config(config),
            pool,
            universe_builder: UniverseBuilder::new(&analyzer.quote_currencies, analyzer.max_symbols),
            spread_analyzer,
            fee_enricher: Arc::new(FeeEnricher::new(&analyzer.preferred_networks)),
            ranker: Ranker::new(analyzer.top_n),
            persistence: PersistenceWriter::spawn(store.clone(), metrics.clone(), PERSIST_BACKLOG),
            store,
            broadcaster,
            snapshot: SnapshotHandle::new(),
            metrics,
            cycle_count: 0,
        })
    }

    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    pub fn metrics(&self) -> Arc<RwLock<CycleMetrics>> {
        self.metrics.clone()
    }

    /// Runs until the stop signal. Cycles never overlap: a trigger that
    /// arrives mid-cycle waits for the current one to finish.
    pub async fn run(mut self, mut control: SchedulerControl) {
        self.perform_health_checks().await;

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting detection loop with {} second intervals",
            self.settings.interval.as_secs()
        );

        loop {
            match control.next_wake(&mut ticker).await {
                Wake::Stop => break,
                Wake::Triggered => debug!("Running on-demand cycle"),
                Wake::Tick => {}
            }
            control.absorb_pending_trigger();

            let summary = self.run_single_cycle(&control).await;
            info!(
                "Cycle #{} finished in {}ms: {} symbols, {}/{} quotes ok, {} candidates, {} published{}",
                summary.cycle,
                summary.duration_ms,
                summary.symbols_scanned,
                summary.quotes_succeeded,
                summary.quotes_succeeded + summary.quotes_failed,
                summary.candidates,
                summary.published,
                if summary.deadline_hit { " (deadline reached)" } else { "" }
            );

            if self.cycle_count % self.settings.maintenance_every_cycles == 0 {
                self.perform_maintenance().await;
            }
        }

        info!("Detection loop stopped after {} cycles", self.cycle_count);
        self.persistence.shutdown().await;
        control.set_state(CycleState::Stopped);
    }

    /// One full pass. Component failures are absorbed here. A cycle in which
    /// no exchange answered leaves the previous snapshot in place.
    pub async fn run_single_cycle(&mut self, control: &SchedulerControl) -> CycleSummary {
        self.cycle_count += 1;
        let started = Instant::now();
        let deadline = started + self.settings.cycle_deadline;
        let mut summary = CycleSummary {
            cycle: self.cycle_count,
            ..Default::default()
        };

        control.set_state(CycleState::FetchingQuotes);
        let universe = self.load_universe().await;
        summary.symbols_scanned = universe.len();

        let fetched = self.fetch_universe(universe, deadline).await;
        summary.quotes_missing = fetched.missing;
        summary.deadline_hit = fetched.missing > 0;

        control.set_state(CycleState::Analyzing);
        let candidates = self.analyze(fetched.by_symbol, &mut summary).await;
        summary.candidates = candidates.len();

        if summary.quotes_succeeded == 0 {
            warn!(
                "Cycle #{} got no quotes, keeping snapshot from cycle #{}",
                self.cycle_count,
                self.snapshot.load().cycle
            );
        } else {
            control.set_state(CycleState::Enriching);
            let opportunities = self.enrich(self.ranker.shortlist(candidates)).await;

            control.set_state(CycleState::Ranking);
            let snapshot = self.snapshot.publish(self.ranker.rank(self.cycle_count, opportunities));

            control.set_state(CycleState::Publishing);
            self.broadcaster.publish_cycle(snapshot.events());
            summary.published = snapshot.len();
            summary.persist_dropped = self.persistence.submit(snapshot.opportunities.clone());
        }

        control.set_state(CycleState::Idle);
        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.metrics.write().await.update_cycle_metrics(summary.clone());
        summary
    }

    async fn load_universe(&self) -> Vec<UniverseEntry> {
        let mut loads = Vec::new();
        for exchange_id in self.pool.exchange_ids() {
            let pool = self.pool.clone();
            loads.push(async move {
                let result = pool.fetch_market_metadata(&exchange_id).await;
                (exchange_id, result)
            });
        }

        let mut listings: Vec<(String, Vec<MarketInfo>)> = Vec::new();
        for (exchange_id, result) in join_all(loads).await {
            match result {
                Ok(markets) => listings.push((exchange_id, markets)),
                Err(e) => {
                    warn!("Skipping {} this cycle: {}", exchange_id, e);
                    self.metrics.write().await.record_error(&e.to_string());
                }
            }
        }

        self.universe_builder
            .build(listings.iter().map(|(id, markets)| (id.as_str(), markets.as_slice())))
    }

    /// Fans out one fetch per (symbol, exchange). Every answer is kept as it
    /// arrives; exchanges still pending at the deadline count as missing.
    async fn fetch_universe(&self, universe: Vec<UniverseEntry>, deadline: Instant) -> FetchedQuotes {
        let mut fetches = FuturesUnordered::new();
        for entry in universe {
            for exchange_id in entry.exchange_ids {
                let pool = self.pool.clone();
                let symbol = entry.symbol.clone();
                fetches.push(async move {
                    let result = pool.fetch_quote(&exchange_id, &symbol).await;
                    (symbol, SymbolFetchOutcome { exchange_id, result })
                });
            }
        }

        let total = fetches.len();
        let mut by_symbol: BTreeMap<String, (Symbol, Vec<SymbolFetchOutcome>)> = BTreeMap::new();
        loop {
            match timeout_at(deadline, fetches.next()).await {
                Ok(Some((symbol, outcome))) => {
                    by_symbol
                        .entry(symbol.id.clone())
                        .or_insert_with(|| (symbol, Vec::new()))
                        .1
                        .push(outcome);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Cycle deadline reached with {} of {} quotes outstanding",
                        fetches.len(),
                        total
                    );
                    break;
                }
            }
        }

        FetchedQuotes {
            missing: fetches.len(),
            by_symbol: by_symbol.into_values().collect(),
        }
    }

    async fn analyze(
        &self,
        fetched: Vec<(Symbol, Vec<SymbolFetchOutcome>)>,
        summary: &mut CycleSummary,
    ) -> Vec<SpreadCandidate> {
        let mut metrics = self.metrics.write().await;
        let mut candidates = Vec::new();

        for (symbol, outcomes) in fetched {
            let mut quotes: Vec<ExchangeQuote> = Vec::with_capacity(outcomes.len());
            for outcome in outcomes {
                match outcome.result {
                    Ok(quote) => {
                        summary.quotes_succeeded += 1;
                        metrics.update_exchange_metrics(&outcome.exchange_id, true);
                        quotes.push(quote);
                    }
                    Err(e) => {
                        summary.quotes_failed += 1;
                        metrics.update_exchange_metrics(&outcome.exchange_id, false);
                        debug!("{} excluded from {}: {}", outcome.exchange_id, symbol.id, e);
                    }
                }
            }

            if let Some(candidate) = self.spread_analyzer.analyze(&symbol, &quotes) {
                metrics.record_sides(&candidate.exchange_min.exchange_id, &candidate.exchange_max.exchange_id);
                candidates.push(candidate);
            }
        }

        candidates
    }

    async fn enrich(&self, candidates: Vec<SpreadCandidate>) -> Vec<Opportunity> {
        let mut enrichments = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let enricher = self.fee_enricher.clone();
            let pool = self.pool.clone();
            enrichments.push(async move { enricher.enrich(&pool, &candidate).await });
        }

        stream::iter(enrichments)
            .buffer_unordered(self.settings.max_concurrent_fetches)
            .collect()
            .await
    }

    async fn perform_health_checks(&self) {
        info!("Performing health checks");

        for exchange_id in self.pool.exchange_ids() {
            match self.pool.exchange_status(&exchange_id).await {
                Ok(status) if status.connected => {
                    info!("{} connected with {} markets", status.name, status.markets_loaded)
                }
                Ok(status) => warn!(
                    "{} unavailable: {}",
                    status.name,
                    status.error.unwrap_or_else(|| "unknown error".to_string())
                ),
                Err(e) => error!("Health check for {} failed: {}", exchange_id, e),
            }
        }
    }

    async fn perform_maintenance(&self) {
        info!("Performing periodic maintenance");

        match self.store.prune(&self.settings.retention).await {
            Ok(report) => info!(
                "Maintenance: removed {} expired and {} over-cap opportunities",
                report.expired, report.over_cap
            ),
            Err(e) => warn!("Failed to prune opportunity store: {}", e),
        }

        let evicted = self.pool.evict_expired_networks().await;
        debug!("Maintenance: evicted {} withdrawal network entries", evicted);

        info!("{}", self.metrics.read().await.generate_report());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bot::{broadcaster::StreamEvent, scheduler::scheduler_channel},
        config::{tests::create_test_exchange_config, AnalyzerConfig, ApiConfig, BroadcastConfig, DatabaseConfig},
        database::{MemoryOpportunityStore, PruneReport},
        error::{ArbResult, ArbitrageError},
        exchange::{
            fake::{network, FakeExchange},
            pool::PoolSettings,
            ExchangeClient,
        },
        types::percentage_difference,
    };
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use std::collections::HashMap;
    use uuid::Uuid;

    /// Every write stalls for 30s and then fails.
    struct SlowStore;

    #[async_trait]
    impl OpportunityStore for SlowStore {
        async fn append(&self, _opportunity: &Opportunity) -> ArbResult<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(ArbitrageError::Persistence("statement timeout".into()))
        }

        async fn query_recent_top_n(&self, _limit: usize) -> ArbResult<Vec<Opportunity>> {
            Ok(Vec::new())
        }

        async fn query_by_id(&self, _id: Uuid) -> ArbResult<Option<Opportunity>> {
            Ok(None)
        }

        async fn prune(&self, _retention: &RetentionPolicy) -> ArbResult<PruneReport> {
            Ok(PruneReport::default())
        }
    }

    fn create_test_config(ids: &[&str]) -> Config {
        let exchanges: HashMap<_, _> = ids
            .iter()
            .map(|id| (id.to_string(), create_test_exchange_config(&id.to_uppercase())))
            .collect();
        Config {
            exchanges,
            analyzer: AnalyzerConfig {
                fetch_timeout_ms: 100,
                cycle_deadline_ms: 2_000,
                ..AnalyzerConfig::default()
            },
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
            broadcast: BroadcastConfig::default(),
        }
    }

    fn create_test_bot(config: &Config, exchanges: Vec<FakeExchange>) -> (SpotArbitrageBot, Arc<MemoryOpportunityStore>) {
        let store = Arc::new(MemoryOpportunityStore::new(chrono::Duration::minutes(60)));
        let fakes = exchanges.into_iter().map(Arc::new).collect();
        (create_test_bot_with_store(config, fakes, store.clone()), store)
    }

    fn create_test_bot_with_store(
        config: &Config,
        exchanges: Vec<Arc<FakeExchange>>,
        store: Arc<dyn OpportunityStore>,
    ) -> SpotArbitrageBot {
        let clients: Vec<Arc<dyn ExchangeClient>> = exchanges
            .into_iter()
            .map(|e| e as Arc<dyn ExchangeClient>)
            .collect();
        let pool = ExchangeAdapterPool::from_clients(
            clients,
            PoolSettings {
                fetch_timeout: config.analyzer.fetch_timeout(),
                max_concurrent_fetches: config.analyzer.max_concurrent_fetches,
                withdrawal_cache_ttl: Duration::from_secs(60),
            },
        );
        SpotArbitrageBot::new(config, Arc::new(pool), store, Broadcaster::new(64)).unwrap()
    }

    async fn wait_for_stored(store: &MemoryOpportunityStore, id: Uuid) -> Opportunity {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(stored) = store.query_by_id(id).await.unwrap() {
                    return stored;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_cycle_publishes_expected_opportunity() {
        let config = create_test_config(&["a", "b"]);
        let (mut bot, store) = create_test_bot(
            &config,
            vec![
                FakeExchange::new("a")
                    .with_quote("X/USDT", "99", "100")
                    .with_quote("Y/USDT", "5", "6")
                    .with_networks("X", vec![network("TRC20", "1", true, true)]),
                FakeExchange::new("b").with_quote("X/USDT", "102", "103"),
            ],
        );
        let mut events = bot.broadcaster.subscribe();
        let (_handle, control) = scheduler_channel();

        let summary = bot.run_single_cycle(&control).await;
        assert_eq!(summary.symbols_scanned, 1);
        assert_eq!(summary.published, 1);
        assert!(!summary.deadline_hit);

        let snapshot = bot.snapshot_handle().load();
        assert_eq!(snapshot.len(), 1);
        let opportunity = &snapshot.opportunities[0];
        assert_eq!(opportunity.symbol, "X/USDT");
        assert_eq!(opportunity.exchange_min.id, "a");
        assert_eq!(opportunity.exchange_min.price, BigDecimal::from(100));
        assert_eq!(opportunity.exchange_max.id, "b");
        assert_eq!(opportunity.exchange_max.price, BigDecimal::from(102));
        assert_eq!(opportunity.formatted_percentage(), "2.00%");
        assert_eq!(opportunity.fees_min.withdrawal_network.as_deref(), Some("TRC20"));

        match events.recv().await.unwrap() {
            StreamEvent::Opportunity(event) => assert_eq!(event.percentage_difference, "2.00%"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(events.recv().await.unwrap(), StreamEvent::Batch(batch) if batch.len() == 1));

        let stored = wait_for_stored(&store, opportunity.id).await;
        assert_eq!(&stored, opportunity);
        let recomputed = percentage_difference(&stored.exchange_min.price, &stored.exchange_max.price).unwrap();
        assert_eq!(recomputed, stored.percentage_difference);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_symbol_is_absent_and_cycle_completes() {
        let config = create_test_config(&["a", "b", "c"]);
        let (mut bot, _) = create_test_bot(
            &config,
            vec![
                FakeExchange::new("a")
                    .with_quote("X/USDT", "99", "100")
                    .with_quote("Z/USDT", "9", "10")
                    .with_delay("Z/USDT", Duration::from_secs(30)),
                FakeExchange::new("b")
                    .with_quote("X/USDT", "102", "103")
                    .with_quote("Z/USDT", "11", "12")
                    .with_quote("W/USDT", "50", "51"),
                FakeExchange::new("c").with_quote("W/USDT", "52", "53"),
            ],
        );
        let (handle, control) = scheduler_channel();

        let summary = bot.run_single_cycle(&control).await;
        assert_eq!(summary.symbols_scanned, 3);
        assert_eq!(summary.quotes_failed, 1);

        let snapshot = bot.snapshot_handle().load();
        let symbols: Vec<&str> = snapshot.opportunities.iter().map(|o| o.symbol.as_str()).collect();
        assert!(symbols.contains(&"X/USDT"));
        assert!(symbols.contains(&"W/USDT"));
        assert!(!symbols.contains(&"Z/USDT"));
        assert_eq!(handle.state(), CycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_deadline_drops_stragglers() {
        let mut config = create_test_config(&["a", "b"]);
        config.analyzer.fetch_timeout_ms = 60_000;
        config.analyzer.cycle_deadline_ms = 1_000;
        config.analyzer.max_concurrent_fetches = 4;
        let (mut bot, _) = create_test_bot(
            &config,
            vec![
                FakeExchange::new("a")
                    .with_quote("X/USDT", "99", "100")
                    .with_quote("Z/USDT", "9", "10")
                    .with_delay("Z/USDT", Duration::from_secs(30)),
                FakeExchange::new("b")
                    .with_quote("X/USDT", "102", "103")
                    .with_quote("Z/USDT", "11", "12"),
            ],
        );
        let (_handle, control) = scheduler_channel();

        let summary = bot.run_single_cycle(&control).await;
        assert!(summary.deadline_hit);
        assert_eq!(summary.quotes_missing, 1);

        let snapshot = bot.snapshot_handle().load();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.opportunities[0].symbol, "X/USDT");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_keeps_quotes_from_exchanges_that_answered() {
        let mut config = create_test_config(&["a", "b", "c"]);
        config.analyzer.fetch_timeout_ms = 60_000;
        config.analyzer.cycle_deadline_ms = 1_000;
        let (mut bot, _) = create_test_bot(
            &config,
            vec![
                FakeExchange::new("a")
                    .with_quote("Z/USDT", "9", "10")
                    .with_delay("Z/USDT", Duration::from_secs(30)),
                FakeExchange::new("b").with_quote("Z/USDT", "99", "100"),
                FakeExchange::new("c").with_quote("Z/USDT", "102", "103"),
            ],
        );
        let (_handle, control) = scheduler_channel();

        let summary = bot.run_single_cycle(&control).await;
        assert!(summary.deadline_hit);
        assert_eq!(summary.quotes_succeeded, 2);
        assert_eq!(summary.quotes_missing, 1);

        let snapshot = bot.snapshot_handle().load();
        assert_eq!(snapshot.len(), 1);
        let opportunity = &snapshot.opportunities[0];
        assert_eq!(opportunity.symbol, "Z/USDT");
        assert_eq!(opportunity.exchange_min.id, "b");
        assert_eq!(opportunity.exchange_max.id, "c");
        assert_eq!(opportunity.formatted_percentage(), "2.00%");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_does_not_delay_cycles() {
        let config = create_test_config(&["a", "b"]);
        let fakes = vec![
            Arc::new(FakeExchange::new("a").with_quote("X/USDT", "99", "100")),
            Arc::new(FakeExchange::new("b").with_quote("X/USDT", "102", "103")),
        ];
        let mut bot = create_test_bot_with_store(&config, fakes, Arc::new(SlowStore));
        let (_handle, control) = scheduler_channel();

        for cycle in 1..=3 {
            let summary = bot.run_single_cycle(&control).await;
            assert_eq!(summary.cycle, cycle);
            assert_eq!(summary.published, 1);
            assert_eq!(summary.persist_dropped, 0);
            assert!(summary.duration_ms < 30_000);
        }
        assert_eq!(bot.snapshot_handle().load().cycle, 3);
    }

    #[tokio::test]
    async fn test_failing_exchange_keeps_loop_alive() {
        let config = create_test_config(&["a", "b"]);
        let (mut bot, _) = create_test_bot(
            &config,
            vec![
                FakeExchange::new("a").with_failure("X/USDT"),
                FakeExchange::new("b").with_quote("X/USDT", "102", "103"),
            ],
        );
        let (_handle, control) = scheduler_channel();

        let first = bot.run_single_cycle(&control).await;
        let second = bot.run_single_cycle(&control).await;
        assert_eq!(first.published, 0);
        assert_eq!(first.quotes_failed, 1);
        assert_eq!(second.cycle, 2);
        assert_eq!(bot.snapshot_handle().load().cycle, 2);
        assert!(bot.snapshot_handle().load().is_empty());
        assert_eq!(bot.metrics().read().await.total_cycles_completed, 2);
    }

    #[tokio::test]
    async fn test_cycle_without_quotes_keeps_previous_snapshot() {
        let config = create_test_config(&["a", "b"]);
        let fakes = vec![
            Arc::new(FakeExchange::new("a").with_quote("X/USDT", "99", "100")),
            Arc::new(FakeExchange::new("b").with_quote("X/USDT", "102", "103")),
        ];
        let store = Arc::new(MemoryOpportunityStore::new(chrono::Duration::minutes(60)));
        let mut bot = create_test_bot_with_store(&config, fakes.clone(), store);
        let (_handle, control) = scheduler_channel();

        let first = bot.run_single_cycle(&control).await;
        assert_eq!(first.published, 1);
        let mut events = bot.broadcaster.subscribe();

        for fake in &fakes {
            fake.set_offline(true);
        }
        let second = bot.run_single_cycle(&control).await;
        assert_eq!(second.quotes_succeeded, 0);
        assert_eq!(second.published, 0);

        let snapshot = bot.snapshot_handle().load();
        assert_eq!(snapshot.cycle, 1);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.opportunities[0].symbol, "X/USDT");
        assert!(events.try_recv().is_err());
        assert_eq!(bot.metrics().read().await.total_cycles_completed, 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        let config = create_test_config(&["a", "b"]);
        let (bot, _) = create_test_bot(
            &config,
            vec![
                FakeExchange::new("a").with_quote("X/USDT", "99", "100"),
                FakeExchange::new("b").with_quote("X/USDT", "102", "103"),
            ],
        );
        let snapshot = bot.snapshot_handle();
        let (handle, control) = scheduler_channel();

        let task = tokio::spawn(bot.run(control));
        tokio::time::timeout(Duration::from_secs(5), async {
            while snapshot.load().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        handle.stop();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert_eq!(handle.state(), CycleState::Stopped);
    }
}
