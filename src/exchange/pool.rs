use chrono::Utc;
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{OnceCell, Semaphore},
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{ArbResult, ArbitrageError},
    exchange::{registry, ExchangeClient, NetworkFeeCache},
    types::{ExchangeQuote, MarketInfo, Symbol, WithdrawalNetwork},
};

/// Market listings are large; give them more room than a single ticker.
const METADATA_TIMEOUT_FACTOR: u32 = 3;

type ClientBuilder = Box<dyn Fn() -> ArbResult<Arc<dyn ExchangeClient>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub withdrawal_cache_ttl: Duration,
}

/// A constructed client plus the market metadata preloaded with it.
pub struct ExchangeHandle {
    pub client: Arc<dyn ExchangeClient>,
    markets: HashMap<String, MarketInfo>,
}

impl ExchangeHandle {
    pub fn market(&self, symbol_id: &str) -> Option<&MarketInfo> {
        self.markets.get(symbol_id)
    }

    pub fn market_count(&self) -> usize {
        self.markets.len()
    }
}

#[derive(Default)]
struct FetchCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

struct ExchangeSlot {
    name: String,
    builder: ClientBuilder,
    // Create-once guard: concurrent first callers wait on the same initialisation.
    handle: OnceCell<Arc<ExchangeHandle>>,
    // Per exchange, so a hanging venue only queues its own requests.
    permits: Semaphore,
    counters: FetchCounters,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExchangeStatus {
    pub id: String,
    pub name: String,
    pub connected: bool,
    pub markets_loaded: usize,
    pub quotes_succeeded: u64,
    pub quotes_failed: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SymbolFetchOutcome {
    pub exchange_id: String,
    pub result: ArbResult<ExchangeQuote>,
}

/// Lazily constructed, cached exchange clients keyed by exchange id.
///
/// The slot map is fixed at construction; the only mutation afterwards is the
/// one-time initialisation inside each slot and the withdrawal network cache.
pub struct ExchangeAdapterPool {
    slots: HashMap<String, ExchangeSlot>,
    fetch_timeout: Duration,
    network_cache: NetworkFeeCache,
}

impl ExchangeAdapterPool {
    pub fn from_config(config: &Config) -> ArbResult<Self> {
        let settings = PoolSettings {
            fetch_timeout: config.analyzer.fetch_timeout(),
            max_concurrent_fetches: config.analyzer.max_concurrent_fetches,
            withdrawal_cache_ttl: Duration::from_secs(config.analyzer.withdrawal_cache_ttl_seconds),
        };

        let http = Client::builder()
            .timeout(settings.fetch_timeout * METADATA_TIMEOUT_FACTOR)
            .build()
            .map_err(|e| ArbitrageError::Configuration(format!("failed to build http client: {}", e)))?;

        let mut slots = HashMap::new();
        for id in config.active_exchange_ids() {
            if !registry::is_supported(&id) {
                return Err(ArbitrageError::Configuration(format!("unsupported exchange id '{}'", id)));
            }
            let Some(exchange_config) = config.exchanges.get(&id).cloned() else {
                continue;
            };
            let name = exchange_config.name.clone();
            let http = http.clone();
            let builder_id = id.clone();
            let builder: ClientBuilder = Box::new(move || {
                registry::create_client(&builder_id, exchange_config.clone(), http.clone())
            });
            slots.insert(id, ExchangeSlot::new(name, builder, settings.max_concurrent_fetches));
        }

        info!("Exchange adapter pool configured with {} exchanges", slots.len());
        Ok(Self::with_slots(slots, settings))
    }

    /// Builds a pool around already constructed clients. Metadata is still
    /// loaded lazily on first use.
    pub fn from_clients(clients: Vec<Arc<dyn ExchangeClient>>, settings: PoolSettings) -> Self {
        let slots = clients
            .into_iter()
            .map(|client| {
                let id = client.id().to_string();
                let name = client.name().to_string();
                let builder: ClientBuilder = Box::new(move || Ok(client.clone()));
                (id, ExchangeSlot::new(name, builder, settings.max_concurrent_fetches))
            })
            .collect();
        Self::with_slots(slots, settings)
    }

    fn with_slots(slots: HashMap<String, ExchangeSlot>, settings: PoolSettings) -> Self {
        Self {
            slots,
            fetch_timeout: settings.fetch_timeout,
            network_cache: NetworkFeeCache::new(settings.withdrawal_cache_ttl),
        }
    }

    pub fn exchange_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn exchange_name(&self, exchange_id: &str) -> Option<&str> {
        self.slots.get(exchange_id).map(|slot| slot.name.as_str())
    }

    fn slot(&self, exchange_id: &str) -> ArbResult<&ExchangeSlot> {
        self.slots
            .get(exchange_id)
            .ok_or_else(|| ArbitrageError::Configuration(format!("unknown exchange id '{}'", exchange_id)))
    }

    /// Returns the exchange's client, constructing it and preloading its
    /// markets on first use.
    pub async fn handle(&self, exchange_id: &str) -> ArbResult<Arc<ExchangeHandle>> {
        let slot = self.slot(exchange_id)?;
        let metadata_timeout = self.fetch_timeout * METADATA_TIMEOUT_FACTOR;

        let handle = slot
            .handle
            .get_or_try_init(|| async {
                info!("Initializing {} client", slot.name);
                let client = (slot.builder)()?;

                let markets = timeout(metadata_timeout, client.load_markets())
                    .await
                    .map_err(|_| {
                        ArbitrageError::transient(
                            exchange_id,
                            "*",
                            format!("market metadata timed out after {}ms", metadata_timeout.as_millis()),
                        )
                    })?
                    .map_err(|e| ArbitrageError::transient(exchange_id, "*", e))?;

                let markets: HashMap<String, MarketInfo> = markets
                    .into_iter()
                    .map(|market| (market.symbol.id.clone(), market))
                    .collect();
                info!("{} client ready with {} markets", slot.name, markets.len());

                Ok::<_, ArbitrageError>(Arc::new(ExchangeHandle {
                    client,
                    markets,
                }))
            })
            .await?;

        Ok(handle.clone())
    }

    pub async fn fetch_market_metadata(&self, exchange_id: &str) -> ArbResult<Vec<MarketInfo>> {
        let handle = self.handle(exchange_id).await?;
        let mut markets: Vec<MarketInfo> = handle.markets.values().cloned().collect();
        markets.sort_by(|a, b| a.symbol.id.cmp(&b.symbol.id));
        Ok(markets)
    }

    /// Cached metadata only; never triggers client construction.
    pub fn cached_market(&self, exchange_id: &str, symbol_id: &str) -> ArbResult<MarketInfo> {
        let slot = self.slot(exchange_id)?;
        slot.handle
            .get()
            .and_then(|handle| handle.market(symbol_id).cloned())
            .ok_or_else(|| {
                ArbitrageError::DataIntegrity(format!("no market metadata for {} on {}", symbol_id, exchange_id))
            })
    }

    /// Fetches one quote under the per-call timeout. Never panics or aborts
    /// the caller; failures come back as `TransientFetch`.
    pub async fn fetch_quote(&self, exchange_id: &str, symbol: &Symbol) -> ArbResult<ExchangeQuote> {
        let result = self.fetch_quote_bounded(exchange_id, symbol).await;

        if let Some(slot) = self.slots.get(exchange_id) {
            match &result {
                Ok(_) => slot.counters.succeeded.fetch_add(1, Ordering::Relaxed),
                Err(_) => slot.counters.failed.fetch_add(1, Ordering::Relaxed),
            };
        }
        if let Err(e) = &result {
            debug!("Quote unavailable: {}", e);
        }
        result
    }

    async fn fetch_quote_bounded(&self, exchange_id: &str, symbol: &Symbol) -> ArbResult<ExchangeQuote> {
        let _permit = self
            .slot(exchange_id)?
            .permits
            .acquire()
            .await
            .map_err(|e| ArbitrageError::transient(exchange_id, &symbol.id, e))?;

        let fetch = async {
            let handle = self.handle(exchange_id).await?;
            let market = handle
                .market(&symbol.id)
                .ok_or_else(|| ArbitrageError::transient(exchange_id, &symbol.id, "symbol not listed"))?;

            let ticker = handle
                .client
                .fetch_ticker(market)
                .await
                .map_err(|e| ArbitrageError::transient(exchange_id, &symbol.id, e))?;

            Ok::<_, ArbitrageError>(ExchangeQuote {
                exchange_id: exchange_id.to_string(),
                bid_price: ticker.bid,
                ask_price: ticker.ask,
                observed_at: Utc::now(),
            })
        };

        match timeout(self.fetch_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(ArbitrageError::transient(
                exchange_id,
                &symbol.id,
                format!("timed out after {}ms", self.fetch_timeout.as_millis()),
            )),
        }
    }

    /// Fetches the symbol on every listed exchange concurrently. Each
    /// exchange's outcome is reported on its own; one failure never discards
    /// another exchange's quote.
    pub async fn fetch_quotes_for_symbol(&self, symbol: &Symbol, exchange_ids: &[String]) -> Vec<SymbolFetchOutcome> {
        let mut fetches = Vec::with_capacity(exchange_ids.len());
        for exchange_id in exchange_ids {
            fetches.push(async move {
                SymbolFetchOutcome {
                    exchange_id: exchange_id.clone(),
                    result: self.fetch_quote(exchange_id, symbol).await,
                }
            });
        }
        join_all(fetches).await
    }

    pub async fn fetch_withdrawal_networks(&self, exchange_id: &str, currency: &str) -> ArbResult<Vec<WithdrawalNetwork>> {
        if let Some(networks) = self.network_cache.get(exchange_id, currency).await {
            return Ok(networks);
        }

        let _permit = self
            .slot(exchange_id)?
            .permits
            .acquire()
            .await
            .map_err(|e| ArbitrageError::transient(exchange_id, currency, e))?;
        let handle = self.handle(exchange_id).await?;
        let networks = timeout(self.fetch_timeout, handle.client.fetch_withdrawal_networks(currency))
            .await
            .map_err(|_| {
                ArbitrageError::transient(
                    exchange_id,
                    currency,
                    format!("withdrawal networks timed out after {}ms", self.fetch_timeout.as_millis()),
                )
            })?
            .map_err(|e| {
                ArbitrageError::DataIntegrity(format!(
                    "withdrawal networks for {} on {}: {}",
                    currency, exchange_id, e
                ))
            })?;

        self.network_cache.insert(exchange_id, currency, networks.clone()).await;
        Ok(networks)
    }

    pub async fn evict_expired_networks(&self) -> usize {
        self.network_cache.evict_expired().await
    }

    /// Adapter health for one exchange. Unknown ids are a configuration error.
    pub async fn exchange_status(&self, exchange_id: &str) -> ArbResult<ExchangeStatus> {
        let slot = self.slot(exchange_id)?;

        let checked: ArbResult<usize> = async {
            let handle = self.handle(exchange_id).await?;
            match timeout(self.fetch_timeout, handle.client.health_check()).await {
                Ok(Ok(())) => Ok(handle.market_count()),
                Ok(Err(e)) => Err(ArbitrageError::transient(exchange_id, "*", e)),
                Err(_) => Err(ArbitrageError::transient(exchange_id, "*", "health check timed out")),
            }
        }
        .await;

        let (connected, markets_loaded, error) = match checked {
            Ok(markets) => (true, markets, None),
            Err(e) => {
                warn!("Exchange {} is unhealthy: {}", exchange_id, e);
                let markets = slot.handle.get().map(|h| h.market_count()).unwrap_or(0);
                (false, markets, Some(e.to_string()))
            }
        };

        Ok(ExchangeStatus {
            id: exchange_id.to_string(),
            name: slot.name.clone(),
            connected,
            markets_loaded,
            quotes_succeeded: slot.counters.succeeded.load(Ordering::Relaxed),
            quotes_failed: slot.counters.failed.load(Ordering::Relaxed),
            error,
        })
    }
}

impl ExchangeSlot {
    fn new(name: String, builder: ClientBuilder, max_concurrent_fetches: usize) -> Self {
        Self {
            name,
            builder,
            handle: OnceCell::new(),
            permits: Semaphore::new(max_concurrent_fetches.max(1)),
            counters: FetchCounters::default(),
        }
    }
}
