//! Binary bootstrap: paper-trading deployment of the scanner.
//!
//! Wires file-backed market sources and a paper order executor into the
//! scan loop. Live venue adapters implement the same capability traits
//! ([`sports_arb::venues`]) and drop in here in place of the paper glue.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, info_span, warn};

use sports_arb::config;
use sports_arb::execution::{Executor, OrderPlacer};
use sports_arb::logging;
use sports_arb::models::{BookDepth, Market, MarketPrice, Venue};
use sports_arb::price_cache::PriceCache;
use sports_arb::retry::{self, RetryPolicy};
use sports_arb::risk::{RiskConfig, RiskManager};
use sports_arb::scan::{run_scan_loop, AppContext};
use sports_arb::store::{MemoryOpportunityStore, MemoryPositionStore};
use sports_arb::venues::{MarketSource, OrderExecutor, OrderOutcome, OrderRequest};

/// Market source backed by a JSON snapshot file (`Vec<Market>`).
///
/// The file is re-read every cycle, so an external discovery job can
/// rewrite it between scans without a restart.
struct FileSource {
    venue: Venue,
    path: String,
    balance: f64,
    retry: RetryPolicy,
}

impl FileSource {
    fn from_env(venue: Venue) -> Self {
        let var = match venue {
            Venue::ExchangeA => "EXCHANGE_A_MARKETS_FILE",
            Venue::ExchangeB => "EXCHANGE_B_MARKETS_FILE",
        };
        let default_name = match venue {
            Venue::ExchangeA => "markets_a.json",
            Venue::ExchangeB => "markets_b.json",
        };
        let path = std::env::var(var)
            .unwrap_or_else(|_| format!("{}/{}", config::data_dir(), default_name));
        let balance = std::env::var("PAPER_BALANCE_DOLLARS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(250.0);
        Self {
            venue,
            path,
            balance,
            retry: RetryPolicy::from_env(),
        }
    }

    fn load(&self) -> Result<Vec<Market>> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading market file {}", self.path))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing market file {}", self.path))
    }

    /// A discovery job may be mid-rewrite of the snapshot file; reads go
    /// through the standard retry policy rather than costing a scan cycle.
    async fn load_with_retry(&self) -> Result<Vec<Market>> {
        retry::retry_async(&self.retry, "load_markets", || async move { self.load() }).await
    }
}

#[async_trait]
impl MarketSource for FileSource {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn fetch_markets(&self) -> Result<Vec<Market>> {
        let mut markets = self.load_with_retry().await?;
        markets.retain(|m| m.venue == self.venue);
        Ok(markets)
    }

    async fn fetch_price(&self, market_id: &str) -> Result<MarketPrice> {
        self.load_with_retry()
            .await?
            .into_iter()
            .find(|m| m.market_id == market_id)
            .and_then(|m| m.price)
            .ok_or_else(|| anyhow::anyhow!("no price for {market_id} in {}", self.path))
    }

    async fn fetch_book(&self, market_id: &str) -> Result<BookDepth> {
        self.load_with_retry()
            .await?
            .into_iter()
            .find(|m| m.market_id == market_id)
            .and_then(|m| m.price)
            .and_then(|p| p.book)
            .ok_or_else(|| anyhow::anyhow!("no book for {market_id} in {}", self.path))
    }

    async fn get_balance(&self) -> Result<f64> {
        Ok(self.balance)
    }
}

/// Fills every order in full at its limit price. Paper trading only.
struct PaperExecutor {
    venue: Venue,
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderOutcome> {
        info!(
            event = "paper_fill",
            venue = %self.venue,
            market_ref = %request.market_ref,
            side = ?request.side,
            action = ?request.action,
            contracts = request.contracts,
            price = request.limit_price,
        );
        Ok(OrderOutcome {
            order_id: Some(format!("paper-{}", uuid::Uuid::new_v4())),
            filled_contracts: request.contracts,
            avg_fill_price: request.limit_price,
            cost: request.contracts * request.limit_price,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before any OnceLock-cached config getter runs.
    dotenvy::dotenv().ok();

    // Guard must live for the whole program so the file writer flushes.
    let _log_guard = logging::init_logging();
    let run_id = logging::get_run_id();

    let dry_run = config::dry_run();
    let root_span = info_span!(
        "sports_arb",
        run_id = %run_id,
        dry_run = dry_run,
    );
    let _enter = root_span.enter();

    info!("🚀 Cross-venue sports arbitrage scanner");
    info!(
        "   Scan interval: {}s | min ROI after fees: {:.1}%",
        config::scan_interval_secs(),
        config::min_arb_percent()
    );
    if dry_run {
        info!("   Mode: DRY RUN (set DRY_RUN=0 to place paper orders)");
    } else {
        warn!("   Mode: PAPER EXECUTION");
    }

    let source_a: Arc<dyn MarketSource> = Arc::new(FileSource::from_env(Venue::ExchangeA));
    let source_b: Arc<dyn MarketSource> = Arc::new(FileSource::from_env(Venue::ExchangeB));

    let opportunities = Arc::new(MemoryOpportunityStore::with_snapshot(config::data_dir()));
    let positions = Arc::new(MemoryPositionStore::with_snapshot(config::data_dir()));
    let risk = Arc::new(RiskManager::new(RiskConfig::from_env()));

    let placer = OrderPlacer::new(
        Arc::new(PaperExecutor {
            venue: Venue::ExchangeA,
        }),
        Arc::new(PaperExecutor {
            venue: Venue::ExchangeB,
        }),
    );
    let executor = Arc::new(Executor::new(
        Arc::clone(&source_a),
        Arc::clone(&source_b),
        placer,
        Arc::clone(&risk),
        positions,
        dry_run,
    ));

    let ctx = Arc::new(AppContext {
        source_a,
        source_b,
        price_cache: Arc::new(PriceCache::new()),
        opportunities,
        risk,
        executor: Some(executor),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scan_handle = tokio::spawn(run_scan_loop(Arc::clone(&ctx), shutdown_rx));

    info!("✅ Scanner running, Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!(event = "shutdown_requested");
    let _ = shutdown_tx.send(true);
    let _ = scan_handle.await;

    info!(event = "shutdown_complete");
    Ok(())
}
