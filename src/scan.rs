//! The scan cycle: fetch, match, refresh, evaluate, record.
//!
//! One cycle walks the full pipeline; [`run_scan_loop`] repeats it on the
//! configured interval until shutdown. Opportunities that stop showing up
//! are deactivated only after the whole cycle has recorded its findings, so
//! a slow venue fetch never flaps records mid-cycle.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures_util::future::join_all;
use rustc_hash::FxHashSet;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::arbitrage;
use crate::config;
use crate::execution::Executor;
use crate::matcher::match_events;
use crate::models::{MarketPrice, OpportunityKey, SportEvent, Venue};
use crate::price_cache::PriceCache;
use crate::risk::RiskManager;
use crate::store::OpportunityStore;
use crate::venues::MarketSource;

/// Everything a scan cycle needs, wired once at startup.
pub struct AppContext {
    pub source_a: Arc<dyn MarketSource>,
    pub source_b: Arc<dyn MarketSource>,
    pub price_cache: Arc<PriceCache>,
    pub opportunities: Arc<dyn OpportunityStore>,
    pub risk: Arc<RiskManager>,
    /// Absent in scan-only deployments.
    pub executor: Option<Arc<Executor>>,
}

#[derive(Debug, Default, Clone)]
pub struct ScanSummary {
    pub markets_a: usize,
    pub markets_b: usize,
    pub matched_events: usize,
    pub opportunities: usize,
    pub executed: usize,
    pub deactivated: usize,
}

/// Streamed prices go stale once the connection has been down a while; past
/// this age the REST price wins.
fn cache_staleness_secs() -> i64 {
    (config::scan_interval_secs() as i64 * 2).max(30)
}

impl AppContext {
    fn source_for(&self, venue: Venue) -> &Arc<dyn MarketSource> {
        match venue {
            Venue::ExchangeA => &self.source_a,
            Venue::ExchangeB => &self.source_b,
        }
    }

    /// Freshest available price for one market: recent stream update first,
    /// REST otherwise, with best-effort book depth attached.
    async fn fresh_price(&self, venue: Venue, market_id: &str) -> Option<MarketPrice> {
        let source = self.source_for(venue);

        let cached = self.price_cache.get(market_id).await.filter(|p| {
            (Utc::now() - p.last_updated).num_seconds() < cache_staleness_secs()
        });

        let mut price = match cached {
            Some(p) => p,
            None => match source.fetch_price(market_id).await {
                Ok(p) => p,
                Err(e) => {
                    debug!(event = "price_fetch_failed", venue = %venue, market_id, error = %e);
                    return None;
                }
            },
        };

        if price.book.is_none() {
            match source.fetch_book(market_id).await {
                Ok(book) => price.book = Some(book),
                Err(e) => {
                    debug!(event = "book_fetch_failed", venue = %venue, market_id, error = %e)
                }
            }
        }
        Some(price)
    }

    /// Refresh prices on every matched event's markets, bounded by
    /// `PRICE_FETCH_CONCURRENCY` so a big slate doesn't stampede the APIs.
    async fn refresh_prices(&self, events: &mut [SportEvent]) {
        let semaphore = Arc::new(Semaphore::new(config::price_fetch_concurrency()));

        let mut wanted: Vec<(usize, Venue, String)> = Vec::new();
        for (idx, event) in events.iter().enumerate() {
            if !event.matched {
                continue;
            }
            for venue in [Venue::ExchangeA, Venue::ExchangeB] {
                if let Some(market) = event.market(venue) {
                    wanted.push((idx, venue, market.market_id.clone()));
                }
            }
        }

        let fetches = wanted.iter().map(|(idx, venue, market_id)| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                // Closed only at shutdown; a None permit just skips.
                let _permit = semaphore.acquire().await.ok()?;
                self.fresh_price(*venue, market_id)
                    .await
                    .map(|p| (*idx, *venue, p))
            }
        });

        for fetched in join_all(fetches).await.into_iter().flatten() {
            let (idx, venue, price) = fetched;
            let market = match venue {
                Venue::ExchangeA => events[idx].market_a.as_mut(),
                Venue::ExchangeB => events[idx].market_b.as_mut(),
            };
            if let Some(market) = market {
                market.price = Some(price);
            }
        }
    }

    /// One full scan pass.
    pub async fn scan_cycle(&self) -> Result<ScanSummary> {
        let (markets_a, markets_b) =
            tokio::join!(self.source_a.fetch_markets(), self.source_b.fetch_markets());
        let markets_a = markets_a?;
        let markets_b = markets_b?;

        let mut summary = ScanSummary {
            markets_a: markets_a.len(),
            markets_b: markets_b.len(),
            ..Default::default()
        };

        let mut events = match_events(&markets_a, &markets_b);
        summary.matched_events = events.iter().filter(|e| e.matched).count();

        self.refresh_prices(&mut events).await;

        let mut seen_keys: FxHashSet<OpportunityKey> = FxHashSet::default();
        for event in events.iter().filter(|e| e.matched) {
            let Some(opp) = arbitrage::evaluate(event, config::allow_live_arbs()) else {
                continue;
            };
            if opp.roi_after_fees < config::min_arb_percent() {
                continue;
            }

            info!(
                event = "opportunity_found",
                title = %opp.event_title,
                arb_type = opp.details.kind(),
                roi = opp.roi_after_fees,
                confidence = ?opp.confidence(),
                executable = opp.is_executable(),
                suspicious = opp.is_suspicious(),
            );

            seen_keys.insert(opp.store_key());
            summary.opportunities += 1;

            let auto = opp.auto_eligible();
            self.opportunities.upsert(opp.clone()).await?;

            if auto {
                if let Some(executor) = &self.executor {
                    match executor.try_execute(&opp).await {
                        Ok(Some(_)) => summary.executed += 1,
                        Ok(None) => {}
                        Err(e) => warn!(event = "execute_error", opportunity = %opp.id, error = %e),
                    }
                }
            }
        }

        // Deactivation runs strictly after all records land: anything active
        // in the store that this cycle did not re-observe is gone.
        for key in self.opportunities.active_keys().await? {
            if !seen_keys.contains(&key) {
                self.opportunities.deactivate(&key).await?;
                summary.deactivated += 1;
            }
        }
        self.opportunities
            .purge_older_than(config::opportunity_retention_hours())
            .await?;

        Ok(summary)
    }
}

/// Repeat scan cycles until the shutdown signal flips.
pub async fn run_scan_loop(ctx: Arc<AppContext>, mut shutdown: watch::Receiver<bool>) {
    let interval = std::time::Duration::from_secs(config::scan_interval_secs());
    info!(event = "scan_loop_started", interval_secs = interval.as_secs());

    loop {
        match ctx.scan_cycle().await {
            Ok(summary) => info!(
                event = "scan_complete",
                markets_a = summary.markets_a,
                markets_b = summary.markets_b,
                matched = summary.matched_events,
                opportunities = summary.opportunities,
                executed = summary.executed,
                deactivated = summary.deactivated,
            ),
            Err(e) => warn!(event = "scan_failed", error = %e),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }
    }
    info!(event = "scan_loop_stopped");
}
