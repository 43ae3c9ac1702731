//! Shared price cache fed by venue streams.
//!
//! Scan cycles read the freshest price a stream has pushed instead of
//! polling the REST API for every market. One [`run_price_stream`] task per
//! venue owns the connection: it resubscribes when the watched market set
//! changes and reconnects with exponential backoff when the venue drops it.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rustc_hash::FxHashMap;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::config;
use crate::models::MarketPrice;
use crate::venues::PriceStreamer;

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Market-id -> latest streamed price.
#[derive(Default)]
pub struct PriceCache {
    inner: RwLock<FxHashMap<String, MarketPrice>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, market_id: &str) -> Option<MarketPrice> {
        self.inner.read().await.get(market_id).cloned()
    }

    pub async fn update(&self, market_id: String, price: MarketPrice) {
        self.inner.write().await.insert(market_id, price);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Drop cached prices for markets no longer tracked.
    pub async fn retain_markets(&self, market_ids: &[String]) {
        let keep: std::collections::HashSet<&String> = market_ids.iter().collect();
        self.inner.write().await.retain(|id, _| keep.contains(id));
    }
}

/// Drive one venue's price stream into the cache until shutdown.
///
/// `subscriptions` carries the current market-id set; any change tears the
/// stream down and resubscribes with the new set. A dropped connection
/// reconnects after `WS_RECONNECT_DELAY_SECS`, doubling up to a minute.
pub async fn run_price_stream(
    streamer: Arc<dyn PriceStreamer>,
    cache: Arc<PriceCache>,
    mut subscriptions: watch::Receiver<Vec<String>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let venue = streamer.venue();
    let base_delay = Duration::from_secs(config::ws_reconnect_delay_secs().max(1));
    let mut delay = base_delay;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let market_ids = subscriptions.borrow_and_update().clone();
        if market_ids.is_empty() {
            // Nothing to stream yet; wait for the first subscription set.
            tokio::select! {
                _ = subscriptions.changed() => continue,
                _ = shutdown.changed() => continue,
            }
        }

        match streamer.subscribe_prices(&market_ids).await {
            Ok(mut stream) => {
                info!(
                    event = "stream_connected",
                    venue = %venue,
                    markets = market_ids.len(),
                );
                delay = base_delay;

                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        changed = subscriptions.changed() => {
                            if changed.is_ok() {
                                debug!(event = "stream_resubscribe", venue = %venue);
                            }
                            break;
                        }
                        update = stream.next() => match update {
                            Some(u) => cache.update(u.market_id, u.price).await,
                            None => {
                                warn!(event = "stream_closed", venue = %venue);
                                break;
                            }
                        },
                    }
                }
            }
            Err(e) => {
                warn!(event = "stream_connect_failed", venue = %venue, error = %e);
            }
        }

        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {}
        }
        delay = (delay * 2).min(MAX_RECONNECT_DELAY);
    }

    info!(event = "stream_stopped", venue = %venue);
}
