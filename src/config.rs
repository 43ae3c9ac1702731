//! Environment-driven configuration.
//!
//! Every setting is read once through an `OnceLock`-cached getter: parse the
//! env var on first access, warn and fall back to the default on an invalid
//! value. `.env` is loaded by `main` before anything touches these.

use std::str::FromStr;
use std::sync::OnceLock;
use tracing::warn;

use crate::models::Confidence;

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!("Invalid {}='{}', using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.trim(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => default,
    }
}

/// Seconds between scan cycles.
pub fn scan_interval_secs() -> u64 {
    static CACHED: OnceLock<u64> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("SCAN_INTERVAL_SECS", 10))
}

/// Minimum after-fee ROI (percent) for an opportunity to be recorded.
pub fn min_arb_percent() -> f64 {
    static CACHED: OnceLock<f64> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("MIN_ARB_PERCENT", 0.5))
}

/// ROI ceiling (percent) above which an opportunity is flagged suspicious.
pub fn suspicious_roi_pct() -> f64 {
    static CACHED: OnceLock<f64> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("SUSPICIOUS_ROI_PCT", 100.0))
}

/// Winning-leg spread (percent) above which an opportunity is flagged.
pub fn suspicious_spread_pct() -> f64 {
    static CACHED: OnceLock<f64> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("SUSPICIOUS_SPREAD_PCT", 20.0))
}

/// Per-venue spread (percent) beyond which pricing is treated as stale and
/// the event is skipped outright.
pub fn max_sane_spread_pct() -> f64 {
    static CACHED: OnceLock<f64> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("MAX_SANE_SPREAD_PCT", 50.0))
}

/// Combined cross-venue volume floor below which events are skipped.
pub fn min_combined_volume() -> f64 {
    static CACHED: OnceLock<f64> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("MIN_COMBINED_VOLUME", 100.0))
}

/// Flat fee rate on venue-A leg cost.
pub fn exchange_a_fee_rate() -> f64 {
    static CACHED: OnceLock<f64> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("EXCHANGE_A_FEE_RATE", 0.02))
}

/// Flat fee rate on venue-B leg cost.
pub fn exchange_b_fee_rate() -> f64 {
    static CACHED: OnceLock<f64> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("EXCHANGE_B_FEE_RATE", 0.015))
}

pub fn fee_rate(venue: crate::models::Venue) -> f64 {
    match venue {
        crate::models::Venue::ExchangeA => exchange_a_fee_rate(),
        crate::models::Venue::ExchangeB => exchange_b_fee_rate(),
    }
}

/// Whether in-progress games may be evaluated at all.
pub fn allow_live_arbs() -> bool {
    static CACHED: OnceLock<bool> = OnceLock::new();
    *CACHED.get_or_init(|| env_bool("ALLOW_LIVE_ARBS", false))
}

/// Minimum confidence tier for a live-game opportunity.
pub fn live_min_confidence() -> Confidence {
    static CACHED: OnceLock<Confidence> = OnceLock::new();
    *CACHED.get_or_init(|| {
        std::env::var("LIVE_MIN_CONFIDENCE")
            .map(|s| Confidence::from_str_lossy(&s))
            .unwrap_or(Confidence::High)
    })
}

/// Spread ceiling (percent) for live-game opportunities.
pub fn live_max_spread_pct() -> f64 {
    static CACHED: OnceLock<f64> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("LIVE_MAX_SPREAD_PCT", 10.0))
}

/// Stricter ROI ceiling (percent) for live-game opportunities.
pub fn live_max_roi_pct() -> f64 {
    static CACHED: OnceLock<f64> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("LIVE_MAX_ROI_PCT", 50.0))
}

/// Bound on concurrent per-event book refreshes within one scan.
pub fn price_fetch_concurrency() -> usize {
    static CACHED: OnceLock<usize> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("PRICE_FETCH_CONCURRENCY", 8usize).max(1))
}

/// Delay before reconnecting a dropped price stream.
pub fn ws_reconnect_delay_secs() -> u64 {
    static CACHED: OnceLock<u64> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("WS_RECONNECT_DELAY_SECS", 5))
}

/// Hours an inactive opportunity is retained before garbage collection.
pub fn opportunity_retention_hours() -> i64 {
    static CACHED: OnceLock<i64> = OnceLock::new();
    *CACHED.get_or_init(|| env_parse("OPP_RETENTION_HOURS", 24))
}

/// Directory for store snapshots.
pub fn data_dir() -> &'static str {
    static CACHED: OnceLock<String> = OnceLock::new();
    CACHED.get_or_init(|| std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()))
}

/// Dry-run flag: detect and log, place no orders. Defaults on.
pub fn dry_run() -> bool {
    static CACHED: OnceLock<bool> = OnceLock::new();
    *CACHED.get_or_init(|| env_bool("DRY_RUN", true))
}
