//! Opportunity and position stores.
//!
//! Both stores are in-memory maps behind trait seams, with an optional JSON
//! snapshot (atomic temp-file + rename) so a restart picks up where the last
//! run left off. Opportunities are deactivated rather than deleted when they
//! disappear, then garbage-collected on a retention clock.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use crate::models::{ArbitrageOpportunity, OpenPosition, OpportunityKey, PositionStatus};

/// Per-day execution summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyStats {
    pub trades: usize,
    pub settled: usize,
    pub partial: usize,
    pub pnl: f64,
}

#[async_trait]
pub trait OpportunityStore: Send + Sync {
    /// Insert or refresh by store key. A refresh keeps the original id and
    /// discovery time and reactivates the record.
    async fn upsert(&self, opp: ArbitrageOpportunity) -> Result<()>;

    async fn active(&self) -> Result<Vec<ArbitrageOpportunity>>;

    async fn active_keys(&self) -> Result<Vec<OpportunityKey>>;

    /// Mark gone-from-the-market, keeping the record for history.
    async fn deactivate(&self, key: &OpportunityKey) -> Result<()>;

    /// Drop inactive records older than the retention window. Returns the
    /// number removed.
    async fn purge_older_than(&self, hours: i64) -> Result<usize>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn save(&self, position: &OpenPosition) -> Result<()>;

    async fn open_positions(&self) -> Result<Vec<OpenPosition>>;

    async fn settle(&self, id: &str, winning_side: &str, pnl: f64) -> Result<()>;

    async fn daily_stats(&self, day: NaiveDate) -> Result<DailyStats>;
}

/// Atomic snapshot write: temp file then rename, so a crash mid-write never
/// truncates the previous snapshot.
fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("renaming to {}", path.display()))?;
    Ok(())
}

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(json) => match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(event = "snapshot_corrupt", path = %path.display(), error = %e);
                None
            }
        },
        Err(e) => {
            warn!(event = "snapshot_unreadable", path = %path.display(), error = %e);
            None
        }
    }
}

/// In-memory opportunity store keyed by `(team_a, yes venue, no venue)`.
pub struct MemoryOpportunityStore {
    inner: Mutex<FxHashMap<OpportunityKey, ArbitrageOpportunity>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryOpportunityStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FxHashMap::default()),
            snapshot_path: None,
        }
    }

    /// Load from (and persist to) a snapshot under the data directory.
    pub fn with_snapshot(data_dir: &str) -> Self {
        let path = Path::new(data_dir).join("opportunities.json");
        let mut map = FxHashMap::default();
        if let Some(opps) = read_snapshot::<Vec<ArbitrageOpportunity>>(&path) {
            info!(event = "opportunities_loaded", count = opps.len());
            for opp in opps {
                map.insert(opp.store_key(), opp);
            }
        }
        Self {
            inner: Mutex::new(map),
            snapshot_path: Some(path),
        }
    }

    fn snapshot(&self, map: &FxHashMap<OpportunityKey, ArbitrageOpportunity>) {
        if let Some(path) = &self.snapshot_path {
            let all: Vec<&ArbitrageOpportunity> = map.values().collect();
            if let Err(e) = write_snapshot(path, &all) {
                warn!(event = "snapshot_failed", error = %e);
            }
        }
    }
}

impl Default for MemoryOpportunityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OpportunityStore for MemoryOpportunityStore {
    async fn upsert(&self, opp: ArbitrageOpportunity) -> Result<()> {
        let mut map = self.inner.lock();
        let key = opp.store_key();
        match map.get_mut(&key) {
            Some(existing) => {
                // Keep identity and discovery time across refreshes.
                let id = existing.id.clone();
                let found_at = existing.found_at;
                *existing = opp;
                existing.id = id;
                existing.found_at = found_at;
                existing.still_active = true;
            }
            None => {
                map.insert(key, opp);
            }
        }
        self.snapshot(&map);
        Ok(())
    }

    async fn active(&self) -> Result<Vec<ArbitrageOpportunity>> {
        Ok(self
            .inner
            .lock()
            .values()
            .filter(|o| o.still_active)
            .cloned()
            .collect())
    }

    async fn active_keys(&self) -> Result<Vec<OpportunityKey>> {
        Ok(self
            .inner
            .lock()
            .iter()
            .filter(|(_, o)| o.still_active)
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn deactivate(&self, key: &OpportunityKey) -> Result<()> {
        let mut map = self.inner.lock();
        if let Some(opp) = map.get_mut(key) {
            opp.still_active = false;
        }
        self.snapshot(&map);
        Ok(())
    }

    async fn purge_older_than(&self, hours: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::hours(hours);
        let mut map = self.inner.lock();
        let before = map.len();
        map.retain(|_, o| o.still_active || o.found_at >= cutoff);
        let removed = before - map.len();
        if removed > 0 {
            info!(event = "opportunities_purged", removed);
            self.snapshot(&map);
        }
        Ok(removed)
    }
}

/// In-memory position store keyed by position id.
pub struct MemoryPositionStore {
    inner: Mutex<FxHashMap<String, OpenPosition>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FxHashMap::default()),
            snapshot_path: None,
        }
    }

    pub fn with_snapshot(data_dir: &str) -> Self {
        let path = Path::new(data_dir).join("positions.json");
        let mut map = FxHashMap::default();
        if let Some(positions) = read_snapshot::<Vec<OpenPosition>>(&path) {
            info!(event = "positions_loaded", count = positions.len());
            for p in positions {
                map.insert(p.id.clone(), p);
            }
        }
        Self {
            inner: Mutex::new(map),
            snapshot_path: Some(path),
        }
    }

    fn snapshot(&self, map: &FxHashMap<String, OpenPosition>) {
        if let Some(path) = &self.snapshot_path {
            let all: Vec<&OpenPosition> = map.values().collect();
            if let Err(e) = write_snapshot(path, &all) {
                warn!(event = "snapshot_failed", error = %e);
            }
        }
    }
}

impl Default for MemoryPositionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PositionStore for MemoryPositionStore {
    async fn save(&self, position: &OpenPosition) -> Result<()> {
        let mut map = self.inner.lock();
        map.insert(position.id.clone(), position.clone());
        self.snapshot(&map);
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<OpenPosition>> {
        Ok(self
            .inner
            .lock()
            .values()
            .filter(|p| p.status != PositionStatus::Settled)
            .cloned()
            .collect())
    }

    async fn settle(&self, id: &str, winning_side: &str, pnl: f64) -> Result<()> {
        let mut map = self.inner.lock();
        let position = map
            .get_mut(id)
            .with_context(|| format!("unknown position {id}"))?;
        position.status = PositionStatus::Settled;
        position.settled_at = Some(Utc::now());
        position.actual_pnl = Some(pnl);
        position.winning_side = Some(winning_side.to_string());
        self.snapshot(&map);
        Ok(())
    }

    async fn daily_stats(&self, day: NaiveDate) -> Result<DailyStats> {
        let map = self.inner.lock();
        let mut stats = DailyStats::default();
        for p in map.values() {
            if p.opened_at.date_naive() == day {
                stats.trades += 1;
                if p.status == PositionStatus::Partial {
                    stats.partial += 1;
                }
            }
            if let Some(settled_at) = p.settled_at {
                if settled_at.date_naive() == day {
                    stats.settled += 1;
                    stats.pnl += p.actual_pnl.unwrap_or(0.0);
                }
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ArbDetails, Confidence, Direction, LegDetail, PositionLeg, Side, TwoLegDetails, Venue,
    };
    use std::collections::BTreeMap;

    fn opportunity(team_a: &str, roi: f64) -> ArbitrageOpportunity {
        let leg = |venue, side| LegDetail {
            venue,
            side,
            price: 0.45,
            market_id: "m1".to_string(),
            ticker: None,
            url: String::new(),
            volume: 1000.0,
        };
        ArbitrageOpportunity {
            id: uuid::Uuid::new_v4().to_string(),
            event_title: format!("{team_a} game"),
            team_a: team_a.to_string(),
            team_b: "Other".to_string(),
            buy_yes_venue: Venue::ExchangeA,
            buy_no_venue: Venue::ExchangeB,
            yes_price: 0.45,
            no_price: 0.40,
            total_cost: 0.865,
            profit_pct: roi,
            roi_after_fees: roi,
            found_at: Utc::now(),
            still_active: true,
            details: ArbDetails::YesNo(TwoLegDetails {
                direction: Direction::YesANoB,
                yes_leg: leg(Venue::ExchangeA, Side::Yes),
                no_leg: leg(Venue::ExchangeB, Side::No),
                confidence: Confidence::Medium,
                executable: false,
                suspicious: false,
                suspicion_reason: None,
                liquidity: None,
                is_live: false,
                extra: BTreeMap::new(),
            }),
        }
    }

    fn position(id: &str) -> OpenPosition {
        let leg = |venue, side| PositionLeg {
            venue,
            side,
            amount: 0.90,
            contracts: 2.0,
            avg_price: 0.45,
            order_id: "ord".to_string(),
        };
        OpenPosition {
            id: id.to_string(),
            event_title: "Lions vs Bills".to_string(),
            team_a: "Lions".to_string(),
            team_b: "Bills".to_string(),
            leg_a: leg(Venue::ExchangeA, Side::Yes),
            leg_b: leg(Venue::ExchangeB, Side::No),
            arb_type: "yes_no".to_string(),
            expected_roi: 15.6,
            opened_at: Utc::now(),
            status: PositionStatus::Open,
            settled_at: None,
            actual_pnl: None,
            winning_side: None,
        }
    }

    #[tokio::test]
    async fn upsert_refreshes_but_keeps_identity() {
        let store = MemoryOpportunityStore::new();
        let first = opportunity("Lions", 10.0);
        let original_id = first.id.clone();
        let original_found = first.found_at;
        store.upsert(first).await.unwrap();

        let mut refresh = opportunity("Lions", 12.5);
        refresh.still_active = true;
        store.upsert(refresh).await.unwrap();

        let active = store.active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, original_id);
        assert_eq!(active[0].found_at, original_found);
        assert_eq!(active[0].roi_after_fees, 12.5);
    }

    #[tokio::test]
    async fn deactivate_keeps_the_record() {
        let store = MemoryOpportunityStore::new();
        let opp = opportunity("Lions", 10.0);
        let key = opp.store_key();
        store.upsert(opp).await.unwrap();

        store.deactivate(&key).await.unwrap();
        assert!(store.active().await.unwrap().is_empty());

        // Reappearing reactivates in place
        store.upsert(opportunity("Lions", 8.0)).await.unwrap();
        assert_eq!(store.active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purge_removes_only_stale_inactive_records() {
        let store = MemoryOpportunityStore::new();
        let mut old = opportunity("Lions", 10.0);
        old.found_at = Utc::now() - Duration::hours(48);
        let old_key = old.store_key();
        store.upsert(old).await.unwrap();
        store.upsert(opportunity("Cowboys", 5.0)).await.unwrap();

        // Active records survive regardless of age
        assert_eq!(store.purge_older_than(24).await.unwrap(), 0);

        store.deactivate(&old_key).await.unwrap();
        assert_eq!(store.purge_older_than(24).await.unwrap(), 1);
        assert_eq!(store.active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn settle_marks_position_and_daily_stats_count_it() {
        let store = MemoryPositionStore::new();
        store.save(&position("p1")).await.unwrap();
        store.save(&position("p2")).await.unwrap();
        store.settle("p1", "team_a", 0.30).await.unwrap();

        let open = store.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "p2");

        let today = Utc::now().date_naive();
        let stats = store.daily_stats(today).await.unwrap();
        assert_eq!(stats.trades, 2);
        assert_eq!(stats.settled, 1);
        assert!((stats.pnl - 0.30).abs() < 1e-9);
    }

    #[tokio::test]
    async fn settle_unknown_position_is_an_error() {
        let store = MemoryPositionStore::new();
        assert!(store.settle("missing", "team_a", 0.0).await.is_err());
    }

    #[tokio::test]
    async fn snapshot_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap().to_string();

        {
            let store = MemoryOpportunityStore::with_snapshot(&data_dir);
            store.upsert(opportunity("Lions", 10.0)).await.unwrap();
        }

        let reloaded = MemoryOpportunityStore::with_snapshot(&data_dir);
        let active = reloaded.active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].team_a, "Lions");
    }
}
