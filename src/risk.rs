//! Pre-trade risk gate, sizing, and the kill switch.
//!
//! Every execution attempt passes through [`RiskManager::check_opportunity`]
//! before any order is placed. Checks run in a fixed order so the cheapest
//! rejection wins; the duplicate-key reservation is atomic so two concurrent
//! attempts on the same game can never both pass.

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::{error, info, warn};

use crate::liquidity::LiquidityAnalysis;
use crate::models::{ArbitrageOpportunity, Confidence, RiskCheck};

/// Risk limits, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Smallest stake worth placing (dollars).
    pub min_bet: f64,
    /// Per-trade stake cap (dollars).
    pub max_bet: f64,
    /// Reject opportunities below this ROI (percent).
    pub min_roi_pct: f64,
    /// Reject opportunities above this ROI as too good to be true (percent).
    pub max_roi_pct: f64,
    pub max_daily_trades: u32,
    /// Realized daily loss (dollars) that trips the kill switch.
    pub max_daily_loss: f64,
    /// Minimum cash required on each venue before trading.
    pub min_platform_balance: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RiskConfig {
    pub fn from_env() -> Self {
        let get = |key: &str, default: f64| -> f64 {
            std::env::var(key)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };
        Self {
            min_bet: get("MIN_BET_DOLLARS", 1.0),
            max_bet: get("MAX_BET_DOLLARS", 2.0),
            min_roi_pct: get("MIN_ROI_PCT", 1.0),
            max_roi_pct: get("MAX_ROI_PCT", 50.0),
            max_daily_trades: std::env::var("MAX_DAILY_TRADES")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(50),
            max_daily_loss: get("MAX_DAILY_LOSS_DOLLARS", 5.0),
            min_platform_balance: get("MIN_PLATFORM_BALANCE", 1.0),
        }
    }
}

#[derive(Debug, Default)]
struct DayCounters {
    date: Option<NaiveDate>,
    trades: u32,
    pnl: f64,
}

#[derive(Debug, Default)]
struct RiskState {
    day: DayCounters,
    /// Dedup keys of positions currently open or mid-execution.
    reserved_keys: FxHashSet<String>,
    kill_switch: bool,
    kill_reason: Option<String>,
}

impl RiskState {
    /// Counters reset at UTC midnight.
    fn roll_day(&mut self) {
        let today = Utc::now().date_naive();
        if self.day.date != Some(today) {
            self.day = DayCounters {
                date: Some(today),
                trades: 0,
                pnl: 0.0,
            };
        }
    }
}

/// Point-in-time view of the risk counters, for logging and status output.
#[derive(Debug, Clone)]
pub struct RiskStats {
    pub trades_today: u32,
    pub pnl_today: f64,
    pub reserved_keys: usize,
    pub kill_switch: bool,
    pub kill_reason: Option<String>,
}

pub struct RiskManager {
    config: RiskConfig,
    state: Mutex<RiskState>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RiskState::default()),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// The full pre-trade gate. Cheapest checks first; the duplicate-key
    /// reservation runs late so earlier rejections never leak a reservation.
    ///
    /// On a pass the opportunity's dedup key is RESERVED and the caller owns
    /// it: release it on failure, keep it while the position is open.
    pub fn check_opportunity(
        &self,
        opp: &ArbitrageOpportunity,
        balance_a: f64,
        balance_b: f64,
    ) -> RiskCheck {
        let mut state = self.state.lock();
        state.roll_day();

        if state.kill_switch {
            let reason = state
                .kill_reason
                .clone()
                .unwrap_or_else(|| "kill switch engaged".to_string());
            return RiskCheck::reject(format!("kill switch: {reason}"));
        }

        let Some(details) = opp.details.two_leg() else {
            return RiskCheck::reject("only two-leg opportunities are executable");
        };
        if details.yes_leg.ticker.is_none() || details.no_leg.ticker.is_none() {
            return RiskCheck::reject("missing trading identifiers");
        }

        if balance_a < self.config.min_platform_balance {
            return RiskCheck::reject(format!("exchange_a balance ${balance_a:.2} too low"));
        }
        if balance_b < self.config.min_platform_balance {
            return RiskCheck::reject(format!("exchange_b balance ${balance_b:.2} too low"));
        }

        if opp.roi_after_fees < self.config.min_roi_pct {
            return RiskCheck::reject(format!(
                "ROI {:.2}% below minimum {:.2}%",
                opp.roi_after_fees, self.config.min_roi_pct
            ));
        }
        if opp.roi_after_fees > self.config.max_roi_pct {
            return RiskCheck::reject(format!(
                "ROI {:.2}% above sanity ceiling {:.2}%",
                opp.roi_after_fees, self.config.max_roi_pct
            ));
        }

        if state.day.trades >= self.config.max_daily_trades {
            return RiskCheck::reject("daily trade limit reached");
        }
        if state.day.pnl <= -self.config.max_daily_loss {
            return RiskCheck::reject("daily loss limit reached");
        }

        // Atomic under the state lock: the second concurrent attempt on the
        // same game sees the key already reserved.
        let key = opp.dedup_key();
        if !state.reserved_keys.insert(key.clone()) {
            return RiskCheck::reject(format!("position already open or pending for {key}"));
        }

        // Reservation is held past this point; undo it on later rejection.
        let mut reject_and_release = |reason: String| {
            state.reserved_keys.remove(&key);
            RiskCheck::reject(reason)
        };

        if opp.confidence() != Confidence::High {
            return reject_and_release(format!(
                "confidence {:?} below required High",
                opp.confidence()
            ));
        }
        if !details.executable {
            return reject_and_release("legs not executable (no real quotes)".to_string());
        }
        if opp.is_suspicious() {
            let why = details
                .suspicion_reason
                .clone()
                .unwrap_or_else(|| "flagged suspicious".to_string());
            return reject_and_release(why);
        }

        RiskCheck::pass()
    }

    /// Stake for this trade: capped by config, both balances, and what the
    /// book can absorb. Below `min_bet` means no trade.
    pub fn calculate_bet_size(
        &self,
        balance_a: f64,
        balance_b: f64,
        liquidity: Option<&LiquidityAnalysis>,
    ) -> f64 {
        let mut size = self.config.max_bet.min(balance_a).min(balance_b);
        if let Some(liq) = liquidity {
            size = size.min(liq.max_dollars);
        }
        if size < self.config.min_bet {
            0.0
        } else {
            size
        }
    }

    /// Release a dedup-key reservation after a failed or abandoned attempt.
    pub fn release_key(&self, key: &str) {
        self.state.lock().reserved_keys.remove(key);
    }

    /// Record a completed execution attempt against the daily counters.
    /// Trips the kill switch when realized losses cross the daily limit.
    pub fn record_trade(&self, realized_pnl: f64) {
        let mut state = self.state.lock();
        state.roll_day();
        state.day.trades += 1;
        state.day.pnl += realized_pnl;

        if realized_pnl < 0.0 {
            warn!(
                event = "trade_loss",
                loss = realized_pnl,
                pnl_today = state.day.pnl,
            );
        }

        if state.day.pnl <= -self.config.max_daily_loss && !state.kill_switch {
            let reason = format!(
                "daily loss ${:.2} reached limit ${:.2}",
                -state.day.pnl, self.config.max_daily_loss
            );
            state.kill_switch = true;
            state.kill_reason = Some(reason.clone());
            error!(event = "kill_switch", reason = %reason);
        }
    }

    /// Manually trip the kill switch (operator action or fatal error path).
    pub fn trip_kill_switch(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state.lock();
        if !state.kill_switch {
            state.kill_switch = true;
            state.kill_reason = Some(reason.clone());
            error!(event = "kill_switch", reason = %reason);
        }
    }

    pub fn kill_switch_engaged(&self) -> bool {
        self.state.lock().kill_switch
    }

    /// Re-arm after operator review. Daily counters are left intact.
    pub fn reset_kill_switch(&self) {
        let mut state = self.state.lock();
        state.kill_switch = false;
        state.kill_reason = None;
        info!(event = "kill_switch_reset");
    }

    pub fn stats(&self) -> RiskStats {
        let mut state = self.state.lock();
        state.roll_day();
        RiskStats {
            trades_today: state.day.trades,
            pnl_today: state.day.pnl,
            reserved_keys: state.reserved_keys.len(),
            kill_switch: state.kill_switch,
            kill_reason: state.kill_reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ArbDetails, Confidence, Direction, LegDetail, Side, TwoLegDetails, Venue,
    };
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn config() -> RiskConfig {
        RiskConfig {
            min_bet: 1.0,
            max_bet: 2.0,
            min_roi_pct: 1.0,
            max_roi_pct: 50.0,
            max_daily_trades: 3,
            max_daily_loss: 5.0,
            min_platform_balance: 1.0,
        }
    }

    fn opportunity(roi: f64) -> ArbitrageOpportunity {
        let leg = |venue, side, ticker: &str| LegDetail {
            venue,
            side,
            price: 0.45,
            market_id: "m1".to_string(),
            ticker: Some(ticker.to_string()),
            url: String::new(),
            volume: 5000.0,
        };
        ArbitrageOpportunity {
            id: "o1".to_string(),
            event_title: "Lions vs Bills".to_string(),
            team_a: "Lions".to_string(),
            team_b: "Bills".to_string(),
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
                yes_leg: leg(Venue::ExchangeA, Side::Yes, "tok-a"),
                no_leg: leg(Venue::ExchangeB, Side::No, "TICK-B"),
                confidence: Confidence::High,
                executable: true,
                suspicious: false,
                suspicion_reason: None,
                liquidity: None,
                is_live: false,
                extra: BTreeMap::new(),
            }),
        }
    }

    #[test]
    fn clean_opportunity_passes_and_reserves_key() {
        let rm = RiskManager::new(config());
        let opp = opportunity(10.0);
        assert!(rm.check_opportunity(&opp, 10.0, 10.0).passed);
        assert_eq!(rm.stats().reserved_keys, 1);
    }

    #[test]
    fn duplicate_key_is_rejected_until_released() {
        let rm = RiskManager::new(config());
        let opp = opportunity(10.0);
        assert!(rm.check_opportunity(&opp, 10.0, 10.0).passed);

        let second = rm.check_opportunity(&opp, 10.0, 10.0);
        assert!(!second.passed);
        assert!(second.reason.unwrap().contains("already open"));

        rm.release_key(&opp.dedup_key());
        assert!(rm.check_opportunity(&opp, 10.0, 10.0).passed);
    }

    #[test]
    fn roi_bounds_are_enforced() {
        let rm = RiskManager::new(config());
        assert!(!rm.check_opportunity(&opportunity(0.5), 10.0, 10.0).passed);
        assert!(!rm.check_opportunity(&opportunity(80.0), 10.0, 10.0).passed);
        assert!(rm.check_opportunity(&opportunity(10.0), 10.0, 10.0).passed);
    }

    #[test]
    fn low_balance_rejects_before_reservation() {
        let rm = RiskManager::new(config());
        let opp = opportunity(10.0);
        assert!(!rm.check_opportunity(&opp, 0.5, 10.0).passed);
        assert!(!rm.check_opportunity(&opp, 10.0, 0.5).passed);
        // No reservation leaked
        assert_eq!(rm.stats().reserved_keys, 0);
    }

    #[test]
    fn non_high_confidence_rejection_releases_the_key() {
        let rm = RiskManager::new(config());
        let mut opp = opportunity(10.0);
        if let ArbDetails::YesNo(d) = &mut opp.details {
            d.confidence = Confidence::Medium;
        }
        assert!(!rm.check_opportunity(&opp, 10.0, 10.0).passed);
        assert_eq!(rm.stats().reserved_keys, 0);
    }

    #[test]
    fn daily_trade_limit_blocks_further_attempts() {
        let rm = RiskManager::new(config());
        for _ in 0..3 {
            rm.record_trade(0.1);
        }
        let check = rm.check_opportunity(&opportunity(10.0), 10.0, 10.0);
        assert!(!check.passed);
        assert!(check.reason.unwrap().contains("daily trade limit"));
    }

    #[test]
    fn daily_loss_trips_the_kill_switch() {
        let rm = RiskManager::new(config());
        rm.record_trade(-5.5);
        assert!(rm.kill_switch_engaged());

        let check = rm.check_opportunity(&opportunity(10.0), 10.0, 10.0);
        assert!(!check.passed);
        assert!(check.reason.unwrap().starts_with("kill switch"));

        // Re-arming clears the switch but not the day's counters; the loss
        // limit itself still blocks trading until the UTC date rolls.
        rm.reset_kill_switch();
        assert!(!rm.kill_switch_engaged());
        let check = rm.check_opportunity(&opportunity(10.0), 10.0, 10.0);
        assert!(!check.passed);
        assert!(check.reason.unwrap().contains("daily loss"));
    }

    #[test]
    fn bet_size_respects_caps_and_minimum() {
        let rm = RiskManager::new(config());
        // Capped by max_bet
        assert_eq!(rm.calculate_bet_size(10.0, 10.0, None), 2.0);
        // Capped by the thinner balance
        assert_eq!(rm.calculate_bet_size(1.5, 10.0, None), 1.5);
        // Below min_bet means no trade
        assert_eq!(rm.calculate_bet_size(0.4, 10.0, None), 0.0);
    }

    #[test]
    fn bet_size_is_capped_by_liquidity() {
        use crate::liquidity::SideLiquidity;
        let side = |venue| SideLiquidity {
            venue,
            contracts_at_best: 2.0,
            contracts_within_1pct: 2.0,
            contracts_within_2pct: 2.0,
            contracts_within_5pct: 2.0,
            estimated: false,
        };
        let liq = LiquidityAnalysis {
            yes: side(Venue::ExchangeA),
            no: side(Venue::ExchangeB),
            bottleneck: Venue::ExchangeB,
            max_contracts: 2.0,
            max_dollars: 1.2,
            score: 10.0,
        };
        let rm = RiskManager::new(config());
        assert_eq!(rm.calculate_bet_size(10.0, 10.0, Some(&liq)), 1.2);
    }
}
