//! Core data model shared across the matcher, arbitrage engine, and executor.
//!
//! Markets and prices arrive normalized from the venue connectors; everything
//! downstream (matching, evaluation, risk, execution) speaks these types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::liquidity::LiquidityAnalysis;

/// The two prediction-market venues we trade across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    ExchangeA,
    ExchangeB,
}

impl Venue {
    pub fn other(self) -> Self {
        match self {
            Venue::ExchangeA => Venue::ExchangeB,
            Venue::ExchangeB => Venue::ExchangeA,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Venue::ExchangeA => "exchange_a",
            Venue::ExchangeB => "exchange_b",
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One price level of a venue order book (YES-contract convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Full order-book depth for one market, best levels first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookDepth {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Snapshot of one market's pricing.
///
/// `yes_price + no_price` need not equal 1 — cross-venue arbitrage exists
/// precisely when the executable sum is below 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPrice {
    pub yes_price: f64,
    pub no_price: f64,
    pub yes_bid: Option<f64>,
    pub yes_ask: Option<f64>,
    pub no_bid: Option<f64>,
    pub no_ask: Option<f64>,
    pub volume: f64,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book: Option<BookDepth>,
}

impl MarketPrice {
    pub fn new(yes_price: f64, no_price: f64) -> Self {
        Self {
            yes_price,
            no_price,
            yes_bid: None,
            yes_ask: None,
            no_bid: None,
            no_ask: None,
            volume: 0.0,
            last_updated: Utc::now(),
            book: None,
        }
    }

    /// Whether this snapshot carries a real two-sided quote (not just a mid).
    pub fn has_real_quotes(&self) -> bool {
        self.yes_bid.is_some() && self.yes_ask.is_some()
    }

    /// YES bid/ask spread as a fraction of the ask, when both sides exist.
    pub fn spread_frac(&self) -> Option<f64> {
        match (self.yes_bid, self.yes_ask) {
            (Some(bid), Some(ask)) if ask > 0.0 => Some((ask - bid) / ask),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    /// A dated head-to-head game.
    Game,
    /// Championship / award / tournament-winner market.
    Futures,
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketType::Game => f.write_str("game"),
            MarketType::Futures => f.write_str("futures"),
        }
    }
}

/// One tradable outcome on one venue.
///
/// `team_a` is always the side that pays out on a YES-equivalent outcome.
/// Immutable after discovery except `price`, refreshed each scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub venue: Venue,
    pub market_id: String,
    pub event_id: String,
    pub title: String,
    pub team_a: String,
    pub team_b: String,
    pub sport: String,
    pub market_type: MarketType,
    pub game_date: Option<NaiveDate>,
    /// Tournament/award key for futures matching (raw venue string).
    pub event_group: String,
    /// Spread/total line value when applicable (e.g. -3.5, 220.5).
    pub line: Option<f64>,
    /// Esports sub-game number.
    pub map_number: Option<u32>,
    pub url: String,
    pub price: Option<MarketPrice>,
    /// Venue-specific metadata: ticker, close timestamps, neg-risk flag,
    /// outcome token ids. Not safety-critical, read by key.
    #[serde(default)]
    pub raw: BTreeMap<String, Value>,
}

impl Market {
    /// String-valued metadata lookup.
    pub fn raw_str(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(Value::as_str)
    }

    pub fn raw_bool(&self, key: &str) -> bool {
        self.raw.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Venue trading ticker when the connector supplied one.
    pub fn ticker(&self) -> Option<&str> {
        self.raw_str("ticker")
    }
}

/// Cross-venue correlation unit produced by the matcher.
///
/// Rebuilt from scratch every matching pass; never mutated across scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SportEvent {
    pub id: String,
    pub title: String,
    pub team_a: String,
    pub team_b: String,
    pub start_time: Option<DateTime<Utc>>,
    pub market_a: Option<Market>,
    pub market_b: Option<Market>,
    /// True only when both venues are present.
    pub matched: bool,
    /// True when venue-B's YES corresponds to venue-A's NO for the same game.
    /// Never set for sports with a draw outcome.
    pub teams_swapped: bool,
}

impl SportEvent {
    pub fn market(&self, venue: Venue) -> Option<&Market> {
        match venue {
            Venue::ExchangeA => self.market_a.as_ref(),
            Venue::ExchangeB => self.market_b.as_ref(),
        }
    }
}

/// Win-A / Draw / Win-B markets across both venues for 3-outcome sports.
#[derive(Debug, Clone, Default)]
pub struct OutcomePair {
    pub exchange_a: Option<Market>,
    pub exchange_b: Option<Market>,
}

#[derive(Debug, Clone)]
pub struct ThreeWayGroup {
    pub title: String,
    pub sport: String,
    pub win_a: OutcomePair,
    pub draw: OutcomePair,
    pub win_b: OutcomePair,
}

/// Data-quality grade attached to every opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Rank for minimum-confidence comparisons (higher is better).
    pub fn rank(self) -> u8 {
        match self {
            Confidence::High => 2,
            Confidence::Medium => 1,
            Confidence::Low => 0,
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

/// Which economic direction a two-leg opportunity takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Buy YES on venue-A, NO on venue-B.
    YesANoB,
    /// Buy YES on venue-B, NO on venue-A.
    YesBNoA,
    /// Cross-team: YES on both venues (swap-aligned 2-outcome sports only).
    CrossYesYes,
    /// Cross-team mirror: NO on both venues.
    CrossNoNo,
}

/// One leg of a detected opportunity, with everything needed to place it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegDetail {
    pub venue: Venue,
    pub side: Side,
    pub price: f64,
    pub market_id: String,
    /// Venue trading identifier (ticker / token id) when known.
    pub ticker: Option<String>,
    pub url: String,
    pub volume: f64,
}

/// Payload for the standard and cross-team two-leg opportunities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoLegDetails {
    pub direction: Direction,
    pub yes_leg: LegDetail,
    pub no_leg: LegDetail,
    pub confidence: Confidence,
    /// Both legs carry real quotes and trading identifiers.
    pub executable: bool,
    pub suspicious: bool,
    pub suspicion_reason: Option<String>,
    pub liquidity: Option<LiquidityAnalysis>,
    pub is_live: bool,
    /// Venue trivia (raw subtype strings etc.) — not safety-critical.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreeWayLeg {
    /// "win_a" | "draw" | "win_b"
    pub outcome: String,
    pub venue: Venue,
    pub price: f64,
    pub market_id: String,
    pub ticker: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreeWayDetails {
    pub legs: Vec<ThreeWayLeg>,
    pub confidence: Confidence,
    pub total_fees: f64,
}

/// Strongly-typed opportunity payload, one variant per arbitrage kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "arb_type", rename_all = "snake_case")]
pub enum ArbDetails {
    YesNo(TwoLegDetails),
    CrossTeam(TwoLegDetails),
    ThreeWay(ThreeWayDetails),
}

impl ArbDetails {
    pub fn kind(&self) -> &'static str {
        match self {
            ArbDetails::YesNo(_) => "yes_no",
            ArbDetails::CrossTeam(_) => "cross_team",
            ArbDetails::ThreeWay(_) => "3way",
        }
    }

    pub fn two_leg(&self) -> Option<&TwoLegDetails> {
        match self {
            ArbDetails::YesNo(d) | ArbDetails::CrossTeam(d) => Some(d),
            ArbDetails::ThreeWay(_) => None,
        }
    }

    pub fn confidence(&self) -> Confidence {
        match self {
            ArbDetails::YesNo(d) | ArbDetails::CrossTeam(d) => d.confidence,
            ArbDetails::ThreeWay(d) => d.confidence,
        }
    }
}

/// Stable upsert key for the opportunity store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpportunityKey {
    pub team_a: String,
    pub buy_yes_venue: Venue,
    pub buy_no_venue: Venue,
}

/// A detected arbitrage opportunity, persisted with upsert-by-key semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub id: String,
    pub event_title: String,
    pub team_a: String,
    pub team_b: String,
    pub buy_yes_venue: Venue,
    pub buy_no_venue: Venue,
    pub yes_price: f64,
    pub no_price: f64,
    pub total_cost: f64,
    pub profit_pct: f64,
    pub roi_after_fees: f64,
    pub found_at: DateTime<Utc>,
    pub still_active: bool,
    pub details: ArbDetails,
}

impl ArbitrageOpportunity {
    pub fn store_key(&self) -> OpportunityKey {
        OpportunityKey {
            team_a: self.team_a.clone(),
            buy_yes_venue: self.buy_yes_venue,
            buy_no_venue: self.buy_no_venue,
        }
    }

    /// Duplicate-prevention key for the risk manager: the venue-B ticker when
    /// present (stable across scans), else the team pair.
    pub fn dedup_key(&self) -> String {
        let ticker = self.details.two_leg().and_then(|d| {
            [&d.yes_leg, &d.no_leg]
                .into_iter()
                .find(|l| l.venue == Venue::ExchangeB)
                .and_then(|l| l.ticker.clone())
        });
        ticker.unwrap_or_else(|| format!("{}:{}", self.team_a, self.team_b))
    }

    pub fn confidence(&self) -> Confidence {
        self.details.confidence()
    }

    pub fn is_executable(&self) -> bool {
        self.details.two_leg().map(|d| d.executable).unwrap_or(false)
    }

    pub fn is_suspicious(&self) -> bool {
        match &self.details {
            ArbDetails::YesNo(d) | ArbDetails::CrossTeam(d) => d.suspicious,
            ArbDetails::ThreeWay(_) => false,
        }
    }

    pub fn is_live(&self) -> bool {
        self.details.two_leg().map(|d| d.is_live).unwrap_or(false)
    }

    /// Eligible for unattended execution: executable, high confidence, clean.
    pub fn auto_eligible(&self) -> bool {
        self.is_executable()
            && self.confidence() == Confidence::High
            && !self.is_suspicious()
            && !self.is_live()
    }
}

// =============================================================================
// Execution-side models
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Buy,
    Sell,
}

/// Outcome of placing one leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegResult {
    pub venue: Venue,
    pub success: bool,
    pub order_id: Option<String>,
    pub filled_contracts: f64,
    pub filled_price: f64,
    pub filled_cost: f64,
    pub error: Option<String>,
}

impl LegResult {
    pub fn failed(venue: Venue, error: impl Into<String>) -> Self {
        Self {
            venue,
            success: false,
            order_id: None,
            filled_contracts: 0.0,
            filled_price: 0.0,
            filled_cost: 0.0,
            error: Some(error.into()),
        }
    }
}

/// Terminal state of a two-leg execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Both legs filled.
    Success,
    /// One leg filled, no rollback attempted.
    Partial,
    /// One leg filled, compensating trade succeeded.
    RolledBack,
    /// Compensating trade failed — unhedged exposure, human intervention.
    RollbackFailed,
    /// Both legs failed.
    Failed,
}

/// Result of a full two-leg execution. Never persisted; status is derived.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub leg_a: LegResult,
    pub leg_b: LegResult,
    pub executed_at: DateTime<Utc>,
    /// Compensating trade result when a partial fill was unwound.
    pub rollback_leg: Option<LegResult>,
    /// Spread loss realized by the unwind.
    pub rollback_loss: f64,
    pub total_invested: f64,
    pub guaranteed_payout: f64,
    pub expected_profit: f64,
}

impl ExecutionResult {
    pub fn status(&self) -> ExecutionStatus {
        match (self.leg_a.success, self.leg_b.success) {
            (true, true) => ExecutionStatus::Success,
            (false, false) => ExecutionStatus::Failed,
            _ => match &self.rollback_leg {
                Some(rb) if rb.success => ExecutionStatus::RolledBack,
                Some(_) => ExecutionStatus::RollbackFailed,
                None => ExecutionStatus::Partial,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Settled,
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLeg {
    pub venue: Venue,
    pub side: Side,
    pub amount: f64,
    pub contracts: f64,
    pub avg_price: f64,
    #[serde(default)]
    pub order_id: String,
}

/// One real trade, tracked until settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub id: String,
    pub event_title: String,
    pub team_a: String,
    pub team_b: String,
    pub leg_a: PositionLeg,
    pub leg_b: PositionLeg,
    /// "yes_no" | "cross_team" | "3way"
    pub arb_type: String,
    pub expected_roi: f64,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
    pub settled_at: Option<DateTime<Utc>>,
    pub actual_pnl: Option<f64>,
    pub winning_side: Option<String>,
}

/// Result of the pre-trade risk gate.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskCheck {
    pub passed: bool,
    pub reason: Option<String>,
}

impl RiskCheck {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(venue: Venue, success: bool) -> LegResult {
        LegResult {
            venue,
            success,
            order_id: success.then(|| "ord-1".to_string()),
            filled_contracts: if success { 10.0 } else { 0.0 },
            filled_price: 0.5,
            filled_cost: if success { 5.0 } else { 0.0 },
            error: (!success).then(|| "rejected".to_string()),
        }
    }

    fn result(a_ok: bool, b_ok: bool, rollback: Option<bool>) -> ExecutionResult {
        ExecutionResult {
            leg_a: leg(Venue::ExchangeA, a_ok),
            leg_b: leg(Venue::ExchangeB, b_ok),
            executed_at: Utc::now(),
            rollback_leg: rollback.map(|ok| leg(Venue::ExchangeA, ok)),
            rollback_loss: 0.0,
            total_invested: 0.0,
            guaranteed_payout: 0.0,
            expected_profit: 0.0,
        }
    }

    #[test]
    fn status_both_filled_is_success() {
        assert_eq!(result(true, true, None).status(), ExecutionStatus::Success);
    }

    #[test]
    fn status_both_failed_is_failed() {
        assert_eq!(result(false, false, None).status(), ExecutionStatus::Failed);
    }

    #[test]
    fn status_one_filled_no_rollback_is_partial() {
        assert_eq!(result(true, false, None).status(), ExecutionStatus::Partial);
        assert_eq!(result(false, true, None).status(), ExecutionStatus::Partial);
    }

    #[test]
    fn status_rollback_outcomes() {
        assert_eq!(
            result(true, false, Some(true)).status(),
            ExecutionStatus::RolledBack
        );
        assert_eq!(
            result(true, false, Some(false)).status(),
            ExecutionStatus::RollbackFailed
        );
    }

    #[test]
    fn dedup_key_prefers_venue_b_ticker() {
        let mk_leg = |venue, ticker: Option<&str>| LegDetail {
            venue,
            side: Side::Yes,
            price: 0.45,
            market_id: "m1".to_string(),
            ticker: ticker.map(String::from),
            url: String::new(),
            volume: 1000.0,
        };

        let mut opp = ArbitrageOpportunity {
            id: "o1".to_string(),
            event_title: "Lions vs Bills".to_string(),
            team_a: "Lions".to_string(),
            team_b: "Bills".to_string(),
            buy_yes_venue: Venue::ExchangeA,
            buy_no_venue: Venue::ExchangeB,
            yes_price: 0.45,
            no_price: 0.40,
            total_cost: 0.85,
            profit_pct: 15.0,
            roi_after_fees: 12.0,
            found_at: Utc::now(),
            still_active: true,
            details: ArbDetails::YesNo(TwoLegDetails {
                direction: Direction::YesANoB,
                yes_leg: mk_leg(Venue::ExchangeA, None),
                no_leg: mk_leg(Venue::ExchangeB, Some("GAME-26JAN05-DET")),
                confidence: Confidence::High,
                executable: true,
                suspicious: false,
                suspicion_reason: None,
                liquidity: None,
                is_live: false,
                extra: BTreeMap::new(),
            }),
        };

        assert_eq!(opp.dedup_key(), "GAME-26JAN05-DET");

        if let ArbDetails::YesNo(d) = &mut opp.details {
            d.no_leg.ticker = None;
        }
        assert_eq!(opp.dedup_key(), "Lions:Bills");
    }

    #[test]
    fn auto_eligible_requires_clean_high_confidence() {
        let mk = |confidence, suspicious, live| ArbitrageOpportunity {
            id: "o1".to_string(),
            event_title: "t".to_string(),
            team_a: "a".to_string(),
            team_b: "b".to_string(),
            buy_yes_venue: Venue::ExchangeA,
            buy_no_venue: Venue::ExchangeB,
            yes_price: 0.45,
            no_price: 0.40,
            total_cost: 0.85,
            profit_pct: 15.0,
            roi_after_fees: 12.0,
            found_at: Utc::now(),
            still_active: true,
            details: ArbDetails::YesNo(TwoLegDetails {
                direction: Direction::YesANoB,
                yes_leg: LegDetail {
                    venue: Venue::ExchangeA,
                    side: Side::Yes,
                    price: 0.45,
                    market_id: "m1".to_string(),
                    ticker: Some("tok".to_string()),
                    url: String::new(),
                    volume: 5000.0,
                },
                no_leg: LegDetail {
                    venue: Venue::ExchangeB,
                    side: Side::No,
                    price: 0.40,
                    market_id: "m2".to_string(),
                    ticker: Some("TICK".to_string()),
                    url: String::new(),
                    volume: 5000.0,
                },
                confidence,
                executable: true,
                suspicious,
                suspicion_reason: None,
                liquidity: None,
                is_live: live,
                extra: BTreeMap::new(),
            }),
        };

        assert!(mk(Confidence::High, false, false).auto_eligible());
        assert!(!mk(Confidence::Medium, false, false).auto_eligible());
        assert!(!mk(Confidence::High, true, false).auto_eligible());
        assert!(!mk(Confidence::High, false, true).auto_eligible());
    }
}
