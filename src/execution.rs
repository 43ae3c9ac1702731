//! Order placement and the execute-or-reject orchestration flow.
//!
//! [`OrderPlacer`] fires both legs concurrently and unwinds a sole fill.
//! [`Executor`] wraps it with the risk gate, sizing, duplicate-key
//! reservation, and position persistence, in that order: the reservation is
//! taken BEFORE any order goes out so a second scan cycle can never race
//! into the same game.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    Action, ArbitrageOpportunity, ExecutionResult, ExecutionStatus, LegResult, OpenPosition,
    PositionLeg, PositionStatus, TwoLegDetails, Venue,
};
use crate::risk::RiskManager;
use crate::store::PositionStore;
use crate::venues::{MarketSource, OrderExecutor, OrderRequest};

const POSITION_SAVE_ATTEMPTS: u32 = 3;
const POSITION_SAVE_BACKOFF: Duration = Duration::from_millis(200);

/// Places the two legs of an opportunity, one executor per venue.
pub struct OrderPlacer {
    executor_a: Arc<dyn OrderExecutor>,
    executor_b: Arc<dyn OrderExecutor>,
}

impl OrderPlacer {
    pub fn new(executor_a: Arc<dyn OrderExecutor>, executor_b: Arc<dyn OrderExecutor>) -> Self {
        Self {
            executor_a,
            executor_b,
        }
    }

    fn executor_for(&self, venue: Venue) -> &Arc<dyn OrderExecutor> {
        match venue {
            Venue::ExchangeA => &self.executor_a,
            Venue::ExchangeB => &self.executor_b,
        }
    }

    /// Fire both legs concurrently for an equal contract count, then unwind
    /// a sole fill by selling it back at market.
    pub async fn execute(
        &self,
        opp: &ArbitrageOpportunity,
        bet_size: f64,
    ) -> Result<ExecutionResult> {
        let Some(details) = opp.details.two_leg() else {
            bail!("three-way opportunities are not executable");
        };

        let pair_cost = details.yes_leg.price + details.no_leg.price;
        if pair_cost <= 0.0 {
            bail!("degenerate leg prices");
        }
        // Whole contracts only; both legs get the same count so every
        // outcome is covered one-for-one.
        let contracts = (bet_size / pair_cost).floor();
        if contracts < 1.0 {
            bail!("stake ${bet_size:.2} buys no whole contract pair at ${pair_cost:.2}");
        }

        let request_for = |leg: &crate::models::LegDetail| -> Result<OrderRequest> {
            let Some(market_ref) = leg.ticker.clone() else {
                bail!("{} leg has no trading identifier", leg.venue);
            };
            Ok(OrderRequest {
                market_ref,
                side: leg.side,
                action: Action::Buy,
                contracts,
                limit_price: leg.price,
            })
        };
        let yes_request = request_for(&details.yes_leg)?;
        let no_request = request_for(&details.no_leg)?;

        let yes_venue = details.yes_leg.venue;
        let no_venue = details.no_leg.venue;

        let yes_fut = self.place_leg(yes_venue, yes_request.clone());
        let no_fut = self.place_leg(no_venue, no_request.clone());
        let (yes_result, no_result) = tokio::join!(yes_fut, no_fut);

        // Normalize to per-venue slots regardless of which leg bought YES.
        let (leg_a, leg_b) = if yes_venue == Venue::ExchangeA {
            (yes_result, no_result)
        } else {
            (no_result, yes_result)
        };

        let mut result = ExecutionResult {
            leg_a,
            leg_b,
            executed_at: Utc::now(),
            rollback_leg: None,
            rollback_loss: 0.0,
            total_invested: 0.0,
            guaranteed_payout: 0.0,
            expected_profit: 0.0,
        };

        result.total_invested = result.leg_a.filled_cost + result.leg_b.filled_cost;
        result.guaranteed_payout =
            result.leg_a.filled_contracts.min(result.leg_b.filled_contracts) * 1.0;
        result.expected_profit = result.guaranteed_payout - result.total_invested;

        // One-sided fill: sell the filled leg back rather than carry naked
        // exposure into settlement.
        if result.leg_a.success != result.leg_b.success {
            let (filled, request) = if result.leg_a.success {
                let req = if yes_venue == Venue::ExchangeA {
                    &yes_request
                } else {
                    &no_request
                };
                (result.leg_a.clone(), req)
            } else {
                let req = if yes_venue == Venue::ExchangeB {
                    &yes_request
                } else {
                    &no_request
                };
                (result.leg_b.clone(), req)
            };

            warn!(
                event = "partial_fill",
                venue = %filled.venue,
                contracts = filled.filled_contracts,
                "one leg filled, unwinding"
            );

            let unwind = OrderRequest {
                market_ref: request.market_ref.clone(),
                side: request.side,
                action: Action::Sell,
                contracts: filled.filled_contracts,
                // At-market: accept whatever the book gives back.
                limit_price: 0.0,
            };
            let rollback = self.place_leg(filled.venue, unwind).await;
            if rollback.success {
                result.rollback_loss = (filled.filled_cost - rollback.filled_cost).max(0.0);
            } else {
                // Worst case: the whole filled cost is at risk until a human
                // flattens the position.
                result.rollback_loss = filled.filled_cost;
            }
            result.rollback_leg = Some(rollback);
        }

        Ok(result)
    }

    async fn place_leg(&self, venue: Venue, request: OrderRequest) -> LegResult {
        match self.executor_for(venue).place_order(&request).await {
            Ok(outcome) if outcome.filled() => LegResult {
                venue,
                success: true,
                order_id: outcome.order_id,
                filled_contracts: outcome.filled_contracts,
                filled_price: outcome.avg_fill_price,
                filled_cost: outcome.cost,
                error: None,
            },
            Ok(_) => LegResult::failed(venue, "order not filled"),
            Err(e) => {
                warn!(event = "leg_failed", venue = %venue, error = %e);
                LegResult::failed(venue, e.to_string())
            }
        }
    }
}

/// Full execution pipeline for one opportunity.
pub struct Executor {
    source_a: Arc<dyn MarketSource>,
    source_b: Arc<dyn MarketSource>,
    placer: OrderPlacer,
    risk: Arc<RiskManager>,
    positions: Arc<dyn PositionStore>,
    dry_run: bool,
}

impl Executor {
    pub fn new(
        source_a: Arc<dyn MarketSource>,
        source_b: Arc<dyn MarketSource>,
        placer: OrderPlacer,
        risk: Arc<RiskManager>,
        positions: Arc<dyn PositionStore>,
        dry_run: bool,
    ) -> Self {
        Self {
            source_a,
            source_b,
            placer,
            risk,
            positions,
            dry_run,
        }
    }

    /// Attempt to trade an opportunity. `Ok(None)` means a gate declined it;
    /// `Ok(Some(_))` carries the terminal execution result.
    pub async fn try_execute(
        &self,
        opp: &ArbitrageOpportunity,
    ) -> Result<Option<ExecutionResult>> {
        let (balance_a, balance_b) =
            tokio::join!(self.source_a.get_balance(), self.source_b.get_balance());
        let balance_a = balance_a?;
        let balance_b = balance_b?;

        let check = self.risk.check_opportunity(opp, balance_a, balance_b);
        if !check.passed {
            info!(
                event = "risk_rejected",
                opportunity = %opp.id,
                team_a = %opp.team_a,
                reason = check.reason.as_deref().unwrap_or("unknown"),
            );
            return Ok(None);
        }
        // The dedup key is now reserved; every early return below must
        // either keep an open position behind it or release it.
        let key = opp.dedup_key();

        let liquidity = opp.details.two_leg().and_then(|d| d.liquidity.as_ref());
        let bet_size = self.risk.calculate_bet_size(balance_a, balance_b, liquidity);
        if bet_size <= 0.0 {
            self.risk.release_key(&key);
            info!(event = "sizing_skip", opportunity = %opp.id);
            return Ok(None);
        }

        if self.dry_run {
            info!(
                event = "dry_run_skip",
                opportunity = %opp.id,
                team_a = %opp.team_a,
                bet_size,
                roi = opp.roi_after_fees,
            );
            self.risk.release_key(&key);
            return Ok(None);
        }

        let result = match self.placer.execute(opp, bet_size).await {
            Ok(r) => r,
            Err(e) => {
                self.risk.release_key(&key);
                return Err(e);
            }
        };
        let status = result.status();

        info!(
            event = "execution_result",
            opportunity = %opp.id,
            team_a = %opp.team_a,
            status = ?status,
            invested = result.total_invested,
            payout = result.guaranteed_payout,
            expected_profit = result.expected_profit,
            rollback_loss = result.rollback_loss,
        );

        match status {
            ExecutionStatus::Success => {
                self.persist_position(opp, &result, PositionStatus::Open).await;
                // PnL locks in at settlement; the trade itself counts now.
                self.risk.record_trade(0.0);
            }
            ExecutionStatus::Partial => {
                // No rollback was attempted; track the lopsided position.
                self.persist_position(opp, &result, PositionStatus::Partial).await;
                self.risk.record_trade(0.0);
            }
            ExecutionStatus::RolledBack => {
                self.risk.record_trade(-result.rollback_loss);
                self.risk.release_key(&key);
            }
            ExecutionStatus::RollbackFailed => {
                error!(
                    event = "rollback_failed",
                    opportunity = %opp.id,
                    team_a = %opp.team_a,
                    exposure = result.rollback_loss,
                    "unhedged exposure, manual intervention required"
                );
                self.persist_position(opp, &result, PositionStatus::Partial).await;
                self.risk.record_trade(-result.rollback_loss);
            }
            ExecutionStatus::Failed => {
                self.risk.release_key(&key);
            }
        }

        Ok(Some(result))
    }

    async fn persist_position(
        &self,
        opp: &ArbitrageOpportunity,
        result: &ExecutionResult,
        status: PositionStatus,
    ) {
        let Some(details) = opp.details.two_leg() else {
            return;
        };
        let position = build_position(opp, details, result, status);

        // The position is real money on two venues; losing the record is
        // worse than a slow save.
        for attempt in 1..=POSITION_SAVE_ATTEMPTS {
            match self.positions.save(&position).await {
                Ok(()) => return,
                Err(e) if attempt < POSITION_SAVE_ATTEMPTS => {
                    warn!(
                        event = "position_save_retry",
                        position = %position.id,
                        attempt,
                        error = %e,
                    );
                    tokio::time::sleep(POSITION_SAVE_BACKOFF).await;
                }
                Err(e) => {
                    error!(
                        event = "position_save_failed",
                        position = %position.id,
                        error = %e,
                        "position is live but unrecorded"
                    );
                }
            }
        }
    }
}

fn build_position(
    opp: &ArbitrageOpportunity,
    details: &TwoLegDetails,
    result: &ExecutionResult,
    status: PositionStatus,
) -> OpenPosition {
    let side_for = |venue: Venue| {
        if details.yes_leg.venue == venue {
            details.yes_leg.side
        } else {
            details.no_leg.side
        }
    };
    let leg = |r: &LegResult| PositionLeg {
        venue: r.venue,
        side: side_for(r.venue),
        amount: r.filled_cost,
        contracts: r.filled_contracts,
        avg_price: r.filled_price,
        order_id: r.order_id.clone().unwrap_or_default(),
    };

    OpenPosition {
        id: Uuid::new_v4().to_string(),
        event_title: opp.event_title.clone(),
        team_a: opp.team_a.clone(),
        team_b: opp.team_b.clone(),
        leg_a: leg(&result.leg_a),
        leg_b: leg(&result.leg_b),
        arb_type: opp.details.kind().to_string(),
        expected_roi: opp.roi_after_fees,
        opened_at: result.executed_at,
        status,
        settled_at: None,
        actual_pnl: None,
        winning_side: None,
    }
}
