//! Two-leg and three-way arbitrage evaluation.
//!
//! Given a matched [`SportEvent`] with fresh prices on both venues, compute
//! the executable cost of covering every outcome and emit an
//! [`ArbitrageOpportunity`] when that cost, fees included, is below the $1
//! settlement payout.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::config;
use crate::liquidity::{self, LegQuote};
use crate::models::{
    ArbDetails, ArbitrageOpportunity, Confidence, Direction, LegDetail, Market, MarketPrice,
    MarketType, OutcomePair, Side, SportEvent, ThreeWayDetails, ThreeWayGroup, ThreeWayLeg,
    TwoLegDetails, Venue,
};

/// Both-real-quotes volume bar for high confidence.
const HIGH_CONFIDENCE_VOLUME: f64 = 5000.0;
/// Per-leg spread bar (percent) for high confidence.
const HIGH_CONFIDENCE_SPREAD_PCT: f64 = 15.0;
/// Volume bar for medium confidence without real quotes.
const MEDIUM_CONFIDENCE_VOLUME: f64 = 1000.0;

/// Executable YES entry: lift the best ask when quoted, else the midpoint.
fn exec_yes(p: &MarketPrice) -> (f64, bool) {
    match p.yes_ask {
        Some(ask) if ask > 0.0 => (ask, true),
        _ => (p.yes_price, false),
    }
}

/// Executable NO entry: the venue's NO ask when quoted, else hit the YES bid
/// (buying NO at `1 - bid`), else the midpoint.
fn exec_no(p: &MarketPrice) -> (f64, bool) {
    if let Some(ask) = p.no_ask {
        if ask > 0.0 {
            return (ask, true);
        }
    }
    match p.yes_bid {
        Some(bid) if bid > 0.0 && bid < 1.0 => (1.0 - bid, true),
        _ => (p.no_price, false),
    }
}

fn spread_pct(p: &MarketPrice) -> f64 {
    p.spread_frac().map(|f| f * 100.0).unwrap_or(0.0)
}

fn sane_price(p: f64) -> bool {
    p > 0.01 && p < 0.99
}

fn is_expired(market: &Market) -> bool {
    market
        .raw_str("close_time")
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc) < Utc::now())
        .unwrap_or(false)
}

fn confidence_for(price_a: &MarketPrice, price_b: &MarketPrice) -> Confidence {
    let combined_volume = price_a.volume + price_b.volume;
    let both_real = price_a.has_real_quotes() && price_b.has_real_quotes();
    let any_real = price_a.has_real_quotes() || price_b.has_real_quotes();
    let spreads_tight = spread_pct(price_a) < HIGH_CONFIDENCE_SPREAD_PCT
        && spread_pct(price_b) < HIGH_CONFIDENCE_SPREAD_PCT;

    if both_real && combined_volume > HIGH_CONFIDENCE_VOLUME && spreads_tight {
        Confidence::High
    } else if any_real || combined_volume > MEDIUM_CONFIDENCE_VOLUME {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

struct DirectionQuote {
    direction: Direction,
    /// (venue, side, entry, real-quote?)
    yes: (Venue, Side, f64, bool),
    no: (Venue, Side, f64, bool),
}

impl DirectionQuote {
    fn total_price(&self) -> f64 {
        self.yes.2 + self.no.2
    }

    /// Per-pair cost with flat per-leg fees applied.
    fn total_cost(&self) -> f64 {
        let fee_yes = self.yes.2 * config::fee_rate(self.yes.0);
        let fee_no = self.no.2 * config::fee_rate(self.no.0);
        self.total_price() + fee_yes + fee_no
    }

    fn roi_pct(&self) -> f64 {
        let cost = self.total_cost();
        if cost <= 0.0 {
            return 0.0;
        }
        (1.0 - cost) / cost * 100.0
    }
}

/// Candidate directions for the event's alignment.
///
/// Same-aligned events hedge YES on one venue against NO on the other.
/// Swap-aligned events (venue-B's YES team is venue-A's NO team) hedge by
/// buying the same side on both venues.
fn candidate_directions(
    swapped: bool,
    price_a: &MarketPrice,
    price_b: &MarketPrice,
) -> Vec<DirectionQuote> {
    let (yes_a, yes_a_real) = exec_yes(price_a);
    let (no_a, no_a_real) = exec_no(price_a);
    let (yes_b, yes_b_real) = exec_yes(price_b);
    let (no_b, no_b_real) = exec_no(price_b);

    if swapped {
        vec![
            DirectionQuote {
                direction: Direction::CrossYesYes,
                yes: (Venue::ExchangeA, Side::Yes, yes_a, yes_a_real),
                no: (Venue::ExchangeB, Side::Yes, yes_b, yes_b_real),
            },
            DirectionQuote {
                direction: Direction::CrossNoNo,
                yes: (Venue::ExchangeA, Side::No, no_a, no_a_real),
                no: (Venue::ExchangeB, Side::No, no_b, no_b_real),
            },
        ]
    } else {
        vec![
            DirectionQuote {
                direction: Direction::YesANoB,
                yes: (Venue::ExchangeA, Side::Yes, yes_a, yes_a_real),
                no: (Venue::ExchangeB, Side::No, no_b, no_b_real),
            },
            DirectionQuote {
                direction: Direction::YesBNoA,
                yes: (Venue::ExchangeB, Side::Yes, yes_b, yes_b_real),
                no: (Venue::ExchangeA, Side::No, no_a, no_a_real),
            },
        ]
    }
}

fn leg_detail(market: &Market, side: Side, price: f64) -> LegDetail {
    LegDetail {
        venue: market.venue,
        side,
        price,
        market_id: market.market_id.clone(),
        ticker: market.ticker().map(String::from),
        url: market.url.clone(),
        volume: market.price.as_ref().map(|p| p.volume).unwrap_or(0.0),
    }
}

/// A game market is live once its start time has passed while the venue
/// still quotes it; some venues also flag it directly.
fn is_live_game(event: &SportEvent, market_a: &Market, market_b: &Market) -> bool {
    if market_a.market_type != MarketType::Game {
        return false;
    }
    let started = event
        .start_time
        .map(|t| t < Utc::now())
        .unwrap_or(false);
    started || market_a.raw_bool("is_live") || market_b.raw_bool("is_live")
}

/// Evaluate a matched event for a two-leg opportunity.
///
/// Returns `None` when no direction covers both outcomes below $1 after
/// fees, or when a data-quality gate rejects the event outright. Live games
/// are skipped entirely unless `allow_live` is set, and then face a stricter
/// validation gate.
pub fn evaluate(event: &SportEvent, allow_live: bool) -> Option<ArbitrageOpportunity> {
    if !event.matched {
        return None;
    }
    let market_a = event.market_a.as_ref()?;
    let market_b = event.market_b.as_ref()?;
    let price_a = market_a.price.as_ref()?;
    let price_b = market_b.price.as_ref()?;

    if is_expired(market_a) || is_expired(market_b) {
        return None;
    }

    let is_live = is_live_game(event, market_a, market_b);
    if is_live && !allow_live {
        return None;
    }

    if price_a.volume + price_b.volume < config::min_combined_volume() {
        return None;
    }

    // Extreme mids are settlement-adjacent noise, not tradable edges.
    if !sane_price(price_a.yes_price)
        || !sane_price(price_a.no_price)
        || !sane_price(price_b.yes_price)
        || !sane_price(price_b.no_price)
    {
        return None;
    }

    // A venue quoting an absurd spread has a stale or one-sided book.
    if spread_pct(price_a) > config::max_sane_spread_pct()
        || spread_pct(price_b) > config::max_sane_spread_pct()
    {
        debug!(
            event = "stale_book_skip",
            title = %event.title,
            spread_a = spread_pct(price_a),
            spread_b = spread_pct(price_b),
        );
        return None;
    }

    let best = candidate_directions(event.teams_swapped, price_a, price_b)
        .into_iter()
        .filter(|d| d.total_price() < 1.0)
        .max_by(|x, y| x.roi_pct().total_cmp(&y.roi_pct()))?;

    let roi = best.roi_pct();
    if roi <= 0.0 {
        return None;
    }

    let confidence = confidence_for(price_a, price_b);
    let max_spread = f64::max(spread_pct(price_a), spread_pct(price_b));

    let suspicion_reason = if roi > config::suspicious_roi_pct() {
        Some(format!("ROI {roi:.1}% exceeds sanity ceiling"))
    } else if max_spread > config::suspicious_spread_pct() {
        Some(format!("leg spread {max_spread:.1}% too wide to trust"))
    } else {
        None
    };

    let market_for = |venue: Venue| -> &Market {
        if venue == Venue::ExchangeA {
            market_a
        } else {
            market_b
        }
    };
    let price_for = |venue: Venue| -> &MarketPrice {
        if venue == Venue::ExchangeA {
            price_a
        } else {
            price_b
        }
    };

    let yes_leg = leg_detail(market_for(best.yes.0), best.yes.1, best.yes.2);
    let no_leg = leg_detail(market_for(best.no.0), best.no.1, best.no.2);

    let executable = best.yes.3
        && best.no.3
        && yes_leg.ticker.is_some()
        && no_leg.ticker.is_some();

    if is_live {
        // Live games move fast; only clean, modest, fillable edges survive.
        if !executable
            || suspicion_reason.is_some()
            || confidence.rank() < config::live_min_confidence().rank()
            || max_spread > config::live_max_spread_pct()
            || roi > config::live_max_roi_pct()
        {
            debug!(
                event = "live_arb_rejected",
                title = %event.title,
                executable,
                confidence = ?confidence,
                spread = max_spread,
                roi,
                suspicious = suspicion_reason.is_some(),
            );
            return None;
        }
    }

    let liquidity = Some(liquidity::analyze(
        LegQuote {
            venue: best.yes.0,
            side: best.yes.1,
            entry: best.yes.2,
            market: price_for(best.yes.0),
        },
        LegQuote {
            venue: best.no.0,
            side: best.no.1,
            entry: best.no.2,
            market: price_for(best.no.0),
        },
    ));

    let details = TwoLegDetails {
        direction: best.direction,
        yes_leg,
        no_leg,
        confidence,
        executable,
        suspicious: suspicion_reason.is_some(),
        suspicion_reason,
        liquidity,
        is_live,
        extra: Default::default(),
    };
    let details = match best.direction {
        Direction::YesANoB | Direction::YesBNoA => ArbDetails::YesNo(details),
        Direction::CrossYesYes | Direction::CrossNoNo => ArbDetails::CrossTeam(details),
    };

    Some(ArbitrageOpportunity {
        id: Uuid::new_v4().to_string(),
        event_title: event.title.clone(),
        team_a: event.team_a.clone(),
        team_b: event.team_b.clone(),
        buy_yes_venue: best.yes.0,
        buy_no_venue: best.no.0,
        yes_price: best.yes.2,
        no_price: best.no.2,
        total_cost: best.total_cost(),
        // Gross margin on the $1 payout, before fees
        profit_pct: (1.0 - best.total_price()) * 100.0,
        roi_after_fees: roi,
        found_at: Utc::now(),
        still_active: true,
        details,
    })
}

fn cheapest_outcome(pair: &OutcomePair, outcome: &str) -> Option<(ThreeWayLeg, f64, bool)> {
    let quote = |m: &Market| -> Option<(ThreeWayLeg, f64, bool)> {
        let price = m.price.as_ref()?;
        let (entry, real) = exec_yes(price);
        if !sane_price(entry) {
            return None;
        }
        Some((
            ThreeWayLeg {
                outcome: outcome.to_string(),
                venue: m.venue,
                price: entry,
                market_id: m.market_id.clone(),
                ticker: m.ticker().map(String::from),
            },
            entry,
            real,
        ))
    };

    let a = pair.exchange_a.as_ref().and_then(quote);
    let b = pair.exchange_b.as_ref().and_then(quote);
    match (a, b) {
        (Some(qa), Some(qb)) => Some(if qa.1 <= qb.1 { qa } else { qb }),
        (Some(q), None) | (None, Some(q)) => Some(q),
        (None, None) => None,
    }
}

/// Three-way arbitrage for draw sports: buy YES on win-A, draw, and win-B,
/// each on whichever venue prices it cheapest. Exactly one leg pays $1.
pub fn evaluate_three_way(group: &ThreeWayGroup) -> Option<ArbitrageOpportunity> {
    let (win_a, pa, ra) = cheapest_outcome(&group.win_a, "win_a")?;
    let (draw, pd, rd) = cheapest_outcome(&group.draw, "draw")?;
    let (win_b, pb, rb) = cheapest_outcome(&group.win_b, "win_b")?;

    let total_price = pa + pd + pb;
    let total_fees = [&win_a, &draw, &win_b]
        .iter()
        .map(|leg| leg.price * config::fee_rate(leg.venue))
        .sum::<f64>();
    let total_cost = total_price + total_fees;
    if total_cost >= 1.0 {
        return None;
    }
    let roi = (1.0 - total_cost) / total_cost * 100.0;

    let confidence = if ra && rd && rb {
        Confidence::High
    } else if ra || rd || rb {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    let (team_a, team_b) = group
        .win_a
        .exchange_a
        .as_ref()
        .or(group.win_a.exchange_b.as_ref())
        .map(|m| (m.team_a.clone(), m.team_b.clone()))
        .unwrap_or_default();

    Some(ArbitrageOpportunity {
        id: Uuid::new_v4().to_string(),
        event_title: group.title.clone(),
        team_a,
        team_b,
        buy_yes_venue: win_a.venue,
        buy_no_venue: win_b.venue,
        yes_price: pa,
        no_price: pb,
        total_cost,
        profit_pct: (1.0 - total_price) * 100.0,
        roi_after_fees: roi,
        found_at: Utc::now(),
        still_active: true,
        details: ArbDetails::ThreeWay(ThreeWayDetails {
            legs: vec![win_a, draw, win_b],
            confidence,
            total_fees,
        }),
    })
}

/// Split a total stake so both legs buy the same number of contracts.
pub fn calculate_bet_sizes(total: f64, yes_price: f64, no_price: f64) -> (f64, f64) {
    let pair_cost = yes_price + no_price;
    if pair_cost <= 0.0 || total <= 0.0 {
        return (0.0, 0.0);
    }
    let contracts = total / pair_cost;
    (contracts * yes_price, contracts * no_price)
}
