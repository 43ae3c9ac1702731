//! Order-book depth analysis for detected opportunities.
//!
//! Answers "how much of this can actually be filled": walk the book within
//! slippage bands when depth is available, fall back to a volume-based
//! estimate when the venue only reports top-of-book.

use serde::{Deserialize, Serialize};

use crate::models::{BookLevel, MarketPrice, Side, Venue};

/// Fallback when no depth is reported: assume a fraction of daily volume is
/// available near the touch.
const VOLUME_DEPTH_FRACTION: f64 = 0.02;

/// Never estimate below this many contracts.
const MIN_ESTIMATED_CONTRACTS: f64 = 10.0;

/// Fillable size on one leg, by slippage band from the entry price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideLiquidity {
    pub venue: Venue,
    pub contracts_at_best: f64,
    pub contracts_within_1pct: f64,
    pub contracts_within_2pct: f64,
    pub contracts_within_5pct: f64,
    /// True when derived from volume rather than real book depth.
    pub estimated: bool,
}

/// Joint liquidity picture for a two-leg opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityAnalysis {
    pub yes: SideLiquidity,
    pub no: SideLiquidity,
    /// The venue whose depth caps the trade.
    pub bottleneck: Venue,
    /// Equal-contract size fillable at the quoted prices on both legs.
    pub max_contracts: f64,
    /// Dollar size of `max_contracts` at the average per-contract price.
    pub max_dollars: f64,
    /// 0-100 grade interpolated between dollar anchors ($50 scores 20,
    /// $200 scores 40, $500 scores 60, $1000 scores 80, $2000 caps at 100).
    pub score: f64,
}

/// Contracts fillable without the effective price exceeding
/// `entry * (1 + slippage)`. Buying NO consumes YES bids at `1 - bid`.
fn walk_depth(levels: &[BookLevel], side: Side, entry: f64, slippage: f64) -> f64 {
    let ceiling = entry * (1.0 + slippage);
    let mut contracts = 0.0;
    for level in levels {
        let effective = match side {
            Side::Yes => level.price,
            Side::No => 1.0 - level.price,
        };
        if effective > ceiling + 1e-12 {
            break;
        }
        contracts += level.size;
    }
    contracts
}

/// Tight markets tend to carry more hidden size near the touch; wide ones
/// less. Multipliers follow the absolute YES spread.
fn spread_multiplier(market: &MarketPrice) -> f64 {
    match (market.yes_bid, market.yes_ask) {
        (Some(bid), Some(ask)) => {
            let spread = ask - bid;
            if spread < 0.02 {
                1.5
            } else if spread < 0.05 {
                1.2
            } else if spread > 0.10 {
                0.5
            } else {
                1.0
            }
        }
        _ => 1.0,
    }
}

fn estimate_contracts(market: &MarketPrice) -> f64 {
    (market.volume * VOLUME_DEPTH_FRACTION * spread_multiplier(market))
        .max(MIN_ESTIMATED_CONTRACTS)
}

/// Analyze one leg: real depth when the book carries the needed side, else
/// the volume estimate spread across all bands.
pub fn analyze_side(venue: Venue, side: Side, entry: f64, market: &MarketPrice) -> SideLiquidity {
    let levels = market.book.as_ref().map(|b| match side {
        Side::Yes => &b.asks,
        Side::No => &b.bids,
    });

    match levels {
        Some(levels) if !levels.is_empty() && entry > 0.0 => SideLiquidity {
            venue,
            contracts_at_best: walk_depth(levels, side, entry, 0.0),
            contracts_within_1pct: walk_depth(levels, side, entry, 0.01),
            contracts_within_2pct: walk_depth(levels, side, entry, 0.02),
            contracts_within_5pct: walk_depth(levels, side, entry, 0.05),
            estimated: false,
        },
        _ => {
            let est = estimate_contracts(market);
            SideLiquidity {
                venue,
                contracts_at_best: est,
                contracts_within_1pct: est,
                contracts_within_2pct: est,
                contracts_within_5pct: est,
                estimated: true,
            }
        }
    }
}

fn score_dollars(dollars: f64) -> f64 {
    if dollars >= 2000.0 {
        100.0
    } else if dollars >= 1000.0 {
        80.0 + (dollars - 1000.0) / 1000.0 * 20.0
    } else if dollars >= 500.0 {
        60.0 + (dollars - 500.0) / 500.0 * 20.0
    } else if dollars >= 200.0 {
        40.0 + (dollars - 200.0) / 300.0 * 20.0
    } else if dollars >= 50.0 {
        20.0 + (dollars - 50.0) / 150.0 * 20.0
    } else {
        dollars / 50.0 * 20.0
    }
}

/// One leg's quote as seen by the analyzer.
#[derive(Debug, Clone, Copy)]
pub struct LegQuote<'a> {
    pub venue: Venue,
    pub side: Side,
    pub entry: f64,
    pub market: &'a MarketPrice,
}

/// Joint analysis for the two legs of an opportunity. Cross-team directions
/// buy the same side on both venues, so each leg carries its own side.
/// Equal contract counts on both legs; the thinner side is the bottleneck.
pub fn analyze(yes_leg: LegQuote<'_>, no_leg: LegQuote<'_>) -> LiquidityAnalysis {
    let yes = analyze_side(yes_leg.venue, yes_leg.side, yes_leg.entry, yes_leg.market);
    let no = analyze_side(no_leg.venue, no_leg.side, no_leg.entry, no_leg.market);

    let (bottleneck, max_contracts) = if yes.contracts_at_best <= no.contracts_at_best {
        (yes_leg.venue, yes.contracts_at_best)
    } else {
        (no_leg.venue, no.contracts_at_best)
    };
    // Dollar size per contract is the average of the two entries, since the
    // stake splits across both legs.
    let pair_cost = yes_leg.entry + no_leg.entry;
    let avg_price = if pair_cost > 0.0 { pair_cost / 2.0 } else { 0.5 };
    let max_dollars = max_contracts * avg_price;

    LiquidityAnalysis {
        yes,
        no,
        bottleneck,
        max_contracts,
        max_dollars,
        score: score_dollars(max_dollars),
    }
}
