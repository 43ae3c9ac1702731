//! Venue connector capability traits.
//!
//! The scanner and executor never talk to a venue API directly; they depend
//! on these traits so live connectors, dry-run shims, and test mocks are
//! interchangeable.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::models::{Action, BookDepth, Market, MarketPrice, Side, Venue};

/// One price update pushed by a venue stream.
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    pub market_id: String,
    pub price: MarketPrice,
}

/// Parameters for placing one leg.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Venue trading identifier (ticker / token id).
    pub market_ref: String,
    pub side: Side,
    pub action: Action,
    pub contracts: f64,
    /// Limit price per contract; fill-or-kill at this price or better.
    pub limit_price: f64,
}

/// Venue acknowledgment of an order attempt.
#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub order_id: Option<String>,
    pub filled_contracts: f64,
    pub avg_fill_price: f64,
    /// Dollars spent (buys) or received (sells).
    pub cost: f64,
}

impl OrderOutcome {
    pub fn filled(&self) -> bool {
        self.filled_contracts > 0.0
    }
}

/// Read side of a venue: discovery, pricing, depth, balance.
#[async_trait]
pub trait MarketSource: Send + Sync {
    fn venue(&self) -> Venue;

    /// All currently listed sports markets, normalized.
    async fn fetch_markets(&self) -> Result<Vec<Market>>;

    async fn fetch_price(&self, market_id: &str) -> Result<MarketPrice>;

    /// Batch refresh; venues with a bulk endpoint override the default.
    async fn fetch_batch_prices(
        &self,
        market_ids: &[String],
    ) -> Result<Vec<(String, MarketPrice)>> {
        let mut out = Vec::with_capacity(market_ids.len());
        for id in market_ids {
            out.push((id.clone(), self.fetch_price(id).await?));
        }
        Ok(out)
    }

    async fn fetch_book(&self, market_id: &str) -> Result<BookDepth>;

    /// Available trading cash in dollars.
    async fn get_balance(&self) -> Result<f64>;
}

/// Push side of a venue: a stream of price updates for subscribed markets.
#[async_trait]
pub trait PriceStreamer: Send + Sync {
    fn venue(&self) -> Venue;

    /// Open a stream for the given markets. The stream ends when the venue
    /// drops the connection; the caller owns reconnection.
    async fn subscribe_prices(
        &self,
        market_ids: &[String],
    ) -> Result<BoxStream<'static, PriceUpdate>>;
}

/// Write side of a venue: order placement.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    fn venue(&self) -> Venue;

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderOutcome>;
}
