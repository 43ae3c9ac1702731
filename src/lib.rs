//! Cross-venue sports arbitrage scanner.
//!
//! Matches equivalent sports markets across two prediction-market venues,
//! prices both directions of the two-leg hedge after fees, and records or
//! executes the opportunities that clear the risk checks.
//!
//! ## Pipeline
//!
//! - **Event matching** by fuzzy team-name similarity with sport, date,
//!   line, and event-group gates
//! - **Arbitrage evaluation** over executable quotes in both directions,
//!   including cross-team directions when the venues list the teams swapped
//! - **Liquidity analysis** from order-book depth, with a volume-based
//!   estimate when a venue publishes no book
//! - **Risk management**: bet sizing, daily limits, duplicate-opportunity
//!   reservation, and a kill switch on daily loss
//! - **Execution** of both legs concurrently with sell-back rollback when
//!   only one side fills

pub mod arbitrage;
pub mod config;
pub mod execution;
pub mod liquidity;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod price_cache;
pub mod retry;
pub mod risk;
pub mod scan;
pub mod store;
pub mod venues;
