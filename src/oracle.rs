// 2.0 oracle.rs: price feed adapter. the engines are agnostic to whether prices
// come from Chainlink, Pyth, or a test fixture; they only see the PriceOracle
// trait. the one check that belongs to the core contract is feed-identity
// binding: a caller must present the feed id that was bound at initialize time.
// freshness policy stays with the feed itself.

use crate::types::{FeedId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed-point price with 8 decimals (100_000_000 = 1.0), Chainlink convention.
pub const PRICE_DECIMALS: u32 = 8;
pub const PRICE_SCALE: u128 = 100_000_000;

/// A single price observation for a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: i128,
    pub timestamp: Timestamp,
    pub feed: FeedId,
}

/// Read-only price source. Reads are synchronous and per-call; engines never
/// cache a PricePoint across operations.
pub trait PriceOracle {
    fn read_price(&self, feed: FeedId) -> Option<PricePoint>;
}

/// In-memory oracle backed by a feed table. Test and simulation fixture.
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    feeds: HashMap<FeedId, PricePoint>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self { feeds: HashMap::new() }
    }

    pub fn set_price(&mut self, feed: FeedId, price: i128, timestamp: Timestamp) {
        self.feeds.insert(feed, PricePoint { price, timestamp, feed });
    }
}

impl PriceOracle for StaticOracle {
    fn read_price(&self, feed: FeedId) -> Option<PricePoint> {
        self.feeds.get(&feed).copied()
    }
}

// 2.1: valuation helpers. everything is valued in USDC minor units (6 decimals):
// lamports are 9 decimals and the price carries 8, so the combined divisor from
// lamports to USDC units is 10^(9-6+8) = 10^11. u128 intermediates, floor division.

const SOL_TO_USDC_DIVISOR: u128 = 100_000_000_000;

/// USDC-minor-unit value of `lamports` at `price`. Floors.
pub fn sol_value_in_usdc(lamports: u64, price: i128) -> u64 {
    if price <= 0 {
        return 0;
    }
    let value = (lamports as u128) * (price as u128) / SOL_TO_USDC_DIVISOR;
    value.min(u64::MAX as u128) as u64
}

/// Lamports equivalent of a USDC-minor-unit value at `price`. Floors.
pub fn usdc_value_in_sol(value: u64, price: i128) -> u64 {
    if price <= 0 {
        return 0;
    }
    let lamports = (value as u128) * SOL_TO_USDC_DIVISOR / (price as u128);
    lamports.min(u64::MAX as u128) as u64
}
