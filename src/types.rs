// 1.0: all the primitives live here. nothing in the engines works without these types.
// identities, custody slots, oracle feeds, asset kinds, timestamps. each is a newtype
// so the compiler catches type mixups.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A signer identity. Stands in for a wallet/program address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(pub u64);

/// A custody slot: a non-keyed storage location holding a token balance,
/// owned by an engine rather than a private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId(pub u64);

/// Identity of an oracle price feed bound to an engine at initialize time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedId(pub u64);

// Sol = 9 decimals (lamports), Usdc = 6 decimals. USDC is the valuation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Sol,
    Usdc,
}

impl AssetKind {
    pub fn decimals(&self) -> u32 {
        match self {
            AssetKind::Sol => 9,
            AssetKind::Usdc => 6,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            AssetKind::Sol => "SOL",
            AssetKind::Usdc => "USDC",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

// 1.1: unix-second timestamp. the timelock is a plain comparison on these,
// never a real wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp())
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// Whole seconds elapsed since `earlier`, clamped at zero.
    pub fn seconds_since(&self, earlier: Timestamp) -> u64 {
        (self.0 - earlier.0).max(0) as u64
    }

    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0 + secs)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::from_secs(0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
