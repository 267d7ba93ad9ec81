//! Shared type definitions for the Aviastar crash engine
//!
//! Identifiers, the fixed-point multiplier and settlement outcomes used by
//! the engine and by every collaborator trait.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Player identifier (Telegram user id)
pub type UserId = i64;

/// Sequence number of a round, incremented at every round start
pub type RoundId = u64;

/// Opaque identifier of a bet record held by the external bet ledger
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct BetId(String);

impl BetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payout multiplier in fixed-point hundredths (`1.30x` is stored as `130`).
///
/// Stepping and payout math stay in integers so repeated ticks never drift.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Multiplier(u32);

impl Multiplier {
    /// The starting multiplier of every round
    pub const ONE: Multiplier = Multiplier(100);

    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    /// Convert a decimal multiplier, rounding to two places.
    /// Returns `None` for negative, non-finite or out-of-range values.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let hundredths = (value * 100.0).round();
        if hundredths > u32::MAX as f64 {
            return None;
        }
        Some(Self(hundredths as u32))
    }

    pub const fn hundredths(self) -> u32 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Advance by `step`, never past `cap`
    pub fn step_towards(self, step: Multiplier, cap: Multiplier) -> Multiplier {
        Multiplier(self.0.saturating_add(step.0).min(cap.0.max(self.0)))
    }

    /// Payout for `amount` minor units at this multiplier, truncated to whole units
    pub fn apply(self, amount: u64) -> u64 {
        let scaled = amount as u128 * self.0 as u128 / 100;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / 100, self.0 % 100)
    }
}

/// Final outcome of a bet as recorded with the bet ledger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BetOutcome {
    /// Cashed out before the crash
    Won,
    /// Still in the round when it crashed
    Lost,
    /// Stake refunded because the bet never entered a round
    Void,
}

impl fmt::Display for BetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetOutcome::Won => write!(f, "won"),
            BetOutcome::Lost => write!(f, "lost"),
            BetOutcome::Void => write!(f, "void"),
        }
    }
}

/// Format minor units as a dollar amount for log lines
pub fn format_amount(amount: u64) -> String {
    format!("${}.{:02}", amount / 100, amount % 100)
}
