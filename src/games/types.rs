use crate::common::types::{BetId, Multiplier, RoundId, UserId};
use crate::errors::{DeliveryError, LedgerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle of the shared round
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    /// No round in progress
    Idle,
    /// Multiplier is rising; cash-outs are accepted
    Running,
    /// Crash point reached; remaining bets are being settled as losses
    Crashed,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Idle => write!(f, "idle"),
            RoundStatus::Running => write!(f, "running"),
            RoundStatus::Crashed => write!(f, "crashed"),
        }
    }
}

/// One user's stake in the current round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub user_id: UserId,
    pub bet_id: BetId,
    /// Stake in minor units
    pub amount: u64,
    /// True once settled by cash-out rather than by crash
    pub cashed_out: bool,
    /// Offset from round start, informational only
    pub joined_at: Duration,
}

/// Read-only view of the round, safe to hand to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundSnapshot {
    pub round_id: RoundId,
    pub status: RoundStatus,
    pub multiplier: Multiplier,
    pub participants: usize,
    /// Only revealed once the round has crashed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_point: Option<Multiplier>,
}

/// Why a participant left the round without settlement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    Blocked,
    DeliveryFailed,
}

/// Events published to live observers, in lock order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundEvent {
    RoundStarted {
        round_id: RoundId,
    },
    ParticipantJoined {
        round_id: RoundId,
        user_id: UserId,
        amount: u64,
    },
    MultiplierAdvanced {
        round_id: RoundId,
        multiplier: Multiplier,
    },
    CashedOut {
        round_id: RoundId,
        user_id: UserId,
        multiplier: Multiplier,
        payout: u64,
    },
    ParticipantDropped {
        round_id: RoundId,
        user_id: UserId,
        reason: DropReason,
    },
    Crashed {
        round_id: RoundId,
        crash_point: Multiplier,
        losers: usize,
    },
    /// Loss settlement finished; the round is gone
    RoundSettled {
        round_id: RoundId,
    },
}

/// A collaborator failure that happened after a bet was already settled in memory.
/// Reported to the caller and logged; never rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    Ledger(LedgerError),
    Delivery(DeliveryError),
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::Ledger(e) => write!(f, "ledger: {}", e),
            Advisory::Delivery(e) => write!(f, "delivery: {}", e),
        }
    }
}

/// Result of a successful cash-out
#[derive(Debug, Clone)]
pub struct CashoutReceipt {
    pub round_id: RoundId,
    pub user_id: UserId,
    pub bet_id: BetId,
    pub amount: u64,
    pub multiplier: Multiplier,
    pub payout: u64,
    pub advisories: Vec<Advisory>,
}

/// One bet lost to a crash
#[derive(Debug, Clone)]
pub struct CrashLoss {
    pub user_id: UserId,
    pub bet_id: BetId,
    pub amount: u64,
}

/// Outcome of the crash settlement pass
#[derive(Debug, Clone)]
pub struct CrashReport {
    pub round_id: RoundId,
    pub crash_point: Multiplier,
    pub losses: Vec<CrashLoss>,
    pub advisories: Vec<(UserId, Advisory)>,
}

impl CrashReport {
    pub fn total_lost(&self) -> u64 {
        self.losses.iter().map(|loss| loss.amount).sum()
    }
}
