//! Crash round engine
//!
//! - `crash_point`: hidden crash point draws
//! - `registry`: active bets of the round
//! - `round`: lifecycle and the lock every settlement goes through
//! - `ticker`: background multiplier advance and crash settlement
//! - `cashout`: player-initiated exits
//! - `settlement`: ledger writes and notifications

pub mod cashout;
pub mod crash_point;
pub mod engine;
pub mod registry;
pub mod round;
pub mod settlement;
mod ticker;
pub mod types;

pub use crash_point::{CrashPointSource, FixedCrashPoints, WeightedCrashPoints};
pub use engine::CrashEngine;
pub use registry::ParticipantRegistry;
pub use round::{Admission, RoundStateMachine};
pub use settlement::{Collaborators, SettlementNotifier};
pub use types::*;
