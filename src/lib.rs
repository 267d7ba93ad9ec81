//! Aviastar - Crash Multiplier Betting Engine
//!
//! Players stake money on a shared round whose multiplier climbs from 1.00x
//! until a hidden crash point. Cashing out before the crash pays
//! `stake * multiplier`; bets still in at the crash are lost. Cash-out and
//! crash settlement go through one lock so every bet is paid at most once.

pub mod common;
pub mod config;
pub mod errors;
pub mod games;
pub mod in_memory;
pub mod metrics;
pub mod services;

pub use common::types::{BetId, BetOutcome, Multiplier, RoundId, UserId};
pub use config::{AviastarConfig, ConfigLoader, GameConfig};
pub use errors::{AviastarError, AviastarResult, DeliveryError, GameError, LedgerError};
pub use games::{CashoutReceipt, CrashEngine, RoundEvent, RoundSnapshot, RoundStatus};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use services::{CrashGameService, PlacedBet, ServiceBuilder};
