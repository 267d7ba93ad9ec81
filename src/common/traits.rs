//! Collaborator interfaces the engine calls into
//!
//! Storage, statistics and message delivery live outside the engine. Every
//! implementation must be safe to call concurrently for different users; the
//! engine never calls them while holding the round lock.

use crate::common::types::{BetId, BetOutcome, Multiplier, UserId};
use crate::errors::{DeliveryError, LedgerResult};
use async_trait::async_trait;

/// Player balances in minor currency units
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Current balance of a user
    async fn balance(&self, user_id: UserId) -> LedgerResult<u64>;

    /// Add funds, returning the new balance
    async fn credit(&self, user_id: UserId, amount: u64) -> LedgerResult<u64>;

    /// Remove funds, returning the new balance. Must refuse to overdraw.
    async fn debit(&self, user_id: UserId, amount: u64) -> LedgerResult<u64>;
}

/// Persistent bet records and per-player statistics
#[async_trait]
pub trait BetLedger: Send + Sync {
    /// Record a new stake and return its identifier
    async fn register_bet(&self, user_id: UserId, amount: u64) -> LedgerResult<BetId>;

    /// Record the final outcome of a bet
    async fn settle_bet(&self, bet_id: &BetId, outcome: BetOutcome, multiplier: Multiplier) -> LedgerResult<()>;
}

/// Moderation lookups
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn is_blocked(&self, user_id: UserId) -> LedgerResult<bool>;
}

/// Per-user message delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Live round update for one participant
    async fn send_game_state(
        &self,
        user_id: UserId,
        multiplier: Multiplier,
        potential_payout: u64,
    ) -> Result<(), DeliveryError>;

    /// The round crashed while the user was still in it
    async fn send_crash(&self, user_id: UserId, multiplier: Multiplier, amount_lost: u64) -> Result<(), DeliveryError>;

    /// Confirmation of a successful cash-out
    async fn send_cashout_result(&self, user_id: UserId, amount: u64, multiplier: Multiplier) -> Result<(), DeliveryError>;
}
