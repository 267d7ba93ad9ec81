//! In-memory collaborators
//!
//! Reference implementations of the collaborator traits, used by the demo
//! binary and by tests. State lives in `DashMap`s so concurrent callers for
//! different users never contend on one lock.

use crate::common::traits::{BalanceLedger, BetLedger, Notifier, UserDirectory};
use crate::common::types::{format_amount, BetId, BetOutcome, Multiplier, UserId};
use crate::errors::{DeliveryError, LedgerError, LedgerResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

/// Player balances in minor units
#[derive(Default)]
pub struct InMemoryBalances {
    balances: DashMap<UserId, u64>,
    offline: AtomicBool,
}

impl InMemoryBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed initial balances
    pub fn with_balances(balances: impl IntoIterator<Item = (UserId, u64)>) -> Self {
        let ledger = Self::new();
        for (user_id, amount) in balances {
            ledger.deposit(user_id, amount);
        }
        ledger
    }

    /// Add funds outside of any game, opening the account if needed
    pub fn deposit(&self, user_id: UserId, amount: u64) -> u64 {
        let mut balance = self.balances.entry(user_id).or_insert(0);
        *balance = balance.saturating_add(amount);
        *balance
    }

    pub fn get(&self, user_id: UserId) -> Option<u64> {
        self.balances.get(&user_id).map(|balance| *balance)
    }

    /// Make every call fail with `Unavailable` until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> LedgerResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("balance ledger offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BalanceLedger for InMemoryBalances {
    async fn balance(&self, user_id: UserId) -> LedgerResult<u64> {
        self.ensure_online()?;
        self.get(user_id).ok_or(LedgerError::UnknownUser(user_id))
    }

    async fn credit(&self, user_id: UserId, amount: u64) -> LedgerResult<u64> {
        self.ensure_online()?;
        Ok(self.deposit(user_id, amount))
    }

    async fn debit(&self, user_id: UserId, amount: u64) -> LedgerResult<u64> {
        self.ensure_online()?;
        let mut balance = self
            .balances
            .get_mut(&user_id)
            .ok_or(LedgerError::UnknownUser(user_id))?;

        if *balance < amount {
            return Err(LedgerError::InsufficientFunds {
                user_id,
                needed: amount,
                available: *balance,
            });
        }

        *balance -= amount;
        Ok(*balance)
    }
}

/// A stored bet and its outcome once settled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BetRecord {
    pub bet_id: BetId,
    pub user_id: UserId,
    pub amount: u64,
    pub outcome: Option<BetOutcome>,
    pub multiplier: Option<Multiplier>,
    pub placed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Per-player totals, updated on every won or lost settlement
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStats {
    pub bets_made: u64,
    pub bets_won: u64,
    pub bets_lost: u64,
    /// Sum of payouts received
    pub total_won: u64,
    /// Sum of stakes lost
    pub total_lost: u64,
}

/// Bet records and statistics
#[derive(Default)]
pub struct InMemoryBets {
    records: DashMap<BetId, BetRecord>,
    stats: DashMap<UserId, PlayerStats>,
    offline: AtomicBool,
}

impl InMemoryBets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, bet_id: &BetId) -> Option<BetRecord> {
        self.records.get(bet_id).map(|record| record.clone())
    }

    /// All bets of a user, settled or not
    pub fn records_for(&self, user_id: UserId) -> Vec<BetRecord> {
        self.records
            .iter()
            .filter(|record| record.user_id == user_id)
            .map(|record| record.clone())
            .collect()
    }

    pub fn stats(&self, user_id: UserId) -> PlayerStats {
        self.stats.get(&user_id).map(|stats| stats.clone()).unwrap_or_default()
    }

    /// Number of settled bets with the given outcome
    pub fn settled_count(&self, outcome: BetOutcome) -> usize {
        self.records
            .iter()
            .filter(|record| record.outcome == Some(outcome))
            .count()
    }

    pub fn unsettled_count(&self) -> usize {
        self.records.iter().filter(|record| record.outcome.is_none()).count()
    }

    /// Top players by total winnings
    pub fn leaderboard(&self, limit: usize) -> Vec<(UserId, u64)> {
        let mut board: Vec<(UserId, u64)> = self
            .stats
            .iter()
            .map(|entry| (*entry.key(), entry.value().total_won))
            .collect();
        board.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        board.truncate(limit);
        board
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> LedgerResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("bet ledger offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BetLedger for InMemoryBets {
    async fn register_bet(&self, user_id: UserId, amount: u64) -> LedgerResult<BetId> {
        self.ensure_online()?;
        let bet_id = BetId::new(Uuid::new_v4().to_string());
        self.records.insert(
            bet_id.clone(),
            BetRecord {
                bet_id: bet_id.clone(),
                user_id,
                amount,
                outcome: None,
                multiplier: None,
                placed_at: Utc::now(),
                settled_at: None,
            },
        );
        Ok(bet_id)
    }

    async fn settle_bet(&self, bet_id: &BetId, outcome: BetOutcome, multiplier: Multiplier) -> LedgerResult<()> {
        self.ensure_online()?;
        let mut record = self
            .records
            .get_mut(bet_id)
            .ok_or_else(|| LedgerError::UnknownBet(bet_id.clone()))?;

        if record.outcome.is_some() {
            return Err(LedgerError::AlreadySettled(bet_id.clone()));
        }
        record.outcome = Some(outcome);
        record.multiplier = Some(multiplier);
        record.settled_at = Some(Utc::now());

        let mut stats = self.stats.entry(record.user_id).or_default();
        match outcome {
            BetOutcome::Won => {
                stats.bets_made += 1;
                stats.bets_won += 1;
                stats.total_won += multiplier.apply(record.amount);
            }
            BetOutcome::Lost => {
                stats.bets_made += 1;
                stats.bets_lost += 1;
                stats.total_lost += record.amount;
            }
            BetOutcome::Void => {}
        }

        debug!("Bet {} settled {} at {}", bet_id, outcome, multiplier);
        Ok(())
    }
}

/// Blocked-user list
#[derive(Default)]
pub struct InMemoryDirectory {
    blocked: DashSet<UserId>,
    offline: AtomicBool,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, user_id: UserId) {
        self.blocked.insert(user_id);
    }

    pub fn unblock(&self, user_id: UserId) {
        self.blocked.remove(&user_id);
    }

    /// Make every lookup fail with `Unavailable` until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn is_blocked(&self, user_id: UserId) -> LedgerResult<bool> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("user directory offline".to_string()));
        }
        Ok(self.blocked.contains(&user_id))
    }
}

/// Notifier that only logs
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send_game_state(
        &self,
        user_id: UserId,
        multiplier: Multiplier,
        potential_payout: u64,
    ) -> Result<(), DeliveryError> {
        debug!(
            "-> {}: multiplier {}, cash out now for {}",
            user_id,
            multiplier,
            format_amount(potential_payout)
        );
        Ok(())
    }

    async fn send_crash(&self, user_id: UserId, multiplier: Multiplier, amount_lost: u64) -> Result<(), DeliveryError> {
        info!("-> {}: crashed at {}, lost {}", user_id, multiplier, format_amount(amount_lost));
        Ok(())
    }

    async fn send_cashout_result(&self, user_id: UserId, amount: u64, multiplier: Multiplier) -> Result<(), DeliveryError> {
        info!("-> {}: cashed out {} at {}", user_id, format_amount(amount), multiplier);
        Ok(())
    }
}

/// A message captured by [`RecordingNotifier`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    GameState {
        user_id: UserId,
        multiplier: Multiplier,
        potential_payout: u64,
    },
    Crash {
        user_id: UserId,
        multiplier: Multiplier,
        amount_lost: u64,
    },
    CashoutResult {
        user_id: UserId,
        amount: u64,
        multiplier: Multiplier,
    },
}

impl Notification {
    pub fn user_id(&self) -> UserId {
        match *self {
            Notification::GameState { user_id, .. }
            | Notification::Crash { user_id, .. }
            | Notification::CashoutResult { user_id, .. } => user_id,
        }
    }
}

/// Notifier that keeps every delivered message and can be told to fail for
/// chosen users
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<Notification>>,
    failing: DashSet<UserId>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery to `user_id` fails from now on
    pub fn fail_for(&self, user_id: UserId) {
        self.failing.insert(user_id);
    }

    pub fn recover(&self, user_id: UserId) {
        self.failing.remove(&user_id);
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn delivered_to(&self, user_id: UserId) -> Vec<Notification> {
        self.delivered()
            .into_iter()
            .filter(|notification| notification.user_id() == user_id)
            .collect()
    }

    fn deliver(&self, notification: Notification) -> Result<(), DeliveryError> {
        let user_id = notification.user_id();
        if self.failing.contains(&user_id) {
            return Err(DeliveryError::Unreachable {
                user_id,
                reason: "connection closed".to_string(),
            });
        }
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_game_state(
        &self,
        user_id: UserId,
        multiplier: Multiplier,
        potential_payout: u64,
    ) -> Result<(), DeliveryError> {
        self.deliver(Notification::GameState {
            user_id,
            multiplier,
            potential_payout,
        })
    }

    async fn send_crash(&self, user_id: UserId, multiplier: Multiplier, amount_lost: u64) -> Result<(), DeliveryError> {
        self.deliver(Notification::Crash {
            user_id,
            multiplier,
            amount_lost,
        })
    }

    async fn send_cashout_result(&self, user_id: UserId, amount: u64, multiplier: Multiplier) -> Result<(), DeliveryError> {
        self.deliver(Notification::CashoutResult {
            user_id,
            amount,
            multiplier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_debit_refuses_overdraft() {
        let balances = InMemoryBalances::with_balances([(1, 500)]);

        let err = balances.debit(1, 501).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                user_id: 1,
                needed: 501,
                available: 500
            }
        );
        assert_eq!(balances.debit(1, 200).await.unwrap(), 300);
        assert_eq!(balances.credit(1, 50).await.unwrap(), 350);
        assert_eq!(
            balances.balance(2).await.unwrap_err(),
            LedgerError::UnknownUser(2)
        );
    }

    #[tokio::test]
    async fn test_offline_ledger() {
        let balances = InMemoryBalances::with_balances([(1, 500)]);
        balances.set_offline(true);
        assert!(matches!(balances.credit(1, 1).await, Err(LedgerError::Unavailable(_))));

        balances.set_offline(false);
        assert_eq!(balances.balance(1).await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_bets_settle_once_and_update_stats() {
        let bets = InMemoryBets::new();
        let won = bets.register_bet(1, 1000).await.unwrap();
        let lost = bets.register_bet(1, 500).await.unwrap();
        assert_ne!(won, lost);

        bets.settle_bet(&won, BetOutcome::Won, Multiplier::from_hundredths(130))
            .await
            .unwrap();
        bets.settle_bet(&lost, BetOutcome::Lost, Multiplier::from_hundredths(120))
            .await
            .unwrap();

        assert_eq!(
            bets.settle_bet(&won, BetOutcome::Lost, Multiplier::ONE).await.unwrap_err(),
            LedgerError::AlreadySettled(won.clone())
        );

        let stats = bets.stats(1);
        assert_eq!(stats.bets_made, 2);
        assert_eq!(stats.bets_won, 1);
        assert_eq!(stats.bets_lost, 1);
        assert_eq!(stats.total_won, 1300);
        assert_eq!(stats.total_lost, 500);
        let record = bets.record(&won).unwrap();
        assert_eq!(record.outcome, Some(BetOutcome::Won));
        assert!(record.settled_at.is_some_and(|settled_at| settled_at >= record.placed_at));
    }

    #[tokio::test]
    async fn test_void_bets_do_not_count() {
        let bets = InMemoryBets::new();
        let bet_id = bets.register_bet(3, 1000).await.unwrap();
        bets.settle_bet(&bet_id, BetOutcome::Void, Multiplier::ONE).await.unwrap();

        assert_eq!(bets.stats(3), PlayerStats::default());
        assert_eq!(bets.settled_count(BetOutcome::Void), 1);
        assert_eq!(bets.unsettled_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_bet() {
        let bets = InMemoryBets::new();
        let missing = BetId::new("missing");
        assert_eq!(
            bets.settle_bet(&missing, BetOutcome::Won, Multiplier::ONE).await.unwrap_err(),
            LedgerError::UnknownBet(missing)
        );
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_winnings() {
        let bets = InMemoryBets::new();
        for (user_id, multiplier) in [(1, 150), (2, 300), (3, 110)] {
            let bet_id = bets.register_bet(user_id, 1000).await.unwrap();
            bets.settle_bet(&bet_id, BetOutcome::Won, Multiplier::from_hundredths(multiplier))
                .await
                .unwrap();
        }

        assert_eq!(bets.leaderboard(2), vec![(2, 3000), (1, 1500)]);
    }

    #[tokio::test]
    async fn test_directory_block_and_unblock() {
        let directory = InMemoryDirectory::new();
        directory.block(7);
        assert!(directory.is_blocked(7).await.unwrap());

        directory.unblock(7);
        assert!(!directory.is_blocked(7).await.unwrap());

        directory.set_offline(true);
        assert!(matches!(directory.is_blocked(7).await, Err(LedgerError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_recording_notifier_failures_are_per_user() {
        let notifier = RecordingNotifier::new();
        notifier.fail_for(2);

        notifier.send_game_state(1, Multiplier::ONE, 1000).await.unwrap();
        assert!(notifier.send_game_state(2, Multiplier::ONE, 1000).await.is_err());

        assert_eq!(notifier.delivered().len(), 1);
        assert!(notifier.delivered_to(2).is_empty());

        notifier.recover(2);
        notifier.send_crash(2, Multiplier::from_hundredths(120), 1000).await.unwrap();
        assert_eq!(notifier.delivered_to(2).len(), 1);
    }
}
