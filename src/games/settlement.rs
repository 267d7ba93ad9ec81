//! Settlement Notifier
//!
//! Collaborator-facing side of the engine. Everything here runs after the
//! round lock has been released: ledger writes, statistics and per-user
//! messages. A failure for one user never affects another; failures after a
//! bet left the round come back as [`Advisory`] values instead of errors.

use crate::common::traits::{BalanceLedger, BetLedger, Notifier, UserDirectory};
use crate::common::types::{format_amount, BetOutcome, Multiplier, RoundId, UserId};
use crate::games::types::{Advisory, Bet, CrashLoss, CrashReport, DropReason};
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

/// The four external collaborators
#[derive(Clone)]
pub struct Collaborators {
    pub balances: Arc<dyn BalanceLedger>,
    pub bets: Arc<dyn BetLedger>,
    pub directory: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct SettlementNotifier {
    collaborators: Collaborators,
}

impl SettlementNotifier {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Blocked-user lookup. A directory outage is logged and treated as not blocked.
    pub async fn is_blocked(&self, user_id: UserId) -> bool {
        match self.collaborators.directory.is_blocked(user_id).await {
            Ok(blocked) => blocked,
            Err(e) => {
                warn!("Blocked-user lookup failed for {}: {}", user_id, e);
                false
            }
        }
    }

    /// Push the new multiplier to every participant. Returns the bets whose
    /// owners must leave the round, with the reason.
    pub async fn broadcast_state(&self, multiplier: Multiplier, participants: Vec<Bet>) -> Vec<(Bet, DropReason)> {
        let sends = participants.into_iter().map(|bet| async move {
            if self.is_blocked(bet.user_id).await {
                return Some((bet, DropReason::Blocked));
            }

            let potential = multiplier.apply(bet.amount);
            match self
                .collaborators
                .notifier
                .send_game_state(bet.user_id, multiplier, potential)
                .await
            {
                Ok(()) => None,
                Err(e) => {
                    warn!("Dropping user {} from round: {}", bet.user_id, e);
                    Some((bet, DropReason::DeliveryFailed))
                }
            }
        });

        join_all(sends).await.into_iter().flatten().collect()
    }

    /// Record a won bet, credit the payout and confirm to the user
    pub async fn settle_cashout(&self, bet: &Bet, multiplier: Multiplier, payout: u64) -> Vec<Advisory> {
        let mut advisories = Vec::new();

        if let Err(e) = self
            .collaborators
            .bets
            .settle_bet(&bet.bet_id, BetOutcome::Won, multiplier)
            .await
        {
            warn!("Failed to record win of bet {}: {}", bet.bet_id, e);
            advisories.push(Advisory::Ledger(e));
        }

        if let Err(e) = self.collaborators.balances.credit(bet.user_id, payout).await {
            warn!(
                "Failed to credit {} to user {} for bet {}: {}",
                format_amount(payout),
                bet.user_id,
                bet.bet_id,
                e
            );
            advisories.push(Advisory::Ledger(e));
        }

        if let Err(e) = self
            .collaborators
            .notifier
            .send_cashout_result(bet.user_id, payout, multiplier)
            .await
        {
            warn!("Cash-out confirmation to user {} failed: {}", bet.user_id, e);
            advisories.push(Advisory::Delivery(e));
        }

        advisories
    }

    /// Record every remaining bet as lost and tell its owner
    pub async fn settle_crash(&self, round_id: RoundId, crash_point: Multiplier, losers: Vec<Bet>) -> CrashReport {
        let settles = losers.iter().map(|bet| async move {
            let mut advisories = Vec::new();

            if let Err(e) = self
                .collaborators
                .bets
                .settle_bet(&bet.bet_id, BetOutcome::Lost, crash_point)
                .await
            {
                warn!("Failed to record loss of bet {}: {}", bet.bet_id, e);
                advisories.push((bet.user_id, Advisory::Ledger(e)));
            }

            if !self.is_blocked(bet.user_id).await {
                if let Err(e) = self
                    .collaborators
                    .notifier
                    .send_crash(bet.user_id, crash_point, bet.amount)
                    .await
                {
                    warn!("Crash notice to user {} failed: {}", bet.user_id, e);
                    advisories.push((bet.user_id, Advisory::Delivery(e)));
                }
            }

            advisories
        });

        let advisories = join_all(settles).await.into_iter().flatten().collect();
        let losses = losers
            .into_iter()
            .map(|bet| CrashLoss {
                user_id: bet.user_id,
                bet_id: bet.bet_id,
                amount: bet.amount,
            })
            .collect();

        CrashReport {
            round_id,
            crash_point,
            losses,
            advisories,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LedgerError;
    use crate::in_memory::{InMemoryBalances, InMemoryBets, InMemoryDirectory, Notification, RecordingNotifier};
    use std::time::Duration;

    struct Fixture {
        bets: Arc<InMemoryBets>,
        directory: Arc<InMemoryDirectory>,
        notifier: Arc<RecordingNotifier>,
        settlement: SettlementNotifier,
    }

    fn fixture() -> Fixture {
        let bets = Arc::new(InMemoryBets::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let settlement = SettlementNotifier::new(Collaborators {
            balances: Arc::new(InMemoryBalances::with_balances([(1, 5000), (2, 5000)])),
            bets: bets.clone(),
            directory: directory.clone(),
            notifier: notifier.clone(),
        });
        Fixture {
            bets,
            directory,
            notifier,
            settlement,
        }
    }

    async fn bet(bets: &InMemoryBets, user_id: UserId, amount: u64) -> Bet {
        Bet {
            user_id,
            bet_id: bets.register_bet(user_id, amount).await.unwrap(),
            amount,
            cashed_out: false,
            joined_at: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_directory_outage_is_not_a_block() {
        let f = fixture();
        let stake = bet(&f.bets, 1, 1000).await;
        f.directory.block(1);
        f.directory.set_offline(true);

        assert!(!f.settlement.is_blocked(1).await);

        let drops = f
            .settlement
            .broadcast_state(Multiplier::from_hundredths(120), vec![stake])
            .await;
        assert!(drops.is_empty());
        assert_eq!(
            f.notifier.delivered_to(1),
            vec![Notification::GameState {
                user_id: 1,
                multiplier: Multiplier::from_hundredths(120),
                potential_payout: 1200,
            }]
        );

        f.directory.set_offline(false);
        assert!(f.settlement.is_blocked(1).await);
    }

    #[tokio::test]
    async fn test_crash_settlement_reaches_every_loser_despite_failures() {
        let f = fixture();
        let first = bet(&f.bets, 1, 1000).await;
        let second = bet(&f.bets, 2, 2000).await;
        f.bets.set_offline(true);
        f.notifier.fail_for(2);

        let report = f
            .settlement
            .settle_crash(4, Multiplier::from_hundredths(150), vec![first, second])
            .await;

        assert_eq!(report.round_id, 4);
        assert_eq!(report.losses.len(), 2);
        assert_eq!(report.total_lost(), 3000);

        let ledger_failures = report
            .advisories
            .iter()
            .filter(|(_, advisory)| matches!(advisory, Advisory::Ledger(LedgerError::Unavailable(_))))
            .count();
        assert_eq!(ledger_failures, 2);
        assert!(report
            .advisories
            .iter()
            .any(|(user_id, advisory)| *user_id == 2 && matches!(advisory, Advisory::Delivery(_))));

        // The reachable loser still hears about the crash
        assert_eq!(
            f.notifier.delivered_to(1),
            vec![Notification::Crash {
                user_id: 1,
                multiplier: Multiplier::from_hundredths(150),
                amount_lost: 1000,
            }]
        );
        assert_eq!(f.bets.unsettled_count(), 2);
    }
}
