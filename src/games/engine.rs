//! Crash engine
//!
//! Ties the round state machine to its collaborators and owns the ticker
//! task. Cash-out handling lives in `cashout.rs`, the tick loop in `ticker.rs`.

use crate::common::types::{BetId, Multiplier, RoundId, UserId};
use crate::config::GameConfig;
use crate::errors::{AviastarResult, GameError};
use crate::games::crash_point::CrashPointSource;
use crate::games::round::{Admission, RoundStateMachine};
use crate::games::settlement::{Collaborators, SettlementNotifier};
use crate::games::ticker;
use crate::games::types::{Bet, RoundEvent, RoundSnapshot, RoundStatus};
use crate::metrics::EngineMetrics;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct CrashEngine {
    pub(crate) round: RoundStateMachine,
    pub(crate) settlement: SettlementNotifier,
    pub(crate) tick_interval: Duration,
    pub(crate) metrics: Arc<EngineMetrics>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl CrashEngine {
    pub fn new(
        config: &GameConfig,
        crash_points: Arc<dyn CrashPointSource>,
        collaborators: Collaborators,
        metrics: Arc<EngineMetrics>,
    ) -> AviastarResult<Arc<Self>> {
        config.validate()?;

        Ok(Arc::new(Self {
            round: RoundStateMachine::new(crash_points, config.step(), config.event_capacity),
            settlement: SettlementNotifier::new(collaborators),
            tick_interval: config.tick_interval(),
            metrics,
            ticker: Mutex::new(None),
        }))
    }

    /// Open a round with no participants. No-op while a round is active.
    pub fn start_round(self: &Arc<Self>) -> Option<RoundId> {
        let mut slot = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        let round_id = self.round.start_round()?;
        self.metrics.record_round_started();
        self.spawn_ticker(&mut slot);
        Some(round_id)
    }

    /// Add a bet to the current round, opening one when idle
    pub async fn admit_participant(
        self: &Arc<Self>,
        user_id: UserId,
        bet_id: BetId,
        amount: u64,
    ) -> Result<Admission, GameError> {
        if self.settlement.is_blocked(user_id).await {
            return Err(GameError::UserBlocked { user_id });
        }

        self.admit_checked(user_id, bet_id, amount)
    }

    /// Admission for a user whose blocked status the caller already looked up
    pub(crate) fn admit_checked(
        self: &Arc<Self>,
        user_id: UserId,
        bet_id: BetId,
        amount: u64,
    ) -> Result<Admission, GameError> {
        // The slot stays locked until the new round's ticker is stored, so
        // shutdown never misses it
        let mut slot = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        let admission = self.round.admit(user_id, bet_id, amount)?;
        self.metrics.record_bet(amount);

        match admission {
            Admission::Joined { round_id, started } => {
                info!("User {} joined round {} with {}", user_id, round_id, amount);
                if started {
                    self.metrics.record_round_started();
                    self.spawn_ticker(&mut slot);
                }
            }
            Admission::Queued { round_id } => {
                info!("User {} queued for round {} with {}", user_id, round_id, amount);
            }
        }

        Ok(admission)
    }

    /// One ticker per round. Rounds opened by queued bets reuse the
    /// ticker of the round that just settled.
    fn spawn_ticker(self: &Arc<Self>, slot: &mut Option<JoinHandle<()>>) {
        let handle = tokio::spawn(ticker::run(Arc::clone(self)));

        // A replaced loop has already seen its round go idle and is exiting
        if slot.replace(handle).is_some_and(|previous| !previous.is_finished()) {
            debug!("Previous ticker still winding down");
        }
    }

    /// Refuse new bets and wait for the active round to crash and settle
    pub async fn shutdown(&self) {
        let handle = {
            let mut slot = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
            self.round.stop_admissions();
            slot.take()
        };
        info!("Admissions stopped, waiting for the active round to settle");

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Ticker task ended abnormally: {}", e);
            }
        }
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        self.round.snapshot()
    }

    pub fn current_multiplier(&self) -> Multiplier {
        self.round.current_multiplier()
    }

    pub fn is_running(&self) -> bool {
        self.round.is_running()
    }

    pub fn status(&self) -> RoundStatus {
        self.round.status()
    }

    pub fn participant(&self, user_id: UserId) -> Option<Bet> {
        self.round.participant(user_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.round.subscribe()
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn collaborators(&self) -> &Collaborators {
        self.settlement.collaborators()
    }
}
