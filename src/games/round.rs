//! Round lifecycle: Idle → Running → Crashed → Idle
//!
//! Status, multiplier, crash point and participants live behind one mutex.
//! Every method here is synchronous and returns as soon as the in-memory
//! transition is done; collaborator calls happen in the caller after the
//! guard is dropped. Events are published while the guard is held so all
//! observers see transitions in the same order.

use crate::common::types::{BetId, Multiplier, RoundId, UserId};
use crate::errors::GameError;
use crate::games::crash_point::CrashPointSource;
use crate::games::registry::ParticipantRegistry;
use crate::games::types::{Bet, DropReason, RoundEvent, RoundSnapshot, RoundStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

struct RoundState {
    round_id: RoundId,
    status: RoundStatus,
    multiplier: Multiplier,
    crash_point: Multiplier,
    started_at: Option<Instant>,
    registry: ParticipantRegistry,
    accepting: bool,
}

/// Result of admitting a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Joined the running round. `started` is true when this admission opened it.
    Joined { round_id: RoundId, started: bool },
    /// The current round is settling its crash; the bet rides the next round
    Queued { round_id: RoundId },
}

impl Admission {
    pub fn round_id(&self) -> RoundId {
        match *self {
            Admission::Joined { round_id, .. } | Admission::Queued { round_id } => round_id,
        }
    }
}

/// Result of one ticker step
#[derive(Debug)]
pub enum Tick {
    /// Multiplier moved up; `participants` is who to broadcast to
    Advanced {
        round_id: RoundId,
        multiplier: Multiplier,
        participants: Vec<Bet>,
    },
    /// Crash point reached. `losers` were removed from the round atomically.
    Crashed {
        round_id: RoundId,
        crash_point: Multiplier,
        losers: Vec<Bet>,
    },
    /// No round is running
    Halted,
}

/// What happens after crash settlement completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundFinish {
    Idle,
    /// Bets queued during settlement opened a new round
    NextRound(RoundId),
}

/// A bet won by cash-out, already removed from the round
#[derive(Debug, Clone)]
pub struct Cashout {
    pub round_id: RoundId,
    pub bet: Bet,
    pub multiplier: Multiplier,
    pub payout: u64,
}

pub struct RoundStateMachine {
    state: Mutex<RoundState>,
    crash_points: Arc<dyn CrashPointSource>,
    step: Multiplier,
    events: broadcast::Sender<RoundEvent>,
}

impl RoundStateMachine {
    pub fn new(crash_points: Arc<dyn CrashPointSource>, step: Multiplier, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: Mutex::new(RoundState {
                round_id: 0,
                status: RoundStatus::Idle,
                multiplier: Multiplier::ONE,
                crash_point: Multiplier::ONE,
                started_at: None,
                registry: ParticipantRegistry::new(),
                accepting: true,
            }),
            crash_points,
            step,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoundState> {
        // Every critical section finishes its transition before anything that
        // could panic, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: RoundEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn begin_round(&self, state: &mut RoundState) -> RoundId {
        state.round_id += 1;
        state.crash_point = self.crash_points.next_crash_point();
        state.multiplier = Multiplier::ONE;
        state.status = RoundStatus::Running;
        state.started_at = Some(Instant::now());
        state.registry.reset_settled();

        info!("Round {} started", state.round_id);
        self.publish(RoundEvent::RoundStarted { round_id: state.round_id });
        state.round_id
    }

    /// Open a round if none is active. Returns the new round id, or `None`
    /// when a round is already running or settling, or admissions are closed.
    pub fn start_round(&self) -> Option<RoundId> {
        let mut state = self.lock();
        if state.status != RoundStatus::Idle || !state.accepting {
            return None;
        }
        Some(self.begin_round(&mut state))
    }

    /// Insert a bet, opening a round when idle
    pub fn admit(&self, user_id: UserId, bet_id: BetId, amount: u64) -> Result<Admission, GameError> {
        let mut state = self.lock();

        if !state.accepting {
            return Err(GameError::ShuttingDown);
        }
        if state.registry.contains(user_id) {
            return Err(GameError::AlreadyParticipating { user_id });
        }

        let admission = match state.status {
            RoundStatus::Idle => Admission::Joined {
                round_id: self.begin_round(&mut state),
                started: true,
            },
            RoundStatus::Running => Admission::Joined {
                round_id: state.round_id,
                started: false,
            },
            RoundStatus::Crashed => Admission::Queued {
                round_id: state.round_id + 1,
            },
        };

        let joined_at = match (admission, state.started_at) {
            (Admission::Joined { .. }, Some(started_at)) => started_at.elapsed(),
            _ => Duration::ZERO,
        };

        state.registry.insert(Bet {
            user_id,
            bet_id,
            amount,
            cashed_out: false,
            joined_at,
        })?;

        self.publish(RoundEvent::ParticipantJoined {
            round_id: admission.round_id(),
            user_id,
            amount,
        });
        Ok(admission)
    }

    /// Advance the round by one tick, or crash it once the crash point is reached
    pub fn tick(&self) -> Tick {
        let mut state = self.lock();

        if state.status != RoundStatus::Running {
            return Tick::Halted;
        }

        if state.multiplier >= state.crash_point {
            state.status = RoundStatus::Crashed;
            let losers = state.registry.drain_for_settlement();
            let crash_point = state.crash_point;

            info!(
                "Round {} crashed at {} with {} bets still in",
                state.round_id,
                crash_point,
                losers.len()
            );
            self.publish(RoundEvent::Crashed {
                round_id: state.round_id,
                crash_point,
                losers: losers.len(),
            });
            return Tick::Crashed {
                round_id: state.round_id,
                crash_point,
                losers,
            };
        }

        // Never past the crash point, so no one can cash out above it
        state.multiplier = state.multiplier.step_towards(self.step, state.crash_point);
        debug!("Round {} at {}", state.round_id, state.multiplier);
        self.publish(RoundEvent::MultiplierAdvanced {
            round_id: state.round_id,
            multiplier: state.multiplier,
        });

        Tick::Advanced {
            round_id: state.round_id,
            multiplier: state.multiplier,
            participants: state.registry.iter().cloned().collect(),
        }
    }

    /// Remove a running bet at the current multiplier. This is the cash-out
    /// side of the race with [`tick`](Self::tick): whichever takes the lock
    /// first decides the bet.
    pub fn take_for_cashout(&self, user_id: UserId) -> Result<Cashout, GameError> {
        let mut state = self.lock();

        if state.status != RoundStatus::Running {
            return Err(if state.registry.contains(user_id) {
                GameError::RoundNotRunning { user_id }
            } else if state.registry.was_settled(user_id) {
                GameError::AlreadySettled { user_id }
            } else {
                GameError::NotParticipating { user_id }
            });
        }

        let mut bet = state.registry.take_for_settlement(user_id)?;
        bet.cashed_out = true;
        let multiplier = state.multiplier;
        let payout = multiplier.apply(bet.amount);

        self.publish(RoundEvent::CashedOut {
            round_id: state.round_id,
            user_id,
            multiplier,
            payout,
        });

        Ok(Cashout {
            round_id: state.round_id,
            bet,
            multiplier,
            payout,
        })
    }

    /// Drop a participant without settlement. Scoped to the round and the
    /// exact bet, so a late failure report cannot touch a newer stake.
    pub fn evict(&self, round_id: RoundId, user_id: UserId, bet_id: &BetId, reason: DropReason) -> bool {
        let mut state = self.lock();

        if state.round_id != round_id || state.status != RoundStatus::Running {
            return false;
        }
        if state.registry.evict(user_id, bet_id).is_none() {
            return false;
        }

        self.publish(RoundEvent::ParticipantDropped {
            round_id,
            user_id,
            reason,
        });
        true
    }

    /// Leave the crashed state once loss settlement is done
    pub fn finish_round(&self, round_id: RoundId) -> RoundFinish {
        let mut state = self.lock();

        if state.round_id != round_id || state.status != RoundStatus::Crashed {
            return RoundFinish::Idle;
        }

        self.publish(RoundEvent::RoundSettled { round_id });

        if state.registry.is_empty() {
            state.status = RoundStatus::Idle;
            state.started_at = None;
            return RoundFinish::Idle;
        }

        RoundFinish::NextRound(self.begin_round(&mut state))
    }

    /// Refuse further admissions
    pub fn stop_admissions(&self) {
        self.lock().accepting = false;
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        let state = self.lock();
        RoundSnapshot {
            round_id: state.round_id,
            status: state.status,
            multiplier: state.multiplier,
            participants: state.registry.len(),
            crash_point: (state.status == RoundStatus::Crashed).then_some(state.crash_point),
        }
    }

    pub fn current_multiplier(&self) -> Multiplier {
        self.lock().multiplier
    }

    pub fn is_running(&self) -> bool {
        self.lock().status == RoundStatus::Running
    }

    pub fn status(&self) -> RoundStatus {
        self.lock().status
    }

    /// The active bet of a user, if any
    pub fn participant(&self, user_id: UserId) -> Option<Bet> {
        self.lock().registry.get(user_id).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.events.subscribe()
    }
}
