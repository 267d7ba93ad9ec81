//! Multiplier ticker
//!
//! One task per round. Each tick either advances the multiplier and pushes
//! it to every participant, or crashes the round and settles the losses.

use crate::games::engine::CrashEngine;
use crate::games::round::{RoundFinish, Tick};
use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub(crate) async fn run(engine: Arc<CrashEngine>) {
    let period = engine.tick_interval;
    let mut ticks = interval_at(Instant::now() + period, period);
    // A slow broadcast pushes later ticks back instead of bunching them up
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;

        match engine.round.tick() {
            Tick::Advanced {
                round_id,
                multiplier,
                participants,
            } => {
                if participants.is_empty() {
                    continue;
                }

                let drops = engine.settlement.broadcast_state(multiplier, participants).await;
                for (bet, reason) in drops {
                    if engine.round.evict(round_id, bet.user_id, &bet.bet_id, reason) {
                        engine.metrics.record_drop();
                        warn!(
                            "User {} dropped from round {} ({:?}), stake {} forfeited",
                            bet.user_id, round_id, reason, bet.amount
                        );
                    }
                }
            }
            Tick::Crashed {
                round_id,
                crash_point,
                losers,
            } => {
                let report = engine.settlement.settle_crash(round_id, crash_point, losers).await;
                engine.metrics.record_crash(report.losses.len() as u64);
                info!(
                    "Round {} settled: {} losses totalling {}, {} advisories",
                    round_id,
                    report.losses.len(),
                    report.total_lost(),
                    report.advisories.len()
                );

                match engine.round.finish_round(round_id) {
                    RoundFinish::NextRound(next) => {
                        engine.metrics.record_round_started();
                        debug!("Round {} opened by queued bets", next);
                        ticks.reset();
                    }
                    RoundFinish::Idle => break,
                }
            }
            Tick::Halted => break,
        }
    }

    debug!("Ticker stopped");
}
