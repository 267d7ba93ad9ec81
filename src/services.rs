//! Service layer with dependency injection
//!
//! `CrashGameService` is the entry point for front ends: it validates and
//! funds bets before they reach the engine, and guards cash-outs. Every
//! collaborator can be swapped through [`ServiceBuilder`].

use crate::common::traits::{BalanceLedger, BetLedger, Notifier, UserDirectory};
use crate::common::types::{format_amount, BetId, BetOutcome, Multiplier, RoundId, UserId};
use crate::config::{AviastarConfig, ConfigLoader};
use crate::errors::{AviastarResult, GameError};
use crate::games::crash_point::{CrashPointSource, WeightedCrashPoints};
use crate::games::round::Admission;
use crate::games::settlement::Collaborators;
use crate::games::types::{CashoutReceipt, RoundEvent, RoundSnapshot};
use crate::games::CrashEngine;
use crate::in_memory::{InMemoryBalances, InMemoryBets, InMemoryDirectory, TracingNotifier};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// A funded bet that entered the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedBet {
    pub bet_id: BetId,
    pub round_id: RoundId,
    /// True when the bet waits for the next round
    pub queued: bool,
    pub amount: u64,
    pub balance_after: u64,
}

pub struct CrashGameService {
    config: AviastarConfig,
    engine: Arc<CrashEngine>,
    collaborators: Collaborators,
}

impl CrashGameService {
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    pub fn config(&self) -> &AviastarConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<CrashEngine> {
        &self.engine
    }

    /// Validate, fund and admit a bet
    pub async fn place_bet(&self, user_id: UserId, amount: u64) -> AviastarResult<PlacedBet> {
        if self.engine.settlement.is_blocked(user_id).await {
            return Err(GameError::UserBlocked { user_id }.into());
        }

        let (min, max) = (self.config.game.min_bet, self.config.game.max_bet);
        if amount < min || amount > max {
            return Err(GameError::BetOutOfRange { amount, min, max }.into());
        }

        let available = self.collaborators.balances.balance(user_id).await?;
        if available < amount {
            return Err(GameError::InsufficientFunds {
                needed: amount,
                available,
            }
            .into());
        }

        let balance_after = self.collaborators.balances.debit(user_id, amount).await?;

        let bet_id = match self.collaborators.bets.register_bet(user_id, amount).await {
            Ok(bet_id) => bet_id,
            Err(e) => {
                self.refund(user_id, amount).await;
                return Err(e.into());
            }
        };

        let admission = match self.engine.admit_checked(user_id, bet_id.clone(), amount) {
            Ok(admission) => admission,
            Err(e) => {
                self.refund(user_id, amount).await;
                if let Err(ledger) = self
                    .collaborators
                    .bets
                    .settle_bet(&bet_id, BetOutcome::Void, Multiplier::ONE)
                    .await
                {
                    warn!("Failed to void bet {}: {}", bet_id, ledger);
                }
                return Err(e.into());
            }
        };

        Ok(PlacedBet {
            bet_id,
            round_id: admission.round_id(),
            queued: matches!(admission, Admission::Queued { .. }),
            amount,
            balance_after,
        })
    }

    async fn refund(&self, user_id: UserId, amount: u64) {
        match self.collaborators.balances.credit(user_id, amount).await {
            Ok(_) => info!("Refunded {} to user {}", format_amount(amount), user_id),
            Err(e) => warn!("Refund of {} to user {} failed: {}", format_amount(amount), user_id, e),
        }
    }

    /// Cash out the user's bet at the current multiplier
    pub async fn cash_out(&self, user_id: UserId) -> AviastarResult<CashoutReceipt> {
        if self.engine.settlement.is_blocked(user_id).await {
            return Err(GameError::UserBlocked { user_id }.into());
        }
        Ok(self.engine.request_cashout(user_id).await?)
    }

    pub fn start_round(&self) -> Option<RoundId> {
        self.engine.start_round()
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        self.engine.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.engine.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.engine.metrics().snapshot()
    }

    /// Stop taking bets and wait for the active round to settle
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
        info!("Crash game service stopped");
    }
}

/// Builder for configured services; unset collaborators default to the
/// in-memory implementations
#[derive(Default)]
pub struct ServiceBuilder {
    config: Option<AviastarConfig>,
    config_path: Option<String>,
    seed: Option<u64>,
    balances: Option<Arc<dyn BalanceLedger>>,
    bets: Option<Arc<dyn BetLedger>>,
    directory: Option<Arc<dyn UserDirectory>>,
    notifier: Option<Arc<dyn Notifier>>,
    crash_points: Option<Arc<dyn CrashPointSource>>,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: AviastarConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load configuration from a TOML file plus environment overrides
    pub fn with_config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Seed the default crash point generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_balances(mut self, balances: Arc<dyn BalanceLedger>) -> Self {
        self.balances = Some(balances);
        self
    }

    pub fn with_bets(mut self, bets: Arc<dyn BetLedger>) -> Self {
        self.bets = Some(bets);
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Replace the crash point generator (scripted rounds in tests)
    pub fn with_crash_points(mut self, crash_points: Arc<dyn CrashPointSource>) -> Self {
        self.crash_points = Some(crash_points);
        self
    }

    /// Build the service. Must be called inside a Tokio runtime, since rounds
    /// spawn their ticker on it.
    pub fn build(self) -> AviastarResult<CrashGameService> {
        let config = match (self.config, self.config_path) {
            (Some(config), _) => {
                config.validate()?;
                config
            }
            (None, Some(path)) => ConfigLoader::new().with_path(path).load()?,
            (None, None) => ConfigLoader::new().load()?,
        };

        let crash_points = match self.crash_points {
            Some(crash_points) => crash_points,
            None => Arc::new(WeightedCrashPoints::from_buckets(
                &config.game.crash_buckets,
                self.seed,
            )?),
        };

        let collaborators = Collaborators {
            balances: self.balances.unwrap_or_else(|| Arc::new(InMemoryBalances::new())),
            bets: self.bets.unwrap_or_else(|| Arc::new(InMemoryBets::new())),
            directory: self.directory.unwrap_or_else(|| Arc::new(InMemoryDirectory::new())),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
        };

        let engine = CrashEngine::new(
            &config.game,
            crash_points,
            collaborators.clone(),
            Arc::new(EngineMetrics::new()),
        )?;

        info!(
            "Crash game service ready (tick {}ms, step {}, bets {}..{})",
            config.game.tick_interval_ms,
            config.game.step(),
            format_amount(config.game.min_bet),
            format_amount(config.game.max_bet)
        );

        Ok(CrashGameService {
            config,
            engine,
            collaborators,
        })
    }
}
