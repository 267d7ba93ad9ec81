//! Engine activity counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct EngineMetrics {
    start_time: Instant,
    rounds_started: AtomicU64,
    rounds_crashed: AtomicU64,
    bets_admitted: AtomicU64,
    cashouts: AtomicU64,
    losses: AtomicU64,
    participants_dropped: AtomicU64,
    total_wagered: AtomicU64,
    total_paid_out: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub rounds_started: u64,
    pub rounds_crashed: u64,
    pub bets_admitted: u64,
    pub cashouts: u64,
    pub losses: u64,
    pub participants_dropped: u64,
    pub total_wagered: u64,
    pub total_paid_out: u64,
}

impl MetricsSnapshot {
    /// Share of wagered money kept by the house; negative when players are ahead
    pub fn house_edge(&self) -> f64 {
        if self.total_wagered == 0 {
            return 0.0;
        }
        1.0 - self.total_paid_out as f64 / self.total_wagered as f64
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            rounds_started: AtomicU64::new(0),
            rounds_crashed: AtomicU64::new(0),
            bets_admitted: AtomicU64::new(0),
            cashouts: AtomicU64::new(0),
            losses: AtomicU64::new(0),
            participants_dropped: AtomicU64::new(0),
            total_wagered: AtomicU64::new(0),
            total_paid_out: AtomicU64::new(0),
        }
    }

    pub fn record_round_started(&self) {
        self.rounds_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crash(&self, losses: u64) {
        self.rounds_crashed.fetch_add(1, Ordering::Relaxed);
        self.losses.fetch_add(losses, Ordering::Relaxed);
    }

    pub fn record_bet(&self, amount: u64) {
        self.bets_admitted.fetch_add(1, Ordering::Relaxed);
        self.total_wagered.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn record_cashout(&self, payout: u64) {
        self.cashouts.fetch_add(1, Ordering::Relaxed);
        self.total_paid_out.fetch_add(payout, Ordering::Relaxed);
    }

    pub fn record_drop(&self) {
        self.participants_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_runtime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.total_runtime().as_secs(),
            rounds_started: self.rounds_started.load(Ordering::Relaxed),
            rounds_crashed: self.rounds_crashed.load(Ordering::Relaxed),
            bets_admitted: self.bets_admitted.load(Ordering::Relaxed),
            cashouts: self.cashouts.load(Ordering::Relaxed),
            losses: self.losses.load(Ordering::Relaxed),
            participants_dropped: self.participants_dropped.load(Ordering::Relaxed),
            total_wagered: self.total_wagered.load(Ordering::Relaxed),
            total_paid_out: self.total_paid_out.load(Ordering::Relaxed),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = EngineMetrics::new();
        metrics.record_round_started();
        metrics.record_bet(1000);
        metrics.record_bet(500);
        metrics.record_cashout(1300);
        metrics.record_crash(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rounds_started, 1);
        assert_eq!(snapshot.bets_admitted, 2);
        assert_eq!(snapshot.total_wagered, 1500);
        assert_eq!(snapshot.total_paid_out, 1300);
        assert_eq!(snapshot.losses, 1);
        assert!((snapshot.house_edge() - (1.0 - 1300.0 / 1500.0)).abs() < 1e-9);
    }

    #[test]
    fn test_house_edge_without_bets() {
        assert_eq!(EngineMetrics::new().snapshot().house_edge(), 0.0);
    }
}
