//! Crash point generation
//!
//! A round's crash point is drawn once at round start: pick a bucket by
//! cumulative weight, then draw uniformly inside it in whole hundredths. The
//! upper bound of every bucket is exclusive.

use crate::common::types::Multiplier;
use crate::config::{validate_buckets, CrashBucket};
use crate::errors::{AviastarResult, ConfigurationError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Source of hidden crash points, injectable so tests can script rounds
pub trait CrashPointSource: Send + Sync {
    fn next_crash_point(&self) -> Multiplier;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WeightedRange {
    lo: u32,
    hi: u32,
    weight: u32,
}

/// `[1.0,2.0) 75`, `[2.0,3.0) 20`, `[3.0,4.0) 3`, `[4.0,5.0) 2`
const STANDARD_TABLE: [WeightedRange; 4] = [
    WeightedRange { lo: 100, hi: 200, weight: 75 },
    WeightedRange { lo: 200, hi: 300, weight: 20 },
    WeightedRange { lo: 300, hi: 400, weight: 3 },
    WeightedRange { lo: 400, hi: 500, weight: 2 },
];

/// Weighted-bucket generator backed by a seedable RNG
pub struct WeightedCrashPoints {
    table: Vec<WeightedRange>,
    total_weight: u32,
    rng: Mutex<StdRng>,
}

impl WeightedCrashPoints {
    /// Standard house table seeded from OS entropy
    pub fn standard() -> Self {
        Self::with_table(STANDARD_TABLE.to_vec(), StdRng::from_entropy())
    }

    /// Standard house table with a fixed seed (reproducible draws)
    pub fn standard_seeded(seed: u64) -> Self {
        Self::with_table(STANDARD_TABLE.to_vec(), StdRng::seed_from_u64(seed))
    }

    /// Build from configured buckets
    pub fn from_buckets(buckets: &[CrashBucket], seed: Option<u64>) -> AviastarResult<Self> {
        validate_buckets(buckets)?;

        let mut table = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let (Some(lo), Some(hi)) = (Multiplier::from_f64(bucket.lo), Multiplier::from_f64(bucket.hi)) else {
                return Err(ConfigurationError::ValidationFailed(format!(
                    "crash bucket {}..{} is not representable",
                    bucket.lo, bucket.hi
                ))
                .into());
            };
            if lo >= hi {
                return Err(ConfigurationError::ValidationFailed(format!(
                    "crash bucket {}..{} is narrower than 0.01",
                    bucket.lo, bucket.hi
                ))
                .into());
            }
            table.push(WeightedRange {
                lo: lo.hundredths(),
                hi: hi.hundredths(),
                weight: bucket.weight,
            });
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self::with_table(table, rng))
    }

    fn with_table(table: Vec<WeightedRange>, rng: StdRng) -> Self {
        let total_weight = table.iter().map(|r| r.weight).sum();
        Self {
            table,
            total_weight,
            rng: Mutex::new(rng),
        }
    }

    /// Restart the RNG from `seed`
    pub fn reseed(&self, seed: u64) {
        *self.rng.lock().unwrap_or_else(PoisonError::into_inner) = StdRng::seed_from_u64(seed);
    }

    /// Draw using a caller-supplied RNG
    pub fn draw_with<R: Rng>(&self, rng: &mut R) -> Multiplier {
        let mut pick = rng.gen_range(0..self.total_weight);
        let mut chosen = self.table[self.table.len() - 1];
        for range in &self.table {
            if pick < range.weight {
                chosen = *range;
                break;
            }
            pick -= range.weight;
        }
        Multiplier::from_hundredths(rng.gen_range(chosen.lo..chosen.hi))
    }

    /// Inclusive lower and exclusive upper bound of all draws
    pub fn bounds(&self) -> (Multiplier, Multiplier) {
        let lo = self.table.iter().map(|r| r.lo).min().unwrap_or(100);
        let hi = self.table.iter().map(|r| r.hi).max().unwrap_or(100);
        (Multiplier::from_hundredths(lo), Multiplier::from_hundredths(hi))
    }
}

impl CrashPointSource for WeightedCrashPoints {
    fn next_crash_point(&self) -> Multiplier {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.draw_with(&mut *rng)
    }
}

/// Scripted crash points, replayed in order. The last one repeats once exhausted.
pub struct FixedCrashPoints {
    queue: Mutex<VecDeque<Multiplier>>,
    last: Mutex<Multiplier>,
}

impl FixedCrashPoints {
    pub fn new(points: impl IntoIterator<Item = Multiplier>) -> Self {
        Self {
            queue: Mutex::new(points.into_iter().collect()),
            last: Mutex::new(Multiplier::ONE),
        }
    }

    /// Every round crashes at `point`
    pub fn always(point: Multiplier) -> Self {
        Self::new([point])
    }
}

impl CrashPointSource for FixedCrashPoints {
    fn next_crash_point(&self) -> Multiplier {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = self.queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front() {
            *last = next;
        }
        *last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_crash_buckets;

    #[test]
    fn test_draws_stay_in_range() {
        let generator = WeightedCrashPoints::standard_seeded(7);
        let lo = Multiplier::from_hundredths(100);
        let hi = Multiplier::from_hundredths(500);

        for _ in 0..10_000 {
            let point = generator.next_crash_point();
            assert!(point >= lo && point < hi, "crash point {} out of range", point);
        }
    }

    #[test]
    fn test_distribution_matches_weights() {
        let generator = WeightedCrashPoints::standard_seeded(2024);
        let mut counts = [0usize; 4];
        let draws = 10_000;

        for _ in 0..draws {
            let bucket = (generator.next_crash_point().hundredths() / 100 - 1) as usize;
            counts[bucket] += 1;
        }

        let expected = [0.75, 0.20, 0.03, 0.02];
        let tolerance = [0.02, 0.02, 0.01, 0.01];
        for i in 0..4 {
            let share = counts[i] as f64 / draws as f64;
            assert!(
                (share - expected[i]).abs() < tolerance[i],
                "bucket {} share {} too far from {}",
                i,
                share,
                expected[i]
            );
        }
    }

    #[test]
    fn test_reseed_is_reproducible() {
        let generator = WeightedCrashPoints::standard_seeded(1);
        let first: Vec<_> = (0..20).map(|_| generator.next_crash_point()).collect();

        generator.reseed(1);
        let second: Vec<_> = (0..20).map(|_| generator.next_crash_point()).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_from_buckets_matches_standard() {
        let configured = WeightedCrashPoints::from_buckets(&default_crash_buckets(), Some(99)).unwrap();
        let standard = WeightedCrashPoints::standard_seeded(99);

        for _ in 0..100 {
            assert_eq!(configured.next_crash_point(), standard.next_crash_point());
        }
        assert_eq!(
            configured.bounds(),
            (Multiplier::from_hundredths(100), Multiplier::from_hundredths(500))
        );
    }

    #[test]
    fn test_single_narrow_bucket() {
        let buckets = vec![CrashBucket::new(1.5, 1.51, 1)];
        let generator = WeightedCrashPoints::from_buckets(&buckets, Some(3)).unwrap();

        for _ in 0..50 {
            assert_eq!(generator.next_crash_point(), Multiplier::from_hundredths(150));
        }
    }

    #[test]
    fn test_invalid_buckets_rejected() {
        assert!(WeightedCrashPoints::from_buckets(&[], None).is_err());
        assert!(WeightedCrashPoints::from_buckets(&[CrashBucket::new(1.0, 1.001, 1)], None).is_err());
        assert!(WeightedCrashPoints::from_buckets(
            &[CrashBucket::new(1.0, 2.0, u32::MAX), CrashBucket::new(2.0, 3.0, u32::MAX)],
            None
        )
        .is_err());
    }

    #[test]
    fn test_fixed_points_replay_then_repeat() {
        let fixed = FixedCrashPoints::new([Multiplier::from_hundredths(150), Multiplier::from_hundredths(120)]);

        assert_eq!(fixed.next_crash_point(), Multiplier::from_hundredths(150));
        assert_eq!(fixed.next_crash_point(), Multiplier::from_hundredths(120));
        assert_eq!(fixed.next_crash_point(), Multiplier::from_hundredths(120));
    }
}
