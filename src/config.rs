//! Configuration management with validation and defaults
//!
//! Loaded from an optional TOML file, then overridden from `AVIASTAR_*`
//! environment variables, then validated.

use crate::common::types::Multiplier;
use crate::errors::{AviastarResult, ConfigurationError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AviastarConfig {
    pub game: GameConfig,
    pub logging: LoggingConfig,
}

/// One range of the crash point distribution, `[lo, hi)` with a relative weight
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CrashBucket {
    pub lo: f64,
    pub hi: f64,
    pub weight: u32,
}

impl CrashBucket {
    pub fn new(lo: f64, hi: f64, weight: u32) -> Self {
        Self { lo, hi, weight }
    }
}

/// Round engine and bet desk settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Delay between multiplier ticks
    pub tick_interval_ms: u64,
    /// Multiplier increase per tick, in hundredths
    pub multiplier_step: u32,
    /// Smallest accepted stake in minor units
    pub min_bet: u64,
    /// Largest accepted stake in minor units
    pub max_bet: u64,
    /// Crash point distribution
    pub crash_buckets: Vec<CrashBucket>,
    /// Capacity of the round event broadcast channel
    pub event_capacity: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            multiplier_step: 10,
            min_bet: 100,     // $1
            max_bet: 100_000, // $1000
            crash_buckets: default_crash_buckets(),
            event_capacity: 1024,
        }
    }
}

/// House distribution: most rounds crash below 2x
pub fn default_crash_buckets() -> Vec<CrashBucket> {
    vec![
        CrashBucket::new(1.0, 2.0, 75),
        CrashBucket::new(2.0, 3.0, 20),
        CrashBucket::new(3.0, 4.0, 3),
        CrashBucket::new(4.0, 5.0, 2),
    ]
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AviastarConfig {
    /// Short ticks for simulations and tests
    pub fn fast_rounds() -> Self {
        Self {
            game: GameConfig {
                tick_interval_ms: 20,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> AviastarResult<()> {
        self.game.validate()
    }
}

impl GameConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn step(&self) -> Multiplier {
        Multiplier::from_hundredths(self.multiplier_step)
    }

    pub fn validate(&self) -> AviastarResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(invalid("game.tick_interval_ms", "0", "Tick interval must be > 0"));
        }

        if self.multiplier_step == 0 {
            return Err(invalid("game.multiplier_step", "0", "Multiplier step must be > 0"));
        }

        if self.min_bet == 0 {
            return Err(invalid("game.min_bet", "0", "Minimum bet must be > 0"));
        }

        if self.min_bet > self.max_bet {
            return Err(invalid(
                "game.max_bet",
                &self.max_bet.to_string(),
                "Maximum bet must be >= minimum bet",
            ));
        }

        if self.event_capacity == 0 {
            return Err(invalid("game.event_capacity", "0", "Event capacity must be > 0"));
        }

        validate_buckets(&self.crash_buckets)
    }
}

pub(crate) fn validate_buckets(buckets: &[CrashBucket]) -> AviastarResult<()> {
    if buckets.is_empty() {
        return Err(ConfigurationError::ValidationFailed("crash_buckets must not be empty".to_string()).into());
    }

    let mut previous_hi: Option<f64> = None;
    let mut total_weight: u32 = 0;
    for (i, bucket) in buckets.iter().enumerate() {
        let field = format!("game.crash_buckets[{}]", i);

        if bucket.lo < 1.0 {
            return Err(invalid(&field, &bucket.lo.to_string(), "Lower bound must be >= 1.0"));
        }
        if bucket.lo >= bucket.hi {
            return Err(invalid(&field, &format!("{}..{}", bucket.lo, bucket.hi), "Range must be non-empty"));
        }
        if bucket.weight == 0 {
            return Err(invalid(&field, "0", "Weight must be > 0"));
        }
        total_weight = total_weight
            .checked_add(bucket.weight)
            .ok_or_else(|| invalid(&field, &bucket.weight.to_string(), "Total weight overflows u32"))?;
        if let Some(hi) = previous_hi {
            if (hi - bucket.lo).abs() > f64::EPSILON {
                return Err(invalid(&field, &bucket.lo.to_string(), "Ranges must be contiguous"));
            }
        }
        previous_hi = Some(bucket.hi);
    }

    Ok(())
}

fn invalid(field: &str, value: &str, reason: &str) -> crate::errors::AviastarError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> AviastarResult<AviastarConfig> {
        self.load_with(|key| std::env::var(key).ok())
    }

    /// Load using an explicit variable lookup instead of the process environment
    pub fn load_with<F>(&self, lookup: F) -> AviastarResult<AviastarConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match self.config_path {
            Some(ref path) => Self::load_from_file(path)?,
            None => AviastarConfig::default(),
        };

        Self::apply_overrides(&mut config, lookup)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(path: &str) -> AviastarResult<AviastarConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        Ok(toml::from_str(&content)?)
    }

    fn apply_overrides<F>(config: &mut AviastarConfig, lookup: F) -> AviastarResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("AVIASTAR_TICK_INTERVAL_MS") {
            config.game.tick_interval_ms = parse_var("AVIASTAR_TICK_INTERVAL_MS", value)?;
        }
        if let Some(value) = lookup("AVIASTAR_MULTIPLIER_STEP") {
            config.game.multiplier_step = parse_var("AVIASTAR_MULTIPLIER_STEP", value)?;
        }
        if let Some(value) = lookup("AVIASTAR_MIN_BET") {
            config.game.min_bet = parse_var("AVIASTAR_MIN_BET", value)?;
        }
        if let Some(value) = lookup("AVIASTAR_MAX_BET") {
            config.game.max_bet = parse_var("AVIASTAR_MAX_BET", value)?;
        }
        if let Some(level) = lookup("AVIASTAR_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(field: &str, value: String) -> AviastarResult<T> {
    value.parse().map_err(|_| {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            value,
            reason: "Not a valid unsigned integer".to_string(),
        }
        .into()
    })
}
