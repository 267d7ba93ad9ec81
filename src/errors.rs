//! Error types for the Aviastar crash engine
//!
//! The root error wraps one enum per concern. Game errors are rejections the
//! caller reports to the player; ledger and delivery errors come from the
//! external collaborators and are usually surfaced as advisories.

use std::fmt;

use crate::common::types::{BetId, UserId};

/// Root error type for all Aviastar operations
#[derive(Debug)]
pub enum AviastarError {
    /// Configuration loading and validation errors
    Configuration(ConfigurationError),

    /// Rejections raised by the round engine or the bet desk
    Game(GameError),

    /// Balance or bet ledger failures
    Ledger(LedgerError),

    /// Notification delivery failures
    Delivery(DeliveryError),
}

/// Configuration and validation errors
#[derive(Debug)]
pub enum ConfigurationError {
    ValidationFailed(String),
    InvalidValue { field: String, value: String, reason: String },
    LoadFailed(String),
}

/// Player-facing rejections. None of these change round state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("User {user_id} already has an active bet this round")]
    AlreadyParticipating { user_id: UserId },

    #[error("User {user_id} is not participating in the current round")]
    NotParticipating { user_id: UserId },

    #[error("Bet of user {user_id} was already settled this round")]
    AlreadySettled { user_id: UserId },

    #[error("User {user_id} has a bet queued for the next round")]
    RoundNotRunning { user_id: UserId },

    #[error("User {user_id} is blocked")]
    UserBlocked { user_id: UserId },

    #[error("Bet amount {amount} outside allowed range [{min}, {max}]")]
    BetOutOfRange { amount: u64, min: u64, max: u64 },

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Engine is shutting down")]
    ShuttingDown,
}

/// Failures reported by the balance and bet ledgers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown user {0}")]
    UnknownUser(UserId),

    #[error("Unknown bet {0}")]
    UnknownBet(BetId),

    #[error("Insufficient funds for user {user_id}: need {needed}, have {available}")]
    InsufficientFunds { user_id: UserId, needed: u64, available: u64 },

    #[error("Bet {0} already settled")]
    AlreadySettled(BetId),
}

/// Failures delivering a message to a single user
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("User {user_id} unreachable: {reason}")]
    Unreachable { user_id: UserId, reason: String },
}

impl fmt::Display for AviastarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AviastarError::Configuration(e) => write!(f, "Configuration error: {}", e),
            AviastarError::Game(e) => write!(f, "Game error: {}", e),
            AviastarError::Ledger(e) => write!(f, "Ledger error: {}", e),
            AviastarError::Delivery(e) => write!(f, "Delivery error: {}", e),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::ValidationFailed(msg) => write!(f, "Validation failed: {}", msg),
            ConfigurationError::InvalidValue { field, value, reason } => {
                write!(f, "Invalid value for {}: '{}' ({})", field, value, reason)
            }
            ConfigurationError::LoadFailed(msg) => write!(f, "Failed to load configuration: {}", msg),
        }
    }
}

impl std::error::Error for AviastarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AviastarError::Configuration(e) => Some(e),
            AviastarError::Game(e) => Some(e),
            AviastarError::Ledger(e) => Some(e),
            AviastarError::Delivery(e) => Some(e),
        }
    }
}

impl std::error::Error for ConfigurationError {}

impl From<ConfigurationError> for AviastarError {
    fn from(e: ConfigurationError) -> Self {
        AviastarError::Configuration(e)
    }
}

impl From<GameError> for AviastarError {
    fn from(e: GameError) -> Self {
        AviastarError::Game(e)
    }
}

impl From<LedgerError> for AviastarError {
    fn from(e: LedgerError) -> Self {
        AviastarError::Ledger(e)
    }
}

impl From<DeliveryError> for AviastarError {
    fn from(e: DeliveryError) -> Self {
        AviastarError::Delivery(e)
    }
}

impl From<toml::de::Error> for AviastarError {
    fn from(e: toml::de::Error) -> Self {
        AviastarError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl AviastarError {
    /// The game rejection, if this error is one
    pub fn as_game(&self) -> Option<&GameError> {
        match self {
            AviastarError::Game(e) => Some(e),
            _ => None,
        }
    }
}

// Convenience type alias for Results
pub type AviastarResult<T> = Result<T, AviastarError>;

pub type LedgerResult<T> = Result<T, LedgerError>;
