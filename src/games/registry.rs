//! Active bets of the current round
//!
//! The registry has no lock of its own. It lives inside the round state and is
//! only reachable through the round's mutex, which makes every insert and
//! removal atomic with respect to multiplier changes and the crash decision.

use crate::common::types::{BetId, UserId};
use crate::errors::GameError;
use crate::games::types::Bet;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    active: HashMap<UserId, Bet>,
    /// Users whose bet was settled (cashed out or lost) in the current round
    settled: HashSet<UserId>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bet. A user may hold at most one active bet.
    pub fn insert(&mut self, bet: Bet) -> Result<(), GameError> {
        if self.active.contains_key(&bet.user_id) {
            return Err(GameError::AlreadyParticipating { user_id: bet.user_id });
        }
        self.settled.remove(&bet.user_id);
        self.active.insert(bet.user_id, bet);
        Ok(())
    }

    /// Remove a bet for settlement. This is the only way a bet leaves the
    /// registry with a payout, so a second call for the same bet always fails.
    pub fn take_for_settlement(&mut self, user_id: UserId) -> Result<Bet, GameError> {
        match self.active.remove(&user_id) {
            Some(bet) => {
                self.settled.insert(user_id);
                Ok(bet)
            }
            None if self.settled.contains(&user_id) => Err(GameError::AlreadySettled { user_id }),
            None => Err(GameError::NotParticipating { user_id }),
        }
    }

    /// Remove every remaining bet for loss settlement
    pub fn drain_for_settlement(&mut self) -> Vec<Bet> {
        let drained: Vec<Bet> = self.active.drain().map(|(_, bet)| bet).collect();
        self.settled.extend(drained.iter().map(|bet| bet.user_id));
        drained
    }

    /// Remove a bet without settling it. Only matches the exact bet so a stale
    /// request cannot evict a newer stake of the same user.
    pub fn evict(&mut self, user_id: UserId, bet_id: &BetId) -> Option<Bet> {
        match self.active.get(&user_id) {
            Some(bet) if &bet.bet_id == bet_id => self.active.remove(&user_id),
            _ => None,
        }
    }

    /// Forget which users settled; called when a new round starts
    pub fn reset_settled(&mut self) {
        self.settled.clear();
    }

    pub fn get(&self, user_id: UserId) -> Option<&Bet> {
        self.active.get(&user_id)
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.active.contains_key(&user_id)
    }

    pub fn was_settled(&self, user_id: UserId) -> bool {
        self.settled.contains(&user_id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bet> {
        self.active.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn bet(user_id: UserId, id: &str, amount: u64) -> Bet {
        Bet {
            user_id,
            bet_id: BetId::new(id),
            amount,
            cashed_out: false,
            joined_at: Duration::ZERO,
        }
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut registry = ParticipantRegistry::new();
        registry.insert(bet(1, "a", 1000)).unwrap();

        let err = registry.insert(bet(1, "b", 500)).unwrap_err();
        assert_eq!(err, GameError::AlreadyParticipating { user_id: 1 });

        // The first stake is untouched
        assert_eq!(registry.get(1).unwrap().bet_id, BetId::new("a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_take_twice_reports_already_settled() {
        let mut registry = ParticipantRegistry::new();
        registry.insert(bet(1, "a", 1000)).unwrap();

        assert!(registry.take_for_settlement(1).is_ok());
        assert_eq!(
            registry.take_for_settlement(1).unwrap_err(),
            GameError::AlreadySettled { user_id: 1 }
        );
        assert_eq!(
            registry.take_for_settlement(2).unwrap_err(),
            GameError::NotParticipating { user_id: 2 }
        );
    }

    #[test]
    fn test_drain_marks_everyone_settled() {
        let mut registry = ParticipantRegistry::new();
        registry.insert(bet(1, "a", 1000)).unwrap();
        registry.insert(bet(2, "b", 2000)).unwrap();

        let drained = registry.drain_for_settlement();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        assert_eq!(
            registry.take_for_settlement(2).unwrap_err(),
            GameError::AlreadySettled { user_id: 2 }
        );

        registry.reset_settled();
        assert_eq!(
            registry.take_for_settlement(2).unwrap_err(),
            GameError::NotParticipating { user_id: 2 }
        );
    }

    #[test]
    fn test_evict_requires_matching_bet() {
        let mut registry = ParticipantRegistry::new();
        registry.insert(bet(1, "new", 1000)).unwrap();

        assert!(registry.evict(1, &BetId::new("old")).is_none());
        assert!(registry.contains(1));

        assert!(registry.evict(1, &BetId::new("new")).is_some());
        // Evicted users were never settled
        assert_eq!(
            registry.take_for_settlement(1).unwrap_err(),
            GameError::NotParticipating { user_id: 1 }
        );
    }
}
