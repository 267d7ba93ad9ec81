use crate::common::types::{format_amount, UserId};
use crate::errors::GameError;
use crate::games::engine::CrashEngine;
use crate::games::types::CashoutReceipt;
use tracing::info;

impl CrashEngine {
    /// Cash out the user's bet at the current multiplier.
    ///
    /// The bet leaves the round under the round lock, in competition with the
    /// ticker's crash. Crediting and notifying happen afterwards and cannot
    /// undo the win; their failures are returned as advisories.
    pub async fn request_cashout(&self, user_id: UserId) -> Result<CashoutReceipt, GameError> {
        let cashout = self.round.take_for_cashout(user_id)?;
        self.metrics.record_cashout(cashout.payout);

        info!(
            "User {} cashed out {} at {} in round {}",
            user_id,
            format_amount(cashout.payout),
            cashout.multiplier,
            cashout.round_id
        );

        let advisories = self
            .settlement
            .settle_cashout(&cashout.bet, cashout.multiplier, cashout.payout)
            .await;

        Ok(CashoutReceipt {
            round_id: cashout.round_id,
            user_id,
            bet_id: cashout.bet.bet_id,
            amount: cashout.bet.amount,
            multiplier: cashout.multiplier,
            payout: cashout.payout,
            advisories,
        })
    }
}
