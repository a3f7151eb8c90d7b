//! Session statistics

use serde::{Deserialize, Serialize};

use crate::Credits;
use crate::spin::SpinOutcome;

/// Running totals over every settled spin of a session.
///
/// Holds `total_spins == total_wins + total_losses` and
/// `net_profit == total_winnings - total_bet` after every fold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_spins: u64,
    pub total_wins: u64,
    pub total_losses: u64,
    pub total_bet: Credits,
    pub total_winnings: Credits,
    pub net_profit: i64,
    pub biggest_win: Credits,
    pub jackpots_won: u64,
    pub crypto_earned: f64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one settled spin into a copy of these stats.
    ///
    /// Not idempotent: callers deliver each settlement exactly once.
    pub fn apply(&self, outcome: &SpinOutcome, bet_amount: Credits) -> Self {
        let mut next = self.clone();
        next.record(outcome, bet_amount);
        next
    }

    /// In-place form of [`SessionStats::apply`]
    pub fn record(&mut self, outcome: &SpinOutcome, bet_amount: Credits) {
        let win = outcome.credited_win();

        self.total_spins += 1;
        if outcome.is_win {
            self.total_wins += 1;
        } else {
            self.total_losses += 1;
        }
        self.total_bet = self.total_bet.saturating_add(bet_amount);
        self.total_winnings = self.total_winnings.saturating_add(win);
        self.net_profit = signed_difference(self.total_winnings, self.total_bet);
        self.biggest_win = self.biggest_win.max(win);
        if outcome.is_jackpot {
            self.jackpots_won += 1;
        }
        self.crypto_earned += outcome.credited_crypto();
    }

    /// Zero every field
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Return to player, in percent
    pub fn rtp(&self) -> f64 {
        if self.total_bet > 0 {
            (self.total_winnings as f64 / self.total_bet as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Share of spins that won, in percent
    pub fn hit_rate(&self) -> f64 {
        if self.total_spins > 0 {
            (self.total_wins as f64 / self.total_spins as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn average_bet(&self) -> f64 {
        if self.total_spins > 0 {
            self.total_bet as f64 / self.total_spins as f64
        } else {
            0.0
        }
    }
}

fn signed_difference(a: Credits, b: Credits) -> i64 {
    let diff = i128::from(a) - i128::from(b);
    diff.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}
