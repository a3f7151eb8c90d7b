//! Change notifications published to the UI layer

use serde::Serialize;

use slot_core::{Credits, SessionStats, SpinOutcome, SpinRequest};

use crate::autospin::{AutoSpinPolicy, AutoSpinReport};
use crate::error::ProviderError;

/// A settled spin: the outcome, the request that produced it and the session
/// totals right after it was folded in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub request: SpinRequest,
    pub outcome: SpinOutcome,
    pub stats: SessionStats,
}

impl Settlement {
    pub fn bet_amount(&self) -> Credits {
        self.request.bet_amount
    }
}

/// Session notifications, delivered over a broadcast channel
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Provider call issued
    SpinStarted { request: SpinRequest },
    /// Outcome folded into the session stats
    SpinSettled(Settlement),
    /// Provider failed or timed out
    SpinFailed {
        request: SpinRequest,
        error: ProviderError,
    },
    /// Spin request dropped because another spin was in flight
    SpinIgnored,
    BetChanged { bet: Credits },
    AutoSpinStarted(AutoSpinPolicy),
    /// Policy after each settled auto-spin
    AutoSpinProgress(AutoSpinPolicy),
    AutoSpinFinished(AutoSpinReport),
    SessionReset,
}
