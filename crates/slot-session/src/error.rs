//! Session error taxonomy
//!
//! Local validation failures never touch the lifecycle state. Provider
//! failures always do: they move the machine through `Failed` and end any
//! auto-spin run.

use serde::Serialize;

use slot_core::Credits;

/// Local pre-check failures, reported synchronously to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient balance: {balance} available, {required} required")]
    InsufficientBalance { balance: Credits, required: Credits },

    #[error(
        "Insufficient balance for {spins} auto-spins at {bet}: {balance} available, {required} required"
    )]
    InsufficientBalanceForAutoSpin {
        balance: Credits,
        bet: Credits,
        spins: u32,
        required: Credits,
    },

    #[error("Auto-spin count must be at least 1")]
    InvalidSpinCount,

    #[error("An auto-spin run is already active")]
    AutoSpinActive,

    #[error("A spin is already in flight")]
    SpinInProgress,
}

/// Remote failures (including timeouts)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum ProviderError {
    #[error("Spin timed out")]
    Timeout,

    #[error("Spin rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed outcome: {0}")]
    MalformedOutcome(String),

    #[error("Provider unavailable")]
    Unavailable,
}
