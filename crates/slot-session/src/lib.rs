//! # slot-session: Spin lifecycle and auto-spin
//!
//! Async layer of the slot client. A [`GameSession`] wraps:
//!
//! - [`SpinMachine`]: single-flight `Idle -> InFlight -> Settled | Failed -> Idle`
//! - [`AutoSpinScheduler`]: repeated spins with a cancellable pause and stop
//!   conditions
//! - the bet selector and the session statistics
//!
//! Outcomes come from a [`SpinProvider`]; balances live in a
//! [`BalanceLedger`]. Changes are published as [`SessionEvent`]s.
//!
//! ## Example
//!
//! ```ignore
//! let session = GameSession::new(config, provider, ledger);
//! let mut events = session.subscribe();
//!
//! session.set_bet(50);
//! let attempt = session.spin().await?;
//!
//! let run = session.start_auto_spin(session.auto_spin_params(25).stop_on_jackpot())?;
//! let report = run.finished().await;
//! ```

pub mod autospin;
pub mod error;
pub mod events;
pub mod machine;
pub mod provider;
pub mod session;

#[cfg(test)]
mod test_support;

pub use autospin::{
    AutoSpinParams, AutoSpinPolicy, AutoSpinReport, AutoSpinRun, AutoSpinScheduler,
    AutoSpinStopReason, Continuation,
};
pub use error::{ProviderError, ValidationError};
pub use events::{SessionEvent, Settlement};
pub use machine::{SpinAttempt, SpinLifecycleState, SpinMachine};
pub use provider::{BalanceLedger, SharedBalance, SpinProvider};
pub use session::GameSession;
