//! # slot-core: Slot client data model
//!
//! Pure types and functions shared by every layer of the slot client.
//! Nothing in here performs I/O or awaits; the async spin lifecycle lives in
//! `slot-session`.
//!
//! ## Contents
//!
//! - **Bet rules**: bounds clamping and affordability pre-checks
//! - **Spin model**: requests and the outcome reported by the remote authority
//! - **Session statistics**: a fold over settled spins
//! - **Configuration**: per-machine bet limits and session timing
//!
//! ## Flow
//!
//! ```text
//! BetSelector ──clamp──> SpinRequest ──(remote)──> SpinOutcome
//!                                                      │
//!                                                      v
//!                                     SessionStats::apply(outcome, bet)
//! ```

pub mod bet;
pub mod config;
pub mod spin;
pub mod stats;

pub use bet::*;
pub use config::*;
pub use spin::*;
pub use stats::*;

/// Integer currency amount (stakes, wins, balances)
pub type Credits = u64;
