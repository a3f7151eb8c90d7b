//! # slot-sim: Local spin providers
//!
//! - [`SyntheticSpinProvider`]: weighted reel strips, a house-side balance
//!   and a progressive jackpot pool; seedable for reproducible sessions
//! - [`ScriptedSpinProvider`]: plays back a fixed list of results, with an
//!   optional gate to hold calls in flight
//!
//! Both implement [`slot_session::SpinProvider`] and can back a
//! `GameSession` without a server.

pub mod scripted;
pub mod symbols;
pub mod synthetic;

pub use scripted::{ScriptedResult, ScriptedSpinProvider};
pub use symbols::{ReelStrip, SymbolDef, SymbolTable, generate_weighted_strips};
pub use synthetic::{ForcedOutcome, SimConfig, SyntheticSpinProvider};
