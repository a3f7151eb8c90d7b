//! Synthetic spin authority
//!
//! A local stand-in for the remote game server. It owns a house-side
//! balance, a progressive jackpot pool and a seeded RNG, and answers
//! [`SpinProvider::spin`] with outcomes drawn from weighted reel strips.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use slot_core::{Credits, MachineId, SpinOutcome, SpinRequest};
use slot_session::{ProviderError, SpinProvider};

use crate::symbols::{ReelStrip, SymbolTable, generate_weighted_strips};

/// Outcome to produce instead of a random draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForcedOutcome {
    Lose,
    /// Three of the lowest paying symbol
    SmallWin,
    /// Three of the highest paying symbol
    BigWin,
    /// Three jackpot symbols; pays the whole pool
    Jackpot,
}

/// Synthetic machine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub reel_count: usize,
    /// Pool value after a jackpot is paid
    pub jackpot_seed: Credits,
    /// Share of every bet added to the pool, in percent
    pub jackpot_contribution_pct: Credits,
    /// Simulated round-trip time per spin
    pub latency_ms: u64,
    /// Crypto reward per credit won
    pub crypto_per_credit: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            reel_count: 3,
            jackpot_seed: 5_000,
            jackpot_contribution_pct: 1,
            latency_ms: 0,
            crypto_per_credit: 0.0,
        }
    }
}

struct SimState {
    rng: ChaCha8Rng,
    balance: Credits,
    jackpot_pool: Credits,
    forced: VecDeque<ForcedOutcome>,
    failures: VecDeque<ProviderError>,
    spin_count: u64,
}

/// Local spin provider with its own balance and jackpot pool
pub struct SyntheticSpinProvider {
    config: SimConfig,
    table: SymbolTable,
    strips: Vec<ReelStrip>,
    state: Mutex<SimState>,
    stop_notices: AtomicUsize,
}

impl SyntheticSpinProvider {
    /// Default machine starting at `balance`. Seeded runs are reproducible.
    pub fn new(balance: Credits, seed: Option<u64>) -> Self {
        Self::with_config(SimConfig::default(), balance, seed)
    }

    pub fn with_config(config: SimConfig, balance: Credits, seed: Option<u64>) -> Self {
        let table = SymbolTable::classic();
        let strips = generate_weighted_strips(&table, config.reel_count.max(1));
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_os_rng(),
        };

        log::debug!(
            "[SlotSim] Machine ready: reels={} balance={} seed={:?}",
            strips.len(),
            balance,
            seed
        );

        Self {
            state: Mutex::new(SimState {
                rng,
                balance,
                jackpot_pool: config.jackpot_seed,
                forced: VecDeque::new(),
                failures: VecDeque::new(),
                spin_count: 0,
            }),
            config,
            table,
            strips,
            stop_notices: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// House-side balance
    pub fn balance(&self) -> Credits {
        self.state.lock().balance
    }

    pub fn jackpot_pool(&self) -> Credits {
        self.state.lock().jackpot_pool
    }

    pub fn spin_count(&self) -> u64 {
        self.state.lock().spin_count
    }

    /// Number of auto-spin stop notices received
    pub fn stop_notices(&self) -> usize {
        self.stop_notices.load(Ordering::SeqCst)
    }

    /// Queue an outcome for the next spin
    pub fn force(&self, outcome: ForcedOutcome) {
        self.state.lock().forced.push_back(outcome);
    }

    /// Make the next spin fail with `error` (no balance change)
    pub fn fail_next(&self, error: ProviderError) {
        self.state.lock().failures.push_back(error);
    }

    fn draw(&self, state: &mut SimState) -> Vec<usize> {
        let forced = state.forced.pop_front();
        match forced {
            Some(outcome) => self.forced_line(outcome),
            None => self
                .strips
                .iter()
                .map(|strip| {
                    let position = state.rng.random_range(0..strip.len().max(1));
                    strip.symbol_at(position)
                })
                .collect(),
        }
    }

    fn forced_line(&self, outcome: ForcedOutcome) -> Vec<usize> {
        let reels = self.strips.len();
        let repeat = |index: Option<usize>| vec![index.unwrap_or(0); reels];

        match outcome {
            ForcedOutcome::SmallWin => repeat(self.table.bottom_index()),
            ForcedOutcome::BigWin => repeat(self.table.top_index()),
            ForcedOutcome::Jackpot => repeat(self.table.jackpot_index()),
            ForcedOutcome::Lose => {
                let bottom = self.table.bottom_index();
                let fillers: Vec<usize> = (0..self.table.symbols.len())
                    .filter(|&i| Some(i) != bottom && !self.table.symbols[i].jackpot)
                    .collect();
                if fillers.is_empty() {
                    return vec![0; reels];
                }
                (0..reels).map(|reel| fillers[reel % fillers.len()]).collect()
            }
        }
    }

    /// Payout multiple for a line, or `None` when the line hits the jackpot
    fn evaluate(&self, line: &[usize]) -> Option<Credits> {
        let Some(&first) = line.first() else {
            return Some(0);
        };

        if line.len() > 1 && line.iter().all(|&s| s == first) {
            return match self.table.get(first) {
                Some(symbol) if symbol.jackpot => None,
                Some(symbol) => Some(symbol.pays),
                None => Some(0),
            };
        }

        let pairs = self
            .table
            .bottom_index()
            .map(|bottom| line.iter().filter(|&&s| s == bottom).count())
            .unwrap_or(0);
        if pairs >= 2 {
            Some(self.table.pair_pays)
        } else {
            Some(0)
        }
    }

    fn play(&self, request: &SpinRequest) -> Result<SpinOutcome, ProviderError> {
        let mut state = self.state.lock();

        if let Some(error) = state.failures.pop_front() {
            log::debug!("[SlotSim] Injected failure: {}", error);
            return Err(error);
        }

        let bet = request.bet_amount;
        if bet == 0 {
            return Err(ProviderError::Rejected("bet must be positive".into()));
        }
        if state.balance < bet {
            return Err(ProviderError::Rejected(format!(
                "insufficient balance: {} < {}",
                state.balance, bet
            )));
        }

        state.spin_count += 1;
        state.balance -= bet;
        state.jackpot_pool = state
            .jackpot_pool
            .saturating_add(bet.saturating_mul(self.config.jackpot_contribution_pct) / 100);

        let line = self.draw(&mut state);
        let reels = line.iter().map(|&i| self.table.to_symbol(i)).collect();

        let mut outcome = match self.evaluate(&line) {
            None => {
                let amount = state.jackpot_pool;
                state.jackpot_pool = self.config.jackpot_seed;
                state.balance = state.balance.saturating_add(amount);
                log::info!(
                    "[SlotSim] JACKPOT on spin {}: {} credits",
                    state.spin_count,
                    amount
                );
                SpinOutcome::win(reels, amount, state.balance).with_jackpot()
            }
            Some(0) => SpinOutcome::loss(reels, state.balance),
            Some(multiple) => {
                let amount = bet.saturating_mul(multiple);
                state.balance = state.balance.saturating_add(amount);
                SpinOutcome::win(reels, amount, state.balance)
            }
        };

        if outcome.is_win && self.config.crypto_per_credit > 0.0 {
            let crypto = outcome.win_amount as f64 * self.config.crypto_per_credit;
            outcome = outcome.with_crypto(crypto);
        }

        log::trace!(
            "[SlotSim] Spin {} ({}): win={} balance={}",
            state.spin_count,
            request.machine_id,
            outcome.win_amount,
            outcome.new_current_balance
        );
        Ok(outcome)
    }
}

#[async_trait]
impl SpinProvider for SyntheticSpinProvider {
    async fn spin(&self, request: &SpinRequest) -> Result<SpinOutcome, ProviderError> {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
        self.play(request)
    }

    async fn stop_auto_spin(&self, machine_id: &MachineId) -> Result<(), ProviderError> {
        self.stop_notices.fetch_add(1, Ordering::SeqCst);
        log::debug!("[SlotSim] Auto-spin stop notice for {}", machine_id);
        Ok(())
    }
}
