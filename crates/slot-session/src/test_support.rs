//! Scripted provider for unit tests
//!
//! Unit tests cannot reach `slot_sim::ScriptedSpinProvider` (slot-sim depends on
//! this crate), so a trimmed copy lives here.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use slot_core::{Credits, MachineId, SpinOutcome, SpinRequest, Symbol};

use crate::error::ProviderError;
use crate::provider::SpinProvider;

pub(crate) enum ScriptStep {
    Outcome(SpinOutcome),
    Fail(ProviderError),
}

impl ScriptStep {
    pub(crate) fn loss(balance: Credits) -> Self {
        Self::Outcome(SpinOutcome::loss(reels(), balance))
    }

    pub(crate) fn win(amount: Credits, balance: Credits) -> Self {
        Self::Outcome(SpinOutcome::win(reels(), amount, balance))
    }

    pub(crate) fn jackpot(amount: Credits, balance: Credits) -> Self {
        Self::Outcome(SpinOutcome::win(reels(), amount, balance).with_jackpot())
    }
}

fn reels() -> Vec<Symbol> {
    vec!["7".into(), "BAR".into(), "CHERRY".into()]
}

/// Plays back a fixed list of results. When gated, every call blocks until
/// [`ScriptedProvider::release`] hands out a permit.
pub(crate) struct ScriptedProvider {
    steps: Mutex<VecDeque<ScriptStep>>,
    calls: AtomicUsize,
    stop_calls: AtomicUsize,
    called: Notify,
    gate: Option<Semaphore>,
}

impl ScriptedProvider {
    pub(crate) fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            called: Notify::new(),
            gate: None,
        }
    }

    pub(crate) fn gated(steps: Vec<ScriptStep>) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(steps)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Let one held call complete
    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub(crate) async fn wait_for_calls(&self, n: usize) {
        loop {
            let notified = self.called.notified();
            if self.calls() >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl SpinProvider for ScriptedProvider {
    async fn spin(&self, _request: &SpinRequest) -> Result<SpinOutcome, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.called.notify_waiters();

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| ProviderError::Unavailable)?
                .forget();
        }

        match self.steps.lock().pop_front() {
            Some(ScriptStep::Outcome(outcome)) => Ok(outcome),
            Some(ScriptStep::Fail(error)) => Err(error),
            None => Err(ProviderError::Unavailable),
        }
    }

    async fn stop_auto_spin(&self, _machine_id: &MachineId) -> Result<(), ProviderError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
