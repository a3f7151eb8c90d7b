//! Scripted playback provider
//!
//! Returns a fixed sequence of results, optionally holding every call until
//! released. Used to drive sessions through exact scenarios.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use slot_core::{Credits, MachineId, SpinOutcome, SpinRequest, Symbol};
use slot_session::{ProviderError, SpinProvider};

/// One scripted response
#[derive(Debug, Clone)]
pub enum ScriptedResult {
    Outcome(SpinOutcome),
    Fail(ProviderError),
}

impl ScriptedResult {
    pub fn loss(balance: Credits) -> Self {
        Self::Outcome(SpinOutcome::loss(default_reels(), balance))
    }

    pub fn win(amount: Credits, balance: Credits) -> Self {
        Self::Outcome(SpinOutcome::win(default_reels(), amount, balance))
    }

    pub fn jackpot(amount: Credits, balance: Credits) -> Self {
        Self::Outcome(SpinOutcome::win(default_reels(), amount, balance).with_jackpot())
    }

    pub fn fail(error: ProviderError) -> Self {
        Self::Fail(error)
    }
}

fn default_reels() -> Vec<Symbol> {
    vec!["BAR".into(), "7".into(), "CHERRY".into()]
}

pub struct ScriptedSpinProvider {
    script: Mutex<VecDeque<ScriptedResult>>,
    requests: Mutex<Vec<SpinRequest>>,
    calls: AtomicUsize,
    stop_notices: AtomicUsize,
    called: Notify,
    gate: Option<Semaphore>,
}

impl ScriptedSpinProvider {
    pub fn new(script: Vec<ScriptedResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            stop_notices: AtomicUsize::new(0),
            called: Notify::new(),
            gate: None,
        }
    }

    /// Every call blocks until [`release`](Self::release) is called once for it
    pub fn gated(script: Vec<ScriptedResult>) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(script)
        }
    }

    /// Append a result to the script
    pub fn push(&self, result: ScriptedResult) {
        self.script.lock().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<SpinRequest> {
        self.requests.lock().clone()
    }

    pub fn stop_notices(&self) -> usize {
        self.stop_notices.load(Ordering::SeqCst)
    }

    /// Let one held call complete
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Resolves once at least `n` calls have been made
    pub async fn wait_for_calls(&self, n: usize) {
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
impl SpinProvider for ScriptedSpinProvider {
    async fn spin(&self, request: &SpinRequest) -> Result<SpinOutcome, ProviderError> {
        self.requests.lock().push(request.clone());
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.called.notify_waiters();

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| ProviderError::Unavailable)?
                .forget();
        }

        match self.script.lock().pop_front() {
            Some(ScriptedResult::Outcome(outcome)) => Ok(outcome),
            Some(ScriptedResult::Fail(error)) => Err(error),
            None => {
                log::warn!("[ScriptedSpin] Script exhausted");
                Err(ProviderError::Unavailable)
            }
        }
    }

    async fn stop_auto_spin(&self, _machine_id: &MachineId) -> Result<(), ProviderError> {
        self.stop_notices.fetch_add(1, Ordering::SeqCst);
        self.called.notify_waiters();
        Ok(())
    }
}
