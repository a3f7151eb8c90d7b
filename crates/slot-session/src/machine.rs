//! Spin lifecycle state machine
//!
//! ```text
//!            request_spin (affordable)
//!   Idle ───────────────────────────────> InFlight ──ok──> Settled ──┐
//!    ^                                       │                       │
//!    │                                       └─err/timeout─> Failed ─┤
//!    └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! A request arriving while the machine is not `Idle` is ignored. Every
//! admitted request runs in its own task, so the provider call always
//! completes and its result is always applied, even if the caller stops
//! waiting. `Settled` and `Failed` are transient: the stats fold and the
//! notification happen before the machine returns to `Idle` and accepts the
//! next request.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use slot_core::{SessionStats, SpinOutcome, SpinRequest, can_afford};

use crate::error::{ProviderError, ValidationError};
use crate::events::{SessionEvent, Settlement};
use crate::provider::{BalanceLedger, SpinProvider};

/// Lifecycle of the single spin slot of a game screen
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SpinLifecycleState {
    Idle,
    InFlight { request: SpinRequest },
    Settled { settlement: Box<Settlement> },
    Failed { error: ProviderError },
}

impl SpinLifecycleState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight { .. })
    }
}

/// Result of one `request_spin` call that passed local validation
#[derive(Debug, Clone, PartialEq)]
pub enum SpinAttempt {
    /// Outcome received and folded into the stats
    Settled(Settlement),
    /// Provider failed or timed out; nothing was recorded
    Failed(ProviderError),
    /// Another spin was in flight; no provider call was made
    Ignored,
}

impl SpinAttempt {
    pub fn settlement(&self) -> Option<&Settlement> {
        match self {
            Self::Settled(settlement) => Some(settlement),
            _ => None,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }
}

enum Admission {
    Accepted,
    Busy,
    Unaffordable,
}

struct MachineShared {
    provider: Arc<dyn SpinProvider>,
    ledger: Arc<dyn BalanceLedger>,
    state_tx: watch::Sender<SpinLifecycleState>,
    stats: Mutex<SessionStats>,
    last_error: Mutex<Option<ProviderError>>,
    events: broadcast::Sender<SessionEvent>,
    spin_timeout: Duration,
}

/// Single-flight spin state machine.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct SpinMachine {
    shared: Arc<MachineShared>,
}

impl SpinMachine {
    pub fn new(
        provider: Arc<dyn SpinProvider>,
        ledger: Arc<dyn BalanceLedger>,
        events: broadcast::Sender<SessionEvent>,
        spin_timeout: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(SpinLifecycleState::Idle);
        Self {
            shared: Arc::new(MachineShared {
                provider,
                ledger,
                state_tx,
                stats: Mutex::new(SessionStats::default()),
                last_error: Mutex::new(None),
                events,
                spin_timeout,
            }),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SpinLifecycleState {
        self.shared.state_tx.borrow().clone()
    }

    /// Receiver that observes every lifecycle change
    pub fn watch_state(&self) -> watch::Receiver<SpinLifecycleState> {
        self.shared.state_tx.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats.lock().clone()
    }

    /// Hand back the session totals and start again from zero.
    ///
    /// Waits until no spin is in flight, so a spin issued before the call is
    /// counted in the returned totals and never in the next session.
    pub async fn take_stats(&self) -> SessionStats {
        let mut state_rx = self.shared.state_tx.subscribe();
        loop {
            let mut taken = None;
            // Runs under the state lock, so no spin can be admitted meanwhile
            self.shared.state_tx.send_if_modified(|state| {
                if state.is_idle() {
                    taken = Some(std::mem::take(&mut *self.shared.stats.lock()));
                }
                false
            });
            if let Some(stats) = taken {
                return stats;
            }
            let settled = state_rx.wait_for(|state| state.is_idle()).await.is_ok();
            if !settled {
                return std::mem::take(&mut *self.shared.stats.lock());
            }
        }
    }

    /// Most recent provider failure, kept until cleared
    pub fn last_error(&self) -> Option<ProviderError> {
        self.shared.last_error.lock().clone()
    }

    pub fn clear_error(&self) {
        *self.shared.last_error.lock() = None;
    }

    /// Issue a spin if the machine is idle.
    ///
    /// Returns `Ok(SpinAttempt::Ignored)` without calling the provider when a
    /// spin is already in flight, and a [`ValidationError`] without touching
    /// the state when the balance cannot cover the bet.
    pub async fn request_spin(&self, request: SpinRequest) -> Result<SpinAttempt, ValidationError> {
        let balance = self.shared.ledger.balance();
        let mut admission = Admission::Busy;

        self.shared.state_tx.send_if_modified(|state| {
            if !state.is_idle() {
                return false;
            }
            if !can_afford(balance, request.bet_amount) {
                admission = Admission::Unaffordable;
                return false;
            }
            *state = SpinLifecycleState::InFlight {
                request: request.clone(),
            };
            admission = Admission::Accepted;
            true
        });

        match admission {
            Admission::Accepted => {}
            Admission::Busy => {
                log::debug!("[SpinMachine] Spin in flight, ignoring request");
                self.shared.emit(SessionEvent::SpinIgnored);
                return Ok(SpinAttempt::Ignored);
            }
            Admission::Unaffordable => {
                return Err(ValidationError::InsufficientBalance {
                    balance,
                    required: request.bet_amount,
                });
            }
        }

        log::debug!(
            "[SpinMachine] Spin issued: machine={} bet={}",
            request.machine_id,
            request.bet_amount
        );
        self.shared.emit(SessionEvent::SpinStarted {
            request: request.clone(),
        });

        let shared = Arc::clone(&self.shared);
        let task_request = request.clone();
        let task = tokio::spawn(async move { shared.run_attempt(task_request).await });

        match task.await {
            Ok(attempt) => Ok(attempt),
            Err(e) => {
                // The attempt task panicked; release the slot so the screen is usable
                log::error!("[SpinMachine] Spin task aborted: {}", e);
                let error = ProviderError::Transport(format!("spin task aborted: {}", e));
                self.shared.fail(request, error.clone());
                Ok(SpinAttempt::Failed(error))
            }
        }
    }
}

impl MachineShared {
    async fn run_attempt(&self, request: SpinRequest) -> SpinAttempt {
        let response = tokio::time::timeout(self.spin_timeout, self.provider.spin(&request)).await;

        let result = match response {
            Ok(Ok(outcome)) => outcome
                .check_shape()
                .map(|_| outcome)
                .map_err(ProviderError::MalformedOutcome),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProviderError::Timeout),
        };

        match result {
            Ok(outcome) => SpinAttempt::Settled(self.settle(request, outcome)),
            Err(error) => {
                log::warn!(
                    "[SpinMachine] Spin failed: machine={} bet={}: {}",
                    request.machine_id,
                    request.bet_amount,
                    error
                );
                self.fail(request, error.clone());
                SpinAttempt::Failed(error)
            }
        }
    }

    fn settle(&self, request: SpinRequest, outcome: SpinOutcome) -> Settlement {
        let stats = {
            let mut stats = self.stats.lock();
            stats.record(&outcome, request.bet_amount);
            stats.clone()
        };
        self.ledger.apply_settlement(&outcome);

        log::debug!(
            "[SpinMachine] Spin settled: win={} jackpot={} balance={}",
            outcome.credited_win(),
            outcome.is_jackpot,
            outcome.new_current_balance
        );

        let settlement = Settlement {
            request,
            outcome,
            stats,
        };
        self.state_tx.send_replace(SpinLifecycleState::Settled {
            settlement: Box::new(settlement.clone()),
        });
        self.emit(SessionEvent::SpinSettled(settlement.clone()));
        self.state_tx.send_replace(SpinLifecycleState::Idle);
        settlement
    }

    fn fail(&self, request: SpinRequest, error: ProviderError) {
        *self.last_error.lock() = Some(error.clone());
        self.state_tx.send_replace(SpinLifecycleState::Failed {
            error: error.clone(),
        });
        self.emit(SessionEvent::SpinFailed { request, error });
        self.state_tx.send_replace(SpinLifecycleState::Idle);
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SharedBalance;
    use crate::test_support::{ScriptStep, ScriptedProvider};
    use slot_core::MachineId;

    fn request(bet: u64) -> SpinRequest {
        SpinRequest::new(MachineId::new("test-machine"), bet)
    }

    fn machine(
        provider: Arc<ScriptedProvider>,
        balance: u64,
    ) -> (SpinMachine, Arc<SharedBalance>, broadcast::Receiver<SessionEvent>) {
        let ledger = Arc::new(SharedBalance::new(balance));
        let (events, rx) = broadcast::channel(64);
        let machine = SpinMachine::new(provider, ledger.clone(), events, Duration::from_secs(5));
        (machine, ledger, rx)
    }

    #[tokio::test]
    async fn test_settled_spin_updates_stats_and_balance() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptStep::win(40, 130)]));
        let (machine, ledger, mut rx) = machine(provider.clone(), 100);

        let attempt = machine.request_spin(request(10)).await.unwrap();
        let settlement = attempt.settlement().unwrap();

        assert_eq!(settlement.outcome.win_amount, 40);
        assert_eq!(settlement.stats.total_spins, 1);
        assert_eq!(machine.stats().total_winnings, 40);
        assert_eq!(ledger.balance(), 130);
        assert!(machine.state().is_idle());
        assert_eq!(provider.calls(), 1);

        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::SpinStarted { .. }));
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::SpinSettled(_)));
    }

    #[tokio::test]
    async fn test_unaffordable_spin_leaves_state_untouched() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptStep::loss(0)]));
        let (machine, _ledger, _rx) = machine(provider.clone(), 5);

        let result = machine.request_spin(request(10)).await;
        assert_eq!(
            result,
            Err(ValidationError::InsufficientBalance {
                balance: 5,
                required: 10
            })
        );
        assert!(machine.state().is_idle());
        assert_eq!(provider.calls(), 0);
        assert_eq!(machine.stats().total_spins, 0);
    }

    #[tokio::test]
    async fn test_second_request_while_in_flight_is_ignored() {
        let provider = Arc::new(ScriptedProvider::gated(vec![ScriptStep::loss(90)]));
        let (machine, _ledger, _rx) = machine(provider.clone(), 100);

        let first = {
            let machine = machine.clone();
            tokio::spawn(async move { machine.request_spin(request(10)).await })
        };
        provider.wait_for_calls(1).await;
        assert!(machine.state().is_in_flight());

        let second = machine.request_spin(request(10)).await.unwrap();
        assert!(second.is_ignored());
        assert_eq!(provider.calls(), 1);

        provider.release();
        let first = first.await.unwrap().unwrap();
        assert!(first.settlement().is_some());
        assert_eq!(machine.stats().total_spins, 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_provider_error_records_nothing() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptStep::Fail(
            ProviderError::Rejected("insufficient funds".into()),
        )]));
        let (machine, ledger, _rx) = machine(provider, 100);

        let attempt = machine.request_spin(request(10)).await.unwrap();
        assert_eq!(
            attempt,
            SpinAttempt::Failed(ProviderError::Rejected("insufficient funds".into()))
        );
        assert_eq!(machine.stats(), SessionStats::default());
        assert_eq!(ledger.balance(), 100);
        assert!(machine.state().is_idle());
        assert!(machine.last_error().is_some());

        machine.clear_error();
        assert!(machine.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_failure() {
        let provider = Arc::new(ScriptedProvider::gated(vec![ScriptStep::loss(90)]));
        let ledger = Arc::new(SharedBalance::new(100));
        let (events, _rx) = broadcast::channel(16);
        let machine = SpinMachine::new(provider, ledger, events, Duration::from_millis(500));

        let attempt = machine.request_spin(request(10)).await.unwrap();
        assert_eq!(attempt, SpinAttempt::Failed(ProviderError::Timeout));
        assert_eq!(machine.stats().total_spins, 0);
        assert!(machine.state().is_idle());
    }

    #[tokio::test]
    async fn test_empty_reels_are_malformed() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptStep::Outcome(
            SpinOutcome::loss(Vec::new(), 90),
        )]));
        let (machine, _ledger, _rx) = machine(provider, 100);

        let attempt = machine.request_spin(request(10)).await.unwrap();
        assert!(matches!(
            attempt,
            SpinAttempt::Failed(ProviderError::MalformedOutcome(_))
        ));
        assert_eq!(machine.stats().total_spins, 0);
    }

    #[tokio::test]
    async fn test_take_stats_waits_for_in_flight_spin() {
        let provider = Arc::new(ScriptedProvider::gated(vec![ScriptStep::win(500, 590)]));
        let (machine, _ledger, _rx) = machine(provider.clone(), 100);

        let spin = {
            let machine = machine.clone();
            tokio::spawn(async move { machine.request_spin(request(10)).await })
        };
        provider.wait_for_calls(1).await;

        let taken = {
            let machine = machine.clone();
            tokio::spawn(async move { machine.take_stats().await })
        };
        tokio::task::yield_now().await;
        assert!(!taken.is_finished());

        provider.release();
        spin.await.unwrap().unwrap();
        let totals = taken.await.unwrap();

        assert_eq!(totals.total_spins, 1);
        assert_eq!(totals.total_winnings, 500);
        assert_eq!(machine.stats(), SessionStats::default());
    }

    #[tokio::test]
    async fn test_dropped_caller_still_settles() {
        let provider = Arc::new(ScriptedProvider::gated(vec![ScriptStep::win(25, 115)]));
        let (machine, ledger, _rx) = machine(provider.clone(), 100);

        let caller = {
            let machine = machine.clone();
            tokio::spawn(async move { machine.request_spin(request(10)).await })
        };
        provider.wait_for_calls(1).await;
        caller.abort();
        let _ = caller.await;

        let mut state_rx = machine.watch_state();
        provider.release();
        state_rx.wait_for(|s| s.is_idle()).await.unwrap();

        assert_eq!(machine.stats().total_spins, 1);
        assert_eq!(ledger.balance(), 115);
    }
}
