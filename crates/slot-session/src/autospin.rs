//! Auto-spin policy and scheduler
//!
//! The scheduler drives [`SpinMachine`] one spin at a time. After each settled
//! spin it decrements the run's remaining count and checks the stop
//! conditions against that spin only; the pause before the next spin can be
//! cancelled, the in-flight spin cannot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use slot_core::{
    BetSelector, Credits, MachineId, SessionStats, SpinOutcome, SpinRequest, can_afford_auto_spin,
};

use crate::error::{ProviderError, ValidationError};
use crate::events::SessionEvent;
use crate::machine::{SpinAttempt, SpinMachine};
use crate::provider::{BalanceLedger, SpinProvider};

/// What the player asked for when starting a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSpinParams {
    pub spins: u32,
    pub stop_on_jackpot: bool,
    pub stop_on_big_win: bool,
    /// Minimum win that counts as a big win
    pub big_win_threshold: Credits,
}

impl AutoSpinParams {
    /// Run without stop conditions
    pub fn new(spins: u32) -> Self {
        Self {
            spins,
            stop_on_jackpot: false,
            stop_on_big_win: false,
            big_win_threshold: Credits::MAX,
        }
    }

    pub fn stop_on_jackpot(mut self) -> Self {
        self.stop_on_jackpot = true;
        self
    }

    pub fn stop_on_big_win(mut self, threshold: Credits) -> Self {
        self.stop_on_big_win = true;
        self.big_win_threshold = threshold;
        self
    }
}

/// State of an active run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSpinPolicy {
    pub total_requested: u32,
    pub remaining: u32,
    pub stop_on_jackpot: bool,
    pub stop_on_big_win: bool,
    pub big_win_threshold: Credits,
}

/// Decision taken after a settled spin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    Continue,
    Stop(AutoSpinStopReason),
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum AutoSpinStopReason {
    /// All requested spins settled
    Exhausted,
    /// Stop-on-jackpot fired
    Jackpot,
    /// Stop-on-big-win fired
    BigWin,
    /// Stopped by the player
    Cancelled,
    /// A spin failed; the run ends without retrying
    Failed(ProviderError),
    /// A spin was refused locally (e.g. the balance ran out mid-run)
    Rejected(ValidationError),
}

impl AutoSpinPolicy {
    pub fn new(params: AutoSpinParams) -> Self {
        Self {
            total_requested: params.spins,
            remaining: params.spins,
            stop_on_jackpot: params.stop_on_jackpot,
            stop_on_big_win: params.stop_on_big_win,
            big_win_threshold: params.big_win_threshold,
        }
    }

    /// Spins settled so far in this run
    pub fn settled(&self) -> u32 {
        self.total_requested - self.remaining
    }

    /// Count one settled spin and decide whether the run goes on.
    ///
    /// A stop condition and exhaustion are independent; either ends the run.
    /// When both hold, the stop condition is reported.
    pub fn record_settled(&mut self, outcome: &SpinOutcome) -> Continuation {
        self.remaining = self.remaining.saturating_sub(1);

        if self.stop_on_jackpot && outcome.is_jackpot {
            Continuation::Stop(AutoSpinStopReason::Jackpot)
        } else if self.stop_on_big_win
            && outcome.is_win
            && outcome.win_amount >= self.big_win_threshold
        {
            Continuation::Stop(AutoSpinStopReason::BigWin)
        } else if self.remaining == 0 {
            Continuation::Stop(AutoSpinStopReason::Exhausted)
        } else {
            Continuation::Continue
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSpinReport {
    pub policy: AutoSpinPolicy,
    pub reason: AutoSpinStopReason,
    /// Stats over the spins of this run only
    pub run_stats: SessionStats,
}

impl AutoSpinReport {
    pub fn settled(&self) -> u32 {
        self.policy.settled()
    }
}

/// Handle to a started run
pub struct AutoSpinRun {
    id: u64,
    task: JoinHandle<AutoSpinReport>,
}

impl AutoSpinRun {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the run to end. `None` if the run task was aborted.
    pub async fn finished(self) -> Option<AutoSpinReport> {
        match self.task.await {
            Ok(report) => Some(report),
            Err(e) => {
                log::error!("[AutoSpin] Run {} task failed: {}", self.id, e);
                None
            }
        }
    }
}

struct ActiveRun {
    id: u64,
    stop_tx: watch::Sender<bool>,
    policy: Arc<Mutex<AutoSpinPolicy>>,
}

struct SchedulerShared {
    machine: SpinMachine,
    machine_id: MachineId,
    bet: Arc<RwLock<BetSelector>>,
    ledger: Arc<dyn BalanceLedger>,
    provider: Arc<dyn SpinProvider>,
    events: broadcast::Sender<SessionEvent>,
    inter_spin_delay: Duration,
    active: Mutex<Option<ActiveRun>>,
    next_id: AtomicU64,
}

/// Runs at most one auto-spin run at a time over a [`SpinMachine`]
#[derive(Clone)]
pub struct AutoSpinScheduler {
    shared: Arc<SchedulerShared>,
}

impl AutoSpinScheduler {
    pub fn new(
        machine: SpinMachine,
        machine_id: MachineId,
        bet: Arc<RwLock<BetSelector>>,
        ledger: Arc<dyn BalanceLedger>,
        provider: Arc<dyn SpinProvider>,
        events: broadcast::Sender<SessionEvent>,
        inter_spin_delay: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                machine,
                machine_id,
                bet,
                ledger,
                provider,
                events,
                inter_spin_delay,
                active: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.lock().is_some()
    }

    /// Snapshot of the active run's policy
    pub fn policy(&self) -> Option<AutoSpinPolicy> {
        self.shared
            .active
            .lock()
            .as_ref()
            .map(|run| run.policy.lock().clone())
    }

    /// Start a run. Rejected when a run is active, a spin is in flight, the
    /// count is zero, or the balance cannot cover `spins` bets.
    pub fn start(&self, params: AutoSpinParams) -> Result<AutoSpinRun, ValidationError> {
        if params.spins == 0 {
            return Err(ValidationError::InvalidSpinCount);
        }

        let mut active = self.shared.active.lock();
        if active.is_some() {
            return Err(ValidationError::AutoSpinActive);
        }
        if !self.shared.machine.state().is_idle() {
            return Err(ValidationError::SpinInProgress);
        }

        let bet = self.shared.bet.read().current();
        let balance = self.shared.ledger.balance();
        if !can_afford_auto_spin(balance, bet, params.spins) {
            return Err(ValidationError::InsufficientBalanceForAutoSpin {
                balance,
                bet,
                spins: params.spins,
                required: bet.saturating_mul(Credits::from(params.spins)),
            });
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let policy = AutoSpinPolicy::new(params);
        let policy_cell = Arc::new(Mutex::new(policy.clone()));
        let (stop_tx, stop_rx) = watch::channel(false);

        *active = Some(ActiveRun {
            id,
            stop_tx,
            policy: Arc::clone(&policy_cell),
        });
        drop(active);

        log::info!(
            "[AutoSpin] Run {} started: spins={} bet={} stop_on_jackpot={} stop_on_big_win={}",
            id,
            params.spins,
            bet,
            params.stop_on_jackpot,
            params.stop_on_big_win
        );
        self.shared.emit(SessionEvent::AutoSpinStarted(policy));

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let report = shared.drive(policy_cell, stop_rx).await;
            shared.finish(id, &report);
            report
        });

        Ok(AutoSpinRun { id, task })
    }

    /// Stop the active run. A pending pause is cancelled at once; a spin in
    /// flight settles normally and no further spin is issued.
    ///
    /// Returns `false` when no run is active.
    pub fn stop(&self) -> bool {
        let stopped = match self.shared.active.lock().as_ref() {
            Some(run) => {
                run.stop_tx.send_replace(true);
                log::info!("[AutoSpin] Run {} stop requested", run.id);
                true
            }
            None => false,
        };

        if stopped {
            self.notify_remote_stop();
        }
        stopped
    }

    fn notify_remote_stop(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::debug!("[AutoSpin] No runtime, skipping remote stop notice");
            return;
        };

        let provider = Arc::clone(&self.shared.provider);
        let machine_id = self.shared.machine_id.clone();
        handle.spawn(async move {
            if let Err(e) = provider.stop_auto_spin(&machine_id).await {
                log::warn!("[AutoSpin] Remote stop notice failed: {}", e);
            }
        });
    }
}

impl SchedulerShared {
    async fn drive(
        &self,
        policy: Arc<Mutex<AutoSpinPolicy>>,
        mut stop_rx: watch::Receiver<bool>,
    ) -> AutoSpinReport {
        let mut run_stats = SessionStats::default();

        let reason = loop {
            if stop_requested(&stop_rx) {
                break AutoSpinStopReason::Cancelled;
            }

            let bet = self.bet.read().current();
            let request = SpinRequest::new(self.machine_id.clone(), bet);

            let attempt = match self.machine.request_spin(request).await {
                Ok(attempt) => attempt,
                Err(e) => break AutoSpinStopReason::Rejected(e),
            };

            let settlement = match attempt {
                SpinAttempt::Settled(settlement) => settlement,
                SpinAttempt::Failed(error) => break AutoSpinStopReason::Failed(error),
                SpinAttempt::Ignored => {
                    // A manual spin got there first; retry once it settles
                    if self.wait_for_idle(&mut stop_rx).await {
                        continue;
                    }
                    break AutoSpinStopReason::Cancelled;
                }
            };

            run_stats.record(&settlement.outcome, settlement.bet_amount());
            let (verdict, snapshot) = {
                let mut policy = policy.lock();
                let verdict = policy.record_settled(&settlement.outcome);
                (verdict, policy.clone())
            };
            self.emit(SessionEvent::AutoSpinProgress(snapshot));

            if let Continuation::Stop(reason) = verdict {
                break reason;
            }
            if stop_requested(&stop_rx) {
                break AutoSpinStopReason::Cancelled;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.inter_spin_delay) => {}
                _ = wait_for_stop(&mut stop_rx) => break AutoSpinStopReason::Cancelled,
            }
        };

        let policy = policy.lock().clone();
        AutoSpinReport {
            policy,
            reason,
            run_stats,
        }
    }

    /// Wait until the machine is idle again. `false` if stopped meanwhile.
    async fn wait_for_idle(&self, stop_rx: &mut watch::Receiver<bool>) -> bool {
        let mut state_rx = self.machine.watch_state();
        tokio::select! {
            idle = async { state_rx.wait_for(|state| state.is_idle()).await.is_ok() } => idle,
            _ = wait_for_stop(stop_rx) => false,
        }
    }

    fn finish(&self, id: u64, report: &AutoSpinReport) {
        {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(|run| run.id == id) {
                *active = None;
            }
        }

        match &report.reason {
            AutoSpinStopReason::Failed(e) => {
                log::warn!(
                    "[AutoSpin] Run {} ended after {} spins: {}",
                    id,
                    report.settled(),
                    e
                );
            }
            reason => {
                log::info!(
                    "[AutoSpin] Run {} ended after {} spins: {:?}",
                    id,
                    report.settled(),
                    reason
                );
            }
        }
        self.emit(SessionEvent::AutoSpinFinished(report.clone()));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

fn stop_requested(stop_rx: &watch::Receiver<bool>) -> bool {
    *stop_rx.borrow()
}

/// Resolves once a stop is requested or the run's stop sender is gone
async fn wait_for_stop(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use slot_core::Symbol;

    fn reels() -> Vec<Symbol> {
        vec!["7".into(), "7".into(), "BAR".into()]
    }

    #[test]
    fn test_policy_exhausts() {
        let mut policy = AutoSpinPolicy::new(AutoSpinParams::new(2));
        let loss = SpinOutcome::loss(reels(), 0);

        assert_eq!(policy.record_settled(&loss), Continuation::Continue);
        assert_eq!(policy.remaining, 1);
        assert_eq!(
            policy.record_settled(&loss),
            Continuation::Stop(AutoSpinStopReason::Exhausted)
        );
        assert_eq!(policy.remaining, 0);
        assert_eq!(policy.settled(), 2);
    }

    #[test]
    fn test_policy_jackpot_only_when_enabled() {
        let jackpot = SpinOutcome::win(reels(), 500, 0).with_jackpot();

        let mut policy = AutoSpinPolicy::new(AutoSpinParams::new(5));
        assert_eq!(policy.record_settled(&jackpot), Continuation::Continue);

        let mut policy = AutoSpinPolicy::new(AutoSpinParams::new(5).stop_on_jackpot());
        assert_eq!(
            policy.record_settled(&jackpot),
            Continuation::Stop(AutoSpinStopReason::Jackpot)
        );
        assert_eq!(policy.remaining, 4);
    }

    #[test]
    fn test_policy_big_win_threshold_inclusive() {
        let mut policy = AutoSpinPolicy::new(AutoSpinParams::new(5).stop_on_big_win(200));

        assert_eq!(
            policy.record_settled(&SpinOutcome::win(reels(), 199, 0)),
            Continuation::Continue
        );
        assert_eq!(
            policy.record_settled(&SpinOutcome::win(reels(), 200, 0)),
            Continuation::Stop(AutoSpinStopReason::BigWin)
        );
    }

    #[test]
    fn test_policy_big_win_requires_win_flag() {
        let mut policy = AutoSpinPolicy::new(AutoSpinParams::new(5).stop_on_big_win(100));
        let mut outcome = SpinOutcome::loss(reels(), 0);
        outcome.win_amount = 1_000;
        assert_eq!(policy.record_settled(&outcome), Continuation::Continue);
    }

    #[test]
    fn test_policy_last_spin_big_win_ends_run_either_way() {
        let mut policy = AutoSpinPolicy::new(AutoSpinParams::new(1).stop_on_big_win(100));
        let verdict = policy.record_settled(&SpinOutcome::win(reels(), 150, 0));
        assert_eq!(verdict, Continuation::Stop(AutoSpinStopReason::BigWin));
        assert_eq!(policy.remaining, 0);
    }
}
