//! Game session facade
//!
//! One `GameSession` per open slot machine screen. It owns the spin machine,
//! the auto-spin scheduler and the bet selector, and exposes the typed API
//! the UI calls.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};

use slot_core::{
    BetSelector, ClientConfig, Credits, MachineConfig, SessionConfig, SessionStats, SpinRequest,
    can_afford_auto_spin,
};

use crate::autospin::{AutoSpinParams, AutoSpinPolicy, AutoSpinRun, AutoSpinScheduler};
use crate::error::{ProviderError, ValidationError};
use crate::events::SessionEvent;
use crate::machine::{SpinAttempt, SpinLifecycleState, SpinMachine};
use crate::provider::{BalanceLedger, SpinProvider};

/// Capacity of the notification channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct GameSession {
    machine_config: MachineConfig,
    session_config: SessionConfig,
    bet: Arc<RwLock<BetSelector>>,
    ledger: Arc<dyn BalanceLedger>,
    machine: SpinMachine,
    scheduler: AutoSpinScheduler,
    events: broadcast::Sender<SessionEvent>,
}

impl GameSession {
    pub fn new(
        config: ClientConfig,
        provider: Arc<dyn SpinProvider>,
        ledger: Arc<dyn BalanceLedger>,
    ) -> Self {
        let ClientConfig { machine, session } = config;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let bet = Arc::new(RwLock::new(BetSelector::with_bet(
            machine.bet_limits,
            machine.initial_bet(),
        )));
        let spin_machine = SpinMachine::new(
            Arc::clone(&provider),
            Arc::clone(&ledger),
            events.clone(),
            session.spin_timeout(),
        );
        let scheduler = AutoSpinScheduler::new(
            spin_machine.clone(),
            machine.machine_id.clone(),
            Arc::clone(&bet),
            Arc::clone(&ledger),
            provider,
            events.clone(),
            session.inter_spin_delay(),
        );

        log::info!(
            "[Session] Opened machine '{}' (bet {}..={} step {})",
            machine.machine_id,
            machine.bet_limits.min_bet,
            machine.bet_limits.max_bet,
            machine.bet_limits.increment
        );

        Self {
            machine_config: machine,
            session_config: session,
            bet,
            ledger,
            machine: spin_machine,
            scheduler,
            events,
        }
    }

    pub fn machine_config(&self) -> &MachineConfig {
        &self.machine_config
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// Subscribe to session notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SpinLifecycleState {
        self.machine.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<SpinLifecycleState> {
        self.machine.watch_state()
    }

    pub fn stats(&self) -> SessionStats {
        self.machine.stats()
    }

    pub fn balance(&self) -> Credits {
        self.ledger.balance()
    }

    /// Session-level error message from the last failed spin
    pub fn last_error(&self) -> Option<ProviderError> {
        self.machine.last_error()
    }

    pub fn clear_error(&self) {
        self.machine.clear_error();
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BET
    // ═══════════════════════════════════════════════════════════════════════

    pub fn bet(&self) -> Credits {
        self.bet.read().current()
    }

    /// Set the bet (clamped). Accepted while a spin is in flight; applies
    /// from the next request on.
    pub fn set_bet(&self, requested: Credits) -> Credits {
        self.update_bet(|selector| selector.set(requested))
    }

    pub fn increase_bet(&self) -> Credits {
        self.update_bet(BetSelector::increase)
    }

    pub fn decrease_bet(&self) -> Credits {
        self.update_bet(BetSelector::decrease)
    }

    pub fn max_bet(&self) -> Credits {
        self.update_bet(BetSelector::set_max)
    }

    pub fn min_bet(&self) -> Credits {
        self.update_bet(BetSelector::set_min)
    }

    fn update_bet(&self, change: impl FnOnce(&mut BetSelector) -> Credits) -> Credits {
        let (before, after) = {
            let mut selector = self.bet.write();
            let before = selector.current();
            (before, change(&mut selector))
        };
        if before != after {
            log::debug!("[Session] Bet changed: {} -> {}", before, after);
            let _ = self.events.send(SessionEvent::BetChanged { bet: after });
        }
        after
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SPINS
    // ═══════════════════════════════════════════════════════════════════════

    /// Manual spin at the current bet.
    ///
    /// A tap while a spin is in flight, or while an auto-spin run owns the
    /// machine, is a no-op.
    pub async fn spin(&self) -> Result<SpinAttempt, ValidationError> {
        if self.scheduler.is_active() {
            log::debug!("[Session] Auto-spin active, ignoring manual spin");
            let _ = self.events.send(SessionEvent::SpinIgnored);
            return Ok(SpinAttempt::Ignored);
        }
        let request = SpinRequest::new(self.machine_config.machine_id.clone(), self.bet());
        self.machine.request_spin(request).await
    }

    /// Auto-spin counts offered to the player
    pub fn presets(&self) -> &[u32] {
        &self.session_config.auto_spin_presets
    }

    pub fn can_afford_auto_spin(&self, spins: u32) -> bool {
        can_afford_auto_spin(self.balance(), self.bet(), spins)
    }

    /// Parameters for `spins` auto-spins using the configured big-win
    /// multiple of the current bet
    pub fn auto_spin_params(&self, spins: u32) -> AutoSpinParams {
        AutoSpinParams {
            spins,
            stop_on_jackpot: false,
            stop_on_big_win: false,
            big_win_threshold: self.session_config.big_win_threshold(self.bet()),
        }
    }

    pub fn start_auto_spin(&self, params: AutoSpinParams) -> Result<AutoSpinRun, ValidationError> {
        self.scheduler.start(params)
    }

    /// Returns `false` if no run was active
    pub fn stop_auto_spin(&self) -> bool {
        self.scheduler.stop()
    }

    pub fn is_auto_spinning(&self) -> bool {
        self.scheduler.is_active()
    }

    pub fn auto_spin_policy(&self) -> Option<AutoSpinPolicy> {
        self.scheduler.policy()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SESSION SCOPE
    // ═══════════════════════════════════════════════════════════════════════

    /// Start a fresh statistics scope. Any auto-spin run is stopped; a spin
    /// still in flight settles into the scope being closed.
    pub async fn reset_session(&self) {
        self.close_scope().await;
    }

    /// Close the statistics scope, returning its final totals
    pub async fn end_session(&self) -> SessionStats {
        let stats = self.close_scope().await;
        log::info!(
            "[Session] Session ended: spins={} net={} rtp={:.1}%",
            stats.total_spins,
            stats.net_profit,
            stats.rtp()
        );
        stats
    }

    async fn close_scope(&self) -> SessionStats {
        self.scheduler.stop();
        let stats = self.machine.take_stats().await;
        self.machine.clear_error();
        log::info!("[Session] Session reset");
        let _ = self.events.send(SessionEvent::SessionReset);
        stats
    }
}
