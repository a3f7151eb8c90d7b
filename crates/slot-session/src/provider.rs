//! External collaborators: the spin authority and the balance owner

use async_trait::async_trait;
use parking_lot::RwLock;

use slot_core::{Credits, MachineId, SpinOutcome, SpinRequest};

use crate::error::ProviderError;

/// The remote authority that decides spin outcomes.
///
/// Called at most once at a time per session; implementations need not
/// support pipelining.
#[async_trait]
pub trait SpinProvider: Send + Sync {
    /// Request an outcome for `(machine_id, bet_amount)`
    async fn spin(&self, request: &SpinRequest) -> Result<SpinOutcome, ProviderError>;

    /// Best-effort notice that a local auto-spin run was cancelled.
    /// Failures are logged by the caller and otherwise ignored.
    async fn stop_auto_spin(&self, _machine_id: &MachineId) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Owner of the player's balance.
///
/// The session only reads it for affordability checks and forwards the
/// authoritative post-spin values; it never computes a balance itself.
pub trait BalanceLedger: Send + Sync {
    fn balance(&self) -> Credits;

    /// Store the balance and crypto reward reported by a settled spin
    fn apply_settlement(&self, outcome: &SpinOutcome);
}

/// In-memory ledger
#[derive(Debug, Default)]
pub struct SharedBalance {
    balance: RwLock<Credits>,
    crypto: RwLock<f64>,
}

impl SharedBalance {
    pub fn new(balance: Credits) -> Self {
        Self {
            balance: RwLock::new(balance),
            crypto: RwLock::new(0.0),
        }
    }

    /// Overwrite the balance (deposits, external refreshes)
    pub fn set_balance(&self, balance: Credits) {
        *self.balance.write() = balance;
    }

    pub fn crypto_balance(&self) -> f64 {
        *self.crypto.read()
    }
}

impl BalanceLedger for SharedBalance {
    fn balance(&self) -> Credits {
        *self.balance.read()
    }

    fn apply_settlement(&self, outcome: &SpinOutcome) {
        *self.balance.write() = outcome.new_current_balance;
        *self.crypto.write() += outcome.credited_crypto();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_balance_takes_remote_value() {
        let ledger = SharedBalance::new(100);
        let outcome = SpinOutcome::win(vec!["7".into()], 50, 140).with_crypto(0.5);

        ledger.apply_settlement(&outcome);
        assert_eq!(ledger.balance(), 140);
        assert!((ledger.crypto_balance() - 0.5).abs() < 1e-9);

        ledger.set_balance(10);
        assert_eq!(ledger.balance(), 10);
    }
}
