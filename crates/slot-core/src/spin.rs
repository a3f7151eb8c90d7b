//! Spin requests and outcomes

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Credits;

/// Identifier of a slot machine on the remote side
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MachineId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A reel symbol as reported by the remote authority (e.g. "CHERRY", "7")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One spin attempt. Built fresh for every attempt, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinRequest {
    pub machine_id: MachineId,
    pub bet_amount: Credits,
}

impl SpinRequest {
    pub fn new(machine_id: MachineId, bet_amount: Credits) -> Self {
        Self {
            machine_id,
            bet_amount,
        }
    }
}

/// Outcome reported by the remote authority.
///
/// Trusted as given: payouts are not recomputed locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinOutcome {
    /// Symbols shown on the reels, left to right
    pub reels: Vec<Symbol>,
    /// Credits won by this spin
    pub win_amount: Credits,
    pub is_win: bool,
    pub is_jackpot: bool,
    /// Secondary reward earned alongside the spin
    #[serde(default)]
    pub crypto_earned: f64,
    /// Authoritative balance after this spin was settled remotely
    pub new_current_balance: Credits,
}

impl SpinOutcome {
    /// Losing outcome
    pub fn loss(reels: Vec<Symbol>, new_current_balance: Credits) -> Self {
        Self {
            reels,
            win_amount: 0,
            is_win: false,
            is_jackpot: false,
            crypto_earned: 0.0,
            new_current_balance,
        }
    }

    /// Winning outcome
    pub fn win(reels: Vec<Symbol>, win_amount: Credits, new_current_balance: Credits) -> Self {
        Self {
            reels,
            win_amount,
            is_win: true,
            is_jackpot: false,
            crypto_earned: 0.0,
            new_current_balance,
        }
    }

    /// Mark as jackpot
    pub fn with_jackpot(mut self) -> Self {
        self.is_jackpot = true;
        self
    }

    pub fn with_crypto(mut self, crypto_earned: f64) -> Self {
        self.crypto_earned = crypto_earned;
        self
    }

    /// Win amount counted towards statistics (zero on a loss)
    pub fn credited_win(&self) -> Credits {
        if self.is_win { self.win_amount } else { 0 }
    }

    /// Crypto earned, with non-finite or negative reports read as zero
    pub fn credited_crypto(&self) -> f64 {
        if self.crypto_earned.is_finite() && self.crypto_earned > 0.0 {
            self.crypto_earned
        } else {
            0.0
        }
    }

    /// Structural check only: an outcome must show at least one symbol
    pub fn check_shape(&self) -> Result<(), String> {
        if self.reels.is_empty() {
            return Err("outcome carries no reel symbols".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reels() -> Vec<Symbol> {
        vec!["CHERRY".into(), "BAR".into(), "7".into()]
    }

    #[test]
    fn test_outcome_wire_format() {
        let outcome: SpinOutcome = serde_json::from_value(json!({
            "reels": ["7", "7", "7"],
            "winAmount": 500,
            "isWin": true,
            "isJackpot": true,
            "cryptoEarned": 0.25,
            "newCurrentBalance": 1490
        }))
        .unwrap();

        assert_eq!(outcome.reels.len(), 3);
        assert_eq!(outcome.reels[0].name(), "7");
        assert_eq!(outcome.win_amount, 500);
        assert!(outcome.is_jackpot);
        assert_eq!(outcome.new_current_balance, 1490);
    }

    #[test]
    fn test_outcome_crypto_defaults_to_zero() {
        let outcome: SpinOutcome = serde_json::from_value(json!({
            "reels": ["BAR"],
            "winAmount": 0,
            "isWin": false,
            "isJackpot": false,
            "newCurrentBalance": 90
        }))
        .unwrap();
        assert_eq!(outcome.crypto_earned, 0.0);
    }

    #[test]
    fn test_outcome_missing_field_rejected() {
        let result: Result<SpinOutcome, _> = serde_json::from_value(json!({
            "reels": ["BAR"],
            "isWin": false
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_credited_win_ignores_loss_amount() {
        let mut outcome = SpinOutcome::loss(reels(), 90);
        outcome.win_amount = 40;
        assert_eq!(outcome.credited_win(), 0);

        let outcome = SpinOutcome::win(reels(), 40, 130);
        assert_eq!(outcome.credited_win(), 40);
    }

    #[test]
    fn test_credited_crypto_sanitised() {
        let outcome = SpinOutcome::loss(reels(), 0).with_crypto(f64::NAN);
        assert_eq!(outcome.credited_crypto(), 0.0);
        let outcome = SpinOutcome::loss(reels(), 0).with_crypto(-1.0);
        assert_eq!(outcome.credited_crypto(), 0.0);
        let outcome = SpinOutcome::loss(reels(), 0).with_crypto(0.5);
        assert_eq!(outcome.credited_crypto(), 0.5);
    }

    #[test]
    fn test_check_shape() {
        assert!(SpinOutcome::loss(reels(), 0).check_shape().is_ok());
        assert!(SpinOutcome::loss(Vec::new(), 0).check_shape().is_err());
    }

    #[test]
    fn test_request_serialization() {
        let request = SpinRequest::new(MachineId::new("lucky-7"), 50);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["machineId"], "lucky-7");
        assert_eq!(value["betAmount"], 50);
    }
}
