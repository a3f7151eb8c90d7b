//! Client configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Credits;
use crate::bet::{BetError, BetLimits};
use crate::spin::MachineId;

/// Default pause between auto-spins (ms)
pub const DEFAULT_INTER_SPIN_DELAY_MS: u64 = 1000;

/// Default timeout for one remote spin call (ms)
pub const DEFAULT_SPIN_TIMEOUT_MS: u64 = 10_000;

/// Static per-machine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    pub machine_id: MachineId,
    /// Display name
    #[serde(default)]
    pub name: String,
    pub bet_limits: BetLimits,
    /// Bet selected when the machine is opened (defaults to `min_bet`)
    #[serde(default)]
    pub default_bet: Option<Credits>,
}

impl MachineConfig {
    pub fn new(machine_id: impl Into<String>, bet_limits: BetLimits) -> Self {
        let machine_id = MachineId::new(machine_id);
        Self {
            name: machine_id.to_string(),
            machine_id,
            bet_limits,
            default_bet: None,
        }
    }

    pub fn initial_bet(&self) -> Credits {
        self.default_bet.unwrap_or(self.bet_limits.min_bet)
    }

    pub fn validate(&self) -> Result<(), BetError> {
        self.bet_limits.validate()?;
        if let Some(bet) = self.default_bet {
            if bet < self.bet_limits.min_bet || bet > self.bet_limits.max_bet {
                return Err(BetError::DefaultOutOfRange {
                    bet,
                    min: self.bet_limits.min_bet,
                    max: self.bet_limits.max_bet,
                });
            }
            if !self.bet_limits.is_valid(bet) {
                return Err(BetError::DefaultOffStep {
                    bet,
                    increment: self.bet_limits.increment,
                });
            }
        }
        Ok(())
    }
}

/// Inter-spin pacing presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingProfile {
    /// Normal gameplay pacing
    #[default]
    Normal,
    /// Fast/Turbo mode
    Turbo,
    /// Studio mode (no pause, for testing)
    Studio,
}

impl TimingProfile {
    pub fn inter_spin_delay_ms(&self) -> u64 {
        match self {
            Self::Normal => DEFAULT_INTER_SPIN_DELAY_MS,
            Self::Turbo => 250,
            Self::Studio => 0,
        }
    }
}

/// Session pacing and auto-spin settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pause between a settled auto-spin and the next request (ms)
    pub inter_spin_delay_ms: u64,
    /// Timeout applied to every remote spin call (ms)
    pub spin_timeout_ms: u64,
    /// Auto-spin counts offered to the player
    pub auto_spin_presets: Vec<u32>,
    /// Big-win threshold as a multiple of the bet, used when a run does not
    /// name an explicit threshold
    pub default_big_win_multiplier: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inter_spin_delay_ms: DEFAULT_INTER_SPIN_DELAY_MS,
            spin_timeout_ms: DEFAULT_SPIN_TIMEOUT_MS,
            auto_spin_presets: vec![10, 25, 50, 100],
            default_big_win_multiplier: 15,
        }
    }
}

impl SessionConfig {
    pub fn from_profile(profile: TimingProfile) -> Self {
        Self {
            inter_spin_delay_ms: profile.inter_spin_delay_ms(),
            ..Self::default()
        }
    }

    pub fn inter_spin_delay(&self) -> Duration {
        Duration::from_millis(self.inter_spin_delay_ms)
    }

    pub fn spin_timeout(&self) -> Duration {
        Duration::from_millis(self.spin_timeout_ms)
    }

    /// Threshold derived from `default_big_win_multiplier` for a given bet
    pub fn big_win_threshold(&self, bet: Credits) -> Credits {
        bet.saturating_mul(self.default_big_win_multiplier)
    }
}

/// Full client configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub machine: MachineConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl ClientConfig {
    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        let config = match extension.as_deref() {
            Some("json") => Self::from_json(&content)?,
            Some("yaml") | Some("yml") => Self::from_yaml(&content)?,
            other => {
                return Err(ConfigError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ));
            }
        };

        log::info!(
            "[Config] Loaded machine '{}' from {}",
            config.machine.machine_id,
            path.display()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.machine.validate()?;
        if self.session.spin_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "spin_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.session.auto_spin_presets.contains(&0) {
            return Err(ConfigError::Invalid(
                "auto-spin presets must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid bet limits: {0}")]
    Bet(#[from] BetError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
machine:
  machine_id: lucky-7
  name: Lucky Sevens
  bet_limits:
    min_bet: 10
    max_bet: 1000
    increment: 10
  default_bet: 50
session:
  inter_spin_delay_ms: 500
"#;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.inter_spin_delay_ms, 1000);
        assert_eq!(config.spin_timeout_ms, 10_000);
        assert_eq!(config.auto_spin_presets, vec![10, 25, 50, 100]);
        assert_eq!(config.big_win_threshold(20), 300);
    }

    #[test]
    fn test_timing_profiles() {
        assert_eq!(SessionConfig::from_profile(TimingProfile::Normal).inter_spin_delay_ms, 1000);
        assert_eq!(SessionConfig::from_profile(TimingProfile::Turbo).inter_spin_delay_ms, 250);
        assert_eq!(SessionConfig::from_profile(TimingProfile::Studio).inter_spin_delay_ms, 0);
    }

    #[test]
    fn test_parse_yaml_with_partial_session() {
        let config = ClientConfig::from_yaml(YAML).unwrap();
        assert_eq!(config.machine.machine_id.as_str(), "lucky-7");
        assert_eq!(config.machine.initial_bet(), 50);
        assert_eq!(config.session.inter_spin_delay_ms, 500);
        // Unspecified fields fall back to defaults
        assert_eq!(config.session.spin_timeout_ms, 10_000);
    }

    #[test]
    fn test_parse_json_without_session() {
        let json = r#"{
            "machine": {
                "machine_id": "classic",
                "bet_limits": { "min_bet": 5, "max_bet": 100, "increment": 5 }
            }
        }"#;
        let config = ClientConfig::from_json(json).unwrap();
        assert_eq!(config.machine.initial_bet(), 5);
        assert_eq!(config.session.inter_spin_delay_ms, 1000);
    }

    #[test]
    fn test_reject_default_bet_out_of_range() {
        let json = r#"{
            "machine": {
                "machine_id": "classic",
                "bet_limits": { "min_bet": 5, "max_bet": 100, "increment": 5 },
                "default_bet": 500
            }
        }"#;
        assert!(matches!(
            ClientConfig::from_json(json),
            Err(ConfigError::Bet(BetError::DefaultOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_reject_unaligned_config() {
        let off_step_default = r#"{
            "machine": {
                "machine_id": "classic",
                "bet_limits": { "min_bet": 5, "max_bet": 100, "increment": 5 },
                "default_bet": 12
            }
        }"#;
        assert!(matches!(
            ClientConfig::from_json(off_step_default),
            Err(ConfigError::Bet(BetError::DefaultOffStep { bet: 12, increment: 5 }))
        ));

        let off_step_max = r#"{
            "machine": {
                "machine_id": "classic",
                "bet_limits": { "min_bet": 10, "max_bet": 995, "increment": 10 }
            }
        }"#;
        assert!(matches!(
            ClientConfig::from_json(off_step_max),
            Err(ConfigError::Bet(BetError::MaxOffStep { .. }))
        ));
    }

    #[test]
    fn test_reject_zero_timeout() {
        let json = r#"{
            "machine": {
                "machine_id": "classic",
                "bet_limits": { "min_bet": 5, "max_bet": 100, "increment": 5 }
            },
            "session": { "spin_timeout_ms": 0 }
        }"#;
        assert!(matches!(
            ClientConfig::from_json(json),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.machine.name, "Lucky Sevens");
    }

    #[test]
    fn test_load_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        assert!(matches!(
            ClientConfig::load(file.path()),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "toml"
        ));
    }
}
