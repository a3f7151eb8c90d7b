//! Bet constraint validation and bet step controls

use serde::{Deserialize, Serialize};

use crate::Credits;

/// Static bet bounds for a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetLimits {
    /// Smallest accepted stake
    pub min_bet: Credits,
    /// Largest accepted stake
    pub max_bet: Credits,
    /// Step between valid stakes, counted from `min_bet`
    pub increment: Credits,
}

impl BetLimits {
    pub fn new(min_bet: Credits, max_bet: Credits, increment: Credits) -> Result<Self, BetError> {
        let limits = Self {
            min_bet,
            max_bet,
            increment,
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Check the limits themselves are coherent
    pub fn validate(&self) -> Result<(), BetError> {
        if self.min_bet == 0 {
            return Err(BetError::ZeroMinimum);
        }
        if self.min_bet > self.max_bet {
            return Err(BetError::InvertedBounds {
                min: self.min_bet,
                max: self.max_bet,
            });
        }
        if self.increment == 0 {
            return Err(BetError::ZeroIncrement);
        }
        if (self.max_bet - self.min_bet) % self.increment != 0 {
            return Err(BetError::MaxOffStep {
                max: self.max_bet,
                min: self.min_bet,
                increment: self.increment,
            });
        }
        Ok(())
    }

    /// Clamp a requested bet into `[min_bet, max_bet]`
    pub fn clamp(&self, requested: Credits) -> Credits {
        clamp(requested, self.min_bet, self.max_bet, self.increment)
    }

    /// Clamp, then snap down onto the increment grid counted from `min_bet`
    pub fn align(&self, requested: Credits) -> Credits {
        let clamped = self.clamp(requested);
        let step = self.increment.max(1);
        clamped - (clamped - self.min_bet) % step
    }

    /// True when `bet` is inside the bounds and on an increment step
    pub fn is_valid(&self, bet: Credits) -> bool {
        bet >= self.min_bet
            && bet <= self.max_bet
            && (bet - self.min_bet) % self.increment.max(1) == 0
    }
}

impl Default for BetLimits {
    fn default() -> Self {
        Self {
            min_bet: 10,
            max_bet: 1000,
            increment: 10,
        }
    }
}

/// Nearest bet inside the bounds.
///
/// Total and idempotent. Values between the bounds are returned untouched:
/// step alignment is the job of the step controls in [`BetSelector`], not of
/// this function.
pub fn clamp(requested: Credits, min_bet: Credits, max_bet: Credits, _increment: Credits) -> Credits {
    if requested < min_bet {
        min_bet
    } else if requested > max_bet {
        max_bet
    } else {
        requested
    }
}

/// Advisory check before a single spin
pub fn can_afford(balance: Credits, bet: Credits) -> bool {
    balance >= bet
}

/// Advisory check before an auto-spin run of `spins` spins
pub fn can_afford_auto_spin(balance: Credits, bet: Credits, spins: u32) -> bool {
    match bet.checked_mul(Credits::from(spins)) {
        Some(required) => balance >= required,
        None => false,
    }
}

/// Current bet plus the step controls that move it.
///
/// The selector only ever holds a value accepted by its [`BetLimits`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetSelector {
    limits: BetLimits,
    current: Credits,
}

impl BetSelector {
    pub fn new(limits: BetLimits) -> Self {
        Self {
            limits,
            current: limits.min_bet,
        }
    }

    /// Selector starting at `initial` (clamped and aligned)
    pub fn with_bet(limits: BetLimits, initial: Credits) -> Self {
        Self {
            limits,
            current: limits.align(initial),
        }
    }

    pub fn limits(&self) -> &BetLimits {
        &self.limits
    }

    pub fn current(&self) -> Credits {
        self.current
    }

    /// Set the bet, clamped to the bounds and snapped down to a step.
    /// Returns the accepted value.
    pub fn set(&mut self, requested: Credits) -> Credits {
        self.current = self.limits.align(requested);
        self.current
    }

    /// One increment up
    pub fn increase(&mut self) -> Credits {
        self.set(self.current.saturating_add(self.limits.increment))
    }

    /// One increment down
    pub fn decrease(&mut self) -> Credits {
        self.set(self.current.saturating_sub(self.limits.increment))
    }

    pub fn set_min(&mut self) -> Credits {
        self.set(self.limits.min_bet)
    }

    pub fn set_max(&mut self) -> Credits {
        self.set(self.limits.max_bet)
    }
}

/// Bet limit errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BetError {
    #[error("Minimum bet must be greater than zero")]
    ZeroMinimum,

    #[error("Minimum bet {min} exceeds maximum bet {max}")]
    InvertedBounds { min: Credits, max: Credits },

    #[error("Bet increment must be greater than zero")]
    ZeroIncrement,

    #[error("Maximum bet {max} is not a whole number of {increment} steps above {min}")]
    MaxOffStep {
        max: Credits,
        min: Credits,
        increment: Credits,
    },

    #[error("Default bet {bet} is outside [{min}, {max}]")]
    DefaultOutOfRange {
        bet: Credits,
        min: Credits,
        max: Credits,
    },

    #[error("Default bet {bet} is not on a {increment}-credit step")]
    DefaultOffStep { bet: Credits, increment: Credits },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_bounds() {
        assert_eq!(clamp(5, 10, 1000, 10), 10);
        assert_eq!(clamp(0, 10, 1000, 10), 10);
        assert_eq!(clamp(5000, 10, 1000, 10), 1000);
        assert_eq!(clamp(250, 10, 1000, 10), 250);
    }

    #[test]
    fn test_clamp_leaves_unaligned_values() {
        // Rounding to the increment belongs to the step controls
        assert_eq!(clamp(15, 10, 1000, 10), 15);
    }

    #[test]
    fn test_clamp_idempotent_and_in_range() {
        let limits = BetLimits::default();
        for x in [0, 1, 9, 10, 11, 500, 999, 1000, 1001, Credits::MAX] {
            let once = limits.clamp(x);
            assert_eq!(limits.clamp(once), once);
            assert!(once >= limits.min_bet && once <= limits.max_bet);
        }
    }

    #[test]
    fn test_can_afford() {
        assert!(can_afford(100, 100));
        assert!(can_afford(101, 100));
        assert!(!can_afford(99, 100));
    }

    #[test]
    fn test_can_afford_auto_spin() {
        assert!(can_afford_auto_spin(500, 100, 5));
        assert!(!can_afford_auto_spin(499, 100, 5));
        assert!(can_afford_auto_spin(0, 100, 0));
        // Overflowing requirement can never be afforded
        assert!(!can_afford_auto_spin(Credits::MAX, Credits::MAX, 2));
    }

    #[test]
    fn test_limits_validate() {
        assert!(BetLimits::new(10, 1000, 10).is_ok());
        assert_eq!(BetLimits::new(0, 1000, 10), Err(BetError::ZeroMinimum));
        assert_eq!(
            BetLimits::new(100, 10, 10),
            Err(BetError::InvertedBounds { min: 100, max: 10 })
        );
        assert_eq!(BetLimits::new(10, 100, 0), Err(BetError::ZeroIncrement));
        assert_eq!(
            BetLimits::new(10, 995, 10),
            Err(BetError::MaxOffStep {
                max: 995,
                min: 10,
                increment: 10
            })
        );
        assert!(BetLimits::new(25, 25, 10).is_ok());
    }

    #[test]
    fn test_is_valid() {
        let limits = BetLimits::default();
        assert!(limits.is_valid(10));
        assert!(limits.is_valid(1000));
        assert!(limits.is_valid(120));
        assert!(!limits.is_valid(125));
        assert!(!limits.is_valid(1010));
    }

    #[test]
    fn test_selector_steps() {
        let mut selector = BetSelector::new(BetLimits::default());
        assert_eq!(selector.current(), 10);

        assert_eq!(selector.decrease(), 10);
        assert_eq!(selector.increase(), 20);
        assert_eq!(selector.increase(), 30);
        assert_eq!(selector.decrease(), 20);

        assert_eq!(selector.set_max(), 1000);
        assert_eq!(selector.increase(), 1000);
        assert_eq!(selector.set_min(), 10);
    }

    #[test]
    fn test_selector_set_clamps() {
        let mut selector = BetSelector::with_bet(BetLimits::default(), 5);
        assert_eq!(selector.current(), 10);
        assert_eq!(selector.set(20_000), 1000);
        assert_eq!(selector.set(300), 300);
    }

    #[test]
    fn test_selector_snaps_to_step() {
        let mut selector = BetSelector::new(BetLimits::default());
        assert_eq!(selector.set(15), 10);
        assert_eq!(selector.set(999), 990);
        assert!(selector.limits().is_valid(selector.current()));

        let limits = BetLimits::new(5, 95, 15).unwrap();
        let mut selector = BetSelector::with_bet(limits, 40);
        assert_eq!(selector.current(), 35);
        assert_eq!(selector.set_max(), 95);
        assert_eq!(selector.increase(), 95);
        assert_eq!(selector.decrease(), 80);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_limits() -> impl Strategy<Value = BetLimits> {
            (1..1_000u64, 1..100u64, 0..200u64).prop_map(|(min_bet, increment, steps)| {
                BetLimits {
                    min_bet,
                    max_bet: min_bet + increment * steps,
                    increment,
                }
            })
        }

        proptest! {
            #[test]
            fn prop_clamp_idempotent_and_bounded(limits in arb_limits(), requested in any::<u64>()) {
                let once = clamp(requested, limits.min_bet, limits.max_bet, limits.increment);
                let twice = clamp(once, limits.min_bet, limits.max_bet, limits.increment);
                prop_assert_eq!(once, twice);
                prop_assert!(once >= limits.min_bet && once <= limits.max_bet);
            }

            #[test]
            fn prop_selector_holds_valid_bet(limits in arb_limits(), requested in any::<u64>()) {
                prop_assert!(limits.validate().is_ok());
                let mut selector = BetSelector::new(limits);
                let accepted = selector.set(requested);
                prop_assert!(limits.is_valid(accepted));
                prop_assert!(limits.is_valid(selector.increase()));
                prop_assert!(limits.is_valid(selector.decrease()));
            }
        }
    }
}
