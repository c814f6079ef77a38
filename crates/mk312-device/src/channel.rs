//! Level mapping for the two output channels
//!
//! Levels are normalized to 0.0..=1.0. A level becomes an intensity register
//! value through a gamma curve so equal steps in level feel roughly equal at
//! the electrodes:
//!
//! ```text
//! value = min + (max - min) * level^gamma
//! ```

use mk312_protocol::Channel;
use serde::{Deserialize, Serialize};

use crate::config::{ChannelMix, ChannelRange};

/// Normalized levels for both channels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelLevels {
    pub a: f64,
    pub b: f64,
}

impl ChannelLevels {
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    /// Level of one channel
    pub fn get(&self, channel: Channel) -> f64 {
        match channel {
            Channel::A => self.a,
            Channel::B => self.b,
        }
    }
}

/// Clamp to 0.0..=1.0, treating NaN as silence
fn normalize(level: f64) -> f64 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

/// Intensity register value for a normalized level
pub fn intensity_value(level: f64, range: ChannelRange, gamma: f64) -> u8 {
    let curved = normalize(level).powf(gamma);
    let min = f64::from(range.min);
    let max = f64::from(range.max);
    (min + (max - min) * curved).round().clamp(0.0, 255.0) as u8
}

impl ChannelMix {
    /// Split a normalized position across both channels
    ///
    /// As the position rises channel B rises and channel A falls.
    pub fn levels(&self, position: f64) -> ChannelLevels {
        let position = normalize(position);
        let fade = normalize(self.fade);
        let balance = self.balance.clamp(-1.0, 1.0);

        let a = fade + (1.0 - fade) * (1.0 - position);
        let b = fade + (1.0 - fade) * position;

        ChannelLevels {
            a: normalize(a * (1.0 - balance.max(0.0))),
            b: normalize(b * (1.0 + balance.min(0.0))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FULL: ChannelRange = ChannelRange { min: 0, max: 255 };

    #[test]
    fn test_intensity_endpoints() {
        assert_eq!(intensity_value(0.0, FULL, 1.5), 0);
        assert_eq!(intensity_value(1.0, FULL, 1.5), 255);

        let range = ChannelRange { min: 40, max: 200 };
        assert_eq!(intensity_value(0.0, range, 1.5), 40);
        assert_eq!(intensity_value(1.0, range, 1.5), 200);
    }

    #[test]
    fn test_intensity_gamma_curve() {
        // 0.25^1.5 = 0.125
        assert_eq!(intensity_value(0.25, ChannelRange { min: 0, max: 200 }, 1.5), 25);
        // Linear with gamma 1
        assert_eq!(intensity_value(0.5, ChannelRange { min: 0, max: 200 }, 1.0), 100);
    }

    #[test]
    fn test_intensity_clamps_input() {
        assert_eq!(intensity_value(-3.0, FULL, 1.5), 0);
        assert_eq!(intensity_value(7.0, FULL, 1.5), 255);
        assert_eq!(intensity_value(f64::NAN, FULL, 1.5), 0);
    }

    #[test]
    fn test_mix_anti_correlated() {
        let mix = ChannelMix::default();
        assert_eq!(mix.levels(0.0), ChannelLevels::new(1.0, 0.0));
        assert_eq!(mix.levels(1.0), ChannelLevels::new(0.0, 1.0));
        assert_eq!(mix.levels(0.5), ChannelLevels::new(0.5, 0.5));
    }

    #[test]
    fn test_mix_fade_and_balance() {
        let faded = ChannelMix {
            fade: 0.2,
            balance: 0.0,
        };
        let levels = faded.levels(1.0);
        assert!((levels.a - 0.2).abs() < 1e-9);
        assert!((levels.b - 1.0).abs() < 1e-9);

        let toward_b = ChannelMix {
            fade: 0.0,
            balance: 0.5,
        };
        let levels = toward_b.levels(0.0);
        assert!((levels.a - 0.5).abs() < 1e-9);

        let toward_a = ChannelMix {
            fade: 0.0,
            balance: -1.0,
        };
        assert_eq!(toward_a.levels(1.0).b, 0.0);
    }

    proptest! {
        #[test]
        fn intensity_is_monotonic(lo in 0.0f64..=1.0, hi in 0.0f64..=1.0, gamma in 0.5f64..3.0) {
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            prop_assert!(intensity_value(lo, FULL, gamma) <= intensity_value(hi, FULL, gamma));
        }

        #[test]
        fn mixed_levels_stay_normalized(
            position in -1.0f64..2.0,
            fade in 0.0f64..=1.0,
            balance in -1.0f64..=1.0,
        ) {
            let levels = ChannelMix { fade, balance }.levels(position);
            prop_assert!((0.0..=1.0).contains(&levels.a));
            prop_assert!((0.0..=1.0).contains(&levels.b));
        }
    }
}
