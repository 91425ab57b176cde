//! Value margin and signal tiers.

use crate::config::ValueConfig;
use crate::types::Signal;

/// `odds × probability − 1`: the model's edge over the price.
pub fn margin_valor(odds: f64, probability: f64) -> f64 {
    odds * probability - 1.0
}

/// Tier a margin. Boundaries are closed at the lower bound.
pub fn classify(margin: f64, config: &ValueConfig) -> Signal {
    if margin >= config.threshold_a {
        Signal::A
    } else if margin >= config.threshold_b {
        Signal::B
    } else if margin >= config.threshold_c {
        Signal::C
    } else {
        Signal::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_are_closed_below() {
        let cfg = ValueConfig::default();
        assert_eq!(classify(0.08, &cfg), Signal::A);
        assert_eq!(classify(0.0799, &cfg), Signal::B);
        assert_eq!(classify(0.03, &cfg), Signal::B);
        assert_eq!(classify(0.0299, &cfg), Signal::C);
        assert_eq!(classify(0.0, &cfg), Signal::C);
        assert_eq!(classify(-0.0001, &cfg), Signal::None);
        assert_eq!(classify(-0.10, &cfg), Signal::None);
    }

    #[test]
    fn test_margin() {
        assert!((margin_valor(1.55, 0.666) - 0.0323).abs() < 1e-9);
        assert!((margin_valor(2.0, 0.5)).abs() < 1e-12);
    }
}
