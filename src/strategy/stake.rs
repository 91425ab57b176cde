//! Stake sizing.
//!
//! Each signal has a fixed base fraction of bankroll. The base is scaled by
//! the prediction's edge score: `clamp(1 + (edge − 50) / 250, 0.8, 1.2)`.

use crate::config::ValueConfig;
use crate::types::Signal;

/// Base bankroll fraction for a signal tier.
pub fn base_fraction(signal: Signal, config: &ValueConfig) -> f64 {
    match signal {
        Signal::A => config.stake_a,
        Signal::B => config.stake_b,
        Signal::C => config.stake_c,
        Signal::None => 0.0,
    }
}

/// Edge-score multiplier applied to the base fraction.
pub fn edge_multiplier(edge_score: f64, config: &ValueConfig) -> f64 {
    (1.0 + (edge_score - 50.0) / 250.0).clamp(config.multiplier_min, config.multiplier_max)
}

/// Sized bet: (stake fraction, multiplier used).
pub fn stake_fraction(signal: Signal, edge_score: f64, config: &ValueConfig) -> (f64, f64) {
    let multiplier = edge_multiplier(edge_score, config);
    (base_fraction(signal, config) * multiplier, multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_bounds() {
        let cfg = ValueConfig::default();
        assert_eq!(edge_multiplier(50.0, &cfg), 1.0);
        assert!((edge_multiplier(75.0, &cfg) - 1.1).abs() < 1e-12);
        assert_eq!(edge_multiplier(120.0, &cfg), 1.2);
        assert_eq!(edge_multiplier(-50.0, &cfg), 0.8);
    }

    #[test]
    fn test_tiers_are_ordered() {
        let cfg = ValueConfig::default();
        let a = stake_fraction(Signal::A, 60.0, &cfg).0;
        let b = stake_fraction(Signal::B, 60.0, &cfg).0;
        let c = stake_fraction(Signal::C, 60.0, &cfg).0;
        assert!(a > b && b > c && c > 0.0);
        assert_eq!(stake_fraction(Signal::None, 90.0, &cfg).0, 0.0);
    }

    #[test]
    fn test_reference_stake() {
        // signal B at edge 67 → 0.02 × 1.068
        let (stake, m) = stake_fraction(Signal::B, 67.0, &ValueConfig::default());
        assert!((m - 1.068).abs() < 1e-12);
        assert!((stake - 0.02136).abs() < 1e-12);
    }
}
