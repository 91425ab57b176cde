//! Per-run selection caps.
//!
//! Tracks how many selections a run has accepted and how much stake they
//! commit. Used by the single ordered rank-and-select pass: a count-cap hit
//! ends the walk, an exposure-cap hit only skips the candidate.

use std::fmt;

use crate::config::PipelineConfig;

/// Float slack when comparing cumulative stake against the cap.
const EXPOSURE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum CapRejection {
    /// Maximum selections per run reached.
    CountCap { max: usize },
    /// Stake would push cumulative exposure over the cap.
    ExposureCap { used: f64, stake: f64, max: f64 },
}

impl CapRejection {
    /// Whether the walk must stop.
    pub fn stops_walk(&self) -> bool {
        matches!(self, CapRejection::CountCap { .. })
    }
}

impl fmt::Display for CapRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapRejection::CountCap { max } => {
                write!(f, "selection cap reached ({max} per run)")
            }
            CapRejection::ExposureCap { used, stake, max } => write!(
                f,
                "exposure cap: {:.2}% used + {:.2}% stake exceeds {:.2}%",
                used * 100.0,
                stake * 100.0,
                max * 100.0
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectionBudget {
    max_selections: usize,
    max_exposure: f64,
    selected: usize,
    exposure: f64,
}

impl SelectionBudget {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_selections: config.max_selections,
            max_exposure: config.max_exposure,
            selected: 0,
            exposure: 0.0,
        }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn exposure(&self) -> f64 {
        self.exposure
    }

    /// Check whether a stake fits, without recording it.
    pub fn check(&self, stake: f64) -> Result<(), CapRejection> {
        if self.selected >= self.max_selections {
            return Err(CapRejection::CountCap {
                max: self.max_selections,
            });
        }
        if self.exposure + stake > self.max_exposure + EXPOSURE_EPSILON {
            return Err(CapRejection::ExposureCap {
                used: self.exposure,
                stake,
                max: self.max_exposure,
            });
        }
        Ok(())
    }

    pub fn record(&mut self, stake: f64) {
        self.selected += 1;
        self.exposure += stake;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(max_selections: usize, max_exposure: f64) -> SelectionBudget {
        SelectionBudget::new(&PipelineConfig {
            max_selections,
            max_exposure,
            ..Default::default()
        })
    }

    #[test]
    fn test_count_cap_stops() {
        let mut b = budget(2, 1.0);
        b.record(0.01);
        b.record(0.01);
        let err = b.check(0.01).unwrap_err();
        assert!(err.stops_walk());
        assert!(err.to_string().contains("selection cap"));
    }

    #[test]
    fn test_exposure_cap_skips_but_smaller_fits() {
        let mut b = budget(5, 0.05);
        b.record(0.03);
        let err = b.check(0.03).unwrap_err();
        assert!(!err.stops_walk());
        assert!(b.check(0.02).is_ok());
    }

    #[test]
    fn test_exact_fill_is_allowed() {
        let mut b = budget(5, 0.15);
        for _ in 0..5 {
            assert!(b.check(0.03).is_ok());
            b.record(0.03);
        }
        assert!((b.exposure() - 0.15).abs() < 1e-9);
        assert_eq!(b.selected(), 5);
    }
}
