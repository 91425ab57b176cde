//! Calibration of selection probabilities.
//!
//! Measures how well the probabilities snapshotted on selections match
//! what actually happened. Computes a Brier score overall and per league,
//! a 10-bucket calibration curve, and a diagnosis.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Outcome, Selection};

/// A bucket needs this many points to count towards the diagnosis.
const MIN_BUCKET_COUNT: usize = 3;
/// Weighted gap between predicted and actual beyond which calibration is off.
const GAP_TOLERANCE: f64 = 0.05;

// ---------------------------------------------------------------------------
// Calibration data
// ---------------------------------------------------------------------------

/// One decided selection.
#[derive(Debug, Clone)]
pub struct CalibrationPoint {
    pub league_code: String,
    pub probability: f64,
    pub won: bool,
}

impl CalibrationPoint {
    /// Only WON/LOST selections carry a calibration signal.
    pub fn from_selection(s: &Selection) -> Option<Self> {
        let won = match s.outcome {
            Outcome::Won => true,
            Outcome::Lost => false,
            Outcome::Pending | Outcome::Void => return None,
        };
        Some(Self {
            league_code: s.league_code.clone(),
            probability: s.probability,
            won,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationReport {
    pub total_points: usize,
    /// `None` without decided selections.
    pub brier_score: Option<f64>,
    pub brier_by_league: BTreeMap<String, f64>,
    pub curve: Vec<CalibrationBucket>,
    pub diagnosis: CalibrationDiagnosis,
}

impl Default for CalibrationReport {
    fn default() -> Self {
        Self {
            total_points: 0,
            brier_score: None,
            brier_by_league: BTreeMap::new(),
            curve: Vec::new(),
            diagnosis: CalibrationDiagnosis::InsufficientData,
        }
    }
}

/// All points whose probability falls in `[bin_start, bin_end)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationBucket {
    pub bin_start: f64,
    pub bin_end: f64,
    pub count: usize,
    pub mean_predicted: Option<f64>,
    pub actual_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationDiagnosis {
    WellCalibrated,
    /// Selections win less often than their probability says.
    OverConfident,
    /// Selections win more often than their probability says.
    UnderConfident,
    InsufficientData,
}

// ---------------------------------------------------------------------------
// Calibrator
// ---------------------------------------------------------------------------

pub struct Calibrator {
    points: Vec<CalibrationPoint>,
    num_bins: usize,
    min_samples: usize,
}

impl Calibrator {
    pub fn new(min_samples: usize) -> Self {
        Self {
            points: Vec::new(),
            num_bins: 10,
            min_samples,
        }
    }

    /// Add every decided selection from a slice.
    pub fn add_selections(&mut self, selections: &[Selection]) {
        self.points
            .extend(selections.iter().filter_map(CalibrationPoint::from_selection));
    }

    pub fn add_point(&mut self, point: CalibrationPoint) {
        self.points.push(point);
    }

    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn report(&self) -> CalibrationReport {
        if self.points.is_empty() {
            return CalibrationReport::default();
        }

        let curve = self.curve();
        CalibrationReport {
            total_points: self.points.len(),
            brier_score: Some(brier(self.points.iter())),
            brier_by_league: self.brier_by_league(),
            diagnosis: self.diagnose(&curve),
            curve,
        }
    }

    fn brier_by_league(&self) -> BTreeMap<String, f64> {
        let mut by_league: BTreeMap<String, Vec<&CalibrationPoint>> = BTreeMap::new();
        for p in &self.points {
            by_league.entry(p.league_code.clone()).or_default().push(p);
        }
        by_league
            .into_iter()
            .map(|(league, points)| (league, brier(points.into_iter())))
            .collect()
    }

    fn curve(&self) -> Vec<CalibrationBucket> {
        let width = 1.0 / self.num_bins as f64;
        (0..self.num_bins)
            .map(|i| {
                let bin_start = i as f64 * width;
                let bin_end = bin_start + width;
                let last = i == self.num_bins - 1;
                let in_bin: Vec<&CalibrationPoint> = self
                    .points
                    .iter()
                    .filter(|p| {
                        p.probability >= bin_start
                            && (p.probability < bin_end || (last && p.probability <= bin_end))
                    })
                    .collect();
                let count = in_bin.len();
                let (mean_predicted, actual_rate) = if count == 0 {
                    (None, None)
                } else {
                    let mean = in_bin.iter().map(|p| p.probability).sum::<f64>() / count as f64;
                    let won = in_bin.iter().filter(|p| p.won).count() as f64;
                    (Some(mean), Some(won / count as f64))
                };
                CalibrationBucket {
                    bin_start,
                    bin_end,
                    count,
                    mean_predicted,
                    actual_rate,
                }
            })
            .collect()
    }

    /// Count-weighted predicted-minus-actual gap over populated buckets.
    fn diagnose(&self, curve: &[CalibrationBucket]) -> CalibrationDiagnosis {
        let populated: Vec<&CalibrationBucket> =
            curve.iter().filter(|b| b.count >= MIN_BUCKET_COUNT).collect();
        if self.points.len() < self.min_samples || populated.is_empty() {
            return CalibrationDiagnosis::InsufficientData;
        }

        let total: usize = populated.iter().map(|b| b.count).sum();
        let gap: f64 = populated
            .iter()
            .filter_map(|b| Some((b.mean_predicted? - b.actual_rate?) * b.count as f64))
            .sum::<f64>()
            / total as f64;

        if gap > GAP_TOLERANCE {
            CalibrationDiagnosis::OverConfident
        } else if gap < -GAP_TOLERANCE {
            CalibrationDiagnosis::UnderConfident
        } else {
            CalibrationDiagnosis::WellCalibrated
        }
    }
}

/// Brier = (1/N) × Σ(p − outcome)². Lower is better.
fn brier<'a>(points: impl Iterator<Item = &'a CalibrationPoint>) -> f64 {
    let (sum, n) = points.fold((0.0, 0usize), |(sum, n), p| {
        let outcome = if p.won { 1.0 } else { 0.0 };
        (sum + (p.probability - outcome).powi(2), n + 1)
    });
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
