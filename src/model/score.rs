//! Edge score and confidence label.
//!
//! The edge score is a 0–100 composite of how much the model trusts its own
//! number, independent of the market price:
//! `50 + (data_quality − 25) + pattern_strength + context + value`.

use crate::types::{Confidence, EdgeBreakdown};

pub const BASE_SCORE: f64 = 50.0;

/// Inputs to the edge score.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs {
    pub warnings: usize,
    pub home_rate: f64,
    pub away_concede_rate: f64,
    pub earliest_first_goal_minute: Option<f64>,
    pub context_multiplier: f64,
    pub p_real: f64,
}

/// 25 with no warnings, minus 5 per warning, never below 10.
pub fn data_quality(warnings: usize) -> f64 {
    (25.0 - 5.0 * warnings as f64).max(10.0)
}

/// Home scoring (≤ 12) + timing (≤ 8) + away vulnerability (≤ 5).
pub fn pattern_strength(inputs: &ScoreInputs) -> f64 {
    let scoring = ((inputs.home_rate - 0.5) * 50.0).clamp(0.0, 12.0);
    let timing = match inputs.earliest_first_goal_minute {
        Some(m) if m < 25.0 => 8.0,
        Some(m) if m < 35.0 => 4.0,
        _ => 0.0,
    };
    let vulnerability = if inputs.away_concede_rate >= 0.60 {
        5.0
    } else if inputs.away_concede_rate >= 0.45 {
        2.0
    } else {
        0.0
    };
    (scoring + timing + vulnerability).min(25.0)
}

pub fn context_score(context_multiplier: f64) -> f64 {
    ((context_multiplier - 1.0) * 100.0).round().clamp(0.0, 10.0)
}

/// Probability-magnitude bonus.
pub fn value_bonus(p: f64) -> f64 {
    match p {
        p if p >= 0.75 => 15.0,
        p if p >= 0.70 => 10.0,
        p if p >= 0.65 => 5.0,
        p if p >= 0.60 => 0.0,
        p if p >= 0.55 => -5.0,
        _ => -10.0,
    }
}

/// Compute the edge score (rounded to one decimal) and its breakdown.
pub fn edge_score(inputs: &ScoreInputs) -> (f64, EdgeBreakdown) {
    let breakdown = EdgeBreakdown {
        data_quality: data_quality(inputs.warnings),
        pattern_strength: pattern_strength(inputs),
        context: context_score(inputs.context_multiplier),
        value: value_bonus(inputs.p_real),
    };
    let raw = BASE_SCORE + (breakdown.data_quality - 25.0)
        + breakdown.pattern_strength
        + breakdown.context
        + breakdown.value;
    let score = (raw.clamp(0.0, 100.0) * 10.0).round() / 10.0;
    (score, breakdown)
}

pub fn confidence(edge_score: f64, warnings: usize) -> Confidence {
    if edge_score >= 70.0 && warnings == 0 {
        Confidence::High
    } else if edge_score >= 50.0 && warnings <= 1 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ScoreInputs {
        ScoreInputs {
            warnings: 0,
            home_rate: 0.70,
            away_concede_rate: 0.55,
            earliest_first_goal_minute: None,
            context_multiplier: 1.0,
            p_real: 0.666,
        }
    }

    #[test]
    fn test_reference_match_scores_67() {
        let (score, b) = edge_score(&inputs());
        assert_eq!(b.data_quality, 25.0);
        assert!((b.pattern_strength - 12.0).abs() < 1e-9);
        assert_eq!(b.context, 0.0);
        assert_eq!(b.value, 5.0);
        assert_eq!(score, 67.0);
        assert_eq!(confidence(score, 0), Confidence::Medium);
    }

    #[test]
    fn test_data_quality_floor() {
        assert_eq!(data_quality(0), 25.0);
        assert_eq!(data_quality(2), 15.0);
        assert_eq!(data_quality(9), 10.0);
    }

    #[test]
    fn test_pattern_is_capped() {
        let i = ScoreInputs {
            home_rate: 1.0,
            away_concede_rate: 0.9,
            earliest_first_goal_minute: Some(15.0),
            ..inputs()
        };
        assert_eq!(pattern_strength(&i), 25.0);
    }

    #[test]
    fn test_value_bonus_bands() {
        assert_eq!(value_bonus(0.80), 15.0);
        assert_eq!(value_bonus(0.70), 10.0);
        assert_eq!(value_bonus(0.60), 0.0);
        assert_eq!(value_bonus(0.55), -5.0);
        assert_eq!(value_bonus(0.40), -10.0);
    }

    #[test]
    fn test_context_score() {
        assert_eq!(context_score(1.0), 0.0);
        assert_eq!(context_score(1.04), 4.0);
        assert_eq!(context_score(1.12), 10.0);
    }

    #[test]
    fn test_score_is_clamped() {
        let i = ScoreInputs {
            warnings: 10,
            home_rate: 0.0,
            away_concede_rate: 0.0,
            p_real: 0.40,
            ..inputs()
        };
        let (score, _) = edge_score(&i);
        // 50 − 15 − 10
        assert_eq!(score, 25.0);
    }

    #[test]
    fn test_confidence_labels() {
        assert_eq!(confidence(75.0, 0), Confidence::High);
        assert_eq!(confidence(75.0, 1), Confidence::Medium);
        assert_eq!(confidence(55.0, 2), Confidence::Low);
        assert_eq!(confidence(45.0, 0), Confidence::Low);
    }
}
