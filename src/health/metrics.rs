//! Hit rate, CLV, ROI and status over a set of selections.

use std::collections::BTreeMap;

use crate::types::{GroupMetrics, HealthStatus, Outcome, Selection};

/// Average CLV at or above this is GREEN.
pub const GREEN_CLV: f64 = 0.02;

/// Mean CLV over settled selections that carry one. Missing CLV is
/// excluded, never counted as zero.
pub fn average_clv<'a>(selections: impl IntoIterator<Item = &'a Selection>) -> Option<f64> {
    let values: Vec<f64> = selections
        .into_iter()
        .filter(|s| s.outcome.is_settled())
        .filter_map(|s| s.clv)
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn group_metrics<'a>(selections: impl IntoIterator<Item = &'a Selection>) -> GroupMetrics {
    let selections: Vec<&Selection> = selections.into_iter().collect();
    let mut m = GroupMetrics {
        total: selections.len(),
        ..Default::default()
    };

    for s in &selections {
        match s.outcome {
            Outcome::Pending => m.pending += 1,
            Outcome::Won => m.won += 1,
            Outcome::Lost => m.lost += 1,
            Outcome::Void => m.voided += 1,
        }
        if s.outcome.is_settled() {
            m.total_profit_loss += s.profit_loss.unwrap_or(0.0);
        }
        // Voided stakes are returned.
        if s.outcome.is_decided() {
            m.total_stake += s.stake_fraction;
        }
    }
    m.settled = m.won + m.lost + m.voided;

    let decided = m.won + m.lost;
    m.hit_rate = (decided > 0).then(|| m.won as f64 / decided as f64);
    m.avg_clv = average_clv(selections.iter().copied());
    m.roi = (m.total_stake > 0.0).then(|| m.total_profit_loss / m.total_stake);
    m
}

/// GREEN ≥ 2% average CLV, YELLOW in [0, 2%), RED below zero.
/// No CLV data is treated as zero.
pub fn status_for(avg_clv: Option<f64>) -> HealthStatus {
    let clv = avg_clv.unwrap_or(0.0);
    if clv >= GREEN_CLV {
        HealthStatus::Green
    } else if clv >= 0.0 {
        HealthStatus::Yellow
    } else {
        HealthStatus::Red
    }
}

/// Per-key metrics, only for groups with at least one settled selection.
pub fn breakdown<'a, F>(selections: &'a [Selection], key: F) -> BTreeMap<String, GroupMetrics>
where
    F: Fn(&'a Selection) -> String,
{
    let mut groups: BTreeMap<String, Vec<&Selection>> = BTreeMap::new();
    for s in selections {
        groups.entry(key(s)).or_default().push(s);
    }
    groups
        .into_iter()
        .map(|(k, group)| (k, group_metrics(group)))
        .filter(|(_, m)| m.settled > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, Signal};
    use chrono::Utc;

    fn sel(league: &str, outcome: Outcome, clv: Option<f64>, pl: Option<f64>) -> Selection {
        Selection {
            id: uuid::Uuid::new_v4().to_string(),
            match_id: uuid::Uuid::new_v4().to_string(),
            run_id: "r".into(),
            rank: 1,
            league_code: league.into(),
            home_team: "H".into(),
            away_team: "A".into(),
            kickoff: Utc::now(),
            signal: Signal::B,
            margin_valor: 0.04,
            probability: 0.66,
            edge_score: 60.0,
            confidence: Confidence::Medium,
            stake_fraction: 0.02,
            odds_at_selection: 1.6,
            bookmaker: None,
            is_real_odds: true,
            outcome,
            closing_odds: None,
            clv,
            profit_loss: pl,
            settled_at: None,
            actual_g1h_goals: None,
            first_goal_minute: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_hit_rate_excludes_voids() {
        let s = vec![
            sel("EPL", Outcome::Won, None, Some(0.012)),
            sel("EPL", Outcome::Lost, None, Some(-0.02)),
            sel("EPL", Outcome::Void, None, Some(0.0)),
            sel("EPL", Outcome::Pending, None, None),
        ];
        let m = group_metrics(&s);
        assert_eq!((m.total, m.settled, m.pending), (4, 3, 1));
        assert_eq!(m.hit_rate, Some(0.5));
        assert!((m.total_stake - 0.04).abs() < 1e-12);
        assert!((m.roi.unwrap() - (-0.008 / 0.04)).abs() < 1e-9);
    }

    #[test]
    fn test_average_clv_ignores_missing() {
        let s = vec![
            sel("EPL", Outcome::Won, Some(0.04), Some(0.01)),
            sel("EPL", Outcome::Lost, None, Some(-0.02)),
            sel("EPL", Outcome::Lost, Some(-0.02), Some(-0.02)),
            // pending selections never count
            sel("EPL", Outcome::Pending, Some(0.5), None),
        ];
        assert!((average_clv(&s).unwrap() - 0.01).abs() < 1e-12);
        assert_eq!(average_clv(&s[1..2]), None);
    }

    #[test]
    fn test_empty_metrics() {
        let m = group_metrics(Vec::<&Selection>::new());
        assert_eq!(m.total, 0);
        assert!(m.hit_rate.is_none());
        assert!(m.avg_clv.is_none());
        assert!(m.roi.is_none());
    }

    #[test]
    fn test_status_boundaries() {
        assert_eq!(status_for(Some(0.02)), HealthStatus::Green);
        assert_eq!(status_for(Some(0.0199)), HealthStatus::Yellow);
        assert_eq!(status_for(Some(0.0)), HealthStatus::Yellow);
        assert_eq!(status_for(None), HealthStatus::Yellow);
        assert_eq!(status_for(Some(-0.0001)), HealthStatus::Red);
    }

    #[test]
    fn test_breakdown_skips_unsettled_groups() {
        let s = vec![
            sel("EPL", Outcome::Won, Some(0.03), Some(0.012)),
            sel("LIGA", Outcome::Pending, None, None),
        ];
        let by_league = breakdown(&s, |s| s.league_code.clone());
        assert_eq!(by_league.len(), 1);
        assert!(by_league.contains_key("EPL"));
    }
}
