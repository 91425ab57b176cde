//! Health alerts. Several may fire at once.

use crate::types::{Alert, AlertSeverity, ClvWindows, GroupMetrics};

/// Selections needed before the hit-rate alert applies.
pub const HIT_RATE_MIN_SELECTIONS: usize = 20;
/// Selections needed before the ROI alert applies.
pub const ROI_MIN_SELECTIONS: usize = 50;
/// Below this many selections the sample is flagged as small.
pub const SMALL_SAMPLE: usize = 20;

fn alert(severity: AlertSeverity, message: String, recommendation: &str) -> Alert {
    Alert {
        severity,
        message,
        recommendation: recommendation.to_string(),
    }
}

pub fn evaluate(metrics: &GroupMetrics, windows: &ClvWindows) -> Vec<Alert> {
    let mut alerts = Vec::new();

    let clv_30d_negative = windows.last_30_days.is_some_and(|c| c < 0.0);
    if let Some(clv) = windows.last_30_days.filter(|c| *c < 0.0) {
        alerts.push(alert(
            AlertSeverity::Critical,
            format!("30-day CLV is negative ({:+.2}%)", clv * 100.0),
            "Consider pausing selections until the model is reviewed",
        ));
    }
    if !clv_30d_negative {
        if let Some(clv) = windows.last_7_days.filter(|c| *c < 0.0) {
            alerts.push(alert(
                AlertSeverity::Warning,
                format!("7-day CLV is negative ({:+.2}%)", clv * 100.0),
                "Monitor closely; the market may be moving against recent picks",
            ));
        }
    }

    if metrics.total >= HIT_RATE_MIN_SELECTIONS {
        if let Some(hit) = metrics.hit_rate.filter(|h| *h < 0.5) {
            alerts.push(alert(
                AlertSeverity::Warning,
                format!(
                    "Hit rate {:.1}% below 50% over {} selections",
                    hit * 100.0,
                    metrics.total
                ),
                "Review probability floors and recent prediction warnings",
            ));
        }
    }

    if metrics.total >= ROI_MIN_SELECTIONS {
        if let Some(roi) = metrics.roi.filter(|r| *r < -0.10) {
            alerts.push(alert(
                AlertSeverity::Critical,
                format!("ROI {:+.1}% over {} selections", roi * 100.0, metrics.total),
                "Reduce stakes or pause until CLV recovers",
            ));
        }
    }

    if metrics.total < SMALL_SAMPLE {
        alerts.push(alert(
            AlertSeverity::Warning,
            format!("Small sample: only {} selections in period", metrics.total),
            "Small sample, wait for more data before drawing conclusions",
        ));
    }

    alerts
}
