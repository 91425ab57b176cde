//! Health monitor.
//!
//! Aggregates selections into a rolling [`HealthSnapshot`]: hit rate,
//! closing-line value, ROI, per-league and per-signal breakdowns, a
//! calibration block and alerts. Status is driven by average CLV, not win
//! rate. Snapshots are stored and never mutated; a fresh one is generated
//! when the latest is older than the cache window.

pub mod alerts;
pub mod calibration;
pub mod metrics;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::HealthConfig;
use crate::storage::Store;
use crate::types::{ClvWindows, HealthSnapshot, Selection};
use calibration::Calibrator;

pub struct HealthMonitor {
    store: Arc<dyn Store>,
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn Store>, config: HealthConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Generate and store a report over selections created in the last
    /// `period_days` (the configured default when `None`).
    pub async fn generate_health_report(&self, period_days: Option<u32>) -> Result<HealthSnapshot> {
        let period = period_days.unwrap_or(self.config.period_days);
        let snapshot = self.build_report(period, Utc::now()).await?;

        self.store
            .save_health_snapshot(&snapshot)
            .await
            .context("Failed to store health snapshot")?;

        info!(
            status = %snapshot.status,
            period_days = period,
            selections = snapshot.metrics.total,
            settled = snapshot.metrics.settled,
            avg_clv = ?snapshot.metrics.avg_clv.map(|c| format!("{:+.2}%", c * 100.0)),
            alerts = snapshot.alerts.len(),
            "Health report generated"
        );
        for alert in &snapshot.alerts {
            warn!(severity = ?alert.severity, message = %alert.message, "Health alert");
        }
        Ok(snapshot)
    }

    /// The stored report if it is fresh enough, else a newly generated one.
    pub async fn get_latest_health_report(&self) -> Result<HealthSnapshot> {
        if let Some(latest) = self.store.latest_health_snapshot().await? {
            let age = Utc::now() - latest.generated_at;
            if age <= Duration::minutes(self.config.cache_minutes) {
                debug!(age_secs = age.num_seconds(), "Serving cached health report");
                return Ok(latest);
            }
        }
        self.generate_health_report(None).await
    }

    /// Compute a report as of `now` without storing it.
    pub async fn build_report(&self, period_days: u32, now: DateTime<Utc>) -> Result<HealthSnapshot> {
        let since = now - Duration::days(period_days as i64);
        let in_period = self
            .store
            .selections_created(Some(since), None)
            .await
            .context("Failed to load selections for period")?;
        let all_time = self.store.selections_created(None, None).await?;

        let window = |days: i64| {
            let from = now - Duration::days(days);
            all_time
                .iter()
                .filter(move |s| s.created_at >= from)
                .collect::<Vec<&Selection>>()
        };
        let clv_windows = ClvWindows {
            last_7_days: metrics::average_clv(window(7)),
            last_30_days: metrics::average_clv(window(30)),
            all_time: metrics::average_clv(&all_time),
        };

        let group = metrics::group_metrics(&in_period);
        let mut calibrator = Calibrator::new(self.config.calibration_min_samples);
        calibrator.add_selections(&in_period);

        Ok(HealthSnapshot {
            id: uuid::Uuid::new_v4().to_string(),
            generated_at: now,
            period_days,
            status: metrics::status_for(group.avg_clv),
            by_league: metrics::breakdown(&in_period, |s| s.league_code.clone()),
            by_signal: metrics::breakdown(&in_period, |s| s.signal.to_string()),
            calibration: calibrator.report(),
            alerts: alerts::evaluate(&group, &clv_windows),
            metrics: group,
            clv_windows,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{
        AlertSeverity, Confidence, HealthStatus, Outcome, Selection, Signal,
    };

    fn sel(id: &str, outcome: Outcome, clv: Option<f64>, age_days: i64) -> Selection {
        let created_at = Utc::now() - Duration::days(age_days);
        Selection {
            id: id.into(),
            match_id: format!("m-{id}"),
            run_id: "r".into(),
            rank: 1,
            league_code: "EPL".into(),
            home_team: "H".into(),
            away_team: "A".into(),
            kickoff: created_at,
            signal: Signal::A,
            margin_valor: 0.09,
            probability: 0.7,
            edge_score: 70.0,
            confidence: Confidence::High,
            stake_fraction: 0.03,
            odds_at_selection: 1.6,
            bookmaker: None,
            is_real_odds: true,
            outcome,
            closing_odds: None,
            clv,
            profit_loss: match outcome {
                Outcome::Won => Some(0.018),
                Outcome::Lost => Some(-0.03),
                _ => None,
            },
            settled_at: None,
            actual_g1h_goals: None,
            first_goal_minute: None,
            created_at,
        }
    }

    async fn monitor(selections: Vec<Selection>) -> (HealthMonitor, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        for s in &selections {
            store.insert_selection(s).await.unwrap();
        }
        (HealthMonitor::new(store.clone(), HealthConfig::default()), store)
    }

    #[tokio::test]
    async fn test_empty_report_is_yellow() {
        let (m, _) = monitor(vec![]).await;
        let r = m.build_report(30, Utc::now()).await.unwrap();
        assert_eq!(r.status, HealthStatus::Yellow);
        assert_eq!(r.metrics.total, 0);
        assert!(r.alerts.iter().any(|a| a.message.starts_with("Small sample")));
    }

    #[tokio::test]
    async fn test_period_and_windows() {
        let (m, _) = monitor(vec![
            sel("a", Outcome::Won, Some(0.06), 2),
            sel("b", Outcome::Lost, Some(0.0), 10),
            sel("c", Outcome::Won, Some(-0.20), 60),
        ])
        .await;
        let r = m.build_report(30, Utc::now()).await.unwrap();
        assert_eq!(r.metrics.total, 2);
        assert!((r.metrics.avg_clv.unwrap() - 0.03).abs() < 1e-12);
        assert_eq!(r.status, HealthStatus::Green);
        assert!((r.clv_windows.last_7_days.unwrap() - 0.06).abs() < 1e-12);
        assert!((r.clv_windows.last_30_days.unwrap() - 0.03).abs() < 1e-12);
        assert!((r.clv_windows.all_time.unwrap() - (-0.14 / 3.0)).abs() < 1e-12);
        assert_eq!(r.by_signal.len(), 1);
    }

    #[tokio::test]
    async fn test_negative_clv_is_red_and_critical() {
        let (m, _) = monitor(vec![
            sel("a", Outcome::Lost, Some(-0.03), 1),
            sel("b", Outcome::Won, Some(-0.01), 3),
        ])
        .await;
        let r = m.build_report(30, Utc::now()).await.unwrap();
        assert_eq!(r.status, HealthStatus::Red);
        assert!(r.alerts.iter().any(|a| a.severity == AlertSeverity::Critical));
    }

    #[tokio::test]
    async fn test_latest_report_is_cached() {
        let (m, store) = monitor(vec![sel("a", Outcome::Won, Some(0.05), 1)]).await;
        let first = m.get_latest_health_report().await.unwrap();
        let second = m.get_latest_health_report().await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(store.latest_health_snapshot().await.unwrap().is_some());

        let fresh = m.generate_health_report(Some(7)).await.unwrap();
        assert_ne!(fresh.id, first.id);
        assert_eq!(fresh.period_days, 7);
    }
}
