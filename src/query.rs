//! Read-only query surface for presentation layers.
//!
//! Time windows select selections by creation time (UTC).

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::ValueConfig;
use crate::health::HealthMonitor;
use crate::storage::{Page, Store};
use crate::strategy::{self, ValueResult};
use crate::types::{
    Confidence, EstimationConfidence, HealthSnapshot, Match, Odds, Prediction, Selection,
};

const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct PredictionSummary {
    pub probability: f64,
    pub edge_score: f64,
    pub confidence: Confidence,
    pub warnings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OddsSummary {
    pub best_yes: Option<f64>,
    pub is_real_odds: bool,
    pub estimation_confidence: Option<EstimationConfidence>,
    pub closing_yes: Option<f64>,
}

/// A match on a given day with what the engine knows about it.
#[derive(Debug, Clone, Serialize)]
pub struct MatchCandidate {
    #[serde(rename = "match")]
    pub fixture: Match,
    pub prediction: Option<PredictionSummary>,
    pub odds: Option<OddsSummary>,
    pub has_selection: bool,
}

/// Everything needed to explain one prediction.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionDetail {
    pub prediction: Prediction,
    pub odds: Option<Odds>,
    /// Value evaluation against the current odds.
    pub value: Option<ValueResult>,
    pub selection: Option<Selection>,
}

pub struct QueryService {
    store: Arc<dyn Store>,
    value: ValueConfig,
    health: HealthMonitor,
}

impl QueryService {
    pub fn new(store: Arc<dyn Store>, value: ValueConfig, health: HealthMonitor) -> Self {
        Self {
            store,
            value,
            health,
        }
    }

    /// Selections created since midnight UTC.
    pub async fn todays_selections(&self, now: DateTime<Utc>) -> Result<Vec<Selection>> {
        let midnight = now.date_naive().and_hms_opt(0, 0, 0).map(|t| t.and_utc());
        Ok(self.store.selections_created(midnight, None).await?)
    }

    /// Selections created in the last seven days.
    pub async fn weeks_selections(&self, now: DateTime<Utc>) -> Result<Vec<Selection>> {
        Ok(self
            .store
            .selections_created(Some(now - Duration::days(7)), None)
            .await?)
    }

    /// Newest-first history. `per_page` is capped at 100.
    pub async fn selection_history(&self, page: u32, per_page: u32) -> Result<Page<Selection>> {
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        self.store
            .selections_page(page, per_page)
            .await
            .context("Failed to load selection history")
    }

    pub async fn match_candidates(&self, date: NaiveDate) -> Result<Vec<MatchCandidate>> {
        let matches = self.store.matches_on(date, None, None).await?;
        let mut out = Vec::with_capacity(matches.len());
        for m in matches {
            let prediction = self.store.prediction_for_match(&m.id).await?;
            let odds = self.store.get_odds(&m.id).await?;
            let has_selection = self.store.selection_for_match(&m.id).await?.is_some();
            out.push(MatchCandidate {
                prediction: prediction.map(|p| PredictionSummary {
                    probability: p.p_real,
                    edge_score: p.edge_score,
                    confidence: p.confidence,
                    warnings: p.warnings.len(),
                }),
                odds: odds.map(|o| OddsSummary {
                    best_yes: o.best_yes,
                    is_real_odds: o.is_real_odds,
                    estimation_confidence: o.estimation_confidence,
                    closing_yes: o.closing_yes,
                }),
                has_selection,
                fixture: m,
            });
        }
        Ok(out)
    }

    pub async fn prediction_detail(&self, match_id: &str) -> Result<Option<PredictionDetail>> {
        let Some(prediction) = self.store.prediction_for_match(match_id).await? else {
            return Ok(None);
        };
        let odds = self.store.get_odds(match_id).await?;
        let value = odds
            .as_ref()
            .map(|o| strategy::evaluate(&prediction, o, &self.value));
        let selection = self.store.selection_for_match(match_id).await?;
        Ok(Some(PredictionDetail {
            prediction,
            odds,
            value,
            selection,
        }))
    }

    /// Latest report, regenerated when the stored one is stale.
    pub async fn latest_health(&self) -> Result<HealthSnapshot> {
        self.health.get_latest_health_report().await
    }

    pub async fn fresh_health(&self, period_days: Option<u32>) -> Result<HealthSnapshot> {
        self.health.generate_health_report(period_days).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HealthConfig, PredictionConfig};
    use crate::model::PredictionEngine;
    use crate::storage::MemoryStore;
    use crate::types::{BookmakerQuote, LeagueProfile, LeagueTier, MatchStatus};
    use chrono::TimeZone;

    fn fixture(id: &str) -> Match {
        Match {
            id: id.into(),
            league_code: "EPL".into(),
            season: "2025".into(),
            home_team: format!("H{id}"),
            away_team: format!("A{id}"),
            kickoff: Utc.with_ymd_and_hms(2025, 10, 4, 15, 0, 0).unwrap(),
            status: MatchStatus::Scheduled,
            ht_home: None,
            ht_away: None,
            ft_home: None,
            ft_away: None,
            first_goal_minute: None,
            home_first_goal_minute: None,
            away_first_goal_minute: None,
            context: None,
            updated_at: Utc::now(),
        }
    }

    async fn service() -> (QueryService, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store
            .upsert_league(&LeagueProfile {
                code: "EPL".into(),
                name: "Premier League".into(),
                tier: LeagueTier::Medium,
                avg_g1h: 1.3,
                active: true,
                season: "2025".into(),
                supplier_id: None,
            })
            .await
            .unwrap();
        let health = HealthMonitor::new(store.clone(), HealthConfig::default());
        (
            QueryService::new(store.clone(), ValueConfig::default(), health),
            store,
        )
    }

    #[tokio::test]
    async fn test_candidates_report_prediction_and_odds_status() {
        let (q, store) = service().await;
        store.upsert_match(&fixture("1")).await.unwrap();
        store.upsert_match(&fixture("2")).await.unwrap();
        store
            .save_odds(&Odds::from_quotes(
                "1",
                vec![BookmakerQuote {
                    bookmaker: "b".into(),
                    yes: Some(1.6),
                    no: Some(2.4),
                }],
            ))
            .await
            .unwrap();
        PredictionEngine::new(store.clone(), PredictionConfig::default())
            .calculate_probability("1", false)
            .await
            .unwrap();

        let day = fixture("1").date();
        let c = q.match_candidates(day).await.unwrap();
        assert_eq!(c.len(), 2);
        let first = c.iter().find(|c| c.fixture.id == "1").unwrap();
        assert!(first.prediction.is_some());
        assert!(first.odds.as_ref().is_some_and(|o| o.is_real_odds));
        assert!(!first.has_selection);
        let second = c.iter().find(|c| c.fixture.id == "2").unwrap();
        assert!(second.prediction.is_none() && second.odds.is_none());

        let detail = q.prediction_detail("1").await.unwrap().unwrap();
        let value = detail.value.unwrap();
        assert_eq!(value.best_odds, Some(1.6));
        assert!(value.margin_valor.is_some());
        assert!(q.prediction_detail("2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_per_page_is_capped() {
        let (q, _) = service().await;
        let page = q.selection_history(1, 1000).await.unwrap();
        assert_eq!(page.per_page, MAX_PER_PAGE);
        assert_eq!(page.total, 0);
        assert!(q.todays_selections(Utc::now()).await.unwrap().is_empty());
    }
}
