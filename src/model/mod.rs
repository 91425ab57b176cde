//! Prediction engine.
//!
//! Turns a match plus its league and team profiles into a calibrated
//! first-half goal probability:
//!
//! 1. League λ → `1 − e^(−λ)`.
//! 2. Home scoring and away conceding rates, with fallbacks and warnings.
//! 3. Base = 0.4 × league + 0.3 × home + 0.3 × away.
//! 4. Six multiplicative factors (league, momentum, aggression,
//!    vulnerability, context, form).
//! 5. Final = base × Π factors, clamped to [0.40, 0.95].
//! 6. Edge score and confidence label.
//!
//! Every intermediate value is stored on the [`Prediction`] so downstream
//! decisions can be explained from stored data alone.

pub mod factors;
pub mod rates;
pub mod score;

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PredictionConfig;
use crate::storage::Store;
use crate::types::{Factor, LeagueProfile, Match, Prediction, TeamProfile};

use factors::FactorInputs;

/// Final probability bounds.
pub const PROBABILITY_FLOOR: f64 = 0.40;
pub const PROBABILITY_CEILING: f64 = 0.95;

/// `clamp(p_base × Π multipliers)`, multiplying in list order.
pub fn apply_factors(p_base: f64, factors: &[Factor]) -> f64 {
    let product: f64 = factors.iter().map(|f| f.multiplier).product();
    (p_base * product).clamp(PROBABILITY_FLOOR, PROBABILITY_CEILING)
}

/// Build a prediction from already-loaded inputs. Pure.
pub fn predict(
    m: &Match,
    league: &LeagueProfile,
    home: Option<&TeamProfile>,
    away: Option<&TeamProfile>,
    config: &PredictionConfig,
) -> Prediction {
    let mut warnings = Vec::new();
    let league_rate = league.g1h_rate();
    let (home_rate, home_rate_source) =
        rates::home_scoring_rate(home, &m.home_team, league_rate, config.min_matches, &mut warnings);
    let (away_concede_rate, away_rate_source) = rates::away_conceding_rate(
        away,
        &m.away_team,
        league_rate,
        config.min_matches,
        &mut warnings,
    );
    let p_base = rates::base_probability(league_rate, home_rate, away_concede_rate);

    let inputs = FactorInputs {
        league,
        home_name: &m.home_team,
        away_name: &m.away_team,
        home,
        away,
        context: m.context.as_ref(),
    };
    let factors = factors::compute_all(&inputs, config);
    let p_real = apply_factors(p_base, &factors);

    let context_multiplier = factors
        .iter()
        .find(|f| f.name == factors::CONTEXT)
        .map_or(1.0, |f| f.multiplier);
    let (edge_score, breakdown) = score::edge_score(&score::ScoreInputs {
        warnings: warnings.len(),
        home_rate,
        away_concede_rate,
        earliest_first_goal_minute: inputs.earliest_first_goal_minute(),
        context_multiplier,
        p_real,
    });
    let confidence = score::confidence(edge_score, warnings.len());

    Prediction {
        id: uuid::Uuid::new_v4().to_string(),
        match_id: m.id.clone(),
        league_code: m.league_code.clone(),
        home_team: m.home_team.clone(),
        away_team: m.away_team.clone(),
        kickoff: m.kickoff,
        league_rate,
        home_rate,
        home_rate_source,
        away_concede_rate,
        away_rate_source,
        p_base,
        factors,
        p_real,
        edge_score,
        breakdown,
        confidence,
        warnings,
        created_at: Utc::now(),
    }
}

/// Loads inputs from the store and persists one prediction per match.
pub struct PredictionEngine {
    store: Arc<dyn Store>,
    config: PredictionConfig,
}

impl PredictionEngine {
    pub fn new(store: Arc<dyn Store>, config: PredictionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// Probability for a match.
    ///
    /// Returns `Ok(None)` when the match or its league is unknown. An
    /// existing prediction is returned unchanged unless `force_regenerate`
    /// is set, in which case it is deleted and recomputed.
    pub async fn calculate_probability(
        &self,
        match_id: &str,
        force_regenerate: bool,
    ) -> Result<Option<Prediction>> {
        let Some(m) = self
            .store
            .get_match(match_id)
            .await
            .context("Failed to load match")?
        else {
            debug!(match_id, "Match not found");
            return Ok(None);
        };

        if let Some(existing) = self.store.prediction_for_match(match_id).await? {
            if !force_regenerate {
                return Ok(Some(existing));
            }
            self.store.delete_prediction_for_match(match_id).await?;
            debug!(match_id, "Existing prediction discarded for regeneration");
        }

        let Some(prediction) = self.compute(&m).await? else {
            return Ok(None);
        };

        match self.store.insert_prediction(&prediction).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => {
                // Another run got there first; keep its record.
                return Ok(self.store.prediction_for_match(match_id).await?);
            }
            Err(e) => return Err(e).context("Failed to store prediction"),
        }

        info!(
            match_id,
            teams = %m.label(),
            p_base = %format!("{:.1}%", prediction.p_base * 100.0),
            p_real = %format!("{:.1}%", prediction.p_real * 100.0),
            edge = prediction.edge_score,
            confidence = %prediction.confidence,
            warnings = prediction.warnings.len(),
            "Prediction created"
        );
        Ok(Some(prediction))
    }

    /// Like [`calculate_probability`](Self::calculate_probability) but never
    /// writes: returns the stored prediction when there is one (and no
    /// regeneration is asked for), otherwise a freshly computed one.
    pub async fn preview_probability(
        &self,
        match_id: &str,
        force_regenerate: bool,
    ) -> Result<Option<Prediction>> {
        let Some(m) = self.store.get_match(match_id).await? else {
            return Ok(None);
        };
        if !force_regenerate {
            if let Some(existing) = self.store.prediction_for_match(match_id).await? {
                return Ok(Some(existing));
            }
        }
        self.compute(&m).await
    }

    async fn compute(&self, m: &Match) -> Result<Option<Prediction>> {
        let Some(league) = self.store.get_league(&m.league_code).await? else {
            warn!(match_id = %m.id, league = %m.league_code, "League not configured");
            return Ok(None);
        };
        let home = self
            .store
            .get_team(&m.league_code, &m.home_team, &m.season)
            .await?;
        let away = self
            .store
            .get_team(&m.league_code, &m.away_team, &m.season)
            .await?;
        Ok(Some(predict(m, &league, home.as_ref(), away.as_ref(), &self.config)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
