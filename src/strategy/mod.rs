//! Value engine: margin, signal tier, stake sizing and candidate filtering.
//!
//! Converts a (prediction, odds) pair into a [`ValueResult`]. Every pair is
//! evaluated independently; ranking and capping across matches belong to
//! the selection pipeline (see [`exposure`]).

pub mod exposure;
pub mod signal;
pub mod stake;

use anyhow::Result;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::config::ValueConfig;
use crate::storage::Store;
use crate::types::{Confidence, Odds, Prediction, Signal};

// ---------------------------------------------------------------------------
// Value result
// ---------------------------------------------------------------------------

/// Outcome of evaluating one (prediction, odds) pair.
///
/// Non-candidates still carry the computed signal, margin and stake so the
/// pipeline audit trail shows why they were passed on.
#[derive(Debug, Clone, Serialize)]
pub struct ValueResult {
    pub prediction_id: String,
    pub odds_id: String,
    pub match_id: String,
    pub probability: f64,
    pub edge_score: f64,
    pub confidence: Confidence,
    pub best_odds: Option<f64>,
    pub bookmaker: Option<String>,
    pub is_real_odds: bool,
    pub margin_valor: Option<f64>,
    pub signal: Signal,
    pub stake_fraction: f64,
    pub multiplier: f64,
    pub is_candidate: bool,
    pub skip_reason: Option<String>,
}

/// Evaluate one pair. Pure.
pub fn evaluate(prediction: &Prediction, odds: &Odds, config: &ValueConfig) -> ValueResult {
    let mut result = ValueResult {
        prediction_id: prediction.id.clone(),
        odds_id: odds.id.clone(),
        match_id: prediction.match_id.clone(),
        probability: prediction.p_real,
        edge_score: prediction.edge_score,
        confidence: prediction.confidence,
        best_odds: None,
        bookmaker: odds.best_yes_bookmaker.clone(),
        is_real_odds: odds.is_real_odds,
        margin_valor: None,
        signal: Signal::None,
        stake_fraction: 0.0,
        multiplier: 0.0,
        is_candidate: false,
        skip_reason: None,
    };

    let Some(price) = odds.usable_yes() else {
        result.skip_reason = Some("no usable first-half Yes price".to_string());
        return result;
    };

    let margin = signal::margin_valor(price, prediction.p_real);
    let tier = signal::classify(margin, config);
    let (stake, multiplier) = stake::stake_fraction(tier, prediction.edge_score, config);
    result.best_odds = Some(price);
    result.margin_valor = Some(margin);
    result.signal = tier;
    result.stake_fraction = stake;
    result.multiplier = multiplier;

    let mut reasons = Vec::new();
    if tier == Signal::None {
        reasons.push(format!("no value: margin {:+.1}% at {price:.2}", margin * 100.0));
    }
    if prediction.p_real < config.min_probability {
        reasons.push(format!(
            "probability {:.1}% below floor {:.0}%",
            prediction.p_real * 100.0,
            config.min_probability * 100.0
        ));
    }
    if prediction.edge_score < config.min_edge_score {
        reasons.push(format!(
            "edge score {:.0} below floor {:.0}",
            prediction.edge_score, config.min_edge_score
        ));
    }

    if reasons.is_empty() {
        result.is_candidate = true;
    } else {
        result.skip_reason = Some(reasons.join("; "));
    }
    result
}

/// Sort candidates best first: margin, then edge score, then match id.
pub fn rank_candidates(candidates: &mut [ValueResult]) {
    candidates.sort_by(|a, b| {
        let margin_a = a.margin_valor.unwrap_or(f64::MIN);
        let margin_b = b.margin_valor.unwrap_or(f64::MIN);
        margin_b
            .partial_cmp(&margin_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.edge_score
                    .partial_cmp(&a.edge_score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.match_id.cmp(&b.match_id))
    });
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ValueEngine {
    store: Arc<dyn Store>,
    config: ValueConfig,
}

impl ValueEngine {
    pub fn new(store: Arc<dyn Store>, config: ValueConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ValueConfig {
        &self.config
    }

    /// Evaluate stored records. `Ok(None)` if either is missing.
    pub async fn evaluate_value(
        &self,
        prediction_id: &str,
        odds_id: &str,
    ) -> Result<Option<ValueResult>> {
        let Some(prediction) = self.store.get_prediction(prediction_id).await? else {
            debug!(prediction_id, "Prediction not found");
            return Ok(None);
        };
        let Some(odds) = self.store.get_odds_by_id(odds_id).await? else {
            debug!(odds_id, "Odds not found");
            return Ok(None);
        };
        Ok(Some(self.evaluate(&prediction, &odds)))
    }

    pub fn evaluate(&self, prediction: &Prediction, odds: &Odds) -> ValueResult {
        let result = evaluate(prediction, odds, &self.config);
        debug!(
            match_id = %result.match_id,
            signal = %result.signal,
            margin = ?result.margin_valor.map(|m| format!("{:+.2}%", m * 100.0)),
            candidate = result.is_candidate,
            "Value evaluated"
        );
        result
    }

    /// Evaluate a batch independently.
    pub fn evaluate_multiple(&self, pairs: &[(Prediction, Odds)]) -> Vec<ValueResult> {
        pairs.iter().map(|(p, o)| self.evaluate(p, o)).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{BookmakerQuote, EdgeBreakdown, RateSource};
    use chrono::Utc;

    fn prediction(match_id: &str, p_real: f64, edge_score: f64) -> Prediction {
        Prediction {
            id: format!("p-{match_id}"),
            match_id: match_id.into(),
            league_code: "EPL".into(),
            home_team: "H".into(),
            away_team: "A".into(),
            kickoff: Utc::now(),
            league_rate: 0.72,
            home_rate: 0.7,
            home_rate_source: RateSource::Venue,
            away_concede_rate: 0.55,
            away_rate_source: RateSource::Venue,
            p_base: p_real,
            factors: vec![],
            p_real,
            edge_score,
            breakdown: EdgeBreakdown::default(),
            confidence: Confidence::Medium,
            warnings: vec![],
            created_at: Utc::now(),
        }
    }

    fn odds(match_id: &str, yes: Option<f64>) -> Odds {
        Odds::from_quotes(
            match_id,
            vec![BookmakerQuote { bookmaker: "bet365".into(), yes, no: Some(2.5) }],
        )
    }

    #[test]
    fn test_reference_pair_is_signal_b() {
        let r = evaluate(&prediction("m1", 0.666, 67.0), &odds("m1", Some(1.55)), &ValueConfig::default());
        assert_eq!(r.signal, Signal::B);
        assert!((r.margin_valor.unwrap() - 0.0323).abs() < 1e-9);
        assert!(r.is_candidate);
        assert!(r.skip_reason.is_none());
        assert!(r.stake_fraction > 0.02);
    }

    #[test]
    fn test_negative_margin_is_not_candidate() {
        // 1.25 × 0.72 − 1 = −0.10
        let r = evaluate(&prediction("m1", 0.72, 70.0), &odds("m1", Some(1.25)), &ValueConfig::default());
        assert_eq!(r.signal, Signal::None);
        assert!(!r.is_candidate);
        assert_eq!(r.stake_fraction, 0.0);
        assert!(r.skip_reason.unwrap().contains("no value"));
    }

    #[test]
    fn test_missing_price_returns_none_signal_with_reason() {
        let r = evaluate(&prediction("m1", 0.7, 70.0), &odds("m1", None), &ValueConfig::default());
        assert_eq!(r.signal, Signal::None);
        assert!(r.best_odds.is_none());
        assert!(r.margin_valor.is_none());
        assert!(!r.is_candidate);
        assert!(r.skip_reason.is_some());
    }

    #[test]
    fn test_floors_reject_but_keep_values() {
        let cfg = ValueConfig::default();
        let r = evaluate(&prediction("m1", 0.50, 35.0), &odds("m1", Some(2.4)), &cfg);
        assert_eq!(r.signal, Signal::A);
        assert!(r.stake_fraction > 0.0);
        assert!(!r.is_candidate);
        let reason = r.skip_reason.unwrap();
        assert!(reason.contains("probability"));
        assert!(reason.contains("edge score"));
    }

    #[test]
    fn test_rank_by_margin_desc() {
        let cfg = ValueConfig::default();
        let mut rs = vec![
            evaluate(&prediction("a", 0.70, 60.0), &odds("a", Some(1.50)), &cfg),
            evaluate(&prediction("b", 0.70, 60.0), &odds("b", Some(1.60)), &cfg),
            evaluate(&prediction("c", 0.70, 60.0), &odds("c", Some(1.55)), &cfg),
        ];
        rank_candidates(&mut rs);
        let order: Vec<&str> = rs.iter().map(|r| r.match_id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_engine_missing_records() {
        let store = Arc::new(MemoryStore::new());
        let engine = ValueEngine::new(store.clone(), ValueConfig::default());
        assert!(engine.evaluate_value("nope", "nope").await.unwrap().is_none());

        let p = prediction("m1", 0.666, 67.0);
        let o = odds("m1", Some(1.55));
        store.insert_prediction(&p).await.unwrap();
        assert!(engine.evaluate_value(&p.id, "nope").await.unwrap().is_none());
        store.save_odds(&o).await.unwrap();
        let r = engine.evaluate_value(&p.id, &o.id).await.unwrap().unwrap();
        assert_eq!(r.signal, Signal::B);
    }

    #[test]
    fn test_evaluate_multiple_is_independent() {
        let engine = ValueEngine::new(Arc::new(MemoryStore::new()), ValueConfig::default());
        let pairs = vec![
            (prediction("a", 0.666, 67.0), odds("a", Some(1.55))),
            (prediction("b", 0.72, 70.0), odds("b", Some(1.25))),
        ];
        let rs = engine.evaluate_multiple(&pairs);
        assert_eq!(rs.len(), 2);
        assert!(rs[0].is_candidate);
        assert!(!rs[1].is_candidate);
    }
}
