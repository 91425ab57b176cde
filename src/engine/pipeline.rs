//! Daily selection pipeline.
//!
//! Fixed step order, each step logged with a sequence number:
//!
//! 1. Fetch scheduled matches for the date (active leagues, or one league).
//! 2. Generate predictions.
//! 3. Load odds.
//! 4. Evaluate value; split candidates from skips.
//! 5. Rank by margin and walk the list under the count and exposure caps.
//! 6. Persist accepted selections with a denormalized snapshot.
//!
//! Per-match failures go to the skip list; only an orchestration failure
//! aborts the run, reported with `success = false`. Re-running for the same
//! date creates no duplicates: selections already persisted for the date
//! are counted against the budget before the walk, and their candidates
//! are skipped.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::model::PredictionEngine;
use crate::storage::Store;
use crate::strategy::exposure::{CapRejection, SelectionBudget};
use crate::strategy::{rank_candidates, ValueEngine, ValueResult};
use crate::types::{Match, MatchStatus, Odds, Outcome, Prediction, Selection};

// ---------------------------------------------------------------------------
// Options and result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Target date (UTC). Defaults to today.
    pub date: Option<NaiveDate>,
    pub league_code: Option<String>,
    /// Compute everything, persist nothing.
    pub dry_run: bool,
    pub force_regenerate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    FetchMatches,
    GeneratePredictions,
    FetchOdds,
    EvaluateValue,
    RankAndSelect,
    Persist,
}

/// A match passed on, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SkipRecord {
    pub match_id: String,
    pub teams: String,
    pub step: PipelineStep,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepLog {
    pub seq: u32,
    pub step: PipelineStep,
    pub count: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub date: NaiveDate,
    pub dry_run: bool,
    pub success: bool,
    pub matches_analyzed: usize,
    pub predictions_generated: usize,
    pub candidates_found: usize,
    pub selections_created: usize,
    pub total_exposure: f64,
    pub selections: Vec<Selection>,
    pub skipped: Vec<SkipRecord>,
    pub steps: Vec<StepLog>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl PipelineResult {
    fn new(date: NaiveDate, dry_run: bool) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            date,
            dry_run,
            success: false,
            matches_analyzed: 0,
            predictions_generated: 0,
            candidates_found: 0,
            selections_created: 0,
            total_exposure: 0.0,
            selections: Vec::new(),
            skipped: Vec::new(),
            steps: Vec::new(),
            message: None,
            error: None,
            execution_time_ms: 0,
        }
    }

    fn log_step(&mut self, step: PipelineStep, count: usize, message: impl Into<String>) {
        let seq = self.steps.len() as u32 + 1;
        let message = message.into();
        info!(run_id = %self.run_id, seq, step = ?step, count, "{message}");
        self.steps.push(StepLog {
            seq,
            step,
            count,
            message,
        });
    }

    fn skip(&mut self, match_id: &str, teams: String, step: PipelineStep, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(run_id = %self.run_id, match_id, step = ?step, reason = %reason, "Match skipped");
        self.skipped.push(SkipRecord {
            match_id: match_id.to_string(),
            teams,
            step,
            reason,
        });
    }
}

/// Everything known about one match as it moves through the run.
struct Work {
    fixture: Match,
    prediction: Prediction,
    odds: Odds,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct SelectionPipeline {
    store: Arc<dyn Store>,
    predictions: PredictionEngine,
    value: ValueEngine,
    config: PipelineConfig,
}

impl SelectionPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        predictions: PredictionEngine,
        value: ValueEngine,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            predictions,
            value,
            config,
        }
    }

    /// Run the daily pipeline. Never returns an error: failures are
    /// reported on the result.
    pub async fn run_daily_pipeline(&self, options: PipelineOptions) -> PipelineResult {
        let started = Instant::now();
        let date = options.date.unwrap_or_else(|| Utc::now().date_naive());
        let mut result = PipelineResult::new(date, options.dry_run);

        info!(
            run_id = %result.run_id,
            %date,
            league = ?options.league_code,
            dry_run = options.dry_run,
            force = options.force_regenerate,
            "Pipeline run started"
        );

        match self.run(&options, &mut result).await {
            Ok(()) => result.success = true,
            Err(e) => {
                error!(run_id = %result.run_id, error = %format!("{e:#}"), "Pipeline run aborted");
                result.error = Some(format!("{e:#}"));
            }
        }

        result.execution_time_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %result.run_id,
            success = result.success,
            matches = result.matches_analyzed,
            candidates = result.candidates_found,
            selections = result.selections_created,
            exposure = %format!("{:.2}%", result.total_exposure * 100.0),
            skipped = result.skipped.len(),
            elapsed_ms = result.execution_time_ms,
            "Pipeline run finished"
        );
        result
    }

    async fn run(&self, options: &PipelineOptions, result: &mut PipelineResult) -> Result<()> {
        // Step 1: fetch matches
        let matches = self
            .fetch_matches(
                result.date,
                options.league_code.as_deref(),
                Some(MatchStatus::Scheduled),
            )
            .await
            .context("Failed to fetch matches")?;
        result.matches_analyzed = matches.len();
        result.log_step(
            PipelineStep::FetchMatches,
            matches.len(),
            format!("{} scheduled matches on {}", matches.len(), result.date),
        );
        if matches.is_empty() {
            result.message = Some("no matches found".to_string());
            return Ok(());
        }

        // Step 2: predictions
        let concurrency = self.config.concurrency.max(1);
        let predicted: Vec<(Match, Result<Option<Prediction>>)> = stream::iter(matches)
            .map(|m| async move {
                let prediction = if options.dry_run {
                    self.predictions
                        .preview_probability(&m.id, options.force_regenerate)
                        .await
                } else {
                    self.predictions
                        .calculate_probability(&m.id, options.force_regenerate)
                        .await
                };
                (m, prediction)
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut with_prediction = Vec::new();
        for (m, outcome) in predicted {
            match outcome {
                Ok(Some(p)) => with_prediction.push((m, p)),
                Ok(None) => result.skip(
                    &m.id,
                    m.label(),
                    PipelineStep::GeneratePredictions,
                    "no prediction: league not configured",
                ),
                Err(e) => {
                    warn!(match_id = %m.id, error = %e, "Prediction failed");
                    result.skip(
                        &m.id,
                        m.label(),
                        PipelineStep::GeneratePredictions,
                        format!("prediction failed: {e:#}"),
                    );
                }
            }
        }
        result.predictions_generated = with_prediction.len();
        result.log_step(
            PipelineStep::GeneratePredictions,
            with_prediction.len(),
            format!("{} predictions ready", with_prediction.len()),
        );

        // Step 3: odds
        let store = &self.store;
        let with_odds: Vec<(Match, Prediction, Result<Option<Odds>>)> =
            stream::iter(with_prediction)
                .map(|(m, p)| async move {
                    let odds = store.get_odds(&m.id).await.map_err(anyhow::Error::from);
                    (m, p, odds)
                })
                .buffered(concurrency)
                .collect()
                .await;

        let mut work: HashMap<String, Work> = HashMap::new();
        let mut pairs = Vec::new();
        for (m, p, odds) in with_odds {
            match odds {
                Ok(Some(o)) => {
                    pairs.push((p.clone(), o.clone()));
                    work.insert(
                        m.id.clone(),
                        Work {
                            fixture: m,
                            prediction: p,
                            odds: o,
                        },
                    );
                }
                Ok(None) => result.skip(&m.id, m.label(), PipelineStep::FetchOdds, "no odds available"),
                Err(e) => result.skip(
                    &m.id,
                    m.label(),
                    PipelineStep::FetchOdds,
                    format!("odds lookup failed: {e:#}"),
                ),
            }
        }
        result.log_step(
            PipelineStep::FetchOdds,
            pairs.len(),
            format!("{} matches with odds", pairs.len()),
        );

        // Step 4: value
        let mut candidates: Vec<ValueResult> = Vec::new();
        for v in self.value.evaluate_multiple(&pairs) {
            if v.is_candidate {
                candidates.push(v);
            } else {
                let teams = work.get(&v.match_id).map(|w| w.fixture.label()).unwrap_or_default();
                let reason = v.skip_reason.clone().unwrap_or_else(|| "not a candidate".to_string());
                result.skip(&v.match_id, teams, PipelineStep::EvaluateValue, reason);
            }
        }
        result.candidates_found = candidates.len();
        result.log_step(
            PipelineStep::EvaluateValue,
            candidates.len(),
            format!("{} candidates from {} evaluated", candidates.len(), pairs.len()),
        );

        // Step 5 + 6: rank, cap, persist. Single ordered pass.
        rank_candidates(&mut candidates);
        result.log_step(
            PipelineStep::RankAndSelect,
            candidates.len(),
            "candidates ranked by margin",
        );
        let existing = self
            .existing_selections(result.date, options.league_code.as_deref())
            .await
            .context("Failed to load existing selections")?;
        self.select_and_persist(&candidates, &work, &existing, options.dry_run, result)
            .await?;
        let message = if options.dry_run {
            format!("dry run: {} selections would be created", result.selections_created)
        } else {
            format!("{} selections persisted", result.selections_created)
        };
        result.log_step(PipelineStep::Persist, result.selections_created, message);
        Ok(())
    }

    async fn fetch_matches(
        &self,
        date: NaiveDate,
        league: Option<&str>,
        status: Option<MatchStatus>,
    ) -> Result<Vec<Match>> {
        let leagues = self.store.list_leagues(true).await?;
        let mut matches = Vec::new();
        for l in leagues.iter().filter(|l| league.map_or(true, |c| c == l.code)) {
            let mut found = self.store.matches_on(date, Some(&l.code), status).await?;
            matches.append(&mut found);
        }
        matches.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then_with(|| a.id.cmp(&b.id)));
        Ok(matches)
    }

    /// Selections already persisted for matches on the date, in any status.
    async fn existing_selections(
        &self,
        date: NaiveDate,
        league: Option<&str>,
    ) -> Result<HashMap<String, Selection>> {
        let mut existing = HashMap::new();
        for m in self.fetch_matches(date, league, None).await? {
            if let Some(s) = self.store.selection_for_match(&m.id).await? {
                existing.insert(m.id, s);
            }
        }
        Ok(existing)
    }

    async fn select_and_persist(
        &self,
        ranked: &[ValueResult],
        work: &HashMap<String, Work>,
        existing: &HashMap<String, Selection>,
        dry_run: bool,
        result: &mut PipelineResult,
    ) -> Result<()> {
        let mut budget = SelectionBudget::new(&self.config);
        for s in existing.values() {
            budget.record(s.stake_fraction);
        }
        if !existing.is_empty() {
            debug!(
                existing = budget.selected(),
                exposure = budget.exposure(),
                "Budget seeded from existing selections"
            );
        }

        let mut stopped: Option<CapRejection> = None;
        for candidate in ranked {
            let Some(w) = work.get(&candidate.match_id) else {
                continue;
            };
            let teams = w.fixture.label();

            if let Some(prior) = existing.get(&candidate.match_id) {
                result.skip(
                    &candidate.match_id,
                    teams,
                    PipelineStep::RankAndSelect,
                    format!("selection already exists (run {})", prior.run_id),
                );
                continue;
            }
            if let Some(cap) = &stopped {
                result.skip(&candidate.match_id, teams, PipelineStep::RankAndSelect, cap.to_string());
                continue;
            }
            if let Err(cap) = budget.check(candidate.stake_fraction) {
                result.skip(&candidate.match_id, teams, PipelineStep::RankAndSelect, cap.to_string());
                if cap.stops_walk() {
                    stopped = Some(cap);
                }
                continue;
            }

            let selection = build_selection(
                candidate,
                w,
                &result.run_id,
                budget.selected() as u32 + 1,
            );

            if !dry_run {
                match self.store.insert_selection(&selection).await {
                    Ok(()) => {}
                    Err(e) if e.is_duplicate() => {
                        result.skip(
                            &candidate.match_id,
                            teams,
                            PipelineStep::Persist,
                            "selection already exists (concurrent run)",
                        );
                        continue;
                    }
                    Err(e) => {
                        warn!(match_id = %candidate.match_id, error = %e, "Selection insert failed");
                        result.skip(
                            &candidate.match_id,
                            teams,
                            PipelineStep::Persist,
                            format!("persist failed: {e}"),
                        );
                        continue;
                    }
                }
            }

            budget.record(selection.stake_fraction);
            info!(
                run_id = %result.run_id,
                rank = selection.rank,
                match_id = %selection.match_id,
                teams = %teams,
                signal = %selection.signal,
                margin = %format!("{:+.2}%", selection.margin_valor * 100.0),
                stake = %format!("{:.2}%", selection.stake_fraction * 100.0),
                odds = selection.odds_at_selection,
                dry_run,
                "Selection accepted"
            );
            result.selections_created += 1;
            result.total_exposure += selection.stake_fraction;
            result.selections.push(selection);
        }
        Ok(())
    }
}

/// Selection with a denormalized decision-time snapshot.
fn build_selection(v: &ValueResult, w: &Work, run_id: &str, rank: u32) -> Selection {
    Selection {
        id: uuid::Uuid::new_v4().to_string(),
        match_id: w.fixture.id.clone(),
        run_id: run_id.to_string(),
        rank,
        league_code: w.fixture.league_code.clone(),
        home_team: w.fixture.home_team.clone(),
        away_team: w.fixture.away_team.clone(),
        kickoff: w.fixture.kickoff,
        signal: v.signal,
        margin_valor: v.margin_valor.unwrap_or_default(),
        probability: w.prediction.p_real,
        edge_score: w.prediction.edge_score,
        confidence: w.prediction.confidence,
        stake_fraction: v.stake_fraction,
        odds_at_selection: v.best_odds.unwrap_or_default(),
        bookmaker: w.odds.best_yes_bookmaker.clone(),
        is_real_odds: w.odds.is_real_odds,
        outcome: Outcome::Pending,
        closing_odds: None,
        clv: None,
        profit_loss: None,
        settled_at: None,
        actual_g1h_goals: None,
        first_goal_minute: None,
        created_at: Utc::now(),
    }
}
