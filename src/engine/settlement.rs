//! Settlement engine.
//!
//! Resolves pending selections once their match reaches a terminal status:
//! outcome, closing-line value and profit/loss (in stake-fraction units).
//! Safe to call repeatedly; settled selections are never touched again and
//! one selection's failure does not stop the others.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::storage::Store;
use crate::types::{Match, MatchStatus, Outcome, Selection, Settlement};

/// Prices closer than this are treated as unchanged.
const PRICE_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Settlement rules
// ---------------------------------------------------------------------------

/// What to do with one pending selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Settle(Settlement),
    Skip(String),
}

/// `(taken − closing) / closing`, or `None` when there is no distinct
/// closing price.
pub fn closing_line_value(taken: f64, closing: Option<f64>) -> Option<f64> {
    let closing = closing.filter(|c| *c > 0.0)?;
    if (taken - closing).abs() < PRICE_EPSILON {
        return None;
    }
    Some((taken - closing) / closing)
}

/// Decide a pending selection against its match. Pure.
pub fn decide(
    selection: &Selection,
    m: &Match,
    closing_odds: Option<f64>,
    now: DateTime<Utc>,
) -> Decision {
    if !m.status.is_settleable() {
        return Decision::Skip(format!("match is {}", m.status));
    }

    if m.status.is_void() {
        return Decision::Settle(Settlement {
            outcome: Outcome::Void,
            closing_odds,
            clv: None,
            profit_loss: 0.0,
            settled_at: now,
            actual_g1h_goals: None,
            first_goal_minute: None,
        });
    }

    let Some(goals) = m.first_half_goals() else {
        return Decision::Skip("finished without a half-time score".to_string());
    };

    let (outcome, profit_loss) = if goals > 0 {
        (
            Outcome::Won,
            (selection.odds_at_selection - 1.0) * selection.stake_fraction,
        )
    } else {
        (Outcome::Lost, -selection.stake_fraction)
    };

    Decision::Settle(Settlement {
        outcome,
        closing_odds,
        clv: closing_line_value(selection.odds_at_selection, closing_odds),
        profit_loss,
        settled_at: now,
        actual_g1h_goals: Some(goals),
        first_goal_minute: if goals > 0 { m.first_goal_minute } else { None },
    })
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SettlementError {
    pub selection_id: String,
    pub match_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SettlementResult {
    pub success: bool,
    pub pending: usize,
    pub settled: usize,
    pub won: usize,
    pub lost: usize,
    pub voided: usize,
    pub skipped: usize,
    pub errors: Vec<SettlementError>,
    pub execution_time_ms: u64,
}

enum Step {
    Settled(Outcome),
    Skipped,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SettlementEngine {
    store: Arc<dyn Store>,
    concurrency: usize,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn Store>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Settle every pending selection whose match has finished, been
    /// cancelled or been postponed.
    pub async fn settle_selections(&self) -> Result<SettlementResult> {
        let started = Instant::now();
        let pending = self
            .store
            .pending_selections()
            .await
            .context("Failed to load pending selections")?;

        let mut result = SettlementResult {
            pending: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            debug!("No pending selections");
            result.success = true;
            return Ok(result);
        }

        let outcomes: Vec<(Selection, Result<Step>)> = stream::iter(pending)
            .map(|s| async move {
                let step = self.settle_one(&s).await;
                (s, step)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (s, step) in outcomes {
            match step {
                Ok(Step::Settled(outcome)) => {
                    result.settled += 1;
                    match outcome {
                        Outcome::Won => result.won += 1,
                        Outcome::Lost => result.lost += 1,
                        Outcome::Void => result.voided += 1,
                        Outcome::Pending => {}
                    }
                }
                Ok(Step::Skipped) => result.skipped += 1,
                Err(e) => {
                    warn!(selection_id = %s.id, match_id = %s.match_id, error = %e, "Settlement failed");
                    result.errors.push(SettlementError {
                        selection_id: s.id.clone(),
                        match_id: s.match_id.clone(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        result.success = true;
        result.execution_time_ms = started.elapsed().as_millis() as u64;
        info!(
            pending = result.pending,
            settled = result.settled,
            won = result.won,
            lost = result.lost,
            voided = result.voided,
            skipped = result.skipped,
            errors = result.errors.len(),
            "Settlement sweep complete"
        );
        Ok(result)
    }

    async fn settle_one(&self, selection: &Selection) -> Result<Step> {
        let Some(m) = self.store.get_match(&selection.match_id).await? else {
            anyhow::bail!("match {} not found", selection.match_id);
        };
        if m.status == MatchStatus::Scheduled {
            return Ok(Step::Skipped);
        }
        let closing = self
            .store
            .get_odds(&selection.match_id)
            .await?
            .and_then(|o| o.closing_yes);

        let settlement = match decide(selection, &m, closing, Utc::now()) {
            Decision::Settle(s) => s,
            Decision::Skip(reason) => {
                debug!(selection_id = %selection.id, reason = %reason, "Not settleable yet");
                return Ok(Step::Skipped);
            }
        };

        if !self.store.settle_selection(&selection.id, &settlement).await? {
            // Settled concurrently by another sweep.
            return Ok(Step::Skipped);
        }
        info!(
            selection_id = %selection.id,
            teams = %selection.label(),
            outcome = %settlement.outcome,
            profit_loss = %format!("{:+.4}", settlement.profit_loss),
            clv = ?settlement.clv.map(|c| format!("{:+.2}%", c * 100.0)),
            "Selection settled"
        );
        Ok(Step::Settled(settlement.outcome))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
