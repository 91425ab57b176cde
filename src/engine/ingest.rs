//! Ingestion services.
//!
//! Bring supplier data into the store: league profiles from config,
//! fixtures and scores, first-half odds (real or estimated), closing
//! prices, and team profiles recomputed from finished matches. Each entry
//! point is idempotent and reports a structured result; per-league and
//! per-match failures are recorded and do not stop the batch.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EstimationConfig;
use crate::data::estimate::estimate;
use crate::data::team_stats::build_profiles;
use crate::data::{FixtureSupplier, OddsSupplier, SupplierError};
use crate::storage::Store;
use crate::types::{LeagueProfile, Match, MatchStatus, Odds};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    /// League code or match id.
    pub key: String,
    pub error: String,
    pub transient: bool,
}

impl IngestFailure {
    fn supplier(key: &str, e: &SupplierError) -> Self {
        Self {
            key: key.to_string(),
            error: e.to_string(),
            transient: e.is_transient(),
        }
    }

    fn store(key: &str, e: &anyhow::Error) -> Self {
        Self {
            key: key.to_string(),
            error: format!("{e:#}"),
            transient: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResult {
    pub leagues: usize,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub failures: Vec<IngestFailure>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OddsRefreshResult {
    pub matches: usize,
    pub real: usize,
    pub estimated: usize,
    /// Estimates not written because real odds were already stored.
    pub kept_real: usize,
    pub missing: usize,
    pub failures: Vec<IngestFailure>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClosingCaptureResult {
    pub matches: usize,
    pub captured: usize,
    /// Captured from the stored price because no fresh quote was available.
    pub stale: usize,
    pub already_captured: usize,
    pub no_odds: usize,
    pub failures: Vec<IngestFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamStatsResult {
    pub league_code: String,
    pub season: String,
    pub matches_used: usize,
    pub teams: usize,
}

enum OddsOutcome {
    Real,
    Estimated,
    KeptReal,
    Missing,
}

enum ClosingOutcome {
    Captured { fresh: bool },
    AlreadyCaptured,
    NoOdds,
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// Upsert configured league profiles. Needs no supplier.
pub async fn sync_leagues(store: &dyn Store, leagues: &[LeagueProfile]) -> Result<usize> {
    for l in leagues {
        store
            .upsert_league(l)
            .await
            .with_context(|| format!("Failed to upsert league {}", l.code))?;
    }
    info!(leagues = leagues.len(), "League profiles synced");
    Ok(leagues.len())
}

pub struct Ingestor {
    store: Arc<dyn Store>,
    fixtures: Arc<dyn FixtureSupplier>,
    odds: Arc<dyn OddsSupplier>,
    estimation: EstimationConfig,
    concurrency: usize,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Store>,
        fixtures: Arc<dyn FixtureSupplier>,
        odds: Arc<dyn OddsSupplier>,
        estimation: EstimationConfig,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            fixtures,
            odds,
            estimation,
            concurrency: concurrency.max(1),
        }
    }

    /// Import fixtures with kickoff dates in `[from, to]` for every active league.
    pub async fn import_fixtures(&self, from: NaiveDate, to: NaiveDate) -> Result<ImportResult> {
        let started = Instant::now();
        let leagues = self
            .store
            .list_leagues(true)
            .await
            .context("Failed to list leagues")?;
        let mut result = ImportResult {
            leagues: leagues.len(),
            ..Default::default()
        };

        for league in &leagues {
            let records = match self.fixtures.fixtures(league, from, to).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(
                        league = %league.code,
                        error = %e,
                        transient = e.is_transient(),
                        "Fixture import failed for league"
                    );
                    result.failures.push(IngestFailure::supplier(&league.code, &e));
                    continue;
                }
            };
            result.fetched += records.len();

            let now = Utc::now();
            for record in records {
                let stored = async {
                    let existing = self.store.get_match(&record.id).await?;
                    let is_new = existing.is_none();
                    let merged = record.merge_into(existing.as_ref(), now);
                    self.store.upsert_match(&merged).await?;
                    anyhow::Ok(is_new)
                }
                .await;
                match stored {
                    Ok(true) => result.created += 1,
                    Ok(false) => result.updated += 1,
                    Err(e) => result.failures.push(IngestFailure::store(&record.id, &e)),
                }
            }
            debug!(league = %league.code, "League fixtures imported");
        }

        result.execution_time_ms = started.elapsed().as_millis() as u64;
        info!(
            %from,
            %to,
            leagues = result.leagues,
            fetched = result.fetched,
            created = result.created,
            updated = result.updated,
            failures = result.failures.len(),
            "Fixture import complete"
        );
        Ok(result)
    }

    /// Refresh first-half odds for scheduled matches on `date`.
    pub async fn refresh_odds(&self, date: NaiveDate) -> Result<OddsRefreshResult> {
        let started = Instant::now();
        let matches = self
            .store
            .matches_on(date, None, Some(MatchStatus::Scheduled))
            .await
            .context("Failed to load scheduled matches")?;
        let mut result = OddsRefreshResult {
            matches: matches.len(),
            ..Default::default()
        };

        let outcomes: Vec<(String, Result<OddsOutcome, IngestFailure>)> = stream::iter(matches)
            .map(|m| async move {
                let outcome = self.refresh_match_odds(&m).await;
                (m.id, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (match_id, outcome) in outcomes {
            match outcome {
                Ok(OddsOutcome::Real) => result.real += 1,
                Ok(OddsOutcome::Estimated) => result.estimated += 1,
                Ok(OddsOutcome::KeptReal) => result.kept_real += 1,
                Ok(OddsOutcome::Missing) => result.missing += 1,
                Err(f) => {
                    warn!(match_id = %match_id, error = %f.error, "Odds refresh failed");
                    result.failures.push(f);
                }
            }
        }

        result.execution_time_ms = started.elapsed().as_millis() as u64;
        info!(
            %date,
            matches = result.matches,
            real = result.real,
            estimated = result.estimated,
            kept_real = result.kept_real,
            missing = result.missing,
            failures = result.failures.len(),
            "Odds refresh complete"
        );
        Ok(result)
    }

    async fn refresh_match_odds(&self, m: &Match) -> Result<OddsOutcome, IngestFailure> {
        let store_err = |e: crate::storage::StoreError| IngestFailure::store(&m.id, &e.into());

        let quotes = self
            .odds
            .first_half_quotes(m)
            .await
            .map_err(|e| IngestFailure::supplier(&m.id, &e))?;
        let real = Odds::from_quotes(&m.id, quotes);
        if real.usable_yes().is_some() {
            self.store.save_odds(&real).await.map_err(store_err)?;
            debug!(match_id = %m.id, odds = %real, "Real odds stored");
            return Ok(OddsOutcome::Real);
        }

        // No direct market. Never estimate over real odds already held.
        let existing = self.store.get_odds(&m.id).await.map_err(store_err)?;
        if existing.as_ref().is_some_and(|o| o.is_real_odds) {
            return Ok(OddsOutcome::KeptReal);
        }

        let Some(result_odds) = self
            .odds
            .match_result_odds(m)
            .await
            .map_err(|e| IngestFailure::supplier(&m.id, &e))?
        else {
            return Ok(OddsOutcome::Missing);
        };
        let Some(est) = estimate(&result_odds, &self.estimation) else {
            return Ok(OddsOutcome::Missing);
        };

        let odds = Odds::estimated(&m.id, est.yes_price, est.no_price, est.reason, est.confidence);
        if !self.store.save_odds(&odds).await.map_err(store_err)? {
            return Ok(OddsOutcome::KeptReal);
        }
        debug!(
            match_id = %m.id,
            odds = %odds,
            confidence = %est.confidence,
            "Estimated odds stored"
        );
        Ok(OddsOutcome::Estimated)
    }

    /// Capture closing prices for scheduled matches kicking off within
    /// `window` of `now`. Each match's market is re-quoted first; the stored
    /// price is used only when the supplier has nothing. A captured price is
    /// never overwritten.
    pub async fn capture_closing_odds(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<ClosingCaptureResult> {
        let matches = self
            .store
            .matches_between(now, now + window)
            .await
            .context("Failed to load upcoming matches")?;
        let scheduled: Vec<Match> = matches
            .into_iter()
            .filter(|m| m.status == MatchStatus::Scheduled)
            .collect();
        let mut result = ClosingCaptureResult {
            matches: scheduled.len(),
            ..Default::default()
        };

        let outcomes: Vec<(String, Result<ClosingOutcome, IngestFailure>)> =
            stream::iter(scheduled)
                .map(|m| async move {
                    let outcome = self.capture_match_closing(&m, now).await;
                    (m.id, outcome)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        for (match_id, outcome) in outcomes {
            match outcome {
                Ok(ClosingOutcome::Captured { fresh }) => {
                    result.captured += 1;
                    if !fresh {
                        result.stale += 1;
                    }
                }
                Ok(ClosingOutcome::AlreadyCaptured) => result.already_captured += 1,
                Ok(ClosingOutcome::NoOdds) => result.no_odds += 1,
                Err(f) => {
                    warn!(match_id = %match_id, error = %f.error, "Closing capture failed");
                    result.failures.push(f);
                }
            }
        }

        info!(
            matches = result.matches,
            captured = result.captured,
            stale = result.stale,
            already = result.already_captured,
            no_odds = result.no_odds,
            failures = result.failures.len(),
            "Closing capture complete"
        );
        Ok(result)
    }

    async fn capture_match_closing(
        &self,
        m: &Match,
        now: DateTime<Utc>,
    ) -> Result<ClosingOutcome, IngestFailure> {
        let store_err = |e: crate::storage::StoreError| IngestFailure::store(&m.id, &e.into());

        let existing = self.store.get_odds(&m.id).await.map_err(store_err)?;
        if existing.as_ref().is_some_and(|o| o.closing_yes.is_some()) {
            return Ok(ClosingOutcome::AlreadyCaptured);
        }

        let fresh = match self.odds.first_half_quotes(m).await {
            Ok(quotes) => {
                let quoted = Odds::from_quotes(&m.id, quotes);
                quoted.usable_yes().is_some()
                    && self.store.save_odds(&quoted).await.map_err(store_err)?
            }
            Err(e) => {
                warn!(
                    match_id = %m.id,
                    error = %e,
                    transient = e.is_transient(),
                    "Closing quote unavailable, using stored price"
                );
                false
            }
        };

        let Some(mut odds) = self.store.get_odds(&m.id).await.map_err(store_err)? else {
            return Ok(ClosingOutcome::NoOdds);
        };
        if !odds.capture_closing(now) {
            return Ok(ClosingOutcome::NoOdds);
        }
        self.store.save_odds(&odds).await.map_err(store_err)?;
        debug!(match_id = %m.id, closing = ?odds.closing_yes, fresh, "Closing price captured");
        Ok(ClosingOutcome::Captured { fresh })
    }

    /// Recompute all team profiles of a league's current season. Profiles
    /// are computed in full before the single replacing write.
    pub async fn refresh_team_stats(&self, league_code: &str) -> Result<TeamStatsResult> {
        let league = self
            .store
            .get_league(league_code)
            .await?
            .with_context(|| format!("League {league_code} is not configured"))?;
        let matches = self
            .store
            .finished_matches(&league.code, &league.season)
            .await
            .context("Failed to load finished matches")?;

        let profiles = build_profiles(&league.code, &league.season, &matches, Utc::now());
        self.store
            .replace_team_profiles(&league.code, &league.season, &profiles)
            .await
            .with_context(|| format!("Failed to write team profiles for {league_code}"))?;

        info!(
            league = %league.code,
            season = %league.season,
            matches = matches.len(),
            teams = profiles.len(),
            "Team profiles refreshed"
        );
        Ok(TeamStatsResult {
            league_code: league.code,
            season: league.season,
            matches_used: matches.len(),
            teams: profiles.len(),
        })
    }

    /// Refresh team profiles for every active league, isolating failures.
    pub async fn refresh_all_team_stats(&self) -> Result<Vec<Result<TeamStatsResult, IngestFailure>>> {
        let leagues = self.store.list_leagues(true).await?;
        let mut out = Vec::with_capacity(leagues.len());
        for l in leagues {
            out.push(
                self.refresh_team_stats(&l.code)
                    .await
                    .map_err(|e| IngestFailure::store(&l.code, &e)),
            );
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
