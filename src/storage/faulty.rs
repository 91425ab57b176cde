//! Test-only store that fails chosen per-match operations.
//!
//! Delegates everything to a [`MemoryStore`]. Odds reads/writes and
//! selection inserts for the configured match ids fail with a backend error.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;

use super::{MemoryStore, Page, Store, StoreError, StoreResult};
use crate::types::{
    HealthSnapshot, LeagueProfile, Match, MatchStatus, Odds, Prediction, Selection, Settlement,
    TeamProfile,
};

#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub odds_failures: HashSet<String>,
    pub selection_failures: HashSet<String>,
}

fn injected(op: &str, match_id: &str) -> StoreError {
    StoreError::Backend(format!("injected {op} failure for {match_id}"))
}

#[async_trait]
impl Store for FaultyStore {
    async fn upsert_league(&self, league: &LeagueProfile) -> StoreResult<()> {
        self.inner.upsert_league(league).await
    }
    async fn get_league(&self, code: &str) -> StoreResult<Option<LeagueProfile>> {
        self.inner.get_league(code).await
    }
    async fn list_leagues(&self, active_only: bool) -> StoreResult<Vec<LeagueProfile>> {
        self.inner.list_leagues(active_only).await
    }

    async fn get_team(
        &self,
        league_code: &str,
        team: &str,
        season: &str,
    ) -> StoreResult<Option<TeamProfile>> {
        self.inner.get_team(league_code, team, season).await
    }
    async fn replace_team_profiles(
        &self,
        league_code: &str,
        season: &str,
        profiles: &[TeamProfile],
    ) -> StoreResult<()> {
        self.inner.replace_team_profiles(league_code, season, profiles).await
    }

    async fn upsert_match(&self, m: &Match) -> StoreResult<()> {
        self.inner.upsert_match(m).await
    }
    async fn get_match(&self, id: &str) -> StoreResult<Option<Match>> {
        self.inner.get_match(id).await
    }
    async fn matches_on(
        &self,
        date: NaiveDate,
        league_code: Option<&str>,
        status: Option<MatchStatus>,
    ) -> StoreResult<Vec<Match>> {
        self.inner.matches_on(date, league_code, status).await
    }
    async fn matches_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Match>> {
        self.inner.matches_between(from, to).await
    }
    async fn finished_matches(&self, league_code: &str, season: &str) -> StoreResult<Vec<Match>> {
        self.inner.finished_matches(league_code, season).await
    }

    async fn get_odds(&self, match_id: &str) -> StoreResult<Option<Odds>> {
        if self.odds_failures.contains(match_id) {
            return Err(injected("odds read", match_id));
        }
        self.inner.get_odds(match_id).await
    }
    async fn get_odds_by_id(&self, id: &str) -> StoreResult<Option<Odds>> {
        self.inner.get_odds_by_id(id).await
    }
    async fn save_odds(&self, odds: &Odds) -> StoreResult<bool> {
        if self.odds_failures.contains(&odds.match_id) {
            return Err(injected("odds write", &odds.match_id));
        }
        self.inner.save_odds(odds).await
    }

    async fn insert_prediction(&self, p: &Prediction) -> StoreResult<()> {
        self.inner.insert_prediction(p).await
    }
    async fn get_prediction(&self, id: &str) -> StoreResult<Option<Prediction>> {
        self.inner.get_prediction(id).await
    }
    async fn prediction_for_match(&self, match_id: &str) -> StoreResult<Option<Prediction>> {
        self.inner.prediction_for_match(match_id).await
    }
    async fn delete_prediction_for_match(&self, match_id: &str) -> StoreResult<bool> {
        self.inner.delete_prediction_for_match(match_id).await
    }

    async fn insert_selection(&self, s: &Selection) -> StoreResult<()> {
        if self.selection_failures.contains(&s.match_id) {
            return Err(injected("selection insert", &s.match_id));
        }
        self.inner.insert_selection(s).await
    }
    async fn get_selection(&self, id: &str) -> StoreResult<Option<Selection>> {
        self.inner.get_selection(id).await
    }
    async fn selection_for_match(&self, match_id: &str) -> StoreResult<Option<Selection>> {
        self.inner.selection_for_match(match_id).await
    }
    async fn pending_selections(&self) -> StoreResult<Vec<Selection>> {
        self.inner.pending_selections().await
    }
    async fn settle_selection(&self, id: &str, settlement: &Settlement) -> StoreResult<bool> {
        self.inner.settle_selection(id, settlement).await
    }
    async fn selections_created(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Selection>> {
        self.inner.selections_created(from, to).await
    }
    async fn selections_page(&self, page: u32, per_page: u32) -> StoreResult<Page<Selection>> {
        self.inner.selections_page(page, per_page).await
    }

    async fn save_health_snapshot(&self, snapshot: &HealthSnapshot) -> StoreResult<()> {
        self.inner.save_health_snapshot(snapshot).await
    }
    async fn latest_health_snapshot(&self) -> StoreResult<Option<HealthSnapshot>> {
        self.inner.latest_health_snapshot().await
    }
}
