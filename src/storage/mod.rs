//! Persistence layer.
//!
//! The [`Store`] trait is the boundary for every record the engine reads or
//! writes. Two backends implement it: [`MemoryStore`] for dry runs and tests,
//! and [`SqliteStore`] for deployments. Both enforce the same invariants:
//! at most one prediction, odds record and selection per match, closing
//! prices that never change once captured, estimated odds that never replace
//! real ones, and one-way settlement.

pub mod memory;
pub mod sqlite;
#[cfg(test)]
pub(crate) mod faulty;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::types::{
    HealthSnapshot, LeagueProfile, Match, MatchStatus, Odds, Prediction, Selection, Settlement,
    TeamProfile,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Duplicate {entity} for match {match_id}")]
    Duplicate {
        entity: &'static str,
        match_id: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// One page of a newest-first listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(self.per_page as u64)
    }

    /// Offset of the first item, for a 1-based page.
    pub fn offset(page: u32, per_page: u32) -> usize {
        (page.max(1) as usize - 1) * per_page as usize
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Persistence boundary for the engine.
///
/// Not-found is `Ok(None)`. Inserts that would break a one-per-match
/// invariant fail with [`StoreError::Duplicate`].
#[async_trait]
pub trait Store: Send + Sync {
    // -- Leagues --
    async fn upsert_league(&self, league: &LeagueProfile) -> StoreResult<()>;
    async fn get_league(&self, code: &str) -> StoreResult<Option<LeagueProfile>>;
    async fn list_leagues(&self, active_only: bool) -> StoreResult<Vec<LeagueProfile>>;

    // -- Teams --
    async fn get_team(
        &self,
        league_code: &str,
        team: &str,
        season: &str,
    ) -> StoreResult<Option<TeamProfile>>;
    /// Replace all profiles of a league season in one write.
    async fn replace_team_profiles(
        &self,
        league_code: &str,
        season: &str,
        profiles: &[TeamProfile],
    ) -> StoreResult<()>;

    // -- Matches --
    async fn upsert_match(&self, m: &Match) -> StoreResult<()>;
    async fn get_match(&self, id: &str) -> StoreResult<Option<Match>>;
    /// Matches scheduled on a UTC date, optionally filtered.
    async fn matches_on(
        &self,
        date: NaiveDate,
        league_code: Option<&str>,
        status: Option<MatchStatus>,
    ) -> StoreResult<Vec<Match>>;
    /// Matches with kickoff in `[from, to)`, ordered by kickoff.
    async fn matches_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Match>>;
    /// Finished matches of a league season, ordered by kickoff.
    async fn finished_matches(&self, league_code: &str, season: &str)
        -> StoreResult<Vec<Match>>;

    // -- Odds --
    async fn get_odds(&self, match_id: &str) -> StoreResult<Option<Odds>>;
    async fn get_odds_by_id(&self, id: &str) -> StoreResult<Option<Odds>>;
    /// Write odds for a match, applying [`merge_odds`]. Returns false when
    /// the write was refused (estimate over real odds).
    async fn save_odds(&self, odds: &Odds) -> StoreResult<bool>;

    // -- Predictions --
    async fn insert_prediction(&self, p: &Prediction) -> StoreResult<()>;
    async fn get_prediction(&self, id: &str) -> StoreResult<Option<Prediction>>;
    async fn prediction_for_match(&self, match_id: &str) -> StoreResult<Option<Prediction>>;
    async fn delete_prediction_for_match(&self, match_id: &str) -> StoreResult<bool>;

    // -- Selections --
    async fn insert_selection(&self, s: &Selection) -> StoreResult<()>;
    async fn get_selection(&self, id: &str) -> StoreResult<Option<Selection>>;
    async fn selection_for_match(&self, match_id: &str) -> StoreResult<Option<Selection>>;
    async fn pending_selections(&self) -> StoreResult<Vec<Selection>>;
    /// Settle a pending selection. Returns false if it was not pending.
    async fn settle_selection(&self, id: &str, settlement: &Settlement) -> StoreResult<bool>;
    /// Selections created in `[from, to)`, newest first. Open bounds are unbounded.
    async fn selections_created(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Selection>>;
    async fn selections_page(&self, page: u32, per_page: u32) -> StoreResult<Page<Selection>>;

    // -- Health --
    async fn save_health_snapshot(&self, snapshot: &HealthSnapshot) -> StoreResult<()>;
    async fn latest_health_snapshot(&self) -> StoreResult<Option<HealthSnapshot>>;
}

// ---------------------------------------------------------------------------
// Shared write rules
// ---------------------------------------------------------------------------

/// Decide what to persist when `incoming` odds arrive for a match.
///
/// Returns `None` when the write must be refused: an estimate never
/// replaces real odds. Otherwise returns the record to store, carrying over
/// the existing id and any captured closing price.
pub fn merge_odds(existing: Option<&Odds>, incoming: &Odds) -> Option<Odds> {
    let mut merged = incoming.clone();
    if let Some(prev) = existing {
        if prev.is_real_odds && !incoming.is_real_odds {
            return None;
        }
        merged.carry_over(prev);
    }
    Some(merged)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
