//! External data suppliers.
//!
//! Defines the `FixtureSupplier` and `OddsSupplier` traits the ingestion
//! services depend on, the supplier error type, and the records suppliers
//! return. Concrete clients live in submodules; `Resilient` wraps any of
//! them with retry and a rate-limit circuit.

pub mod api_football;
pub mod estimate;
pub mod resilient;
pub mod team_stats;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{BookmakerQuote, LeagueProfile, Match, MatchStatus};

#[cfg(test)]
use mockall::automock;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SupplierError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unparseable response: {0}")]
    Parse(String),
    #[error("circuit open after rate limit, retry in {remaining_secs}s")]
    CircuitOpen { remaining_secs: u64 },
    #[error("unsupported request: {0}")]
    Unsupported(String),
}

impl SupplierError {
    /// Whether the same request may succeed later without intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            SupplierError::RateLimited(_)
            | SupplierError::Transport(_)
            | SupplierError::CircuitOpen { .. } => true,
            SupplierError::Http { status, .. } => *status >= 500,
            SupplierError::Auth(_) | SupplierError::Parse(_) | SupplierError::Unsupported(_) => {
                false
            }
        }
    }

    /// Whether an immediate retry with backoff is worthwhile. Rate limits
    /// are not retried; they open the circuit instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            SupplierError::Transport(_) => true,
            SupplierError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SupplierError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SupplierError::Parse(e.to_string())
        } else {
            SupplierError::Transport(e.to_string())
        }
    }
}

pub type SupplierResult<T> = std::result::Result<T, SupplierError>;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A fixture as reported by a supplier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureRecord {
    /// Supplier fixture id, used as the match id.
    pub id: String,
    pub league_code: String,
    pub season: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub status: MatchStatus,
    pub ht_home: Option<u32>,
    pub ht_away: Option<u32>,
    pub ft_home: Option<u32>,
    pub ft_away: Option<u32>,
    pub first_goal_minute: Option<u32>,
    pub home_first_goal_minute: Option<u32>,
    pub away_first_goal_minute: Option<u32>,
}

impl FixtureRecord {
    /// Merge supplier state into the stored match, keeping fields the
    /// supplier does not own (context) and values it stopped reporting.
    pub fn merge_into(&self, existing: Option<&Match>, now: DateTime<Utc>) -> Match {
        let keep = |new: Option<u32>, old: Option<u32>| new.or(old);
        let (ht_home, ht_away, ft_home, ft_away, fgm, home_fgm, away_fgm, context) =
            match existing {
                Some(m) => (
                    keep(self.ht_home, m.ht_home),
                    keep(self.ht_away, m.ht_away),
                    keep(self.ft_home, m.ft_home),
                    keep(self.ft_away, m.ft_away),
                    keep(self.first_goal_minute, m.first_goal_minute),
                    keep(self.home_first_goal_minute, m.home_first_goal_minute),
                    keep(self.away_first_goal_minute, m.away_first_goal_minute),
                    m.context.clone(),
                ),
                None => (
                    self.ht_home,
                    self.ht_away,
                    self.ft_home,
                    self.ft_away,
                    self.first_goal_minute,
                    self.home_first_goal_minute,
                    self.away_first_goal_minute,
                    None,
                ),
            };

        Match {
            id: self.id.clone(),
            league_code: self.league_code.clone(),
            season: self.season.clone(),
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            kickoff: self.kickoff,
            status: self.status,
            ht_home,
            ht_away,
            ft_home,
            ft_away,
            first_goal_minute: fgm,
            home_first_goal_minute: home_fgm,
            away_first_goal_minute: away_fgm,
            context,
            updated_at: now,
        }
    }
}

/// Full-match odds used to estimate a missing first-half market.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MatchResultOdds {
    pub home: Option<f64>,
    pub draw: Option<f64>,
    pub away: Option<f64>,
    pub over_2_5: Option<f64>,
    pub under_2_5: Option<f64>,
}

// ---------------------------------------------------------------------------
// Supplier traits
// ---------------------------------------------------------------------------

/// Source of fixtures, statuses and scores.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FixtureSupplier: Send + Sync {
    /// Fixtures of a league with kickoff dates in `[from, to]`.
    async fn fixtures(
        &self,
        league: &LeagueProfile,
        from: NaiveDate,
        to: NaiveDate,
    ) -> SupplierResult<Vec<FixtureRecord>>;
}

/// Source of bookmaker prices.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OddsSupplier: Send + Sync {
    /// Per-bookmaker first-half goal Yes/No quotes. Empty when no bookmaker
    /// offers the market.
    async fn first_half_quotes(&self, m: &Match) -> SupplierResult<Vec<BookmakerQuote>>;

    /// 1X2 and total-goals odds, when offered.
    async fn match_result_odds(&self, m: &Match) -> SupplierResult<Option<MatchResultOdds>>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
