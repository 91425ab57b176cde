//! In-memory store.
//!
//! Used for dry runs and tests. Same invariants as the SQLite backend.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{merge_odds, Page, Store, StoreError, StoreResult};
use crate::types::{
    HealthSnapshot, LeagueProfile, Match, MatchStatus, Odds, Prediction, Selection, Settlement,
    TeamProfile,
};

#[derive(Default)]
struct Inner {
    leagues: HashMap<String, LeagueProfile>,
    /// Keyed by (league, team, season).
    teams: HashMap<(String, String, String), TeamProfile>,
    matches: HashMap<String, Match>,
    /// Keyed by match id.
    odds: HashMap<String, Odds>,
    /// Keyed by match id.
    predictions: HashMap<String, Prediction>,
    /// Keyed by match id.
    selections: HashMap<String, Selection>,
    health: Vec<HealthSnapshot>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn in_range(t: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map_or(true, |f| t >= f) && to.map_or(true, |e| t < e)
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_league(&self, league: &LeagueProfile) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.leagues.insert(league.code.clone(), league.clone());
        Ok(())
    }

    async fn get_league(&self, code: &str) -> StoreResult<Option<LeagueProfile>> {
        Ok(self.inner.read().await.leagues.get(code).cloned())
    }

    async fn list_leagues(&self, active_only: bool) -> StoreResult<Vec<LeagueProfile>> {
        let inner = self.inner.read().await;
        let mut leagues: Vec<LeagueProfile> = inner
            .leagues
            .values()
            .filter(|l| !active_only || l.active)
            .cloned()
            .collect();
        leagues.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(leagues)
    }

    async fn get_team(
        &self,
        league_code: &str,
        team: &str,
        season: &str,
    ) -> StoreResult<Option<TeamProfile>> {
        let key = (league_code.to_string(), team.to_string(), season.to_string());
        Ok(self.inner.read().await.teams.get(&key).cloned())
    }

    async fn replace_team_profiles(
        &self,
        league_code: &str,
        season: &str,
        profiles: &[TeamProfile],
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        for p in profiles {
            if p.league_code != league_code || p.season != season {
                return Err(StoreError::Backend(format!(
                    "profile {} does not belong to {league_code}/{season}",
                    p.team
                )));
            }
        }
        for p in profiles {
            let key = (p.league_code.clone(), p.team.clone(), p.season.clone());
            inner.teams.insert(key, p.clone());
        }
        Ok(())
    }

    async fn upsert_match(&self, m: &Match) -> StoreResult<()> {
        self.inner.write().await.matches.insert(m.id.clone(), m.clone());
        Ok(())
    }

    async fn get_match(&self, id: &str) -> StoreResult<Option<Match>> {
        Ok(self.inner.read().await.matches.get(id).cloned())
    }

    async fn matches_on(
        &self,
        date: NaiveDate,
        league_code: Option<&str>,
        status: Option<MatchStatus>,
    ) -> StoreResult<Vec<Match>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Match> = inner
            .matches
            .values()
            .filter(|m| m.date() == date)
            .filter(|m| league_code.map_or(true, |c| m.league_code == c))
            .filter(|m| status.map_or(true, |s| m.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn matches_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Match>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Match> = inner
            .matches
            .values()
            .filter(|m| m.kickoff >= from && m.kickoff < to)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn finished_matches(
        &self,
        league_code: &str,
        season: &str,
    ) -> StoreResult<Vec<Match>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Match> = inner
            .matches
            .values()
            .filter(|m| {
                m.league_code == league_code
                    && m.season == season
                    && m.status == MatchStatus::Finished
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn get_odds(&self, match_id: &str) -> StoreResult<Option<Odds>> {
        Ok(self.inner.read().await.odds.get(match_id).cloned())
    }

    async fn get_odds_by_id(&self, id: &str) -> StoreResult<Option<Odds>> {
        let inner = self.inner.read().await;
        Ok(inner.odds.values().find(|o| o.id == id).cloned())
    }

    async fn save_odds(&self, odds: &Odds) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        match merge_odds(inner.odds.get(&odds.match_id), odds) {
            Some(merged) => {
                inner.odds.insert(merged.match_id.clone(), merged);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_prediction(&self, p: &Prediction) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.predictions.contains_key(&p.match_id) {
            return Err(StoreError::Duplicate {
                entity: "prediction",
                match_id: p.match_id.clone(),
            });
        }
        inner.predictions.insert(p.match_id.clone(), p.clone());
        Ok(())
    }

    async fn get_prediction(&self, id: &str) -> StoreResult<Option<Prediction>> {
        let inner = self.inner.read().await;
        Ok(inner.predictions.values().find(|p| p.id == id).cloned())
    }

    async fn prediction_for_match(&self, match_id: &str) -> StoreResult<Option<Prediction>> {
        Ok(self.inner.read().await.predictions.get(match_id).cloned())
    }

    async fn delete_prediction_for_match(&self, match_id: &str) -> StoreResult<bool> {
        Ok(self.inner.write().await.predictions.remove(match_id).is_some())
    }

    async fn insert_selection(&self, s: &Selection) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.selections.contains_key(&s.match_id) {
            return Err(StoreError::Duplicate {
                entity: "selection",
                match_id: s.match_id.clone(),
            });
        }
        inner.selections.insert(s.match_id.clone(), s.clone());
        Ok(())
    }

    async fn get_selection(&self, id: &str) -> StoreResult<Option<Selection>> {
        let inner = self.inner.read().await;
        Ok(inner.selections.values().find(|s| s.id == id).cloned())
    }

    async fn selection_for_match(&self, match_id: &str) -> StoreResult<Option<Selection>> {
        Ok(self.inner.read().await.selections.get(match_id).cloned())
    }

    async fn pending_selections(&self) -> StoreResult<Vec<Selection>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Selection> = inner
            .selections
            .values()
            .filter(|s| !s.outcome.is_settled())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn settle_selection(&self, id: &str, settlement: &Settlement) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let selection = inner
            .selections
            .values_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "selection",
                id: id.to_string(),
            })?;
        Ok(selection.apply_settlement(settlement))
    }

    async fn selections_created(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Selection>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Selection> = inner
            .selections
            .values()
            .filter(|s| in_range(s.created_at, from, to))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.rank.cmp(&b.rank)));
        Ok(out)
    }

    async fn selections_page(&self, page: u32, per_page: u32) -> StoreResult<Page<Selection>> {
        let all = self.selections_created(None, None).await?;
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(Page::<Selection>::offset(page, per_page))
            .take(per_page as usize)
            .collect();
        Ok(Page {
            items,
            page: page.max(1),
            per_page,
            total,
        })
    }

    async fn save_health_snapshot(&self, snapshot: &HealthSnapshot) -> StoreResult<()> {
        self.inner.write().await.health.push(snapshot.clone());
        Ok(())
    }

    async fn latest_health_snapshot(&self) -> StoreResult<Option<HealthSnapshot>> {
        let inner = self.inner.read().await;
        Ok(inner.health.iter().max_by_key(|h| h.generated_at).cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
