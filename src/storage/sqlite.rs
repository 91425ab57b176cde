//! SQLite store.
//!
//! One table per entity. The record body is stored as JSON text next to the
//! key columns used for lookups and ordering. `UNIQUE(match_id)` on odds,
//! predictions and selections enforces one record per match; settlement is
//! guarded with `WHERE outcome = 'PENDING'`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use super::{merge_odds, Page, Store, StoreError, StoreResult};
use crate::types::{
    HealthSnapshot, LeagueProfile, Match, MatchStatus, Odds, Outcome, Prediction, Selection,
    Settlement, TeamProfile,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS leagues (
        code    TEXT PRIMARY KEY,
        active  INTEGER NOT NULL,
        body    TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS teams (
        league_code TEXT NOT NULL,
        team        TEXT NOT NULL,
        season      TEXT NOT NULL,
        body        TEXT NOT NULL,
        PRIMARY KEY (league_code, team, season)
    )",
    "CREATE TABLE IF NOT EXISTS matches (
        id          TEXT PRIMARY KEY,
        league_code TEXT NOT NULL,
        season      TEXT NOT NULL,
        match_date  TEXT NOT NULL,
        kickoff_ms  INTEGER NOT NULL,
        status      TEXT NOT NULL,
        body        TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_matches_date ON matches (match_date, league_code)",
    "CREATE INDEX IF NOT EXISTS idx_matches_kickoff ON matches (kickoff_ms)",
    "CREATE TABLE IF NOT EXISTS odds (
        id       TEXT PRIMARY KEY,
        match_id TEXT NOT NULL UNIQUE,
        body     TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS predictions (
        id       TEXT PRIMARY KEY,
        match_id TEXT NOT NULL UNIQUE,
        body     TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS selections (
        id         TEXT PRIMARY KEY,
        match_id   TEXT NOT NULL UNIQUE,
        outcome    TEXT NOT NULL,
        created_ms INTEGER NOT NULL,
        rank       INTEGER NOT NULL,
        body       TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_selections_created ON selections (created_ms)",
    "CREATE INDEX IF NOT EXISTS idx_selections_outcome ON selections (outcome)",
    "CREATE TABLE IF NOT EXISTS health_snapshots (
        id           TEXT PRIMARY KEY,
        generated_ms INTEGER NOT NULL,
        body         TEXT NOT NULL
    )",
];

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Map a failed insert to `Duplicate` when a uniqueness constraint fired.
fn insert_error(e: sqlx::Error, entity: &'static str, match_id: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Duplicate {
                entity,
                match_id: match_id.to_string(),
            };
        }
    }
    e.into()
}

fn to_body<T: Serialize>(value: &T) -> StoreResult<String> {
    Ok(serde_json::to_string(value)?)
}

fn from_row<T: DeserializeOwned>(row: &SqliteRow) -> StoreResult<T> {
    let body: String = row.try_get("body")?;
    Ok(serde_json::from_str(&body)?)
}

fn from_rows<T: DeserializeOwned>(rows: &[SqliteRow]) -> StoreResult<Vec<T>> {
    rows.iter().map(from_row).collect()
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database and apply the schema.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Each connection to an in-memory database is a separate database.
        let in_memory = url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };
        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(url, "SQLite store ready");
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!(statements = SCHEMA.len(), "Schema applied");
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_league(&self, league: &LeagueProfile) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO leagues (code, active, body) VALUES (?, ?, ?)
             ON CONFLICT(code) DO UPDATE SET active = excluded.active, body = excluded.body",
        )
        .bind(&league.code)
        .bind(league.active)
        .bind(to_body(league)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_league(&self, code: &str) -> StoreResult<Option<LeagueProfile>> {
        let row = sqlx::query("SELECT body FROM leagues WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn list_leagues(&self, active_only: bool) -> StoreResult<Vec<LeagueProfile>> {
        let rows = sqlx::query("SELECT body FROM leagues WHERE (? = 0 OR active = 1) ORDER BY code")
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?;
        from_rows(&rows)
    }

    async fn get_team(
        &self,
        league_code: &str,
        team: &str,
        season: &str,
    ) -> StoreResult<Option<TeamProfile>> {
        let row = sqlx::query(
            "SELECT body FROM teams WHERE league_code = ? AND team = ? AND season = ?",
        )
        .bind(league_code)
        .bind(team)
        .bind(season)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn replace_team_profiles(
        &self,
        league_code: &str,
        season: &str,
        profiles: &[TeamProfile],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for p in profiles {
            if p.league_code != league_code || p.season != season {
                // tx is rolled back on drop
                return Err(StoreError::Backend(format!(
                    "profile {} does not belong to {league_code}/{season}",
                    p.team
                )));
            }
            sqlx::query(
                "INSERT INTO teams (league_code, team, season, body) VALUES (?, ?, ?, ?)
                 ON CONFLICT(league_code, team, season) DO UPDATE SET body = excluded.body",
            )
            .bind(&p.league_code)
            .bind(&p.team)
            .bind(&p.season)
            .bind(to_body(p)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_match(&self, m: &Match) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO matches (id, league_code, season, match_date, kickoff_ms, status, body)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                league_code = excluded.league_code,
                season = excluded.season,
                match_date = excluded.match_date,
                kickoff_ms = excluded.kickoff_ms,
                status = excluded.status,
                body = excluded.body",
        )
        .bind(&m.id)
        .bind(&m.league_code)
        .bind(&m.season)
        .bind(m.date().to_string())
        .bind(m.kickoff.timestamp_millis())
        .bind(m.status.as_str())
        .bind(to_body(m)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_match(&self, id: &str) -> StoreResult<Option<Match>> {
        let row = sqlx::query("SELECT body FROM matches WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn matches_on(
        &self,
        date: NaiveDate,
        league_code: Option<&str>,
        status: Option<MatchStatus>,
    ) -> StoreResult<Vec<Match>> {
        let rows = sqlx::query(
            "SELECT body FROM matches
             WHERE match_date = ?1
               AND (?2 IS NULL OR league_code = ?2)
               AND (?3 IS NULL OR status = ?3)
             ORDER BY kickoff_ms, id",
        )
        .bind(date.to_string())
        .bind(league_code)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        from_rows(&rows)
    }

    async fn matches_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Match>> {
        let rows = sqlx::query(
            "SELECT body FROM matches WHERE kickoff_ms >= ? AND kickoff_ms < ?
             ORDER BY kickoff_ms, id",
        )
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;
        from_rows(&rows)
    }

    async fn finished_matches(
        &self,
        league_code: &str,
        season: &str,
    ) -> StoreResult<Vec<Match>> {
        let rows = sqlx::query(
            "SELECT body FROM matches WHERE league_code = ? AND season = ? AND status = ?
             ORDER BY kickoff_ms, id",
        )
        .bind(league_code)
        .bind(season)
        .bind(MatchStatus::Finished.as_str())
        .fetch_all(&self.pool)
        .await?;
        from_rows(&rows)
    }

    async fn get_odds(&self, match_id: &str) -> StoreResult<Option<Odds>> {
        let row = sqlx::query("SELECT body FROM odds WHERE match_id = ?")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn get_odds_by_id(&self, id: &str) -> StoreResult<Option<Odds>> {
        let row = sqlx::query("SELECT body FROM odds WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn save_odds(&self, odds: &Odds) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT body FROM odds WHERE match_id = ?")
            .bind(&odds.match_id)
            .fetch_optional(&mut *tx)
            .await?;
        let existing: Option<Odds> = row.as_ref().map(from_row).transpose()?;

        let Some(merged) = merge_odds(existing.as_ref(), odds) else {
            return Ok(false);
        };
        sqlx::query(
            "INSERT INTO odds (id, match_id, body) VALUES (?, ?, ?)
             ON CONFLICT(match_id) DO UPDATE SET body = excluded.body",
        )
        .bind(&merged.id)
        .bind(&merged.match_id)
        .bind(to_body(&merged)?)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn insert_prediction(&self, p: &Prediction) -> StoreResult<()> {
        sqlx::query("INSERT INTO predictions (id, match_id, body) VALUES (?, ?, ?)")
            .bind(&p.id)
            .bind(&p.match_id)
            .bind(to_body(p)?)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error(e, "prediction", &p.match_id))?;
        Ok(())
    }

    async fn get_prediction(&self, id: &str) -> StoreResult<Option<Prediction>> {
        let row = sqlx::query("SELECT body FROM predictions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn prediction_for_match(&self, match_id: &str) -> StoreResult<Option<Prediction>> {
        let row = sqlx::query("SELECT body FROM predictions WHERE match_id = ?")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn delete_prediction_for_match(&self, match_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM predictions WHERE match_id = ?")
            .bind(match_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_selection(&self, s: &Selection) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO selections (id, match_id, outcome, created_ms, rank, body)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&s.id)
        .bind(&s.match_id)
        .bind(s.outcome.as_str())
        .bind(s.created_at.timestamp_millis())
        .bind(s.rank as i64)
        .bind(to_body(s)?)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "selection", &s.match_id))?;
        Ok(())
    }

    async fn get_selection(&self, id: &str) -> StoreResult<Option<Selection>> {
        let row = sqlx::query("SELECT body FROM selections WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn selection_for_match(&self, match_id: &str) -> StoreResult<Option<Selection>> {
        let row = sqlx::query("SELECT body FROM selections WHERE match_id = ?")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn pending_selections(&self) -> StoreResult<Vec<Selection>> {
        let rows = sqlx::query("SELECT body FROM selections WHERE outcome = ? ORDER BY created_ms")
            .bind(Outcome::Pending.as_str())
            .fetch_all(&self.pool)
            .await?;
        from_rows(&rows)
    }

    async fn settle_selection(&self, id: &str, settlement: &Settlement) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT body FROM selections WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::NotFound {
                entity: "selection",
                id: id.to_string(),
            });
        };
        let mut selection: Selection = from_row(&row)?;
        if !selection.apply_settlement(settlement) {
            return Ok(false);
        }

        let result = sqlx::query(
            "UPDATE selections SET outcome = ?, body = ? WHERE id = ? AND outcome = ?",
        )
        .bind(selection.outcome.as_str())
        .bind(to_body(&selection)?)
        .bind(id)
        .bind(Outcome::Pending.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn selections_created(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Selection>> {
        let rows = sqlx::query(
            "SELECT body FROM selections
             WHERE (?1 IS NULL OR created_ms >= ?1)
               AND (?2 IS NULL OR created_ms < ?2)
             ORDER BY created_ms DESC, rank ASC",
        )
        .bind(from.map(|t| t.timestamp_millis()))
        .bind(to.map(|t| t.timestamp_millis()))
        .fetch_all(&self.pool)
        .await?;
        from_rows(&rows)
    }

    async fn selections_page(&self, page: u32, per_page: u32) -> StoreResult<Page<Selection>> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS n FROM selections")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        let rows = sqlx::query(
            "SELECT body FROM selections ORDER BY created_ms DESC, rank ASC LIMIT ? OFFSET ?",
        )
        .bind(per_page as i64)
        .bind(Page::<Selection>::offset(page, per_page) as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page {
            items: from_rows(&rows)?,
            page: page.max(1),
            per_page,
            total: total.max(0) as u64,
        })
    }

    async fn save_health_snapshot(&self, snapshot: &HealthSnapshot) -> StoreResult<()> {
        sqlx::query("INSERT INTO health_snapshots (id, generated_ms, body) VALUES (?, ?, ?)")
            .bind(&snapshot.id)
            .bind(snapshot.generated_at.timestamp_millis())
            .bind(to_body(snapshot)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn latest_health_snapshot(&self) -> StoreResult<Option<HealthSnapshot>> {
        let row = sqlx::query(
            "SELECT body FROM health_snapshots ORDER BY generated_ms DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(from_row).transpose()
    }
}
