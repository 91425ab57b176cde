//! Shared fixture builders for integration tests.
//!
//! The reference match: league λ 1.30 (MEDIUM tier), home side scoring in
//! 7 of 10 home first halves, away side conceding in 11 of 20 away first
//! halves, no context. That gives pBase = pReal ≈ 0.666 and edge score 67.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use firsthalf::config::{AppConfig, PipelineConfig};
use firsthalf::engine::SelectionPipeline;
use firsthalf::model::PredictionEngine;
use firsthalf::storage::{MemoryStore, Store};
use firsthalf::strategy::ValueEngine;
use firsthalf::types::{
    BookmakerQuote, Confidence, LeagueProfile, LeagueTier, Match, MatchStatus, Odds, Outcome,
    Selection, Signal, TeamProfile,
};

pub const LEAGUE: &str = "EPL";
pub const SEASON: &str = "2025";
pub const REFERENCE_P: f64 = 0.665987;

pub fn kickoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 4, 15, 0, 0).unwrap()
}

pub fn league() -> LeagueProfile {
    LeagueProfile {
        code: LEAGUE.into(),
        name: "Premier League".into(),
        tier: LeagueTier::Medium,
        avg_g1h: 1.30,
        active: true,
        season: SEASON.into(),
        supplier_id: Some(39),
    }
}

pub fn scheduled(id: &str) -> Match {
    Match {
        id: id.into(),
        league_code: LEAGUE.into(),
        season: SEASON.into(),
        home_team: format!("Home {id}"),
        away_team: format!("Away {id}"),
        kickoff: kickoff(),
        status: MatchStatus::Scheduled,
        ht_home: None,
        ht_away: None,
        ft_home: None,
        ft_away: None,
        first_goal_minute: None,
        home_first_goal_minute: None,
        away_first_goal_minute: None,
        context: None,
        updated_at: Utc::now(),
    }
}

/// Home first-half scoring rate 0.70 over 10 home matches.
pub fn home_profile(team: &str) -> TeamProfile {
    let mut t = TeamProfile::new(LEAGUE, team, SEASON);
    t.matches_played = 20;
    t.home_matches = 10;
    t.away_matches = 10;
    t.home_g1h_for = 7;
    t.matches_with_g1h = 14;
    t
}

/// Away first-half conceding rate 0.55 over 20 away matches.
pub fn away_profile(team: &str) -> TeamProfile {
    let mut t = TeamProfile::new(LEAGUE, team, SEASON);
    t.matches_played = 40;
    t.home_matches = 20;
    t.away_matches = 20;
    t.away_g1h_against = 11;
    t.matches_with_g1h = 22;
    t
}

pub fn real_odds(match_id: &str, yes: f64) -> Odds {
    Odds::from_quotes(
        match_id,
        vec![BookmakerQuote {
            bookmaker: "bet365".into(),
            yes: Some(yes),
            no: Some(2.50),
        }],
    )
}

pub async fn store_with_league() -> Arc<dyn Store> {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    store.upsert_league(&league()).await.unwrap();
    store
}

/// Seed reference matches `ids` with the given Yes prices.
pub async fn seed_matches(store: &Arc<dyn Store>, matches: &[(&str, f64)]) {
    let mut profiles = Vec::new();
    for (id, yes) in matches {
        let m = scheduled(id);
        profiles.push(home_profile(&m.home_team));
        profiles.push(away_profile(&m.away_team));
        store.upsert_match(&m).await.unwrap();
        store.save_odds(&real_odds(id, *yes)).await.unwrap();
    }
    store
        .replace_team_profiles(LEAGUE, SEASON, &profiles)
        .await
        .unwrap();
}

pub fn pipeline(store: &Arc<dyn Store>, pipeline_cfg: PipelineConfig) -> SelectionPipeline {
    let cfg = AppConfig::default();
    SelectionPipeline::new(
        store.clone(),
        PredictionEngine::new(store.clone(), cfg.prediction),
        ValueEngine::new(store.clone(), cfg.value),
        pipeline_cfg,
    )
}

/// A pending selection on a reference match.
pub fn selection(id: &str, match_id: &str) -> Selection {
    Selection {
        id: id.into(),
        match_id: match_id.into(),
        run_id: "run-1".into(),
        rank: 1,
        league_code: LEAGUE.into(),
        home_team: format!("Home {match_id}"),
        away_team: format!("Away {match_id}"),
        kickoff: kickoff(),
        signal: Signal::B,
        margin_valor: 0.0323,
        probability: REFERENCE_P,
        edge_score: 67.0,
        confidence: Confidence::Medium,
        stake_fraction: 0.02136,
        odds_at_selection: 1.55,
        bookmaker: Some("bet365".into()),
        is_real_odds: true,
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
