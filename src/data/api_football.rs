//! API-Football (API-Sports v3) supplier.
//!
//! `/fixtures` for schedules, statuses and scores; `/fixtures/events` for
//! first-half goal minutes of finished fixtures; `/odds` for the first-half
//! goal market and the full-match markets used for estimation.
//!
//! Auth: `x-apisports-key` header. The API reports quota and token problems
//! in the body `errors` field with HTTP 200, so the body is checked too.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    FixtureRecord, FixtureSupplier, MatchResultOdds, OddsSupplier, SupplierError, SupplierResult,
};
use crate::config::SupplierConfig;
use crate::types::{BookmakerQuote, LeagueProfile, Match, MatchStatus};

const API_KEY_HEADER: &str = "x-apisports-key";

const BET_FIRST_HALF_TOTALS: &str = "Goals Over/Under First Half";
const BET_MATCH_WINNER: &str = "Match Winner";
const BET_TOTALS: &str = "Goals Over/Under";

// ---------------------------------------------------------------------------
// Status mapping
// ---------------------------------------------------------------------------

/// Map an API-Football short status code. Unknown codes are `None`.
pub fn map_status(short: &str) -> Option<MatchStatus> {
    let status = match short {
        "TBD" | "NS" => MatchStatus::Scheduled,
        "1H" | "2H" | "ET" | "BT" | "P" | "LIVE" => MatchStatus::Live,
        "HT" => MatchStatus::Halftime,
        "FT" | "AET" | "PEN" | "AWD" | "WO" => MatchStatus::Finished,
        "PST" | "SUSP" | "INT" => MatchStatus::Postponed,
        "CANC" | "ABD" => MatchStatus::Cancelled,
        _ => return None,
    };
    Some(status)
}

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    /// Empty array on success, object of messages on failure.
    #[serde(default)]
    errors: serde_json::Value,
    #[serde(default = "Vec::new")]
    response: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct FixtureItem {
    fixture: FixtureInfo,
    teams: Teams,
    #[serde(default)]
    score: Score,
}

#[derive(Debug, Deserialize)]
struct FixtureInfo {
    id: u64,
    timestamp: i64,
    status: FixtureStatus,
}

#[derive(Debug, Deserialize)]
struct FixtureStatus {
    short: String,
}

#[derive(Debug, Deserialize)]
struct Teams {
    home: TeamName,
    away: TeamName,
}

#[derive(Debug, Deserialize)]
struct TeamName {
    #[serde(default)]
    id: Option<u64>,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Score {
    #[serde(default)]
    halftime: Goals,
    #[serde(default)]
    fulltime: Goals,
}

#[derive(Debug, Default, Deserialize)]
struct Goals {
    home: Option<u32>,
    away: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    time: EventTime,
    team: EventTeam,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
struct EventTime {
    elapsed: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EventTeam {
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OddsItem {
    #[serde(default)]
    bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize)]
struct Bookmaker {
    #[serde(default)]
    id: u32,
    name: String,
    #[serde(default)]
    bets: Vec<Bet>,
}

#[derive(Debug, Deserialize)]
struct Bet {
    name: String,
    #[serde(default)]
    values: Vec<BetValue>,
}

#[derive(Debug, Deserialize)]
struct BetValue {
    value: String,
    odd: String,
}

impl Bet {
    fn price(&self, value: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|v| v.value.eq_ignore_ascii_case(value))
            .and_then(|v| v.odd.trim().parse::<f64>().ok())
    }
}

/// Classify a non-empty body `errors` object.
fn body_error(errors: &serde_json::Value) -> Option<SupplierError> {
    let map = errors.as_object().filter(|m| !m.is_empty())?;
    let text = serde_json::Value::Object(map.clone()).to_string();
    if map.contains_key("rateLimit") || map.contains_key("requests") {
        Some(SupplierError::RateLimited(text))
    } else if map.contains_key("token") {
        Some(SupplierError::Auth(text))
    } else {
        Some(SupplierError::Http {
            status: 200,
            body: text,
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ApiFootballClient {
    http: Client,
    base_url: String,
    api_key: String,
    bookmakers: Vec<u32>,
}

impl ApiFootballClient {
    pub fn new(config: &SupplierConfig, api_key: String) -> SupplierResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("firsthalf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SupplierError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            bookmakers: config.bookmakers.clone(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> SupplierResult<Vec<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, ?query, "API-Football request");

        let resp = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SupplierError::RateLimited(format!("HTTP 429 on {path}")));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SupplierError::Auth(format!("HTTP {status} on {path}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SupplierError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| SupplierError::Parse(e.to_string()))?;
        if let Some(err) = body_error(&envelope.errors) {
            return Err(err);
        }
        Ok(envelope.response)
    }

    async fn odds_for(&self, m: &Match) -> SupplierResult<Vec<Bookmaker>> {
        let mut query = vec![("fixture", m.id.clone())];
        if self.bookmakers.len() == 1 {
            query.push(("bookmaker", self.bookmakers[0].to_string()));
        }
        let items: Vec<OddsItem> = self.get("/odds", &query).await?;
        Ok(items
            .into_iter()
            .flat_map(|i| i.bookmakers)
            .filter(|b| self.bookmakers.is_empty() || self.bookmakers.contains(&b.id))
            .collect())
    }

    async fn goal_events(&self, fixture_id: &str) -> SupplierResult<Vec<EventItem>> {
        let query = [
            ("fixture", fixture_id.to_string()),
            ("type", "Goal".to_string()),
        ];
        self.get("/fixtures/events", &query).await
    }
}

fn to_record(item: FixtureItem, league: &LeagueProfile) -> SupplierResult<FixtureRecord> {
    let status = map_status(&item.fixture.status.short).ok_or_else(|| {
        SupplierError::Parse(format!(
            "unknown status '{}' for fixture {}",
            item.fixture.status.short, item.fixture.id
        ))
    })?;
    let kickoff = Utc
        .timestamp_opt(item.fixture.timestamp, 0)
        .single()
        .ok_or_else(|| SupplierError::Parse(format!("bad timestamp for fixture {}", item.fixture.id)))?;

    Ok(FixtureRecord {
        id: item.fixture.id.to_string(),
        league_code: league.code.clone(),
        season: league.season.clone(),
        home_team: item.teams.home.name,
        away_team: item.teams.away.name,
        kickoff,
        status,
        ht_home: item.score.halftime.home,
        ht_away: item.score.halftime.away,
        ft_home: item.score.fulltime.home,
        ft_away: item.score.fulltime.away,
        first_goal_minute: None,
        home_first_goal_minute: None,
        away_first_goal_minute: None,
    })
}

/// Whether a fixture's first-half goal minutes can be looked up.
fn needs_goal_minutes(rec: &FixtureRecord) -> bool {
    rec.status == MatchStatus::Finished
        && rec.ht_home.unwrap_or(0) + rec.ht_away.unwrap_or(0) > 0
}

/// Earliest first-half goal minute per side, from `type=Goal` events.
///
/// Stoppage-time goals report `elapsed = 45`. Own goals are listed under the
/// scorer's team and count for the opponent; missed penalties are ignored.
fn first_half_goal_minutes(
    events: &[EventItem],
    home_id: u64,
    away_id: u64,
) -> (Option<u32>, Option<u32>) {
    let (mut home, mut away) = (None, None);
    for e in events {
        if e.kind != "Goal" || e.detail == "Missed Penalty" {
            continue;
        }
        let (Some(minute), Some(team)) = (e.time.elapsed, e.team.id) else {
            continue;
        };
        if minute > 45 || (team != home_id && team != away_id) {
            continue;
        }
        let home_scored = (team == home_id) != (e.detail == "Own Goal");
        let slot: &mut Option<u32> = if home_scored { &mut home } else { &mut away };
        *slot = Some(slot.map_or(minute, |m| m.min(minute)));
    }
    (home, away)
}

fn apply_goal_minutes(rec: &mut FixtureRecord, (home, away): (Option<u32>, Option<u32>)) {
    rec.home_first_goal_minute = home;
    rec.away_first_goal_minute = away;
    rec.first_goal_minute = match (home, away) {
        (Some(h), Some(a)) => Some(h.min(a)),
        (h, a) => h.or(a),
    };
}

fn first_half_quote(b: &Bookmaker) -> Option<BookmakerQuote> {
    let bet = b.bets.iter().find(|bet| bet.name == BET_FIRST_HALF_TOTALS)?;
    let yes = bet.price("Over 0.5");
    let no = bet.price("Under 0.5");
    if yes.is_none() && no.is_none() {
        return None;
    }
    Some(BookmakerQuote {
        bookmaker: b.name.clone(),
        yes,
        no,
    })
}

/// First bookmaker offering each full-match market wins.
fn match_result(bookmakers: &[Bookmaker]) -> Option<MatchResultOdds> {
    let mut out = MatchResultOdds::default();
    for b in bookmakers {
        for bet in &b.bets {
            if bet.name == BET_MATCH_WINNER && out.draw.is_none() {
                out.home = bet.price("Home");
                out.draw = bet.price("Draw");
                out.away = bet.price("Away");
            } else if bet.name == BET_TOTALS && out.over_2_5.is_none() {
                out.over_2_5 = bet.price("Over 2.5");
                out.under_2_5 = bet.price("Under 2.5");
            }
        }
    }
    (out.draw.is_some() || out.over_2_5.is_some()).then_some(out)
}

#[async_trait]
impl FixtureSupplier for ApiFootballClient {
    async fn fixtures(
        &self,
        league: &LeagueProfile,
        from: NaiveDate,
        to: NaiveDate,
    ) -> SupplierResult<Vec<FixtureRecord>> {
        let Some(supplier_id) = league.supplier_id else {
            return Err(SupplierError::Unsupported(format!(
                "league {} has no supplier id",
                league.code
            )));
        };
        let query = [
            ("league", supplier_id.to_string()),
            ("season", league.season.clone()),
            ("from", from.format("%Y-%m-%d").to_string()),
            ("to", to.format("%Y-%m-%d").to_string()),
        ];
        let items: Vec<FixtureItem> = self.get("/fixtures", &query).await?;

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let team_ids = item.teams.home.id.zip(item.teams.away.id);
            let mut rec = to_record(item, league)?;
            if let Some((home_id, away_id)) = team_ids.filter(|_| needs_goal_minutes(&rec)) {
                // A missing timeline leaves the minutes unset; the score still settles.
                match self.goal_events(&rec.id).await {
                    Ok(events) => {
                        apply_goal_minutes(&mut rec, first_half_goal_minutes(&events, home_id, away_id))
                    }
                    Err(e) => warn!(fixture = %rec.id, error = %e, "Goal events unavailable"),
                }
            }
            records.push(rec);
        }
        Ok(records)
    }
}

#[async_trait]
impl OddsSupplier for ApiFootballClient {
    async fn first_half_quotes(&self, m: &Match) -> SupplierResult<Vec<BookmakerQuote>> {
        let bookmakers = self.odds_for(m).await?;
        Ok(bookmakers.iter().filter_map(first_half_quote).collect())
    }

    async fn match_result_odds(&self, m: &Match) -> SupplierResult<Option<MatchResultOdds>> {
        let bookmakers = self.odds_for(m).await?;
        Ok(match_result(&bookmakers))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LeagueTier;

    fn league() -> LeagueProfile {
        LeagueProfile {
            code: "EPL".into(),
            name: "Premier League".into(),
            tier: LeagueTier::Medium,
            avg_g1h: 1.3,
            active: true,
            season: "2025".into(),
            supplier_id: Some(39),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status("NS"), Some(MatchStatus::Scheduled));
        assert_eq!(map_status("2H"), Some(MatchStatus::Live));
        assert_eq!(map_status("HT"), Some(MatchStatus::Halftime));
        assert_eq!(map_status("PEN"), Some(MatchStatus::Finished));
        assert_eq!(map_status("SUSP"), Some(MatchStatus::Postponed));
        assert_eq!(map_status("ABD"), Some(MatchStatus::Cancelled));
        assert_eq!(map_status("??"), None);
    }

    #[test]
    fn test_parse_fixture_payload() {
        let body = r#"{
            "errors": [],
            "results": 1,
            "response": [{
                "fixture": {"id": 1035037, "timestamp": 1759590000, "status": {"short": "FT"}},
                "teams": {"home": {"name": "Arsenal"}, "away": {"name": "Spurs"}},
                "score": {"halftime": {"home": 1, "away": 0}, "fulltime": {"home": 2, "away": 1}}
            }]
        }"#;
        let env: Envelope<FixtureItem> = serde_json::from_str(body).unwrap();
        assert!(body_error(&env.errors).is_none());
        let rec = to_record(env.response.into_iter().next().unwrap(), &league()).unwrap();
        assert_eq!(rec.id, "1035037");
        assert_eq!(rec.status, MatchStatus::Finished);
        assert_eq!(rec.ht_home, Some(1));
        assert_eq!(rec.league_code, "EPL");
    }

    #[test]
    fn test_goal_events_give_first_half_minutes_per_side() {
        let body = r#"{
            "errors": [],
            "response": [
                {"time": {"elapsed": 12, "extra": null}, "team": {"id": 42}, "type": "Goal", "detail": "Missed Penalty"},
                {"time": {"elapsed": 23, "extra": null}, "team": {"id": 42}, "type": "Goal", "detail": "Normal Goal"},
                {"time": {"elapsed": 45, "extra": 2}, "team": {"id": 42}, "type": "Goal", "detail": "Own Goal"},
                {"time": {"elapsed": 38, "extra": null}, "team": {"id": 47}, "type": "Goal", "detail": "Penalty"},
                {"time": {"elapsed": 61, "extra": null}, "team": {"id": 47}, "type": "Goal", "detail": "Normal Goal"}
            ]
        }"#;
        let env: Envelope<EventItem> = serde_json::from_str(body).unwrap();
        let minutes = first_half_goal_minutes(&env.response, 42, 47);
        assert_eq!(minutes, (Some(23), Some(38)));

        let fixture = r#"{
            "fixture": {"id": 1035037, "timestamp": 1759590000, "status": {"short": "FT"}},
            "teams": {"home": {"id": 42, "name": "Arsenal"}, "away": {"id": 47, "name": "Spurs"}},
            "score": {"halftime": {"home": 1, "away": 2}, "fulltime": {"home": 1, "away": 3}}
        }"#;
        let item: FixtureItem = serde_json::from_str(fixture).unwrap();
        assert_eq!(item.teams.home.id, Some(42));
        let mut rec = to_record(item, &league()).unwrap();
        assert!(needs_goal_minutes(&rec));
        apply_goal_minutes(&mut rec, minutes);
        assert_eq!(rec.first_goal_minute, Some(23));
        assert_eq!(rec.home_first_goal_minute, Some(23));
        assert_eq!(rec.away_first_goal_minute, Some(38));

        // Only an away own goal before the break.
        let own_goal: Vec<EventItem> = serde_json::from_str(
            r#"[{"time": {"elapsed": 9}, "team": {"id": 47}, "type": "Goal", "detail": "Own Goal"}]"#,
        )
        .unwrap();
        assert_eq!(first_half_goal_minutes(&own_goal, 42, 47), (Some(9), None));
    }

    #[test]
    fn test_goalless_first_half_needs_no_events() {
        let body = r#"{
            "fixture": {"id": 1, "timestamp": 1759590000, "status": {"short": "FT"}},
            "teams": {"home": {"name": "Arsenal"}, "away": {"name": "Spurs"}},
            "score": {"halftime": {"home": 0, "away": 0}, "fulltime": {"home": 1, "away": 0}}
        }"#;
        let rec = to_record(serde_json::from_str(body).unwrap(), &league()).unwrap();
        assert!(!needs_goal_minutes(&rec));
        assert_eq!(rec.first_goal_minute, None);
    }

    #[test]
    fn test_body_errors() {
        let rate: serde_json::Value =
            serde_json::from_str(r#"{"rateLimit": "Too many requests"}"#).unwrap();
        assert!(matches!(body_error(&rate), Some(SupplierError::RateLimited(_))));
        let token: serde_json::Value =
            serde_json::from_str(r#"{"token": "Error/Missing application key"}"#).unwrap();
        assert!(matches!(body_error(&token), Some(SupplierError::Auth(_))));
        assert!(body_error(&serde_json::json!([])).is_none());
    }

    #[test]
    fn test_extract_markets() {
        let body = r#"[{
            "id": 8,
            "name": "Bet365",
            "bets": [
                {"name": "Goals Over/Under First Half",
                 "values": [{"value": "Over 0.5", "odd": "1.50"}, {"value": "Under 0.5", "odd": "2.55"}]},
                {"name": "Match Winner",
                 "values": [{"value": "Home", "odd": "2.10"}, {"value": "Draw", "odd": "3.40"}, {"value": "Away", "odd": "3.60"}]}
            ]
        }]"#;
        let books: Vec<Bookmaker> = serde_json::from_str(body).unwrap();
        let q = first_half_quote(&books[0]).unwrap();
        assert_eq!(q.yes, Some(1.50));
        assert_eq!(q.no, Some(2.55));

        let mr = match_result(&books).unwrap();
        assert_eq!(mr.draw, Some(3.40));
        assert!(mr.over_2_5.is_none());
    }

    #[tokio::test]
    async fn test_league_without_supplier_id_is_unsupported() {
        let client = ApiFootballClient::new(&SupplierConfig::default(), "k".into()).unwrap();
        let mut l = league();
        l.supplier_id = None;
        let from = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let err = client.fixtures(&l, from, from).await.unwrap_err();
        assert!(matches!(err, SupplierError::Unsupported(_)));
        assert!(!err.is_transient());
    }
}
