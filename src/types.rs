//! Shared types for the FIRSTHALF engine.
//!
//! These types form the data model used across all modules: reference
//! data (leagues, teams), the match registry, the odds store, and the
//! records the engine writes (predictions, selections, health snapshots).
//! They are designed to be stable so that the model, strategy, engine and
//! storage modules can depend on them without circular references.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::health::calibration::CalibrationReport;

/// Decimal odds at or below this are not a usable price.
pub const MIN_USABLE_PRICE: f64 = 1.01;

/// Number of recent matches kept on a team profile.
pub const RECENT_FORM_LEN: usize = 5;

// ---------------------------------------------------------------------------
// League
// ---------------------------------------------------------------------------

/// League tier. Determines the fixed league factor used by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LeagueTier {
    Max,
    High,
    Medium,
    Low,
}

impl LeagueTier {
    /// Multiplicative league factor applied to the base probability.
    pub fn factor(&self) -> f64 {
        match self {
            LeagueTier::Max => 1.08,
            LeagueTier::High => 1.04,
            LeagueTier::Medium => 1.00,
            LeagueTier::Low => 0.96,
        }
    }
}

impl fmt::Display for LeagueTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeagueTier::Max => write!(f, "MAX"),
            LeagueTier::High => write!(f, "HIGH"),
            LeagueTier::Medium => write!(f, "MEDIUM"),
            LeagueTier::Low => write!(f, "LOW"),
        }
    }
}

impl std::str::FromStr for LeagueTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "max" => Ok(LeagueTier::Max),
            "high" => Ok(LeagueTier::High),
            "medium" | "mid" => Ok(LeagueTier::Medium),
            "low" => Ok(LeagueTier::Low),
            _ => Err(anyhow::anyhow!("Unknown league tier: {s}")),
        }
    }
}

/// Slow-changing per-league configuration. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueProfile {
    /// League code, e.g. "EPL".
    pub code: String,
    pub name: String,
    pub tier: LeagueTier,
    /// Average first-half goals per match (λ).
    pub avg_g1h: f64,
    pub active: bool,
    /// Season label used for team profiles, e.g. "2025".
    pub season: String,
    /// League id on the fixture/odds supplier.
    #[serde(default)]
    pub supplier_id: Option<u32>,
}

impl LeagueProfile {
    /// League-wide probability of at least one first-half goal.
    pub fn g1h_rate(&self) -> f64 {
        crate::model::rates::at_least_one_goal(self.avg_g1h)
    }
}

impl fmt::Display for LeagueProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}, λ1H={:.2}{})",
            self.code,
            self.name,
            self.tier,
            self.avg_g1h,
            if self.active { "" } else { ", inactive" },
        )
    }
}

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

/// Home or away, from the team's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Venue {
    Home,
    Away,
}

/// One entry in a team's recent-form list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentMatch {
    pub date: NaiveDate,
    pub opponent: String,
    pub venue: Venue,
    /// Whether either side scored before half-time.
    pub had_g1h: bool,
    /// Minute of the first goal of the match, if any.
    pub minute: Option<u32>,
}

/// Per-team, per-season first-half statistics.
///
/// Counts are stored raw; rates are derived on read and are undefined
/// (`None`) until the sample reaches the caller's minimum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamProfile {
    pub league_code: String,
    pub team: String,
    pub season: String,
    pub matches_played: u32,
    pub home_matches: u32,
    pub away_matches: u32,
    /// Home matches in which this team scored in the first half.
    pub home_g1h_for: u32,
    /// Home matches in which this team conceded in the first half.
    pub home_g1h_against: u32,
    pub away_g1h_for: u32,
    pub away_g1h_against: u32,
    /// Matches (any venue) with at least one first-half goal.
    pub matches_with_g1h: u32,
    /// Average minute of the first goal this team scored.
    pub avg_first_goal_minute: Option<f64>,
    /// Last matches, newest first, at most [`RECENT_FORM_LEN`].
    pub recent_form: Vec<RecentMatch>,
    pub updated_at: DateTime<Utc>,
}

fn rate(hits: u32, sample: u32, min_sample: u32) -> Option<f64> {
    if sample == 0 || sample < min_sample {
        None
    } else {
        Some(hits as f64 / sample as f64)
    }
}

impl TeamProfile {
    /// Empty profile (no matches yet).
    pub fn new(league_code: &str, team: &str, season: &str) -> Self {
        Self {
            league_code: league_code.to_string(),
            team: team.to_string(),
            season: season.to_string(),
            matches_played: 0,
            home_matches: 0,
            away_matches: 0,
            home_g1h_for: 0,
            home_g1h_against: 0,
            away_g1h_for: 0,
            away_g1h_against: 0,
            matches_with_g1h: 0,
            avg_first_goal_minute: None,
            recent_form: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// First-half scoring rate in home matches.
    pub fn home_scoring_rate(&self, min_sample: u32) -> Option<f64> {
        rate(self.home_g1h_for, self.home_matches, min_sample)
    }

    /// First-half scoring rate across all matches.
    pub fn overall_scoring_rate(&self, min_sample: u32) -> Option<f64> {
        rate(
            self.home_g1h_for + self.away_g1h_for,
            self.matches_played,
            min_sample,
        )
    }

    /// First-half conceding rate in away matches.
    pub fn away_conceding_rate(&self, min_sample: u32) -> Option<f64> {
        rate(self.away_g1h_against, self.away_matches, min_sample)
    }

    /// First-half conceding rate across all matches.
    pub fn overall_conceding_rate(&self, min_sample: u32) -> Option<f64> {
        rate(
            self.home_g1h_against + self.away_g1h_against,
            self.matches_played,
            min_sample,
        )
    }

    /// Share of this season's matches that had a first-half goal.
    pub fn season_g1h_rate(&self, min_sample: u32) -> Option<f64> {
        rate(self.matches_with_g1h, self.matches_played, min_sample)
    }

    /// (matches with a first-half goal, matches counted) over the recent form list.
    pub fn recent_g1h(&self) -> (usize, usize) {
        let window = self.recent_form.iter().take(RECENT_FORM_LEN);
        let n = window.clone().count();
        let hits = window.filter(|m| m.had_g1h).count();
        (hits, n)
    }
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// Match lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Halftime,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "SCHEDULED",
            MatchStatus::Live => "LIVE",
            MatchStatus::Halftime => "HALFTIME",
            MatchStatus::Finished => "FINISHED",
            MatchStatus::Postponed => "POSTPONED",
            MatchStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal statuses a selection can be settled against.
    pub fn is_settleable(&self) -> bool {
        matches!(
            self,
            MatchStatus::Finished | MatchStatus::Cancelled | MatchStatus::Postponed
        )
    }

    /// Statuses that void a bet.
    pub fn is_void(&self) -> bool {
        matches!(self, MatchStatus::Cancelled | MatchStatus::Postponed)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SCHEDULED" => Ok(MatchStatus::Scheduled),
            "LIVE" => Ok(MatchStatus::Live),
            "HALFTIME" => Ok(MatchStatus::Halftime),
            "FINISHED" => Ok(MatchStatus::Finished),
            "POSTPONED" => Ok(MatchStatus::Postponed),
            "CANCELLED" => Ok(MatchStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Unknown match status: {s}")),
        }
    }
}

/// What a team is playing for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Motivation {
    #[default]
    Normal,
    Title,
    Relegation,
    Europe,
}

/// Optional qualitative context attached to a match.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MatchContext {
    #[serde(default)]
    pub home_motivation: Motivation,
    #[serde(default)]
    pub away_motivation: Motivation,
    #[serde(default)]
    pub is_derby: bool,
    pub home_rest_days: Option<u32>,
    pub away_rest_days: Option<u32>,
    /// Recent results string, e.g. "WWDLW".
    pub home_recent_results: Option<String>,
    pub away_recent_results: Option<String>,
    pub home_position: Option<u32>,
    pub away_position: Option<u32>,
}

/// Canonical match record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
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
    /// Minute of the first goal of the match, when the supplier reports it.
    #[serde(default)]
    pub first_goal_minute: Option<u32>,
    /// Home side's first-goal minute, used for team timing stats.
    #[serde(default)]
    pub home_first_goal_minute: Option<u32>,
    #[serde(default)]
    pub away_first_goal_minute: Option<u32>,
    #[serde(default)]
    pub context: Option<MatchContext>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} vs {} @ {} ({})",
            self.league_code,
            self.home_team,
            self.away_team,
            self.kickoff.format("%Y-%m-%d %H:%M"),
            self.status,
        )
    }
}

impl Match {
    /// Scheduled date (UTC).
    pub fn date(&self) -> NaiveDate {
        self.kickoff.date_naive()
    }

    /// "Home vs Away".
    pub fn label(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }

    /// Total first-half goals, if the half-time score is known.
    pub fn first_half_goals(&self) -> Option<u32> {
        Some(self.ht_home? + self.ht_away?)
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// One bookmaker's first-half goal Yes/No quote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookmakerQuote {
    pub bookmaker: String,
    pub yes: Option<f64>,
    pub no: Option<f64>,
}

/// How much an estimated price can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EstimationConfidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for EstimationConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimationConfidence::High => write!(f, "HIGH"),
            EstimationConfidence::Medium => write!(f, "MEDIUM"),
            EstimationConfidence::Low => write!(f, "LOW"),
        }
    }
}

/// First-half goal market for one match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Odds {
    pub id: String,
    pub match_id: String,
    pub quotes: Vec<BookmakerQuote>,
    pub best_yes: Option<f64>,
    pub best_yes_bookmaker: Option<String>,
    pub avg_yes: Option<f64>,
    pub best_no: Option<f64>,
    pub avg_no: Option<f64>,
    /// 1 / best Yes price.
    pub implied_probability: Option<f64>,
    /// Best Yes price captured at or near kickoff. Immutable once set.
    pub closing_yes: Option<f64>,
    pub closing_captured_at: Option<DateTime<Utc>>,
    pub is_real_odds: bool,
    pub estimation_reason: Option<String>,
    pub estimation_confidence: Option<EstimationConfidence>,
    pub updated_at: DateTime<Utc>,
}

fn best_and_avg(prices: impl Iterator<Item = f64>) -> (Option<f64>, Option<f64>) {
    let prices: Vec<f64> = prices.filter(|p| *p >= MIN_USABLE_PRICE).collect();
    if prices.is_empty() {
        return (None, None);
    }
    let best = prices.iter().copied().fold(f64::MIN, f64::max);
    let avg = prices.iter().sum::<f64>() / prices.len() as f64;
    (Some(best), Some(avg))
}

impl Odds {
    /// Build a real-odds record from bookmaker quotes.
    pub fn from_quotes(match_id: &str, quotes: Vec<BookmakerQuote>) -> Self {
        let (best_yes, avg_yes) = best_and_avg(quotes.iter().filter_map(|q| q.yes));
        let (best_no, avg_no) = best_and_avg(quotes.iter().filter_map(|q| q.no));
        let best_yes_bookmaker = best_yes.and_then(|best| {
            quotes
                .iter()
                .find(|q| q.yes == Some(best))
                .map(|q| q.bookmaker.clone())
        });

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            match_id: match_id.to_string(),
            quotes,
            best_yes,
            best_yes_bookmaker,
            avg_yes,
            best_no,
            avg_no,
            implied_probability: best_yes.map(|p| 1.0 / p),
            closing_yes: None,
            closing_captured_at: None,
            is_real_odds: true,
            estimation_reason: None,
            estimation_confidence: None,
            updated_at: Utc::now(),
        }
    }

    /// Build an estimated record derived from a correlated market.
    pub fn estimated(
        match_id: &str,
        yes: f64,
        no: f64,
        reason: String,
        confidence: EstimationConfidence,
    ) -> Self {
        let mut odds = Self::from_quotes(
            match_id,
            vec![BookmakerQuote {
                bookmaker: "estimate".to_string(),
                yes: Some(yes),
                no: Some(no),
            }],
        );
        odds.is_real_odds = false;
        odds.estimation_reason = Some(reason);
        odds.estimation_confidence = Some(confidence);
        odds
    }

    /// Best Yes price if it is usable.
    pub fn usable_yes(&self) -> Option<f64> {
        self.best_yes.filter(|p| *p >= MIN_USABLE_PRICE)
    }

    /// Capture the current best Yes price as the closing price.
    /// Returns false if a closing price already exists or there is no price.
    pub fn capture_closing(&mut self, at: DateTime<Utc>) -> bool {
        if self.closing_yes.is_some() {
            return false;
        }
        match self.usable_yes() {
            Some(price) => {
                self.closing_yes = Some(price);
                self.closing_captured_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Keep identity and the captured closing price of a previous record.
    pub fn carry_over(&mut self, previous: &Odds) {
        self.id = previous.id.clone();
        if previous.closing_yes.is_some() {
            self.closing_yes = previous.closing_yes;
            self.closing_captured_at = previous.closing_captured_at;
        }
    }
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_price = |p: Option<f64>| p.map_or("-".to_string(), |p| format!("{p:.2}"));
        write!(
            f,
            "{} yes={} (avg {}) no={} close={} [{}]",
            self.match_id,
            fmt_price(self.best_yes),
            fmt_price(self.avg_yes),
            fmt_price(self.best_no),
            fmt_price(self.closing_yes),
            if self.is_real_odds { "real" } else { "estimated" },
        )
    }
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// A named multiplicative contribution to the final probability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Factor {
    pub name: String,
    pub multiplier: f64,
    pub reason: String,
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ×{:.3} ({})", self.name, self.multiplier, self.reason)
    }
}

/// Sub-scores behind the edge score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct EdgeBreakdown {
    /// 10–25, fewer fallback warnings is higher.
    pub data_quality: f64,
    /// 0–25, home scoring rate, timing and away vulnerability.
    pub pattern_strength: f64,
    /// 0–10, from the context factor.
    pub context: f64,
    /// −10..+15, probability magnitude bonus.
    pub value: f64,
}

/// Confidence label attached to a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "HIGH"),
            Confidence::Medium => write!(f, "MEDIUM"),
            Confidence::Low => write!(f, "LOW"),
        }
    }
}

/// Where a team rate came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    /// Home-only or away-only sample.
    Venue,
    Overall,
    /// League rate used in place of a thin team sample.
    #[default]
    League,
}

/// Calibrated first-half goal probability for one match, with every
/// intermediate value kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub match_id: String,
    pub league_code: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    /// 1 − e^(−λ) for the league.
    pub league_rate: f64,
    pub home_rate: f64,
    #[serde(default)]
    pub home_rate_source: RateSource,
    pub away_concede_rate: f64,
    #[serde(default)]
    pub away_rate_source: RateSource,
    pub p_base: f64,
    pub factors: Vec<Factor>,
    pub p_real: f64,
    pub edge_score: f64,
    pub breakdown: EdgeBreakdown,
    pub confidence: Confidence,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Prediction {
    /// Recompute the final probability from the stored base and factors.
    pub fn recompute_probability(&self) -> f64 {
        crate::model::apply_factors(self.p_base, &self.factors)
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vs {}: base={:.1}% final={:.1}% edge={:.0} ({}, {} warnings)",
            self.home_team,
            self.away_team,
            self.p_base * 100.0,
            self.p_real * 100.0,
            self.edge_score,
            self.confidence,
            self.warnings.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Discrete value tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Signal {
    A,
    B,
    C,
    #[serde(rename = "NONE")]
    None,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::A => "A",
            Signal::B => "B",
            Signal::C => "C",
            Signal::None => "NONE",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement outcome of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pending,
    Won,
    Lost,
    Void,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pending => "PENDING",
            Outcome::Won => "WON",
            Outcome::Lost => "LOST",
            Outcome::Void => "VOID",
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }

    /// Won or lost (voids excluded).
    pub fn is_decided(&self) -> bool {
        matches!(self, Outcome::Won | Outcome::Lost)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of settling one selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settlement {
    pub outcome: Outcome,
    pub closing_odds: Option<f64>,
    pub clv: Option<f64>,
    pub profit_loss: f64,
    pub settled_at: DateTime<Utc>,
    pub actual_g1h_goals: Option<u32>,
    pub first_goal_minute: Option<u32>,
}

/// A recommended bet. Immutable event record of decision-time facts,
/// mutated once by settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub id: String,
    pub match_id: String,
    pub run_id: String,
    /// 1-based rank within the pipeline run.
    pub rank: u32,
    // Decision-time snapshot
    pub league_code: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub signal: Signal,
    pub margin_valor: f64,
    pub probability: f64,
    pub edge_score: f64,
    pub confidence: Confidence,
    pub stake_fraction: f64,
    pub odds_at_selection: f64,
    pub bookmaker: Option<String>,
    pub is_real_odds: bool,
    // Settlement
    pub outcome: Outcome,
    pub closing_odds: Option<f64>,
    pub clv: Option<f64>,
    pub profit_loss: Option<f64>,
    pub settled_at: Option<DateTime<Utc>>,
    pub actual_g1h_goals: Option<u32>,
    pub first_goal_minute: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Selection {
    /// Apply a settlement. One-way: returns false if already settled.
    pub fn apply_settlement(&mut self, s: &Settlement) -> bool {
        if self.outcome.is_settled() {
            return false;
        }
        self.outcome = s.outcome;
        self.closing_odds = s.closing_odds;
        self.clv = s.clv;
        self.profit_loss = Some(s.profit_loss);
        self.settled_at = Some(s.settled_at);
        self.actual_g1h_goals = s.actual_g1h_goals;
        self.first_goal_minute = s.first_goal_minute;
        true
    }

    pub fn label(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{}] {} vs {} | signal={} margin={:+.1}% p={:.0}% @ {:.2} stake={:.2}% | {}",
            self.rank,
            self.league_code,
            self.home_team,
            self.away_team,
            self.signal,
            self.margin_valor * 100.0,
            self.probability * 100.0,
            self.odds_at_selection,
            self.stake_fraction * 100.0,
            self.outcome,
        )
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Top-level health signal, driven by average CLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Green => write!(f, "🟢 GREEN"),
            HealthStatus::Yellow => write!(f, "🟡 YELLOW"),
            HealthStatus::Red => write!(f, "🔴 RED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub message: String,
    pub recommendation: String,
}

/// Hit rate / CLV / ROI for a group of selections.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupMetrics {
    pub total: usize,
    pub settled: usize,
    pub pending: usize,
    pub won: usize,
    pub lost: usize,
    pub voided: usize,
    /// won / (won + lost); `None` with no decided selections.
    pub hit_rate: Option<f64>,
    /// Mean CLV over settled selections that carry one.
    pub avg_clv: Option<f64>,
    pub roi: Option<f64>,
    pub total_profit_loss: f64,
    pub total_stake: f64,
}

/// Average CLV over three windows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClvWindows {
    pub last_7_days: Option<f64>,
    pub last_30_days: Option<f64>,
    pub all_time: Option<f64>,
}

/// Rolling health report. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub id: String,
    pub generated_at: DateTime<Utc>,
    pub period_days: u32,
    pub status: HealthStatus,
    pub metrics: GroupMetrics,
    pub clv_windows: ClvWindows,
    pub by_league: std::collections::BTreeMap<String, GroupMetrics>,
    pub by_signal: std::collections::BTreeMap<String, GroupMetrics>,
    pub calibration: CalibrationReport,
    pub alerts: Vec<Alert>,
}

impl fmt::Display for HealthSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{:+.2}%", v * 100.0));
        write!(
            f,
            "{} | {}d: selections={} settled={} pending={} | hit={} clv={} roi={} | alerts={}",
            self.status,
            self.period_days,
            self.metrics.total,
            self.metrics.settled,
            self.metrics.pending,
            self.metrics
                .hit_rate
                .map_or("-".to_string(), |h| format!("{:.1}%", h * 100.0)),
            pct(self.metrics.avg_clv),
            pct(self.metrics.roi),
            self.alerts.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // -- LeagueTier tests --

    #[test]
    fn test_tier_factors() {
        assert_eq!(LeagueTier::Max.factor(), 1.08);
        assert_eq!(LeagueTier::High.factor(), 1.04);
        assert_eq!(LeagueTier::Medium.factor(), 1.00);
        assert_eq!(LeagueTier::Low.factor(), 0.96);
    }

    #[test]
    fn test_tier_from_str() {
        assert_eq!("max".parse::<LeagueTier>().unwrap(), LeagueTier::Max);
        assert_eq!("MEDIUM".parse::<LeagueTier>().unwrap(), LeagueTier::Medium);
        assert!("premier".parse::<LeagueTier>().is_err());
    }

    #[test]
    fn test_tier_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&LeagueTier::High).unwrap(), "\"HIGH\"");
    }

    // -- TeamProfile tests --

    fn profile() -> TeamProfile {
        let mut p = TeamProfile::new("EPL", "Arsenal", "2025");
        p.matches_played = 10;
        p.home_matches = 6;
        p.away_matches = 4;
        p.home_g1h_for = 4;
        p.away_g1h_for = 2;
        p.home_g1h_against = 1;
        p.away_g1h_against = 3;
        p.matches_with_g1h = 7;
        p
    }

    #[test]
    fn test_rates_respect_min_sample() {
        let p = profile();
        assert!((p.home_scoring_rate(5).unwrap() - 4.0 / 6.0).abs() < 1e-12);
        assert!(p.away_conceding_rate(5).is_none());
        assert!((p.away_conceding_rate(4).unwrap() - 0.75).abs() < 1e-12);
        assert!((p.overall_scoring_rate(5).unwrap() - 0.6).abs() < 1e-12);
        assert!((p.overall_conceding_rate(5).unwrap() - 0.4).abs() < 1e-12);
        assert!((p.season_g1h_rate(5).unwrap() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_rates_undefined_for_empty_profile() {
        let p = TeamProfile::new("EPL", "New", "2025");
        assert!(p.home_scoring_rate(0).is_none());
        assert!(p.season_g1h_rate(0).is_none());
    }

    #[test]
    fn test_recent_g1h_counts_last_five() {
        let mut p = profile();
        for i in 0..7 {
            p.recent_form.push(RecentMatch {
                date: NaiveDate::from_ymd_opt(2025, 9, 1 + i).unwrap(),
                opponent: format!("T{i}"),
                venue: Venue::Home,
                had_g1h: i % 2 == 0,
                minute: None,
            });
        }
        // indices 0,2,4 inside the first five
        assert_eq!(p.recent_g1h(), (3, 5));
    }

    // -- Match tests --

    fn sample_match() -> Match {
        Match {
            id: "m1".into(),
            league_code: "EPL".into(),
            season: "2025".into(),
            home_team: "Arsenal".into(),
            away_team: "Chelsea".into(),
            kickoff: Utc.with_ymd_and_hms(2025, 10, 4, 14, 0, 0).unwrap(),
            status: MatchStatus::Finished,
            ht_home: Some(1),
            ht_away: Some(0),
            ft_home: Some(2),
            ft_away: Some(1),
            first_goal_minute: Some(23),
            home_first_goal_minute: Some(23),
            away_first_goal_minute: Some(70),
            context: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_match_first_half_goals() {
        let mut m = sample_match();
        assert_eq!(m.first_half_goals(), Some(1));
        m.ht_away = None;
        assert_eq!(m.first_half_goals(), None);
    }

    #[test]
    fn test_match_status_helpers() {
        assert!(MatchStatus::Finished.is_settleable());
        assert!(MatchStatus::Postponed.is_settleable());
        assert!(!MatchStatus::Halftime.is_settleable());
        assert!(MatchStatus::Cancelled.is_void());
        assert!(!MatchStatus::Finished.is_void());
        assert_eq!("halftime".parse::<MatchStatus>().unwrap(), MatchStatus::Halftime);
    }

    #[test]
    fn test_match_display() {
        let display = format!("{}", sample_match());
        assert!(display.contains("Arsenal vs Chelsea"));
        assert!(display.contains("FINISHED"));
    }

    // -- Odds tests --

    fn quotes() -> Vec<BookmakerQuote> {
        vec![
            BookmakerQuote { bookmaker: "bet365".into(), yes: Some(1.50), no: Some(2.50) },
            BookmakerQuote { bookmaker: "pinnacle".into(), yes: Some(1.60), no: Some(2.30) },
            BookmakerQuote { bookmaker: "broken".into(), yes: Some(1.0), no: None },
        ]
    }

    #[test]
    fn test_odds_from_quotes() {
        let odds = Odds::from_quotes("m1", quotes());
        assert_eq!(odds.best_yes, Some(1.60));
        assert_eq!(odds.best_yes_bookmaker.as_deref(), Some("pinnacle"));
        assert!((odds.avg_yes.unwrap() - 1.55).abs() < 1e-12);
        assert_eq!(odds.best_no, Some(2.50));
        assert!((odds.implied_probability.unwrap() - 0.625).abs() < 1e-12);
        assert!(odds.is_real_odds);
    }

    #[test]
    fn test_odds_without_yes_is_unusable() {
        let odds = Odds::from_quotes(
            "m1",
            vec![BookmakerQuote { bookmaker: "x".into(), yes: None, no: Some(2.0) }],
        );
        assert!(odds.usable_yes().is_none());
        assert!(odds.implied_probability.is_none());
    }

    #[test]
    fn test_closing_capture_is_once() {
        let mut odds = Odds::from_quotes("m1", quotes());
        let t = Utc::now();
        assert!(odds.capture_closing(t));
        assert_eq!(odds.closing_yes, Some(1.60));

        odds.best_yes = Some(1.40);
        assert!(!odds.capture_closing(Utc::now()));
        assert_eq!(odds.closing_yes, Some(1.60));
        assert_eq!(odds.closing_captured_at, Some(t));
    }

    #[test]
    fn test_carry_over_keeps_id_and_closing() {
        let mut old = Odds::from_quotes("m1", quotes());
        old.capture_closing(Utc::now());
        let mut fresh = Odds::from_quotes("m1", quotes());
        fresh.carry_over(&old);
        assert_eq!(fresh.id, old.id);
        assert_eq!(fresh.closing_yes, old.closing_yes);
    }

    #[test]
    fn test_estimated_odds_flags() {
        let odds = Odds::estimated("m1", 1.45, 2.60, "from 1X2".into(), EstimationConfidence::Medium);
        assert!(!odds.is_real_odds);
        assert_eq!(odds.estimation_confidence, Some(EstimationConfidence::Medium));
        assert_eq!(odds.best_yes, Some(1.45));
    }

    // -- Signal / Outcome tests --

    #[test]
    fn test_signal_serialization() {
        assert_eq!(serde_json::to_string(&Signal::None).unwrap(), "\"NONE\"");
        assert_eq!(serde_json::to_string(&Signal::A).unwrap(), "\"A\"");
        let parsed: Signal = serde_json::from_str("\"NONE\"").unwrap();
        assert_eq!(parsed, Signal::None);
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(!Outcome::Pending.is_settled());
        assert!(Outcome::Void.is_settled());
        assert!(!Outcome::Void.is_decided());
        assert!(Outcome::Won.is_decided());
    }

    // -- Selection tests --

    fn selection() -> Selection {
        Selection {
            id: "s1".into(),
            match_id: "m1".into(),
            run_id: "r1".into(),
            rank: 1,
            league_code: "EPL".into(),
            home_team: "Arsenal".into(),
            away_team: "Chelsea".into(),
            kickoff: Utc::now(),
            signal: Signal::B,
            margin_valor: 0.04,
            probability: 0.68,
            edge_score: 66.0,
            confidence: Confidence::Medium,
            stake_fraction: 0.02,
            odds_at_selection: 1.53,
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

    #[test]
    fn test_selection_settlement_is_one_way() {
        let mut s = selection();
        let first = Settlement {
            outcome: Outcome::Won,
            closing_odds: Some(1.45),
            clv: Some(0.05),
            profit_loss: 0.0106,
            settled_at: Utc::now(),
            actual_g1h_goals: Some(1),
            first_goal_minute: Some(12),
        };
        assert!(s.apply_settlement(&first));

        let second = Settlement { outcome: Outcome::Lost, profit_loss: -0.02, ..first.clone() };
        assert!(!s.apply_settlement(&second));
        assert_eq!(s.outcome, Outcome::Won);
        assert_eq!(s.profit_loss, Some(0.0106));
    }

    #[test]
    fn test_selection_display() {
        let display = format!("{}", selection());
        assert!(display.contains("signal=B"));
        assert!(display.contains("PENDING"));
    }

    // -- Health tests --

    #[test]
    fn test_health_status_display() {
        assert_eq!(format!("{}", HealthStatus::Green), "🟢 GREEN");
        assert_eq!(format!("{}", HealthStatus::Red), "🔴 RED");
    }
}
