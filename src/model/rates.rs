//! Base rates: league Poisson rate and team rates with fallbacks.

pub use crate::types::RateSource;
use crate::types::TeamProfile;

/// Base blend weights: league, home scoring, away conceding.
pub const WEIGHT_LEAGUE: f64 = 0.4;
pub const WEIGHT_HOME: f64 = 0.3;
pub const WEIGHT_AWAY: f64 = 0.3;

/// P(N ≥ 1) for N ~ Poisson(λ).
pub fn at_least_one_goal(lambda: f64) -> f64 {
    1.0 - (-lambda.max(0.0)).exp()
}

/// Weighted blend of the three base rates.
pub fn base_probability(league_rate: f64, home_rate: f64, away_concede_rate: f64) -> f64 {
    WEIGHT_LEAGUE * league_rate + WEIGHT_HOME * home_rate + WEIGHT_AWAY * away_concede_rate
}

/// Home side's first-half scoring rate: home sample, then overall, then league.
pub fn home_scoring_rate(
    team: Option<&TeamProfile>,
    name: &str,
    league_rate: f64,
    min_matches: u32,
    warnings: &mut Vec<String>,
) -> (f64, RateSource) {
    resolve(
        team,
        name,
        "home scoring",
        |t| t.home_scoring_rate(min_matches),
        |t| t.overall_scoring_rate(min_matches),
        league_rate,
        warnings,
    )
}

/// Away side's first-half conceding rate: away sample, then overall, then league.
pub fn away_conceding_rate(
    team: Option<&TeamProfile>,
    name: &str,
    league_rate: f64,
    min_matches: u32,
    warnings: &mut Vec<String>,
) -> (f64, RateSource) {
    resolve(
        team,
        name,
        "away conceding",
        |t| t.away_conceding_rate(min_matches),
        |t| t.overall_conceding_rate(min_matches),
        league_rate,
        warnings,
    )
}

fn resolve(
    team: Option<&TeamProfile>,
    name: &str,
    what: &str,
    venue: impl Fn(&TeamProfile) -> Option<f64>,
    overall: impl Fn(&TeamProfile) -> Option<f64>,
    league_rate: f64,
    warnings: &mut Vec<String>,
) -> (f64, RateSource) {
    let Some(t) = team else {
        warnings.push(format!(
            "{name}: no team profile, {what} rate uses league average"
        ));
        return (league_rate, RateSource::League);
    };
    if let Some(rate) = venue(t) {
        return (rate, RateSource::Venue);
    }
    if let Some(rate) = overall(t) {
        warnings.push(format!(
            "{name}: venue sample too small, {what} rate uses overall sample ({} matches)",
            t.matches_played
        ));
        return (rate, RateSource::Overall);
    }
    warnings.push(format!(
        "{name}: insufficient data ({} matches), {what} rate uses league average",
        t.matches_played
    ));
    (league_rate, RateSource::League)
}
