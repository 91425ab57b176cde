//! The six multiplicative adjustment factors.
//!
//! Each factor is bounded and carries a human-readable reason. A factor
//! with nothing to say returns a neutral multiplier of 1.0 rather than
//! being omitted, so every prediction lists the same six names in the
//! same order.

use crate::config::PredictionConfig;
use crate::types::{Factor, LeagueProfile, MatchContext, Motivation, TeamProfile, RECENT_FORM_LEN};

pub const LEAGUE: &str = "league";
pub const MOMENTUM: &str = "momentum";
pub const AGGRESSION: &str = "aggression";
pub const VULNERABILITY: &str = "vulnerability";
pub const CONTEXT: &str = "context";
pub const FORM: &str = "form";

/// Inputs shared by all factors.
pub struct FactorInputs<'a> {
    pub league: &'a LeagueProfile,
    pub home_name: &'a str,
    pub away_name: &'a str,
    pub home: Option<&'a TeamProfile>,
    pub away: Option<&'a TeamProfile>,
    pub context: Option<&'a MatchContext>,
}

impl FactorInputs<'_> {
    /// Earliest average first-goal minute across both teams.
    pub fn earliest_first_goal_minute(&self) -> Option<f64> {
        [self.home, self.away]
            .into_iter()
            .flatten()
            .filter_map(|t| t.avg_first_goal_minute)
            .reduce(f64::min)
    }
}

fn factor(name: &str, multiplier: f64, reason: impl Into<String>) -> Factor {
    Factor {
        name: name.to_string(),
        multiplier,
        reason: reason.into(),
    }
}

/// All six factors, in application order.
pub fn compute_all(inputs: &FactorInputs<'_>, config: &PredictionConfig) -> Vec<Factor> {
    vec![
        league_factor(inputs.league),
        momentum_factor(inputs, config),
        aggression_factor(inputs, config),
        vulnerability_factor(inputs, config),
        context_factor(inputs.context, config),
        form_factor(inputs, config),
    ]
}

pub fn league_factor(league: &LeagueProfile) -> Factor {
    factor(
        LEAGUE,
        league.tier.factor(),
        format!("{} is a {} tier league", league.name, league.tier),
    )
}

/// Recent-5 first-half goal rate against the season rate, per team.
pub fn momentum_factor(inputs: &FactorInputs<'_>, config: &PredictionConfig) -> Factor {
    let mut multiplier = 1.0;
    let mut reasons = Vec::new();

    for (name, team) in [(inputs.home_name, inputs.home), (inputs.away_name, inputs.away)] {
        let Some(team) = team else { continue };
        let (hits, n) = team.recent_g1h();
        if n < config.momentum_min_recent {
            continue;
        }
        let Some(season) = team.season_g1h_rate(config.min_matches) else {
            continue;
        };
        let recent = hits as f64 / n as f64;
        let gap = recent - season;
        if gap.abs() > config.momentum_threshold {
            multiplier *= 1.0 + gap * config.momentum_sensitivity;
            reasons.push(format!(
                "{name} recent {hits}/{n} vs season {:.0}%",
                season * 100.0
            ));
        }
    }

    if reasons.is_empty() {
        return factor(MOMENTUM, 1.0, "no momentum shift");
    }
    let bounded = multiplier.clamp(config.momentum_min, config.momentum_max);
    factor(MOMENTUM, bounded, reasons.join("; "))
}

/// Early first goals historically.
pub fn aggression_factor(inputs: &FactorInputs<'_>, config: &PredictionConfig) -> Factor {
    match inputs.earliest_first_goal_minute() {
        Some(minute) if minute < config.aggression_early_minute => factor(
            AGGRESSION,
            config.aggression_early_boost,
            format!("average first goal at {minute:.0}'"),
        ),
        Some(minute) if minute < config.aggression_mid_minute => factor(
            AGGRESSION,
            config.aggression_mid_boost,
            format!("average first goal at {minute:.0}'"),
        ),
        Some(minute) => factor(AGGRESSION, 1.0, format!("average first goal at {minute:.0}'")),
        None => factor(AGGRESSION, 1.0, "no first-goal timing data"),
    }
}

/// How often the away side concedes before half-time on the road.
pub fn vulnerability_factor(inputs: &FactorInputs<'_>, config: &PredictionConfig) -> Factor {
    let rate = inputs
        .away
        .and_then(|t| t.away_conceding_rate(config.min_matches));
    let Some(rate) = rate else {
        return factor(VULNERABILITY, 1.0, "insufficient away sample");
    };
    let pct = rate * 100.0;
    if rate >= config.vulnerability_high {
        factor(
            VULNERABILITY,
            config.vulnerability_boost,
            format!("{} concede in {pct:.0}% of away first halves", inputs.away_name),
        )
    } else if rate <= config.vulnerability_low {
        factor(
            VULNERABILITY,
            config.vulnerability_penalty,
            format!("{} concede in only {pct:.0}% of away first halves", inputs.away_name),
        )
    } else {
        factor(VULNERABILITY, 1.0, format!("away conceding {pct:.0}% is average"))
    }
}

fn has_stakes(m: Motivation) -> bool {
    matches!(m, Motivation::Title | Motivation::Relegation)
}

/// Qualitative match context. Boosts compound and are capped.
pub fn context_factor(context: Option<&MatchContext>, config: &PredictionConfig) -> Factor {
    let Some(ctx) = context else {
        return factor(CONTEXT, 1.0, "no context");
    };
    let mut multiplier = 1.0;
    let mut reasons = Vec::new();

    if has_stakes(ctx.home_motivation) || has_stakes(ctx.away_motivation) {
        multiplier *= config.context_stakes_boost;
        reasons.push("title/relegation stakes".to_string());
    }
    if ctx.is_derby {
        multiplier *= config.context_derby_boost;
        reasons.push("derby".to_string());
    }
    if ctx.home_rest_days.is_some_and(|d| d >= config.context_rested_days) {
        multiplier *= config.context_rested_boost;
        reasons.push("rested home side".to_string());
    }
    if ctx.away_rest_days.is_some_and(|d| d <= config.context_tired_days) {
        multiplier *= config.context_tired_boost;
        reasons.push("tired away side".to_string());
    }

    if reasons.is_empty() {
        return factor(CONTEXT, 1.0, "context neutral");
    }
    factor(CONTEXT, multiplier.min(config.context_max), reasons.join(", "))
}

/// Recent first-half goal streaks, per team.
pub fn form_factor(inputs: &FactorInputs<'_>, config: &PredictionConfig) -> Factor {
    let mut multiplier = 1.0;
    let mut reasons = Vec::new();

    for (name, team) in [(inputs.home_name, inputs.home), (inputs.away_name, inputs.away)] {
        let Some(team) = team else { continue };
        let (hits, n) = team.recent_g1h();
        if n < RECENT_FORM_LEN {
            continue;
        }
        let m = match hits {
            5 => config.form_perfect_boost,
            4 => config.form_strong_boost,
            0 | 1 => config.form_cold_penalty,
            _ => 1.0,
        };
        if m != 1.0 {
            multiplier *= m;
            reasons.push(format!("{name} {hits}/{n} recent first halves with a goal"));
        }
    }

    if reasons.is_empty() {
        return factor(FORM, 1.0, "no form streak");
    }
    factor(
        FORM,
        multiplier.clamp(config.form_min, config.form_max),
        reasons.join("; "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LeagueTier, RecentMatch, Venue};
    use chrono::NaiveDate;

    fn league(tier: LeagueTier) -> LeagueProfile {
        LeagueProfile {
            code: "EPL".into(),
            name: "Premier League".into(),
            tier,
            avg_g1h: 1.3,
            active: true,
            season: "2025".into(),
            supplier_id: None,
        }
    }

    fn team(name: &str, played: u32, with_g1h: u32, recent: &[bool]) -> TeamProfile {
        let mut t = TeamProfile::new("EPL", name, "2025");
        t.matches_played = played;
        t.home_matches = played / 2;
        t.away_matches = played - played / 2;
        t.matches_with_g1h = with_g1h;
        t.recent_form = recent
            .iter()
            .enumerate()
            .map(|(i, g)| RecentMatch {
                date: NaiveDate::from_ymd_opt(2025, 9, 1 + i as u32).unwrap(),
                opponent: "Opp".into(),
                venue: Venue::Home,
                had_g1h: *g,
                minute: None,
            })
            .collect();
        t
    }

    fn inputs<'a>(
        l: &'a LeagueProfile,
        home: Option<&'a TeamProfile>,
        away: Option<&'a TeamProfile>,
        context: Option<&'a MatchContext>,
    ) -> FactorInputs<'a> {
        FactorInputs { league: l, home_name: "Home", away_name: "Away", home, away, context }
    }

    #[test]
    fn test_all_neutral_without_data() {
        let l = league(LeagueTier::Medium);
        let factors = compute_all(&inputs(&l, None, None, None), &PredictionConfig::default());
        let names: Vec<&str> = factors.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec![LEAGUE, MOMENTUM, AGGRESSION, VULNERABILITY, CONTEXT, FORM]);
        assert!(factors.iter().all(|f| f.multiplier == 1.0));
    }

    #[test]
    fn test_momentum_hot_team_is_bounded() {
        let l = league(LeagueTier::Medium);
        let cfg = PredictionConfig::default();
        // season 40%, recent 5/5: gap 0.6 → 1.3 raw, bounded to 1.10
        let home = team("Home", 10, 4, &[true; 5]);
        let f = momentum_factor(&inputs(&l, Some(&home), None, None), &cfg);
        assert_eq!(f.multiplier, cfg.momentum_max);
    }

    #[test]
    fn test_momentum_small_gap_is_neutral() {
        let l = league(LeagueTier::Medium);
        // season 60%, recent 3/5
        let home = team("Home", 10, 6, &[true, true, true, false, false]);
        let f = momentum_factor(&inputs(&l, Some(&home), None, None), &PredictionConfig::default());
        assert_eq!(f.multiplier, 1.0);
    }

    #[test]
    fn test_momentum_cold_team() {
        let l = league(LeagueTier::Medium);
        // season 70%, recent 2/5 → gap −0.3 → 0.85, bounded to 0.92
        let away = team("Away", 10, 7, &[true, false, false, true, false]);
        let f = momentum_factor(&inputs(&l, None, Some(&away), None), &PredictionConfig::default());
        assert!((f.multiplier - 0.92).abs() < 1e-12);
    }

    #[test]
    fn test_aggression_uses_earliest_minute() {
        let l = league(LeagueTier::Medium);
        let cfg = PredictionConfig::default();
        let mut home = team("Home", 10, 5, &[]);
        let mut away = team("Away", 10, 5, &[]);
        home.avg_first_goal_minute = Some(40.0);
        away.avg_first_goal_minute = Some(30.0);
        let f = aggression_factor(&inputs(&l, Some(&home), Some(&away), None), &cfg);
        assert_eq!(f.multiplier, cfg.aggression_mid_boost);

        away.avg_first_goal_minute = Some(20.0);
        let f = aggression_factor(&inputs(&l, Some(&home), Some(&away), None), &cfg);
        assert_eq!(f.multiplier, cfg.aggression_early_boost);
    }

    #[test]
    fn test_vulnerability_bands() {
        let l = league(LeagueTier::Medium);
        let cfg = PredictionConfig::default();
        let mut away = team("Away", 10, 5, &[]);
        away.away_matches = 5;

        away.away_g1h_against = 4;
        let f = vulnerability_factor(&inputs(&l, None, Some(&away), None), &cfg);
        assert_eq!(f.multiplier, cfg.vulnerability_boost);

        away.away_g1h_against = 1;
        let f = vulnerability_factor(&inputs(&l, None, Some(&away), None), &cfg);
        assert_eq!(f.multiplier, cfg.vulnerability_penalty);

        away.away_matches = 3;
        let f = vulnerability_factor(&inputs(&l, None, Some(&away), None), &cfg);
        assert_eq!(f.multiplier, 1.0);
    }

    #[test]
    fn test_context_compounds_and_caps() {
        let cfg = PredictionConfig::default();
        let ctx = MatchContext {
            home_motivation: Motivation::Title,
            is_derby: true,
            home_rest_days: Some(7),
            away_rest_days: Some(2),
            ..Default::default()
        };
        // 1.03 × 1.04 × 1.02 × 1.03 ≈ 1.1254 → capped at 1.12
        let f = context_factor(Some(&ctx), &cfg);
        assert_eq!(f.multiplier, cfg.context_max);

        let derby_only = MatchContext { is_derby: true, ..Default::default() };
        assert_eq!(context_factor(Some(&derby_only), &cfg).multiplier, cfg.context_derby_boost);
        assert_eq!(context_factor(Some(&MatchContext::default()), &cfg).multiplier, 1.0);
    }

    #[test]
    fn test_form_requires_five_matches() {
        let l = league(LeagueTier::Medium);
        let cfg = PredictionConfig::default();
        let four = team("Home", 10, 5, &[true; 4]);
        assert_eq!(form_factor(&inputs(&l, Some(&four), None, None), &cfg).multiplier, 1.0);

        let hot = team("Home", 10, 5, &[true; 5]);
        let cold = team("Away", 10, 5, &[false, false, true, false, false]);
        let f = form_factor(&inputs(&l, Some(&hot), Some(&cold), None), &cfg);
        assert!((f.multiplier - 1.05 * 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_league_factor_per_tier() {
        assert_eq!(league_factor(&league(LeagueTier::Max)).multiplier, 1.08);
        assert_eq!(league_factor(&league(LeagueTier::Low)).multiplier, 0.96);
    }
}
