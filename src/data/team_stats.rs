//! Team profiles rebuilt from finished matches in the registry.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::types::{Match, MatchStatus, RecentMatch, TeamProfile, Venue, RECENT_FORM_LEN};

#[derive(Default)]
struct Accumulator {
    profile: Option<TeamProfile>,
    scored_minutes: Vec<u32>,
}

/// Compute every team's profile for a league season. Matches without a
/// half-time score are ignored. Output is sorted by team name.
pub fn build_profiles(
    league_code: &str,
    season: &str,
    matches: &[Match],
    now: DateTime<Utc>,
) -> Vec<TeamProfile> {
    let mut finished: Vec<&Match> = matches
        .iter()
        .filter(|m| m.status == MatchStatus::Finished && m.first_half_goals().is_some())
        .collect();
    finished.sort_by_key(|m| m.kickoff);

    let mut teams: BTreeMap<String, Accumulator> = BTreeMap::new();
    for m in finished {
        let (Some(ht_home), Some(ht_away)) = (m.ht_home, m.ht_away) else {
            continue;
        };
        let had_g1h = ht_home + ht_away > 0;

        let sides = [
            (&m.home_team, &m.away_team, Venue::Home, ht_home, ht_away, m.home_first_goal_minute),
            (&m.away_team, &m.home_team, Venue::Away, ht_away, ht_home, m.away_first_goal_minute),
        ];
        for (team, opponent, venue, scored, conceded, scored_minute) in sides {
            let acc = teams.entry(team.clone()).or_default();
            let p = acc
                .profile
                .get_or_insert_with(|| TeamProfile::new(league_code, team, season));

            p.matches_played += 1;
            if had_g1h {
                p.matches_with_g1h += 1;
            }
            match venue {
                Venue::Home => {
                    p.home_matches += 1;
                    p.home_g1h_for += u32::from(scored > 0);
                    p.home_g1h_against += u32::from(conceded > 0);
                }
                Venue::Away => {
                    p.away_matches += 1;
                    p.away_g1h_for += u32::from(scored > 0);
                    p.away_g1h_against += u32::from(conceded > 0);
                }
            }

            p.recent_form.insert(
                0,
                RecentMatch {
                    date: m.date(),
                    opponent: opponent.clone(),
                    venue,
                    had_g1h,
                    minute: m.first_goal_minute,
                },
            );
            p.recent_form.truncate(RECENT_FORM_LEN);

            if let Some(minute) = scored_minute {
                acc.scored_minutes.push(minute);
            }
        }
    }

    teams
        .into_values()
        .filter_map(|acc| {
            let mut p = acc.profile?;
            if !acc.scored_minutes.is_empty() {
                let total: u32 = acc.scored_minutes.iter().sum();
                p.avg_first_goal_minute = Some(total as f64 / acc.scored_minutes.len() as f64);
            }
            p.updated_at = now;
            Some(p)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
