//! First-half goal odds estimated from correlated full-match markets.
//!
//! Total match goals are modelled as Poisson(λ). λ is solved by bisection:
//! from the over/under 2.5 market when it exists (P(N ≥ 3) = normalised
//! over probability), otherwise from the draw price assuming two
//! independent Poisson(λ/2) teams. The first-half rate is λ × share, and
//! P(yes) = 1 − e^(−λ₁ₕ).

use serde::Serialize;

use super::MatchResultOdds;
use crate::config::EstimationConfig;
use crate::model::rates::at_least_one_goal;
use crate::types::{EstimationConfidence, MIN_USABLE_PRICE};

const BISECTION_STEPS: usize = 60;
/// Truncation of the draw sum; terms past this are negligible for λ ≤ 10.
const DRAW_TERMS: u32 = 25;
const P_YES_BOUNDS: (f64, f64) = (0.01, 0.99);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OddsEstimate {
    pub lambda: f64,
    pub p_yes: f64,
    pub yes_price: f64,
    pub no_price: f64,
    pub confidence: EstimationConfidence,
    pub reason: String,
}

/// P(N ≥ 3) for N ~ Poisson(λ).
pub fn p_over_2_5(lambda: f64) -> f64 {
    1.0 - (-lambda).exp() * (1.0 + lambda + lambda * lambda / 2.0)
}

/// P(home goals = away goals) for two independent Poisson(λ/2) teams.
pub fn p_draw(lambda: f64) -> f64 {
    let mu = lambda / 2.0;
    let mut term = (-mu).exp();
    let mut sum = term * term;
    for k in 1..DRAW_TERMS {
        term *= mu / k as f64;
        sum += term * term;
    }
    sum
}

/// Normalise two or three decimal prices into probabilities summing to 1.
fn normalised(prices: &[f64]) -> Option<Vec<f64>> {
    if prices.iter().any(|p| *p < MIN_USABLE_PRICE) {
        return None;
    }
    let raw: Vec<f64> = prices.iter().map(|p| 1.0 / p).collect();
    let total: f64 = raw.iter().sum();
    Some(raw.into_iter().map(|r| r / total).collect())
}

/// Solve `f(λ) = target` on `[lo, hi]` for monotone `f`. The flag is true
/// when the target lies outside the bracket and λ was pinned to a bound.
fn solve(f: impl Fn(f64) -> f64, target: f64, lo: f64, hi: f64) -> (f64, bool) {
    let (f_lo, f_hi) = (f(lo), f(hi));
    let increasing = f_hi > f_lo;
    let (min, max) = if increasing { (f_lo, f_hi) } else { (f_hi, f_lo) };
    if target <= min {
        return (if increasing { lo } else { hi }, true);
    }
    if target >= max {
        return (if increasing { hi } else { lo }, true);
    }

    let (mut a, mut b) = (lo, hi);
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (a + b);
        let below = f(mid) < target;
        if below == increasing {
            a = mid;
        } else {
            b = mid;
        }
    }
    (0.5 * (a + b), false)
}

/// Estimate the first-half goal market, or `None` when neither the totals
/// nor the 1X2 market carry usable prices.
pub fn estimate(odds: &MatchResultOdds, config: &EstimationConfig) -> Option<OddsEstimate> {
    let (lo, hi) = (config.lambda_min, config.lambda_max);

    let from_totals = match (odds.over_2_5, odds.under_2_5) {
        (Some(over), Some(under)) => normalised(&[over, under]).map(|p| {
            let (lambda, pinned) = solve(p_over_2_5, p[0], lo, hi);
            (lambda, pinned, EstimationConfidence::High, "over/under 2.5")
        }),
        _ => None,
    };

    let solved = from_totals.or_else(|| match (odds.home, odds.draw, odds.away) {
        (Some(h), Some(d), Some(a)) => normalised(&[h, d, a]).map(|p| {
            let (lambda, pinned) = solve(p_draw, p[1], lo, hi);
            (lambda, pinned, EstimationConfidence::Medium, "1X2 draw price")
        }),
        _ => None,
    });

    let (lambda, pinned, confidence, source) = solved?;
    let confidence = if pinned {
        EstimationConfidence::Low
    } else {
        confidence
    };

    let p_yes = at_least_one_goal(lambda * config.first_half_share)
        .clamp(P_YES_BOUNDS.0, P_YES_BOUNDS.1);
    let margin = 1.0 + config.overround;

    Some(OddsEstimate {
        lambda,
        p_yes,
        yes_price: 1.0 / (p_yes * margin),
        no_price: 1.0 / ((1.0 - p_yes) * margin),
        confidence,
        reason: format!(
            "estimated from {source}: match λ {lambda:.2}, first-half λ {:.2}{}",
            lambda * config.first_half_share,
            if pinned { " (solver bound)" } else { "" }
        ),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
