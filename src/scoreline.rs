//! Joint scoreline distribution from two expected-goal rates.
//!
//! Goals for each side are independent Poisson counts. The table is truncated
//! at `max_goals` per side and is *not* renormalized: the missing mass
//! `1 - sum(table)` is reported by [`ScorelineTable::truncation_residual`] and
//! is bounded by `P(X_home > cap) + P(X_away > cap)`. With the default cap of
//! 10 that is below 1e-4 while both rates are at most 2.4 and below 1e-3 up to
//! 3.0; at a cap of 8 it stays below 1e-3 up to 2.2. Callers that need a
//! closed distribution (1X2, goal buckets) normalize after collapsing.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const MIN_GOAL_CAP: u32 = 5;
/// Above this the table is all noise and the cell count explodes.
pub const MAX_GOAL_CAP: u32 = 50;

/// Recent-form rates for one team, split by venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamForm {
    #[serde(alias = "home_goals_scored_avg")]
    pub home_scored_avg: f64,
    #[serde(alias = "home_goals_conceded_avg")]
    pub home_conceded_avg: f64,
    #[serde(alias = "away_goals_scored_avg")]
    pub away_scored_avg: f64,
    #[serde(alias = "away_goals_conceded_avg")]
    pub away_conceded_avg: f64,
}

impl TeamForm {
    pub fn validate(&self) -> EngineResult<()> {
        check_rate("home_scored_avg", self.home_scored_avg)?;
        check_rate("home_conceded_avg", self.home_conceded_avg)?;
        check_rate("away_scored_avg", self.away_scored_avg)?;
        check_rate("away_conceded_avg", self.away_conceded_avg)?;
        Ok(())
    }
}

/// Blend of attack and opposing defence, plus venue multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XgWeights {
    pub attack_weight: f64,
    pub defence_weight: f64,
    pub home_factor: f64,
    pub away_factor: f64,
}

impl Default for XgWeights {
    fn default() -> Self {
        Self {
            attack_weight: 0.7,
            defence_weight: 0.3,
            home_factor: 1.1,
            away_factor: 0.9,
        }
    }
}

impl XgWeights {
    pub fn validate(&self) -> EngineResult<()> {
        let fields = [
            ("xg.attack_weight", self.attack_weight),
            ("xg.defence_weight", self.defence_weight),
            ("xg.home_factor", self.home_factor),
            ("xg.away_factor", self.away_factor),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfig {
                    field,
                    reason: format!("{value} must be finite and non-negative"),
                });
            }
        }
        Ok(())
    }
}

pub fn expected_goals(
    attacker_scoring_rate: f64,
    defender_conceding_rate: f64,
    home_advantage_factor: f64,
    weights: &XgWeights,
) -> f64 {
    (attacker_scoring_rate * weights.attack_weight
        + defender_conceding_rate * weights.defence_weight)
        * home_advantage_factor
}

/// Home and away rates for a fixture: home attack at home against the away
/// side's away defence, and the reverse.
pub fn match_expected_goals(
    home: &TeamForm,
    away: &TeamForm,
    weights: &XgWeights,
) -> EngineResult<(f64, f64)> {
    home.validate()?;
    away.validate()?;
    let home_xg = expected_goals(
        home.home_scored_avg,
        away.away_conceded_avg,
        weights.home_factor,
        weights,
    );
    let away_xg = expected_goals(
        away.away_scored_avg,
        home.home_conceded_avg,
        weights.away_factor,
        weights,
    );
    Ok((home_xg, away_xg))
}

/// League-average rates used when a fixture has no team statistics.
pub fn baseline_expected_goals(goals_total_base: f64, weights: &XgWeights) -> (f64, f64) {
    let half = goals_total_base.max(0.0) / 2.0;
    (half * weights.home_factor, half * weights.away_factor)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScorelineTable {
    max_goals: u32,
    // Row-major: index = home_goals * (max_goals + 1) + away_goals.
    cells: Vec<f64>,
}

impl ScorelineTable {
    pub fn max_goals(&self) -> u32 {
        self.max_goals
    }

    pub fn get(&self, home_goals: u32, away_goals: u32) -> f64 {
        if home_goals > self.max_goals || away_goals > self.max_goals {
            return 0.0;
        }
        self.cells[self.index(home_goals, away_goals)]
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, f64)> + '_ {
        let width = self.max_goals + 1;
        self.cells
            .iter()
            .enumerate()
            .map(move |(idx, p)| (idx as u32 / width, idx as u32 % width, *p))
    }

    pub fn total(&self) -> f64 {
        self.cells.iter().sum()
    }

    pub fn truncation_residual(&self) -> f64 {
        1.0 - self.total()
    }

    fn index(&self, home_goals: u32, away_goals: u32) -> usize {
        (home_goals * (self.max_goals + 1) + away_goals) as usize
    }
}

pub fn scoreline_table(home_xg: f64, away_xg: f64, max_goals: u32) -> EngineResult<ScorelineTable> {
    scoreline_table_with_rho(home_xg, away_xg, max_goals, 0.0)
}

/// Independent Poisson table with an optional Dixon-Coles low-score
/// correction. `rho == 0` leaves the plain product untouched.
pub fn scoreline_table_with_rho(
    home_xg: f64,
    away_xg: f64,
    max_goals: u32,
    rho: f64,
) -> EngineResult<ScorelineTable> {
    check_rate("home_xg", home_xg)?;
    check_rate("away_xg", away_xg)?;
    check_goal_cap(max_goals)?;

    let pmf_h = poisson_pmf(home_xg, max_goals);
    let pmf_a = poisson_pmf(away_xg, max_goals);

    let mut cells = Vec::with_capacity(pmf_h.len() * pmf_a.len());
    for (i, p_i) in pmf_h.iter().enumerate() {
        for (j, p_j) in pmf_a.iter().enumerate() {
            let base = p_i * p_j;
            let p = if rho == 0.0 {
                base
            } else {
                (base * dc_tau(i as u32, j as u32, home_xg, away_xg, rho)).max(0.0)
            };
            cells.push(p);
        }
    }

    Ok(ScorelineTable { max_goals, cells })
}

/// First-half table: both rates scaled by `fraction` of full-time scoring.
pub fn half_time_table(
    home_xg: f64,
    away_xg: f64,
    fraction: f64,
    max_goals: u32,
    rho: f64,
) -> EngineResult<ScorelineTable> {
    scoreline_table_with_rho(home_xg * fraction, away_xg * fraction, max_goals, rho)
}

pub fn check_goal_cap(max_goals: u32) -> EngineResult<()> {
    if !(MIN_GOAL_CAP..=MAX_GOAL_CAP).contains(&max_goals) {
        return Err(EngineError::InvalidGoalCap {
            max_goals,
            min: MIN_GOAL_CAP,
            max: MAX_GOAL_CAP,
        });
    }
    Ok(())
}

pub fn poisson_pmf(lambda: f64, max_k: u32) -> Vec<f64> {
    let max_k = max_k as usize;
    let lambda = lambda.max(0.0);
    let mut out = vec![0.0; max_k + 1];
    out[0] = (-lambda).exp();
    for k in 1..=max_k {
        out[k] = out[k - 1] * lambda / k as f64;
    }
    out
}

fn dc_tau(home_goals: u32, away_goals: u32, lambda_home: f64, lambda_away: f64, rho: f64) -> f64 {
    match (home_goals, away_goals) {
        (0, 0) => 1.0 - lambda_home * lambda_away * rho,
        (0, 1) => 1.0 + lambda_home * rho,
        (1, 0) => 1.0 + lambda_away * rho,
        (1, 1) => 1.0 - rho,
        _ => 1.0,
    }
}

fn check_rate(field: &'static str, value: f64) -> EngineResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(EngineError::InvalidTeamStatistics { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(hs: f64, hc: f64, as_: f64, ac: f64) -> TeamForm {
        TeamForm {
            home_scored_avg: hs,
            home_conceded_avg: hc,
            away_scored_avg: as_,
            away_conceded_avg: ac,
        }
    }

    #[test]
    fn pmf_matches_closed_form() {
        let pmf = poisson_pmf(1.8, 10);
        // P(2; 1.8) = e^-1.8 * 1.8^2 / 2
        let expected = (-1.8_f64).exp() * 1.8 * 1.8 / 2.0;
        assert!((pmf[2] - expected).abs() < 1e-12);
    }

    #[test]
    fn zero_rate_puts_all_mass_on_zero() {
        let t = scoreline_table(0.0, 0.0, 6).unwrap();
        assert_eq!(t.get(0, 0), 1.0);
        assert_eq!(t.get(1, 0), 0.0);
        assert!(t.truncation_residual().abs() < 1e-15);
    }

    #[test]
    fn residual_is_small_at_default_cap() {
        let t = scoreline_table(1.8, 1.2, 10).unwrap();
        let residual = t.truncation_residual();
        assert!(residual >= 0.0);
        assert!(residual < 1e-4);
    }

    #[test]
    fn rejects_low_cap_and_bad_rates() {
        assert!(matches!(
            scoreline_table(1.0, 1.0, 4),
            Err(EngineError::InvalidGoalCap { max_goals: 4, .. })
        ));
        assert!(matches!(
            scoreline_table(1.0, 1.0, MAX_GOAL_CAP + 1),
            Err(EngineError::InvalidGoalCap { max_goals: 51, .. })
        ));
        assert!(scoreline_table(1.0, 1.0, MAX_GOAL_CAP).is_ok());
        assert!(matches!(
            scoreline_table(-0.1, 1.0, 10),
            Err(EngineError::InvalidTeamStatistics { field: "home_xg", .. })
        ));
        assert!(scoreline_table(1.0, f64::INFINITY, 10).is_err());
    }

    #[test]
    fn expected_goals_blends_attack_and_defence() {
        let home = form(2.0, 1.0, 1.5, 1.5);
        let away = form(1.2, 1.1, 1.0, 1.6);
        let (hx, ax) = match_expected_goals(&home, &away, &XgWeights::default()).unwrap();
        assert!((hx - (2.0 * 0.7 + 1.6 * 0.3) * 1.1).abs() < 1e-12);
        assert!((ax - (1.0 * 0.7 + 1.0 * 0.3) * 0.9).abs() < 1e-12);
    }

    #[test]
    fn negative_form_is_rejected() {
        let home = form(2.0, -1.0, 1.5, 1.5);
        let away = form(1.2, 1.1, 1.0, 1.6);
        let err = match_expected_goals(&home, &away, &XgWeights::default()).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidTeamStatistics {
                field: "home_conceded_avg",
                value: -1.0
            }
        );
    }

    #[test]
    fn negative_rho_lifts_low_draws() {
        let plain = scoreline_table(1.4, 1.1, 10).unwrap();
        let dc = scoreline_table_with_rho(1.4, 1.1, 10, -0.10).unwrap();
        assert!(dc.get(0, 0) > plain.get(0, 0));
        assert!(dc.get(1, 1) > plain.get(1, 1));
        assert_eq!(dc.get(2, 3), plain.get(2, 3));
    }

    #[test]
    fn iter_visits_every_cell_once() {
        let t = scoreline_table(1.0, 1.0, 5).unwrap();
        let cells: Vec<(u32, u32, f64)> = t.iter().collect();
        assert_eq!(cells.len(), 36);
        assert_eq!((cells[7].0, cells[7].1), (1, 1));
    }
}
