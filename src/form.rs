use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::odds::OddsTriple;
use crate::probability::Outcome;
use crate::scoreline::TeamForm;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedMatch {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: u8,
    pub away_goals: u8,
    /// Closing 1X2 prices, when the history source has them.
    #[serde(default)]
    pub odds: Option<OddsTriple>,
}

impl FinishedMatch {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_goals(self.home_goals as u32, self.away_goals as u32)
    }
}

/// Venue-split scoring averages over the team's last `lookback` home and
/// last `lookback` away matches. A venue with no matches averages to 0.
pub fn team_form_from_history(team: &str, matches: &[FinishedMatch], lookback: usize) -> TeamForm {
    let mut ordered: Vec<&FinishedMatch> = matches.iter().collect();
    ordered.sort_by_key(|m| m.date);

    let home = last_n(ordered.iter().copied().filter(|m| m.home_team == team), lookback);
    let away = last_n(ordered.iter().copied().filter(|m| m.away_team == team), lookback);

    TeamForm {
        home_scored_avg: mean(home.iter().map(|m| m.home_goals)),
        home_conceded_avg: mean(home.iter().map(|m| m.away_goals)),
        away_scored_avg: mean(away.iter().map(|m| m.away_goals)),
        away_conceded_avg: mean(away.iter().map(|m| m.home_goals)),
    }
}

/// Number of (home, away) matches the team has in `matches`.
pub fn history_depth(team: &str, matches: &[FinishedMatch]) -> (usize, usize) {
    let home = matches.iter().filter(|m| m.home_team == team).count();
    let away = matches.iter().filter(|m| m.away_team == team).count();
    (home, away)
}

fn last_n<'a>(iter: impl Iterator<Item = &'a FinishedMatch>, n: usize) -> Vec<&'a FinishedMatch> {
    let all: Vec<&FinishedMatch> = iter.collect();
    let skip = all.len().saturating_sub(n);
    all[skip..].to_vec()
}

fn mean(values: impl Iterator<Item = u8>) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values {
        sum += v as f64;
        n += 1;
    }
    if n == 0 { 0.0 } else { sum / n as f64 }
}
