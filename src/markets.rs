use std::cmp::Ordering;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::odds::{normalize, normalize_outcomes};
use crate::probability::{Outcome, OutcomeProbs, ProbabilityMap};
use crate::scoreline::ScorelineTable;

/// Total-goals range; `max == None` marks the open-ended last bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalBucket {
    pub label: String,
    pub min: u32,
    #[serde(default)]
    pub max: Option<u32>,
}

impl GoalBucket {
    pub fn closed(min: u32, max: u32) -> Self {
        Self {
            label: format!("{min}-{max}"),
            min,
            max: Some(max),
        }
    }

    pub fn open(min: u32) -> Self {
        Self {
            label: format!("{min}+"),
            min,
            max: None,
        }
    }

    pub fn contains(&self, goals: u32) -> bool {
        goals >= self.min && self.max.is_none_or(|max| goals <= max)
    }
}

pub static DEFAULT_GOAL_BUCKETS: Lazy<Vec<GoalBucket>> = Lazy::new(|| {
    vec![
        GoalBucket::closed(0, 1),
        GoalBucket::closed(2, 3),
        GoalBucket::closed(4, 6),
        GoalBucket::open(7),
    ]
});

/// Buckets must start at 0, be contiguous and end with one open bucket.
pub fn validate_buckets(buckets: &[GoalBucket]) -> EngineResult<()> {
    let Some(first) = buckets.first() else {
        return Err(EngineError::InvalidGoalBuckets("no buckets".to_string()));
    };
    if first.min != 0 {
        return Err(EngineError::InvalidGoalBuckets(format!(
            "first bucket {} must start at 0",
            first.label
        )));
    }

    let mut next_min = 0u32;
    for (idx, bucket) in buckets.iter().enumerate() {
        let is_last = idx + 1 == buckets.len();
        if bucket.min != next_min {
            return Err(EngineError::InvalidGoalBuckets(format!(
                "bucket {} starts at {}, expected {next_min}",
                bucket.label, bucket.min
            )));
        }
        match (bucket.max, is_last) {
            (None, true) => {}
            (None, false) => {
                return Err(EngineError::InvalidGoalBuckets(format!(
                    "open bucket {} must be last",
                    bucket.label
                )));
            }
            (Some(_), true) => {
                return Err(EngineError::InvalidGoalBuckets(format!(
                    "last bucket {} must be open-ended",
                    bucket.label
                )));
            }
            (Some(max), false) => {
                if max < bucket.min {
                    return Err(EngineError::InvalidGoalBuckets(format!(
                        "bucket {} has max below min",
                        bucket.label
                    )));
                }
                next_min = max + 1;
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreProbability {
    pub home_goals: u32,
    pub away_goals: u32,
    pub probability: f64,
}

impl ScoreProbability {
    pub fn label(&self) -> String {
        format!("{}-{}", self.home_goals, self.away_goals)
    }
}

pub fn outcome_probabilities(table: &ScorelineTable) -> OutcomeProbs {
    let mut probs = OutcomeProbs::default();
    for (i, j, p) in table.iter() {
        match Outcome::from_goals(i, j) {
            Outcome::Home => probs.home += p,
            Outcome::Draw => probs.draw += p,
            Outcome::Away => probs.away += p,
        }
    }
    // Absorbs the truncation residual.
    normalize_outcomes(probs)
}

/// Most likely exact scores. Ordered by probability, then fewer total
/// goals, then by (home, away) goals ascending.
pub fn top_scores(table: &ScorelineTable, n: usize) -> Vec<ScoreProbability> {
    let mut scores: Vec<ScoreProbability> = table
        .iter()
        .map(|(home_goals, away_goals, probability)| ScoreProbability {
            home_goals,
            away_goals,
            probability,
        })
        .collect();
    scores.sort_by(compare_scores);
    scores.truncate(n);
    scores
}

/// Ranks an outside `"home-away"` keyed score map like [`top_scores`].
pub fn top_scores_from_map(map: &ProbabilityMap, n: usize) -> EngineResult<Vec<ScoreProbability>> {
    let mut scores = Vec::with_capacity(map.len());
    for (key, probability) in map.iter() {
        let (home_goals, away_goals) =
            parse_score(key).ok_or_else(|| EngineError::InvalidScoreLabel(key.to_string()))?;
        scores.push(ScoreProbability {
            home_goals,
            away_goals,
            probability,
        });
    }
    scores.sort_by(compare_scores);
    scores.truncate(n);
    Ok(scores)
}

fn parse_score(label: &str) -> Option<(u32, u32)> {
    let (home, away) = label.split_once('-')?;
    Some((home.trim().parse().ok()?, away.trim().parse().ok()?))
}

fn compare_scores(a: &ScoreProbability, b: &ScoreProbability) -> Ordering {
    b.probability
        .total_cmp(&a.probability)
        .then_with(|| (a.home_goals + a.away_goals).cmp(&(b.home_goals + b.away_goals)))
        .then_with(|| (a.home_goals, a.away_goals).cmp(&(b.home_goals, b.away_goals)))
}

pub fn goal_bucket_probabilities(
    table: &ScorelineTable,
    buckets: &[GoalBucket],
) -> EngineResult<ProbabilityMap> {
    validate_buckets(buckets)?;
    let mut out = ProbabilityMap::from_pairs(buckets.iter().map(|b| (b.label.clone(), 0.0)));
    for (i, j, p) in table.iter() {
        let total = i + j;
        // Validation guarantees exactly one bucket matches.
        if let Some(bucket) = buckets.iter().find(|b| b.contains(total)) {
            out.add(&bucket.label, p);
        }
    }
    Ok(normalize(&out))
}

/// Joins a half-time and a full-time 1X2 distribution into the nine
/// half/full combinations, keyed `"{half}_{full}"` (e.g. `draw_home`).
pub trait HalfFullModel: Send + Sync {
    fn combine(&self, half_time: &OutcomeProbs, full_time: &OutcomeProbs) -> ProbabilityMap;
}

/// Treats the half-time and full-time results as independent.
///
/// They are not independent in real matches (a side leading at the break
/// wins far more often than this predicts); this is a modeling shortcut.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndependentHalfFull;

impl HalfFullModel for IndependentHalfFull {
    fn combine(&self, half_time: &OutcomeProbs, full_time: &OutcomeProbs) -> ProbabilityMap {
        let mut out = ProbabilityMap::new();
        for half in Outcome::ALL {
            for full in Outcome::ALL {
                out.insert(
                    half_full_key(half, full),
                    half_time.get(half) * full_time.get(full),
                );
            }
        }
        out
    }
}

pub fn half_full_key(half: Outcome, full: Outcome) -> String {
    format!("{}_{}", half.key(), full.key())
}

pub fn half_full_time_probabilities(
    half_table: &ScorelineTable,
    full_table: &ScorelineTable,
    model: &dyn HalfFullModel,
) -> ProbabilityMap {
    let half = outcome_probabilities(half_table);
    let full = outcome_probabilities(full_table);
    normalize(&model.combine(&half, &full))
}
