//! Multi-leg combinations across independent matches.
//!
//! Enumeration is the full cross product of each match's candidate legs, so
//! its size is the product of the set sizes. That product is computed first
//! and checked against `max_combinations`; nothing is materialized for an
//! oversized slate.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::odds::check_price;
use crate::value::MatchOutcomeCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParlayConfig {
    pub max_combinations: usize,
    pub top_k: usize,
    /// Keep only the best N legs of each match before enumerating.
    pub max_legs_per_match: Option<usize>,
}

impl Default for ParlayConfig {
    fn default() -> Self {
        Self {
            max_combinations: 100_000,
            top_k: 10,
            max_legs_per_match: None,
        }
    }
}

/// Probability that every leg of a combination wins.
pub trait LegCombiner: Send + Sync {
    fn joint_probability(&self, legs: &[&MatchOutcomeCandidate]) -> f64;
}

/// Multiplies leg probabilities. Matches on the same day or in the same
/// league can be correlated, which this ignores.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndependentLegs;

impl LegCombiner for IndependentLegs {
    fn joint_probability(&self, legs: &[&MatchOutcomeCandidate]) -> f64 {
        legs.iter().fold(1.0, |acc, leg| acc * leg.model_probability)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParlayLeg {
    pub match_index: usize,
    pub candidate: MatchOutcomeCandidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParlayCombination {
    pub legs: Vec<ParlayLeg>,
    pub total_odds: f64,
    pub total_probability: f64,
    pub expected_value: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParlayResult {
    pub best_single_leg_per_match: Vec<MatchOutcomeCandidate>,
    /// Greedy pick: the best leg of every match chained together.
    pub best_parlay: Option<ParlayCombination>,
    /// The likeliest leg of every match, whatever its price.
    pub most_probable_parlay: Option<ParlayCombination>,
    pub ranked_top_k: Vec<ParlayCombination>,
    pub combinations_evaluated: usize,
}

#[derive(Clone)]
pub struct ParlayComposer {
    config: ParlayConfig,
    combiner: Arc<dyn LegCombiner>,
}

impl ParlayComposer {
    pub fn new(config: ParlayConfig) -> Self {
        Self {
            config,
            combiner: Arc::new(IndependentLegs),
        }
    }

    pub fn with_combiner(mut self, combiner: Arc<dyn LegCombiner>) -> Self {
        self.combiner = combiner;
        self
    }

    pub fn config(&self) -> &ParlayConfig {
        &self.config
    }

    /// Product of set sizes, saturating instead of overflowing.
    pub fn combination_count(sets: &[Vec<MatchOutcomeCandidate>]) -> usize {
        if sets.is_empty() {
            return 0;
        }
        sets.iter().fold(1usize, |acc, set| acc.saturating_mul(set.len()))
    }

    /// Sorts each set best-first and keeps its top `keep` legs.
    pub fn prefilter(
        sets: &[Vec<MatchOutcomeCandidate>],
        keep: usize,
    ) -> Vec<Vec<MatchOutcomeCandidate>> {
        let keep = keep.max(1);
        sets.iter()
            .map(|set| {
                let mut sorted = sorted_by_value(set);
                sorted.truncate(keep);
                sorted
            })
            .collect()
    }

    pub fn compose(
        &self,
        sets: &[Vec<MatchOutcomeCandidate>],
        top_k: usize,
    ) -> EngineResult<ParlayResult> {
        if sets.is_empty() {
            return Ok(ParlayResult::default());
        }
        validate_candidates(sets)?;

        let sets: Vec<Vec<MatchOutcomeCandidate>> = match self.config.max_legs_per_match {
            Some(keep) => Self::prefilter(sets, keep),
            None => sets.iter().map(|s| sorted_by_value(s)).collect(),
        };
        if let Some(match_index) = sets.iter().position(|s| s.is_empty()) {
            return Err(EngineError::EmptyCandidateSet { match_index });
        }

        let requested = Self::combination_count(&sets);
        if requested > self.config.max_combinations {
            return Err(EngineError::CombinationLimitExceeded {
                requested,
                limit: self.config.max_combinations,
            });
        }
        info!(matches = sets.len(), combinations = requested, "enumerating parlays");

        let best_single_leg_per_match: Vec<MatchOutcomeCandidate> =
            sets.iter().map(|s| s[0].clone()).collect();
        let best_parlay = self.build(&sets, &vec![0; sets.len()]);
        let most_probable_parlay = self.build(&sets, &most_probable_choice(&sets));

        let mut ranked: Vec<ParlayCombination> = (0..requested)
            .into_par_iter()
            .map(|idx| self.build(&sets, &mixed_radix(idx, &sets)))
            .collect();
        // Stable: equal values keep enumeration order (last match varies fastest).
        ranked.par_sort_by(|a, b| b.expected_value.total_cmp(&a.expected_value));
        ranked.truncate(top_k);

        if let Some(top) = ranked.first() {
            debug!(
                best_ev = top.expected_value,
                greedy_ev = best_parlay.expected_value,
                "parlay ranking done"
            );
        }

        Ok(ParlayResult {
            best_single_leg_per_match,
            best_parlay: Some(best_parlay),
            most_probable_parlay: Some(most_probable_parlay),
            ranked_top_k: ranked,
            combinations_evaluated: requested,
        })
    }

    fn build(&self, sets: &[Vec<MatchOutcomeCandidate>], choice: &[usize]) -> ParlayCombination {
        let chosen: Vec<&MatchOutcomeCandidate> = sets
            .iter()
            .zip(choice)
            .map(|(set, &pick)| &set[pick])
            .collect();
        let total_odds = chosen.iter().fold(1.0, |acc, leg| acc * leg.odds);
        let total_probability = self.combiner.joint_probability(&chosen);
        ParlayCombination {
            legs: chosen
                .iter()
                .enumerate()
                .map(|(match_index, leg)| ParlayLeg {
                    match_index,
                    candidate: (*leg).clone(),
                })
                .collect(),
            total_odds,
            total_probability,
            expected_value: total_odds * total_probability - 1.0,
        }
    }
}

impl Default for ParlayComposer {
    fn default() -> Self {
        Self::new(ParlayConfig::default())
    }
}

/// Every leg needs a real price and a probability in [0, 1]; a NaN would
/// otherwise sort above every real expected value.
fn validate_candidates(sets: &[Vec<MatchOutcomeCandidate>]) -> EngineResult<()> {
    for (match_index, set) in sets.iter().enumerate() {
        for leg in set {
            check_price(leg.odds)?;
            if !(0.0..=1.0).contains(&leg.model_probability) {
                return Err(EngineError::InvalidProbability {
                    market: format!("match {match_index}"),
                    key: leg.label.clone(),
                    value: leg.model_probability,
                });
            }
        }
    }
    Ok(())
}

// Ties keep the earlier (higher value) leg.
fn most_probable_choice(sets: &[Vec<MatchOutcomeCandidate>]) -> Vec<usize> {
    sets.iter()
        .map(|set| {
            let mut best = 0;
            for (idx, leg) in set.iter().enumerate().skip(1) {
                if leg.model_probability > set[best].model_probability {
                    best = idx;
                }
            }
            best
        })
        .collect()
}

fn sorted_by_value(set: &[MatchOutcomeCandidate]) -> Vec<MatchOutcomeCandidate> {
    let mut sorted = set.to_vec();
    sorted.sort_by(|a, b| b.expected_value.total_cmp(&a.expected_value));
    sorted
}

// Combination index -> one pick per match, last match as the lowest digit.
fn mixed_radix(mut idx: usize, sets: &[Vec<MatchOutcomeCandidate>]) -> Vec<usize> {
    let mut digits = vec![0usize; sets.len()];
    for (pos, set) in sets.iter().enumerate().rev() {
        let radix = set.len();
        digits[pos] = idx % radix;
        idx /= radix;
    }
    digits
}
