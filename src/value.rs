use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::odds::{OddsTriple, check_price};
use crate::probability::{Outcome, OutcomeProbs, ProbabilityMap};

/// One selectable leg for a match: the parlay composer's unit of choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcomeCandidate {
    pub label: String,
    pub expected_value: f64,
    pub odds: f64,
    pub model_probability: f64,
}

impl MatchOutcomeCandidate {
    pub fn new(label: impl Into<String>, model_probability: f64, odds: f64) -> Self {
        Self {
            label: label.into(),
            expected_value: expected_value(model_probability, odds),
            odds,
            model_probability,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueBet {
    pub outcome: Outcome,
    pub odds: f64,
    pub model_probability: f64,
    pub implied_probability: f64,
    pub expected_value: f64,
    /// Model probability minus the raw implied probability.
    pub edge: f64,
}

impl ValueBet {
    pub fn as_candidate(&self) -> MatchOutcomeCandidate {
        MatchOutcomeCandidate::new(self.outcome.key(), self.model_probability, self.odds)
    }
}

/// Value opportunity in any keyed market (goal totals, half/full time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketValueBet {
    pub market: String,
    pub selection: String,
    pub odds: f64,
    pub model_probability: f64,
    pub expected_value: f64,
}

pub fn expected_value(probability: f64, odds: f64) -> f64 {
    probability * odds - 1.0
}

/// The three 1X2 legs, best expected value first. Equal values keep
/// home/draw/away order.
pub fn all_bets(
    probs: &OutcomeProbs,
    odds: &OddsTriple,
) -> EngineResult<Vec<MatchOutcomeCandidate>> {
    odds.validate()?;
    let mut bets: Vec<MatchOutcomeCandidate> = Outcome::ALL
        .iter()
        .map(|o| MatchOutcomeCandidate::new(o.key(), probs.get(*o), odds.price(*o)))
        .collect();
    bets.sort_by(|a, b| b.expected_value.total_cmp(&a.expected_value));
    Ok(bets)
}

/// Outcomes whose expected value clears `threshold`, best first. An empty
/// result is the normal "no value here" answer.
pub fn find_value_bets(
    model_probs: &OutcomeProbs,
    odds: &OddsTriple,
    threshold: f64,
) -> EngineResult<Vec<ValueBet>> {
    odds.validate()?;
    let mut out = Vec::new();
    for outcome in Outcome::ALL {
        let price = odds.price(outcome);
        let p = model_probs.get(outcome);
        let ev = expected_value(p, price);
        if ev > threshold {
            let implied = 1.0 / price;
            out.push(ValueBet {
                outcome,
                odds: price,
                model_probability: p,
                implied_probability: implied,
                expected_value: ev,
                edge: p - implied,
            });
        }
    }
    out.sort_by(|a, b| b.expected_value.total_cmp(&a.expected_value));
    Ok(out)
}

/// Same rule for an arbitrary keyed market. Selections without a price are
/// skipped; ties keep the probability map's key order.
pub fn find_market_value_bets(
    market: &str,
    probs: &ProbabilityMap,
    odds_by_key: &BTreeMap<String, f64>,
    threshold: f64,
) -> EngineResult<Vec<MarketValueBet>> {
    let mut out = Vec::new();
    for (selection, p) in probs.iter() {
        let Some(&price) = odds_by_key.get(selection) else {
            continue;
        };
        check_price(price)?;
        let ev = expected_value(p, price);
        if ev > threshold {
            out.push(MarketValueBet {
                market: market.to_string(),
                selection: selection.to_string(),
                odds: price,
                model_probability: p,
                expected_value: ev,
            });
        }
    }
    out.sort_by(|a, b| b.expected_value.total_cmp(&a.expected_value));
    Ok(out)
}
