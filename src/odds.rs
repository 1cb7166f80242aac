use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::probability::{Outcome, OutcomeProbs, ProbabilityMap};

/// One bookmaker's 1X2 prices in decimal odds.
///
/// Feeds deliver prices either as numbers or as strings (`"2.10"`), and the
/// China lottery feed uses the `h`/`d`/`a` keys, so both spellings parse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsTriple {
    #[serde(alias = "h", deserialize_with = "decimal_price")]
    pub home: f64,
    #[serde(alias = "d", deserialize_with = "decimal_price")]
    pub draw: f64,
    #[serde(alias = "a", deserialize_with = "decimal_price")]
    pub away: f64,
}

impl OddsTriple {
    pub fn new(home: f64, draw: f64, away: f64) -> EngineResult<Self> {
        let odds = Self { home, draw, away };
        odds.validate()?;
        Ok(odds)
    }

    pub fn validate(&self) -> EngineResult<()> {
        for outcome in Outcome::ALL {
            check_price(self.price(outcome))?;
        }
        Ok(())
    }

    pub fn price(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }
}

pub fn implied_probability(odds: f64) -> EngineResult<f64> {
    check_price(odds)?;
    Ok(1.0 / odds)
}

/// Raw implied probabilities; they sum to 1 + overround.
pub fn implied_probabilities(odds: &OddsTriple) -> EngineResult<OutcomeProbs> {
    Ok(OutcomeProbs::new(
        implied_probability(odds.home)?,
        implied_probability(odds.draw)?,
        implied_probability(odds.away)?,
    ))
}

pub fn overround(odds: &OddsTriple) -> EngineResult<f64> {
    Ok(implied_probabilities(odds)?.sum() - 1.0)
}

/// Implied probabilities with the bookmaker margin removed proportionally.
pub fn fair_probabilities(odds: &OddsTriple) -> EngineResult<OutcomeProbs> {
    let raw = implied_probabilities(odds)?;
    Ok(normalize_outcomes(raw))
}

/// Divides every value by the total. Empty and zero-sum maps come back
/// unchanged; that degenerate case is not an error here.
pub fn normalize(map: &ProbabilityMap) -> ProbabilityMap {
    let total = map.total();
    if map.is_empty() || total == 0.0 {
        return map.clone();
    }
    map.map_values(|v| v / total)
}

/// Like [`normalize`] but rejects a zero-sum map.
pub fn normalize_strict(map: &ProbabilityMap, market: &str) -> EngineResult<ProbabilityMap> {
    if !map.is_empty() && map.total() == 0.0 {
        return Err(EngineError::DegenerateProbability {
            market: market.to_string(),
        });
    }
    Ok(normalize(map))
}

pub fn normalize_outcomes(probs: OutcomeProbs) -> OutcomeProbs {
    let total = probs.sum();
    if total == 0.0 {
        return probs;
    }
    OutcomeProbs::new(probs.home / total, probs.draw / total, probs.away / total)
}

pub(crate) fn check_price(odds: f64) -> EngineResult<()> {
    if !odds.is_finite() || odds <= 1.0 {
        return Err(EngineError::InvalidOdds { odds });
    }
    Ok(())
}

fn decimal_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(v) => Ok(v),
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid decimal odds {s:?}"))),
    }
}
