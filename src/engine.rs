use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::markets::{
    HalfFullModel, IndependentHalfFull, ScoreProbability, goal_bucket_probabilities,
    half_full_time_probabilities, outcome_probabilities, top_scores, top_scores_from_map,
};
use crate::odds::{
    OddsTriple, fair_probabilities, normalize, normalize_outcomes, normalize_strict, overround,
};
use crate::parlay::{LegCombiner, ParlayComposer, ParlayConfig, ParlayResult};
use crate::probability::{OutcomeProbs, ProbabilityMap};
use crate::scoreline::{
    TeamForm, baseline_expected_goals, half_time_table, match_expected_goals,
    scoreline_table_with_rho,
};
use crate::value::{
    MarketValueBet, MatchOutcomeCandidate, ValueBet, all_bets, find_market_value_bets,
    find_value_bets,
};

const RESIDUAL_WARN: f64 = 1e-4;

/// Probabilities supplied from outside the Poisson model (for example a
/// language-model advisor). Any map present replaces the derived one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketEstimate {
    #[serde(default)]
    pub win_draw_loss: Option<ProbabilityMap>,
    #[serde(default)]
    pub half_full_time: Option<ProbabilityMap>,
    #[serde(default)]
    pub total_goals: Option<ProbabilityMap>,
    /// Keyed `"home-away"`, e.g. `"2-1"`.
    #[serde(default)]
    pub exact_scores: Option<ProbabilityMap>,
}

/// Per-market prices beyond 1X2, keyed like the derived maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketOdds {
    #[serde(default)]
    pub total_goals: BTreeMap<String, f64>,
    #[serde(default)]
    pub half_full_time: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub home_team: String,
    pub away_team: String,
    pub odds: OddsTriple,
    #[serde(default)]
    pub home_form: Option<TeamForm>,
    #[serde(default)]
    pub away_form: Option<TeamForm>,
    #[serde(default)]
    pub estimate: Option<MarketEstimate>,
    #[serde(default)]
    pub market_odds: Option<MarketOdds>,
}

impl Fixture {
    pub fn label(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAnalysis {
    pub home_xg: f64,
    pub away_xg: f64,
    pub truncation_residual: f64,
    pub outcome_probabilities: OutcomeProbs,
    pub market_implied: OutcomeProbs,
    pub overround: f64,
    pub half_full_time: ProbabilityMap,
    pub total_goals: ProbabilityMap,
    pub top_scores: Vec<ScoreProbability>,
    pub value_bets: Vec<ValueBet>,
    pub market_value_bets: Vec<MarketValueBet>,
    /// All three 1X2 legs, best expected value first.
    pub all_bets: Vec<MatchOutcomeCandidate>,
}

impl MatchAnalysis {
    pub fn best_bet(&self) -> Option<&MatchOutcomeCandidate> {
        self.all_bets.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureAnalysis {
    pub fixture: String,
    pub home_team: String,
    pub away_team: String,
    pub analysis: MatchAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFixture {
    pub fixture: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlateReport {
    pub matches: Vec<FixtureAnalysis>,
    pub skipped: Vec<SkippedFixture>,
    /// Leg `match_index` values point into `matches`.
    pub parlay: ParlayResult,
}

#[derive(Clone)]
pub struct MatchEngine {
    config: EngineConfig,
    half_full: Arc<dyn HalfFullModel>,
    composer: ParlayComposer,
}

impl MatchEngine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let composer = ParlayComposer::new(config.parlay);
        Ok(Self {
            config,
            half_full: Arc::new(IndependentHalfFull),
            composer,
        })
    }

    pub fn with_half_full_model(mut self, model: Arc<dyn HalfFullModel>) -> Self {
        self.half_full = model;
        self
    }

    pub fn with_leg_combiner(mut self, combiner: Arc<dyn LegCombiner>) -> Self {
        self.composer = self.composer.with_combiner(combiner);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn analyze(
        &self,
        home: &TeamForm,
        away: &TeamForm,
        odds: &OddsTriple,
    ) -> EngineResult<MatchAnalysis> {
        let xg = match_expected_goals(home, away, &self.config.xg)?;
        self.run(xg, odds, None, None, None)
    }

    pub fn analyze_with_estimate(
        &self,
        home: &TeamForm,
        away: &TeamForm,
        odds: &OddsTriple,
        estimate: &MarketEstimate,
    ) -> EngineResult<MatchAnalysis> {
        let xg = match_expected_goals(home, away, &self.config.xg)?;
        self.run(xg, odds, Some(estimate), None, None)
    }

    /// Uses team statistics when both sides have them. Otherwise the table
    /// comes from the league baseline and 1X2 falls back to the estimate or,
    /// failing that, to the margin-free market prices.
    pub fn analyze_fixture(&self, fixture: &Fixture) -> EngineResult<MatchAnalysis> {
        let estimate = fixture.estimate.as_ref();
        let market_odds = fixture.market_odds.as_ref();
        match (&fixture.home_form, &fixture.away_form) {
            (Some(home), Some(away)) => {
                let xg = match_expected_goals(home, away, &self.config.xg)?;
                self.run(xg, &fixture.odds, estimate, market_odds, None)
            }
            _ => {
                debug!(fixture = %fixture.label(), "no team statistics, using league baseline");
                let xg = baseline_expected_goals(self.config.baseline_total_goals, &self.config.xg);
                let has_estimate = estimate.is_some_and(|e| e.win_draw_loss.is_some());
                let fallback = if has_estimate {
                    None
                } else {
                    Some(fair_probabilities(&fixture.odds)?)
                };
                self.run(xg, &fixture.odds, estimate, market_odds, fallback)
            }
        }
    }

    pub fn analyze_slate(&self, fixtures: &[Fixture]) -> Vec<EngineResult<MatchAnalysis>> {
        fixtures.par_iter().map(|f| self.analyze_fixture(f)).collect()
    }

    pub fn compose_parlay(
        &self,
        candidate_sets: &[Vec<MatchOutcomeCandidate>],
        top_k: usize,
    ) -> EngineResult<ParlayResult> {
        self.composer.compose(candidate_sets, top_k)
    }

    /// Analyses every fixture, then composes parlays over the ones that
    /// could be analysed. Failed fixtures are listed, not fatal.
    pub fn predict_parlay(&self, fixtures: &[Fixture], top_k: usize) -> EngineResult<SlateReport> {
        let mut matches = Vec::new();
        let mut skipped = Vec::new();
        for (fixture, result) in fixtures.iter().zip(self.analyze_slate(fixtures)) {
            match result {
                Ok(analysis) => matches.push(FixtureAnalysis {
                    fixture: fixture.label(),
                    home_team: fixture.home_team.clone(),
                    away_team: fixture.away_team.clone(),
                    analysis,
                }),
                Err(err) => {
                    warn!(fixture = %fixture.label(), error = %err, "fixture skipped");
                    skipped.push(SkippedFixture {
                        fixture: fixture.label(),
                        error: err.to_string(),
                    });
                }
            }
        }

        let sets: Vec<Vec<MatchOutcomeCandidate>> =
            matches.iter().map(|m| m.analysis.all_bets.clone()).collect();
        let parlay = self.compose_parlay(&sets, top_k)?;

        Ok(SlateReport {
            matches,
            skipped,
            parlay,
        })
    }

    fn run(
        &self,
        (home_xg, away_xg): (f64, f64),
        odds: &OddsTriple,
        estimate: Option<&MarketEstimate>,
        market_odds: Option<&MarketOdds>,
        fallback_1x2: Option<OutcomeProbs>,
    ) -> EngineResult<MatchAnalysis> {
        let cfg = &self.config;
        odds.validate()?;

        let full = scoreline_table_with_rho(home_xg, away_xg, cfg.max_goals, cfg.low_score_rho)?;
        let half = half_time_table(
            home_xg,
            away_xg,
            cfg.half_time_fraction,
            cfg.max_goals,
            cfg.low_score_rho,
        )?;
        let truncation_residual = full.truncation_residual();
        if truncation_residual > RESIDUAL_WARN {
            warn!(
                home_xg,
                away_xg,
                max_goals = cfg.max_goals,
                residual = truncation_residual,
                "scoreline truncation residual is large"
            );
        }

        let outcome_probs = match estimate.and_then(|e| e.win_draw_loss.as_ref()) {
            Some(map) => {
                let map = self.normalize_estimate("win_draw_loss", map)?;
                normalize_outcomes(OutcomeProbs::from_map(&map))
            }
            None => fallback_1x2.unwrap_or_else(|| outcome_probabilities(&full)),
        };

        let half_full_time = match estimate.and_then(|e| e.half_full_time.as_ref()) {
            Some(map) => self.normalize_estimate("half_full_time", map)?,
            None => half_full_time_probabilities(&half, &full, self.half_full.as_ref()),
        };

        let total_goals = match estimate.and_then(|e| e.total_goals.as_ref()) {
            Some(map) => self.normalize_estimate("total_goals", map)?,
            None => goal_bucket_probabilities(&full, &cfg.goal_buckets)?,
        };

        let likely_scores = match estimate.and_then(|e| e.exact_scores.as_ref()) {
            Some(map) => {
                top_scores_from_map(&self.normalize_estimate("exact_scores", map)?, cfg.top_scores)?
            }
            None => top_scores(&full, cfg.top_scores),
        };

        let value_bets = find_value_bets(&outcome_probs, odds, cfg.value_threshold)?;
        let candidates = all_bets(&outcome_probs, odds)?;

        let mut market_value_bets = Vec::new();
        if let Some(prices) = market_odds {
            market_value_bets.extend(find_market_value_bets(
                "total_goals",
                &total_goals,
                &prices.total_goals,
                cfg.value_threshold,
            )?);
            market_value_bets.extend(find_market_value_bets(
                "half_full_time",
                &half_full_time,
                &prices.half_full_time,
                cfg.value_threshold,
            )?);
            market_value_bets.sort_by(|a, b| b.expected_value.total_cmp(&a.expected_value));
        }

        debug!(
            home_xg,
            away_xg,
            residual = truncation_residual,
            value_bets = value_bets.len(),
            "match analysed"
        );

        Ok(MatchAnalysis {
            home_xg,
            away_xg,
            truncation_residual,
            outcome_probabilities: outcome_probs,
            market_implied: fair_probabilities(odds)?,
            overround: overround(odds)?,
            half_full_time,
            total_goals,
            top_scores: likely_scores,
            value_bets,
            market_value_bets,
            all_bets: candidates,
        })
    }

    fn normalize_estimate(
        &self,
        market: &str,
        map: &ProbabilityMap,
    ) -> EngineResult<ProbabilityMap> {
        // Estimates are relative weights; any scale works, negatives do not.
        if let Some((key, value)) = map.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(EngineError::InvalidProbability {
                market: market.to_string(),
                key: key.to_string(),
                value,
            });
        }
        if self.config.strict_normalization {
            return normalize_strict(map, market);
        }
        if !map.is_empty() && map.total() == 0.0 {
            warn!(market, "estimate sums to zero, passing through unnormalized");
        }
        Ok(normalize(map))
    }
}

/// One-shot analysis with an explicit config.
pub fn analyze(
    home: &TeamForm,
    away: &TeamForm,
    odds: &OddsTriple,
    config: &EngineConfig,
) -> EngineResult<MatchAnalysis> {
    MatchEngine::new(config.clone())?.analyze(home, away, odds)
}

pub fn compose_parlay(
    candidate_sets: &[Vec<MatchOutcomeCandidate>],
    top_k: usize,
    config: &ParlayConfig,
) -> EngineResult<ParlayResult> {
    ParlayComposer::new(*config).compose(candidate_sets, top_k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probability::Outcome;

    fn form(hs: f64, hc: f64, as_: f64, ac: f64) -> TeamForm {
        TeamForm {
            home_scored_avg: hs,
            home_conceded_avg: hc,
            away_scored_avg: as_,
            away_conceded_avg: ac,
        }
    }

    fn even() -> TeamForm {
        form(1.0, 1.0, 1.0, 1.0)
    }

    fn wdl(home: f64, draw: f64, away: f64) -> ProbabilityMap {
        ProbabilityMap::from_pairs([("home", home), ("draw", draw), ("away", away)])
    }

    fn odds() -> OddsTriple {
        OddsTriple::new(2.10, 3.50, 2.80).unwrap()
    }

    #[test]
    fn analysis_maps_are_closed_distributions() {
        let engine = MatchEngine::new(EngineConfig::default()).unwrap();
        let a = engine
            .analyze(&form(2.0, 0.9, 1.4, 1.3), &form(1.5, 1.2, 1.1, 1.6), &odds())
            .unwrap();
        assert!((a.outcome_probabilities.sum() - 1.0).abs() < 1e-9);
        assert!((a.half_full_time.total() - 1.0).abs() < 1e-9);
        assert!((a.total_goals.total() - 1.0).abs() < 1e-9);
        assert_eq!(a.top_scores.len(), 5);
        assert_eq!(a.all_bets.len(), 3);
        assert!(a.value_bets.iter().all(|b| b.expected_value > 0.05));
        assert!((a.overround - 0.119).abs() < 1e-3);
    }

    #[test]
    fn estimate_replaces_derived_maps() {
        let engine = MatchEngine::new(EngineConfig::default()).unwrap();
        let estimate = MarketEstimate {
            win_draw_loss: Some(ProbabilityMap::from_pairs([
                ("home", 60.0),
                ("draw", 20.0),
                ("away", 20.0),
            ])),
            total_goals: Some(ProbabilityMap::from_pairs([("0-1", 1.0), ("2-3", 3.0)])),
            half_full_time: None,
            exact_scores: Some(ProbabilityMap::from_pairs([("1-0", 3.0), ("2-1", 1.0)])),
        };
        let a = engine.analyze_with_estimate(&even(), &even(), &odds(), &estimate).unwrap();
        assert!((a.outcome_probabilities.home - 0.6).abs() < 1e-12);
        assert_eq!(a.total_goals.get("2-3"), Some(0.75));
        assert_eq!(a.half_full_time.len(), 9);
        assert_eq!(a.top_scores.len(), 2);
        assert_eq!(a.top_scores[0].label(), "1-0");
        assert!((a.top_scores[0].probability - 0.75).abs() < 1e-12);
        // 0.6 * 2.10 - 1
        assert_eq!(a.value_bets[0].outcome, Outcome::Home);
        assert!((a.value_bets[0].expected_value - 0.26).abs() < 1e-9);
    }

    #[test]
    fn strict_mode_rejects_zero_estimate() {
        let cfg = EngineConfig {
            strict_normalization: true,
            ..EngineConfig::default()
        };
        let engine = MatchEngine::new(cfg).unwrap();
        let estimate = MarketEstimate {
            win_draw_loss: Some(wdl(0.0, 0.0, 0.0)),
            ..MarketEstimate::default()
        };
        let err = engine.analyze_with_estimate(&even(), &even(), &odds(), &estimate).unwrap_err();
        assert!(matches!(err, EngineError::DegenerateProbability { .. }));
    }

    #[test]
    fn negative_or_nan_estimate_is_rejected() {
        let engine = MatchEngine::new(EngineConfig::default()).unwrap();
        let estimate = MarketEstimate {
            win_draw_loss: Some(wdl(2.0, -1.0, 0.0)),
            ..MarketEstimate::default()
        };
        let err = engine.analyze_with_estimate(&even(), &even(), &odds(), &estimate).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidProbability {
                market: "win_draw_loss".to_string(),
                key: "draw".to_string(),
                value: -1.0,
            }
        );

        let estimate = MarketEstimate {
            total_goals: Some(ProbabilityMap::from_pairs([("0-1", f64::NAN), ("2-3", 1.0)])),
            ..MarketEstimate::default()
        };
        assert!(matches!(
            engine.analyze_with_estimate(&even(), &even(), &odds(), &estimate),
            Err(EngineError::InvalidProbability { .. })
        ));
    }

    #[test]
    fn lenient_mode_passes_zero_estimate_through() {
        let engine = MatchEngine::new(EngineConfig::default()).unwrap();
        let estimate = MarketEstimate {
            win_draw_loss: Some(wdl(0.0, 0.0, 0.0)),
            ..MarketEstimate::default()
        };
        let a = engine.analyze_with_estimate(&even(), &even(), &odds(), &estimate).unwrap();
        assert_eq!(a.outcome_probabilities, OutcomeProbs::default());
        assert!(a.value_bets.is_empty());
    }

    #[test]
    fn missing_stats_fall_back_to_market_prices() {
        let engine = MatchEngine::new(EngineConfig::default()).unwrap();
        let fixture = Fixture {
            home_team: "Man City".to_string(),
            away_team: "Liverpool".to_string(),
            odds: odds(),
            home_form: None,
            away_form: Some(form(1.0, 1.0, 1.0, 1.0)),
            estimate: None,
            market_odds: None,
        };
        let a = engine.analyze_fixture(&fixture).unwrap();
        assert_eq!(a.outcome_probabilities, a.market_implied);
        // Fair prices never clear a positive threshold.
        assert!(a.value_bets.is_empty());
        assert!((a.home_xg - 1.3 * 1.1).abs() < 1e-12);
    }

    #[test]
    fn invalid_odds_and_stats_are_reported() {
        let engine = MatchEngine::new(EngineConfig::default()).unwrap();
        let bad_odds = OddsTriple {
            home: 0.9,
            draw: 3.0,
            away: 3.0,
        };
        assert!(matches!(
            engine.analyze(&form(1.0, 1.0, 1.0, 1.0), &form(1.0, 1.0, 1.0, 1.0), &bad_odds),
            Err(EngineError::InvalidOdds { .. })
        ));
        assert!(matches!(
            engine.analyze(&form(f64::NAN, 1.0, 1.0, 1.0), &form(1.0, 1.0, 1.0, 1.0), &odds()),
            Err(EngineError::InvalidTeamStatistics { .. })
        ));
    }

    #[test]
    fn market_odds_produce_keyed_value_bets() {
        let engine = MatchEngine::new(EngineConfig::default()).unwrap();
        let mut prices = MarketOdds::default();
        prices.total_goals.insert("2-3".to_string(), 5.0);
        prices.half_full_time.insert("home_home".to_string(), 1.01);
        let fixture = Fixture {
            home_team: "A".to_string(),
            away_team: "B".to_string(),
            odds: odds(),
            home_form: Some(form(1.6, 1.0, 1.2, 1.3)),
            away_form: Some(form(1.4, 1.1, 1.0, 1.5)),
            estimate: None,
            market_odds: Some(prices),
        };
        let a = engine.analyze_fixture(&fixture).unwrap();
        assert_eq!(a.market_value_bets.len(), 1);
        assert_eq!(a.market_value_bets[0].market, "total_goals");
        assert_eq!(a.market_value_bets[0].selection, "2-3");
    }
}
