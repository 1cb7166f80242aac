use std::fs;
use std::path::PathBuf;

use matchday_edge::engine::{Fixture, MatchEngine};
use matchday_edge::markets::{
    DEFAULT_GOAL_BUCKETS, goal_bucket_probabilities, outcome_probabilities,
};
use matchday_edge::odds::{fair_probabilities, implied_probabilities, overround};
use matchday_edge::probability::{Outcome, OutcomeProbs};
use matchday_edge::scoreline::scoreline_table;
use matchday_edge::value::find_value_bets;
use matchday_edge::{
    EngineConfig, OddsTriple, ParlayComposer, ParlayConfig, ParlayResult, TeamForm, analyze,
    compose_parlay,
};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn slate() -> Vec<Fixture> {
    serde_json::from_str(&read_fixture("slate.json")).expect("slate fixture should parse")
}

fn form(hs: f64, hc: f64, as_: f64, ac: f64) -> TeamForm {
    TeamForm {
        home_scored_avg: hs,
        home_conceded_avg: hc,
        away_scored_avg: as_,
        away_conceded_avg: ac,
    }
}

#[test]
fn reference_rates_give_poisson_outcome_split() {
    let table = scoreline_table(1.8, 1.2, 10).unwrap();
    assert!(table.total() >= 1.0 - 1e-3);
    let p = outcome_probabilities(&table);
    assert!((p.home - 0.514).abs() < 0.005, "home {}", p.home);
    assert!((p.draw - 0.231).abs() < 0.005, "draw {}", p.draw);
    assert!((p.away - 0.254).abs() < 0.005, "away {}", p.away);
    assert_eq!(p.argmax(), Outcome::Home);
}

#[test]
fn bookmaker_margin_is_removed_proportionally() {
    let odds = OddsTriple::new(2.10, 3.50, 2.80).unwrap();
    let raw = implied_probabilities(&odds).unwrap();
    assert!((raw.home - 0.476).abs() < 1e-3);
    assert!((raw.draw - 0.286).abs() < 1e-3);
    assert!((raw.away - 0.357).abs() < 1e-3);
    assert!((overround(&odds).unwrap() - 0.119).abs() < 1e-3);

    let fair = fair_probabilities(&odds).unwrap();
    assert!((fair.home - 0.426).abs() < 1e-3);
    assert!((fair.draw - 0.255).abs() < 1e-3);
    assert!((fair.away - 0.319).abs() < 1e-3);
    assert!((fair.sum() - 1.0).abs() < 1e-12);
    assert!((fair.home / fair.away - raw.home / raw.away).abs() < 1e-12);
}

#[test]
fn only_positive_edge_clears_threshold() {
    let odds = OddsTriple::new(2.10, 3.50, 2.80).unwrap();
    let probs = OutcomeProbs::new(0.55, 0.25, 0.20);
    let bets = find_value_bets(&probs, &odds, 0.05).unwrap();
    assert_eq!(bets.len(), 1);
    assert_eq!(bets[0].outcome, Outcome::Home);
    assert!((bets[0].expected_value - 0.155).abs() < 1e-9);
    assert!(bets[0].edge > 0.0);
}

#[test]
fn single_match_parlay_is_the_best_leg() {
    let cfg = EngineConfig::default();
    let a = analyze(
        &form(2.4, 0.7, 1.8, 1.0),
        &form(1.2, 1.4, 0.9, 1.7),
        &OddsTriple::new(2.10, 3.50, 4.80).unwrap(),
        &cfg,
    )
    .unwrap();
    assert!(!a.value_bets.is_empty());

    let out = compose_parlay(&[a.all_bets.clone()], 10, &ParlayConfig::default()).unwrap();
    let best = out.best_parlay.expect("one match yields a parlay");
    assert_eq!(best.legs.len(), 1);
    assert_eq!(best.legs[0].candidate.label, a.value_bets[0].outcome.key());
    assert!((best.expected_value - a.value_bets[0].expected_value).abs() < 1e-12);
    assert_eq!(out.ranked_top_k.len(), 3);
    assert_eq!(out.ranked_top_k[0], best);
}

#[test]
fn all_bets_cover_every_outcome_best_first() {
    let a = analyze(
        &form(1.5, 1.1, 1.2, 1.3),
        &form(1.4, 1.2, 1.1, 1.4),
        &OddsTriple::new(2.50, 3.20, 2.90).unwrap(),
        &EngineConfig::default(),
    )
    .unwrap();
    let mut labels: Vec<&str> = a.all_bets.iter().map(|b| b.label.as_str()).collect();
    assert!(
        a.all_bets
            .windows(2)
            .all(|w| w[0].expected_value >= w[1].expected_value)
    );
    labels.sort();
    assert_eq!(labels, vec!["away", "draw", "home"]);
}

#[test]
fn derived_markets_use_stable_keys() {
    let a = analyze(
        &form(1.8, 1.0, 1.3, 1.2),
        &form(1.6, 1.1, 1.2, 1.3),
        &OddsTriple::new(2.20, 3.30, 3.20).unwrap(),
        &EngineConfig::default(),
    )
    .unwrap();

    let buckets: Vec<&str> = a.total_goals.keys().collect();
    assert_eq!(buckets, vec!["0-1", "2-3", "4-6", "7+"]);
    assert!((a.total_goals.total() - 1.0).abs() < 1e-9);

    assert_eq!(a.half_full_time.len(), 9);
    assert!(a.half_full_time.get("home_home").is_some());
    assert!(a.half_full_time.get("away_draw").is_some());
    assert!((a.half_full_time.total() - 1.0).abs() < 1e-9);

    assert_eq!(a.top_scores.len(), 5);
    assert!(
        a.top_scores
            .windows(2)
            .all(|w| w[0].probability >= w[1].probability)
    );
}

#[test]
fn open_bucket_holds_exactly_seven_plus() {
    let table = scoreline_table(1.5, 1.3, 10).unwrap();
    let buckets = goal_bucket_probabilities(&table, &DEFAULT_GOAL_BUCKETS).unwrap();
    assert!((buckets.total() - 1.0).abs() < 1e-6);

    let high: f64 = table
        .iter()
        .filter(|(h, a, _)| h + a >= 7)
        .map(|(_, _, p)| p)
        .sum();
    let expected = high / table.total();
    assert!((buckets.get("7+").unwrap() - expected).abs() < 1e-12);
}

#[test]
fn slate_fixture_parses_both_odds_spellings() {
    let fixtures = slate();
    assert_eq!(fixtures.len(), 4);
    assert_eq!(fixtures[1].odds.home, 2.45);
    assert_eq!(fixtures[1].odds.away, 2.95);
    let inter = fixtures[1].home_form.expect("aliased form fields");
    assert_eq!(inter.home_scored_avg, 1.9);
    assert!(fixtures[2].home_form.is_none());
}

#[test]
fn slate_report_skips_bad_fixtures_and_ranks_parlays() {
    let engine = MatchEngine::new(EngineConfig::default()).unwrap();
    let report = engine.predict_parlay(&slate(), 10).unwrap();

    assert_eq!(report.matches.len(), 3);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].fixture, "Ajax vs PSV");
    assert!(report.skipped[0].error.contains("0.95"));

    let arsenal = &report.matches[0].analysis;
    assert!((arsenal.home_xg - 2.09).abs() < 1e-9);
    assert!((arsenal.away_xg - 1.035).abs() < 1e-9);

    let inter = &report.matches[1].analysis;
    assert!(inter.market_value_bets.iter().all(|b| {
        b.expected_value > 0.05 && (b.market == "total_goals" || b.market == "half_full_time")
    }));

    let porto = &report.matches[2].analysis;
    assert!((porto.outcome_probabilities.home - 0.45).abs() < 1e-12);
    assert!((porto.outcome_probabilities.draw - 0.30).abs() < 1e-12);
    assert_eq!(porto.value_bets.len(), 1);
    assert_eq!(porto.value_bets[0].outcome, Outcome::Home);

    let parlay = &report.parlay;
    assert_eq!(parlay.combinations_evaluated, 27);
    assert_eq!(parlay.ranked_top_k.len(), 10);
    assert_eq!(parlay.best_single_leg_per_match.len(), 3);
    assert!(
        parlay
            .ranked_top_k
            .windows(2)
            .all(|w| w[0].expected_value >= w[1].expected_value)
    );
    let greedy = parlay.best_parlay.as_ref().unwrap();
    assert!(parlay.ranked_top_k[0].expected_value >= greedy.expected_value);
    let likeliest = parlay.most_probable_parlay.as_ref().unwrap();
    assert!(likeliest.total_probability >= greedy.total_probability);
    assert!(
        parlay
            .ranked_top_k
            .iter()
            .all(|c| c.total_probability <= likeliest.total_probability + 1e-12)
    );
    for combo in &parlay.ranked_top_k {
        let idx: Vec<usize> = combo.legs.iter().map(|l| l.match_index).collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }
}

#[test]
fn report_serializes_to_json() {
    let engine = MatchEngine::new(EngineConfig::default()).unwrap();
    let report = engine.predict_parlay(&slate(), 3).unwrap();
    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["matches"].as_array().unwrap().len(), 3);
    assert_eq!(value["parlay"]["ranked_top_k"].as_array().unwrap().len(), 3);
    assert!(value["matches"][0]["analysis"]["total_goals"]["7+"].is_number());
}

#[test]
fn config_file_feeds_the_engine() {
    let raw = r#"{ "max_goals": 8, "value_threshold": 0.2, "parlay": { "top_k": 4 } }"#;
    let cfg: EngineConfig = serde_json::from_str(raw).unwrap();
    assert_eq!(cfg.max_goals, 8);
    assert_eq!(cfg.parlay.top_k, 4);
    assert_eq!(cfg.parlay.max_combinations, 100_000);
    assert_eq!(cfg.half_time_fraction, 0.45);

    let engine = MatchEngine::new(cfg).unwrap();
    let report = engine.predict_parlay(&slate(), engine.config().parlay.top_k).unwrap();
    assert_eq!(report.parlay.ranked_top_k.len(), 4);
    let porto = &report.matches[2].analysis;
    assert!(porto.value_bets.is_empty());
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn engine_types_cross_threads() {
    assert_send_sync::<MatchEngine>();
    assert_send_sync::<ParlayComposer>();
    assert_send_sync::<ParlayResult>();

    let engine = &MatchEngine::new(EngineConfig::default()).unwrap();
    let fixtures = &slate();
    let reports: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| scope.spawn(move || engine.predict_parlay(fixtures, 5).unwrap().matches.len()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(reports, vec![3, 3]);
}
