use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use matchday_edge::calibration::{Metrics, evaluate_probs};
use matchday_edge::form::{FinishedMatch, history_depth, team_form_from_history};
use matchday_edge::odds::fair_probabilities;
use matchday_edge::probability::{Outcome, OutcomeProbs};
use matchday_edge::{EngineConfig, MatchEngine, OddsTriple};

/// Replays a match history: each match is predicted from form built only
/// on earlier matches, then scored against the result.
#[derive(Parser)]
#[command(name = "backtest")]
struct Args {
    #[arg(default_value = "tests/fixtures/history.json")]
    history: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 10)]
    lookback: usize,
    /// Minimum earlier home and away appearances for both sides.
    #[arg(long, default_value_t = 2)]
    min_history: usize,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref())?;
    let engine = MatchEngine::new(config)?;

    let raw = fs::read_to_string(&args.history)
        .with_context(|| format!("read history {}", args.history.display()))?;
    let mut history: Vec<FinishedMatch> = serde_json::from_str(&raw)
        .with_context(|| format!("parse history {}", args.history.display()))?;
    history.sort_by_key(|m| m.date);

    let mut model_preds: Vec<OutcomeProbs> = Vec::new();
    let mut model_outcomes: Vec<Outcome> = Vec::new();
    let mut market_preds: Vec<OutcomeProbs> = Vec::new();
    let mut market_outcomes: Vec<Outcome> = Vec::new();
    let mut skipped = 0usize;

    for m in &history {
        let cut = history.partition_point(|x| x.date < m.date);
        let prior = &history[..cut];

        let (home_h, _) = history_depth(&m.home_team, prior);
        let (_, away_a) = history_depth(&m.away_team, prior);
        if home_h < args.min_history || away_a < args.min_history {
            skipped += 1;
            continue;
        }

        let home = team_form_from_history(&m.home_team, prior, args.lookback);
        let away = team_form_from_history(&m.away_team, prior, args.lookback);
        // Prices only feed value bets here; flat 3.0s stand in when the row has none.
        let odds = match m.odds {
            Some(odds) => odds,
            None => OddsTriple::new(3.0, 3.0, 3.0)?,
        };
        match engine.analyze(&home, &away, &odds) {
            Ok(analysis) => {
                model_preds.push(analysis.outcome_probabilities);
                model_outcomes.push(m.outcome());
            }
            Err(err) => {
                warn!(home = %m.home_team, away = %m.away_team, error = %err, "prediction failed");
                skipped += 1;
                continue;
            }
        }
        if let Some(odds) = &m.odds {
            market_preds.push(fair_probabilities(odds)?);
            market_outcomes.push(m.outcome());
        }
    }

    info!(matches = history.len(), skipped, "backtest finished");
    print_metrics("Model", evaluate_probs(&model_preds, &model_outcomes));
    if !market_preds.is_empty() {
        print_metrics("Market", evaluate_probs(&market_preds, &market_outcomes));
    }
    Ok(())
}

fn print_metrics(name: &str, m: Metrics) {
    println!(
        "{name:<7} n={:<5} brier={:.4} log_loss={:.4} accuracy={:.1}%",
        m.samples,
        m.brier,
        m.log_loss,
        m.accuracy * 100.0
    );
}
