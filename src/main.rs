use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use matchday_edge::engine::{Fixture, MatchEngine, SlateReport};
use matchday_edge::odds::{OddsTriple, fair_probabilities, implied_probabilities, overround};
use matchday_edge::parlay::ParlayCombination;
use matchday_edge::report::{export_slate_report, selections_text};
use matchday_edge::EngineConfig;

#[derive(Parser)]
#[command(name = "matchday", about = "Scoreline model, value bets and parlay ranking")]
struct Cli {
    /// JSON engine config; MATCHDAY_* env vars override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse a slate of fixtures and rank parlays across them.
    Analyze {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the full report as JSON instead of text.
        #[arg(long)]
        json: bool,
        /// Also write an .xlsx workbook.
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Show implied probabilities and bookmaker margin for a 1X2 price.
    Odds {
        #[arg(long)]
        home: f64,
        #[arg(long)]
        draw: f64,
        #[arg(long)]
        away: f64,
    },
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    #[serde(flatten)]
    report: &'a SlateReport,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze {
            input,
            top_k,
            json,
            export,
        } => {
            let raw = fs::read_to_string(&input)
                .with_context(|| format!("read slate {}", input.display()))?;
            let fixtures: Vec<Fixture> = serde_json::from_str(&raw)
                .with_context(|| format!("parse slate {}", input.display()))?;

            let top_k = top_k.unwrap_or(config.parlay.top_k);
            let engine = MatchEngine::new(config)?;
            let report = engine.predict_parlay(&fixtures, top_k)?;

            if json {
                let out = JsonReport {
                    generated_at: chrono::Utc::now().to_rfc3339(),
                    report: &report,
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_report(&report);
            }

            if let Some(path) = export {
                let summary = export_slate_report(&path, &report)?;
                tracing::info!(
                    path = %path.display(),
                    matches = summary.matches,
                    scores = summary.scores,
                    value_bets = summary.value_bets,
                    parlays = summary.parlays,
                    "workbook written"
                );
            }
        }
        Command::Odds { home, draw, away } => {
            let odds = OddsTriple::new(home, draw, away)?;
            let raw = implied_probabilities(&odds)?;
            let fair = fair_probabilities(&odds)?;
            println!("Implied:    H {:.3}  D {:.3}  A {:.3}", raw.home, raw.draw, raw.away);
            println!("Overround:  {:.3}", overround(&odds)?);
            println!("Normalized: H {:.3}  D {:.3}  A {:.3}", fair.home, fair.draw, fair.away);
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_report(report: &SlateReport) {
    println!("Single-match predictions");
    println!("{}", "=".repeat(50));
    for (idx, entry) in report.matches.iter().enumerate() {
        let a = &entry.analysis;
        let p = &a.outcome_probabilities;
        println!();
        println!("Match #{}: {}", idx + 1, entry.fixture);
        println!("xG: {:.2} - {:.2}", a.home_xg, a.away_xg);
        println!(
            "Home {:.1}%  Draw {:.1}%  Away {:.1}%  (market {:.1}% / {:.1}% / {:.1}%)",
            p.home * 100.0,
            p.draw * 100.0,
            p.away * 100.0,
            a.market_implied.home * 100.0,
            a.market_implied.draw * 100.0,
            a.market_implied.away * 100.0,
        );
        let scores: Vec<String> = a
            .top_scores
            .iter()
            .map(|s| format!("{} ({:.1}%)", s.label(), s.probability * 100.0))
            .collect();
        println!("Likely scores: {}", scores.join(", "));
        let goals: Vec<String> = a
            .total_goals
            .iter()
            .map(|(k, v)| format!("{k}: {:.1}%", v * 100.0))
            .collect();
        println!("Total goals: {}", goals.join(", "));
        if let Some((key, prob)) = a.half_full_time.ranked().first() {
            println!("Likeliest half/full: {key} ({:.1}%)", prob * 100.0);
        }
        println!("All bets (by expected value):");
        for bet in &a.all_bets {
            println!(
                "  {:<5} EV={:+.4}  odds={:.2}  prob={:.2}",
                bet.label, bet.expected_value, bet.odds, bet.model_probability
            );
        }
        if a.value_bets.is_empty() {
            println!("No value bet above threshold");
        }
        for bet in &a.value_bets {
            println!(
                "Value: {} @ {:.2} (EV {:+.4}, edge {:+.3})",
                bet.outcome, bet.odds, bet.expected_value, bet.edge
            );
        }
        for bet in &a.market_value_bets {
            println!(
                "Value: {} {} @ {:.2} (EV {:+.4})",
                bet.market, bet.selection, bet.odds, bet.expected_value
            );
        }
    }

    for skipped in &report.skipped {
        println!();
        println!("Skipped {}: {}", skipped.fixture, skipped.error);
    }

    let Some(best) = &report.parlay.best_parlay else {
        println!();
        println!("No parlay: nothing could be analysed");
        return;
    };
    println!();
    println!("Best parlay (best leg per match)");
    println!("{}", "=".repeat(50));
    print_combination(best, report);

    if let Some(likeliest) = &report.parlay.most_probable_parlay {
        println!();
        println!("Likeliest parlay (most probable leg per match)");
        println!("{}", "=".repeat(50));
        print_combination(likeliest, report);
    }

    println!();
    println!(
        "Top combinations ({} evaluated)",
        report.parlay.combinations_evaluated
    );
    println!("{}", "=".repeat(50));
    for (idx, combo) in report.parlay.ranked_top_k.iter().enumerate() {
        println!();
        println!("#{}", idx + 1);
        print_combination(combo, report);
    }
}

fn print_combination(combo: &ParlayCombination, report: &SlateReport) {
    println!("Total odds: {:.2}", combo.total_odds);
    println!(
        "Win probability: {:.4} ({:.2}%)",
        combo.total_probability,
        combo.total_probability * 100.0
    );
    println!("Expected value: {:.4}", combo.expected_value);
    println!("Selections: {}", selections_text(combo, report));
}
