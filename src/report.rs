use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::engine::{FixtureAnalysis, SlateReport};
use crate::parlay::ParlayCombination;

pub struct ExportSummary {
    pub matches: usize,
    pub scores: usize,
    pub value_bets: usize,
    pub parlays: usize,
}

pub fn export_slate_report(path: &Path, report: &SlateReport) -> Result<ExportSummary> {
    let mut matches_rows = vec![vec![
        "Match".to_string(),
        "Home xG".to_string(),
        "Away xG".to_string(),
        "P(Home)".to_string(),
        "P(Draw)".to_string(),
        "P(Away)".to_string(),
        "Market Home".to_string(),
        "Market Draw".to_string(),
        "Market Away".to_string(),
        "Overround".to_string(),
        "Best Bet".to_string(),
        "Best EV".to_string(),
    ]];

    let mut scores_rows = vec![vec![
        "Match".to_string(),
        "Score".to_string(),
        "Probability".to_string(),
    ]];

    let mut value_rows = vec![vec![
        "Match".to_string(),
        "Market".to_string(),
        "Selection".to_string(),
        "Odds".to_string(),
        "Model Prob".to_string(),
        "EV".to_string(),
    ]];

    for entry in &report.matches {
        matches_rows.push(match_row(entry));
        scores_rows.extend(entry.analysis.top_scores.iter().map(|s| {
            vec![entry.fixture.clone(), s.label(), fmt4(s.probability)]
        }));
        value_rows.extend(entry.analysis.value_bets.iter().map(|b| {
            vec![
                entry.fixture.clone(),
                "1x2".to_string(),
                b.outcome.key().to_string(),
                fmt2(b.odds),
                fmt4(b.model_probability),
                fmt4(b.expected_value),
            ]
        }));
        value_rows.extend(entry.analysis.market_value_bets.iter().map(|b| {
            vec![
                entry.fixture.clone(),
                b.market.clone(),
                b.selection.clone(),
                fmt2(b.odds),
                fmt4(b.model_probability),
                fmt4(b.expected_value),
            ]
        }));
    }

    let mut parlay_rows = vec![vec![
        "Rank".to_string(),
        "Selections".to_string(),
        "Total Odds".to_string(),
        "Win Prob".to_string(),
        "EV".to_string(),
    ]];
    if let Some(best) = &report.parlay.best_parlay {
        parlay_rows.push(parlay_row("greedy", best, report));
    }
    if let Some(likeliest) = &report.parlay.most_probable_parlay {
        parlay_rows.push(parlay_row("likeliest", likeliest, report));
    }
    for (idx, combo) in report.parlay.ranked_top_k.iter().enumerate() {
        parlay_rows.push(parlay_row(&(idx + 1).to_string(), combo, report));
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Matches")?;
        write_rows(sheet, &matches_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Scores")?;
        write_rows(sheet, &scores_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("ValueBets")?;
        write_rows(sheet, &value_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Parlays")?;
        write_rows(sheet, &parlay_rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportSummary {
        matches: matches_rows.len().saturating_sub(1),
        scores: scores_rows.len().saturating_sub(1),
        value_bets: value_rows.len().saturating_sub(1),
        parlays: parlay_rows.len().saturating_sub(1),
    })
}

fn match_row(entry: &FixtureAnalysis) -> Vec<String> {
    let a = &entry.analysis;
    let (best_label, best_ev) = a
        .best_bet()
        .map(|b| (b.label.clone(), fmt4(b.expected_value)))
        .unwrap_or_default();
    vec![
        entry.fixture.clone(),
        fmt2(a.home_xg),
        fmt2(a.away_xg),
        fmt4(a.outcome_probabilities.home),
        fmt4(a.outcome_probabilities.draw),
        fmt4(a.outcome_probabilities.away),
        fmt4(a.market_implied.home),
        fmt4(a.market_implied.draw),
        fmt4(a.market_implied.away),
        fmt4(a.overround),
        best_label,
        best_ev,
    ]
}

fn parlay_row(rank: &str, combo: &ParlayCombination, report: &SlateReport) -> Vec<String> {
    vec![
        rank.to_string(),
        selections_text(combo, report),
        fmt2(combo.total_odds),
        fmt4(combo.total_probability),
        fmt4(combo.expected_value),
    ]
}

pub fn selections_text(combo: &ParlayCombination, report: &SlateReport) -> String {
    combo
        .legs
        .iter()
        .map(|leg| {
            let fixture = report
                .matches
                .get(leg.match_index)
                .map(|m| m.fixture.as_str())
                .unwrap_or("?");
            format!("{fixture}: {}", leg.candidate.label)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn fmt2(v: f64) -> String {
    format!("{v:.2}")
}

fn fmt4(v: f64) -> String {
    format!("{v:.4}")
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
