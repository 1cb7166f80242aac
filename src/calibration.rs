use serde::Serialize;

use crate::probability::{Outcome, OutcomeProbs};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Metrics {
    fn empty() -> Self {
        Self {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        }
    }
}

/// Brier score, log loss and argmax accuracy. Mismatched or empty inputs
/// give zeroed metrics with `samples == 0`.
pub fn evaluate_probs(predictions: &[OutcomeProbs], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::empty();
    }

    let (brier, log_loss, hits) = predictions.iter().zip(outcomes).fold(
        (0.0_f64, 0.0_f64, 0usize),
        |(brier, log_loss, hits), (probs, &actual)| {
            let squared: f64 = Outcome::ALL
                .iter()
                .map(|&o| {
                    let target = if o == actual { 1.0 } else { 0.0 };
                    (probs.get(o) - target).powi(2)
                })
                .sum();
            let surprise = -probs.get(actual).clamp(1e-12, 1.0).ln();
            let hit = usize::from(probs.argmax() == actual);
            (brier + squared, log_loss + surprise, hits + hit)
        },
    );

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier / n,
        log_loss: log_loss / n,
        accuracy: hits as f64 / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let preds = vec![
            OutcomeProbs::new(1.0, 0.0, 0.0),
            OutcomeProbs::new(0.0, 1.0, 0.0),
            OutcomeProbs::new(0.0, 0.0, 1.0),
        ];
        let outcomes = vec![Outcome::Home, Outcome::Draw, Outcome::Away];
        let m = evaluate_probs(&preds, &outcomes);
        assert_eq!(m.samples, 3);
        assert!(m.brier < 1e-12);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn uniform_forecast_log_loss_is_ln3() {
        let preds = vec![OutcomeProbs::uniform(); 4];
        let outcomes = vec![Outcome::Home, Outcome::Away, Outcome::Draw, Outcome::Home];
        let m = evaluate_probs(&preds, &outcomes);
        assert!((m.log_loss - 3.0_f64.ln()).abs() < 1e-12);
        assert!((m.brier - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_lengths_are_empty() {
        let m = evaluate_probs(&[OutcomeProbs::uniform()], &[]);
        assert_eq!(m.samples, 0);
    }
}
