use serde::{Deserialize, Serialize};

use crate::outcome::{Outcome, OutcomeProbs};

const PROB_FLOOR: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

/// Temperature-style rescale in log space with an additive draw bias.
pub fn apply_logit_calibration(
    prob: OutcomeProbs,
    logit_scale: f64,
    draw_bias: f64,
) -> OutcomeProbs {
    let scale = logit_scale.clamp(0.50, 1.80);
    let logits = OutcomeProbs::from_fn(|o| {
        let bias = if o == Outcome::Draw { draw_bias } else { 0.0 };
        prob.get(o).clamp(PROB_FLOOR, 1.0).ln() + bias
    });
    let centre = logits.sum() / 3.0;
    let scaled = OutcomeProbs::from_fn(|o| (logits.get(o) - centre) * scale);

    let peak = scaled.get(scaled.argmax());
    OutcomeProbs::from_fn(|o| (scaled.get(o) - peak).exp()).normalized()
}

fn brier(p: &OutcomeProbs, actual: Outcome) -> f64 {
    p.iter()
        .map(|(o, mass)| {
            let hit = if o == actual { 1.0 } else { 0.0 };
            (mass - hit).powi(2)
        })
        .sum()
}

/// Multiclass Brier, log loss and argmax accuracy.
pub fn evaluate_probs(predictions: &[OutcomeProbs], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::default();
    }

    let (brier_sum, loss_sum, correct) = predictions.iter().zip(outcomes).fold(
        (0.0_f64, 0.0_f64, 0usize),
        |(b, l, c), (p, &actual)| {
            (
                b + brier(p, actual),
                l - p.get(actual).clamp(1e-12, 1.0).ln(),
                c + usize::from(p.argmax() == actual),
            )
        },
    );

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

/// Scales 0.70..=1.30 and draw biases -0.30..=0.30; identity wins ties.
fn calibration_grid() -> impl Iterator<Item = (f64, f64)> {
    let grid = (35..=65).flat_map(|scale| {
        (-30..=30).map(move |bias| (scale as f64 / 50.0, bias as f64 / 100.0))
    });
    std::iter::once((1.0, 0.0)).chain(grid)
}

/// Grid search over scale and draw bias, minimising log loss.
pub fn fit_logit_calibration(
    predictions: &[OutcomeProbs],
    outcomes: &[Outcome],
) -> (f64, f64, Metrics) {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return (1.0, 0.0, Metrics::default());
    }

    calibration_grid()
        .map(|(scale, bias)| {
            let calibrated: Vec<OutcomeProbs> = predictions
                .iter()
                .map(|p| apply_logit_calibration(*p, scale, bias))
                .collect();
            (scale, bias, evaluate_probs(&calibrated, outcomes))
        })
        .min_by(|a, b| a.2.log_loss.total_cmp(&b.2.log_loss))
        .unwrap_or((1.0, 0.0, Metrics::default()))
}

/// Reliability table for one outcome over `bins` equal-width buckets.
pub fn calibration_bins(
    predictions: &[OutcomeProbs],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let width = 1.0 / bins as f64;
    let mut table: Vec<CalibrationBin> = (0..bins)
        .map(|i| CalibrationBin {
            bucket_start: i as f64 * width,
            bucket_end: (i + 1) as f64 * width,
            count: 0,
            avg_pred: 0.0,
            actual_rate: 0.0,
        })
        .collect();

    for (p, &actual) in predictions.iter().zip(outcomes) {
        let mass = p.get(class).clamp(0.0, 1.0);
        let bin = &mut table[((mass * bins as f64) as usize).min(bins - 1)];
        bin.count += 1;
        bin.avg_pred += mass;
        if actual == class {
            bin.actual_rate += 1.0;
        }
    }

    for bin in table.iter_mut().filter(|b| b.count > 0) {
        bin.avg_pred /= bin.count as f64;
        bin.actual_rate /= bin.count as f64;
    }
    table
}
