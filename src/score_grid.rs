use std::collections::BTreeMap;

use crate::outcome::{Outcome, OutcomeProbs, ScoreLine};

pub const GOALS_TOTAL_BASE: f64 = 2.60;
pub const HOME_ADV_GOALS: f64 = 0.15;
pub const MAX_GOALS: u32 = 10;

const LAMBDA_MIN: f64 = 0.20;
const LAMBDA_MAX: f64 = 3.80;

/// Independent-Poisson joint distribution over final scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreGrid {
    cells: Vec<Vec<f64>>,
}

impl ScoreGrid {
    pub fn poisson(lambda_home: f64, lambda_away: f64) -> Self {
        Self::poisson_with_max(lambda_home, lambda_away, MAX_GOALS)
    }

    pub fn poisson_with_max(lambda_home: f64, lambda_away: f64, max_goals: u32) -> Self {
        let pmf_h = poisson_pmf(clamp_lambda(lambda_home), max_goals);
        let pmf_a = poisson_pmf(clamp_lambda(lambda_away), max_goals);
        let cells = pmf_h
            .iter()
            .map(|p_i| pmf_a.iter().map(|p_j| p_i * p_j).collect())
            .collect();
        Self { cells }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScoreLine, f64)> + '_ {
        self.cells.iter().enumerate().flat_map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(move |(j, p)| (ScoreLine::new(i as u32, j as u32), *p))
        })
    }

    pub fn outcome_probs(&self) -> OutcomeProbs {
        let mut out = OutcomeProbs::default();
        for (score, p) in self.iter() {
            out.add(score.outcome(), p);
        }
        out.normalized()
    }

    /// Probability of any score matching `pred`.
    pub fn mass_where(&self, pred: impl Fn(ScoreLine) -> bool) -> f64 {
        self.iter().filter(|(s, _)| pred(*s)).map(|(_, p)| p).sum()
    }

    /// Home-minus-away goal difference distribution.
    pub fn goal_difference(&self) -> BTreeMap<i64, f64> {
        let mut out = BTreeMap::new();
        for (score, p) in self.iter() {
            *out.entry(score.goal_difference()).or_insert(0.0) += p;
        }
        out
    }

    /// Rescales each win/draw/loss region so the grid carries `target`'s mass.
    pub fn rescaled_to(&self, target: &OutcomeProbs) -> Self {
        let current = self.outcome_probs();
        let target = target.normalized();
        let factor = |o: Outcome| {
            let have = current.get(o);
            if have > 0.0 { target.get(o) / have } else { 0.0 }
        };
        let cells = self
            .cells
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .map(|(j, p)| p * factor(Outcome::from_score(i as u32, j as u32)))
                    .collect()
            })
            .collect();
        Self { cells }
    }

    /// Most probable scoreline that ends in `outcome`.
    pub fn most_likely(&self, outcome: Outcome) -> ScoreLine {
        let mut best = None::<(ScoreLine, f64)>;
        for (score, p) in self.iter() {
            if score.outcome() != outcome {
                continue;
            }
            if best.is_none_or(|(_, bp)| p > bp) {
                best = Some((score, p));
            }
        }
        best.map(|(s, _)| s).unwrap_or_else(|| match outcome {
            Outcome::HomeWin => ScoreLine::new(1, 0),
            Outcome::Draw => ScoreLine::new(1, 1),
            Outcome::AwayWin => ScoreLine::new(0, 1),
        })
    }
}

/// Truncated Poisson pmf with the tail folded into the last bucket.
pub fn poisson_pmf(lambda: f64, max_k: u32) -> Vec<f64> {
    let max_k = max_k as usize;
    let mut out = vec![0.0; max_k + 1];
    let lambda = lambda.max(0.0);

    out[0] = (-lambda).exp();
    for k in 1..=max_k {
        out[k] = out[k - 1] * lambda / k as f64;
    }

    let sum: f64 = out.iter().sum();
    if sum < 1.0 {
        out[max_k] += 1.0 - sum;
    }
    out
}

/// Splits the league-average total around a strength difference in goals.
pub fn lambdas_from_diff(goals_total: f64, diff: f64) -> (f64, f64) {
    (
        clamp_lambda(goals_total / 2.0 + diff / 2.0),
        clamp_lambda(goals_total / 2.0 - diff / 2.0),
    )
}

fn clamp_lambda(v: f64) -> f64 {
    if v.is_nan() {
        return LAMBDA_MIN;
    }
    v.clamp(LAMBDA_MIN, LAMBDA_MAX)
}
