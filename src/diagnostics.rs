use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::markets::{DerivedMarkets, NumericMarket};

/// Two-sided 95% normal quantile.
const Z_95: f64 = 1.959_963_984_540_054;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub mean: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence_level: f64,
}

/// Read-only explainability output. Nothing here feeds back into prices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub confidence_intervals: BTreeMap<String, ConfidenceInterval>,
    /// `"a~b"` keyed similarity in [-1, 1], one entry per unordered pair.
    pub correlations: BTreeMap<String, f64>,
}

pub fn analyze(markets: &DerivedMarkets) -> Diagnostics {
    let numeric = markets.numeric();
    Diagnostics {
        confidence_intervals: numeric
            .iter()
            .map(|m| (m.name.to_string(), interval(m)))
            .collect(),
        correlations: correlations(&numeric),
    }
}

/// Normal interval with sd = (1 - confidence) × mean × 0.5, lower bound floored at 0.
pub fn interval(market: &NumericMarket) -> ConfidenceInterval {
    let mean = market.total;
    let sd = ((1.0 - market.confidence) * mean * 0.5).abs();
    ConfidenceInterval {
        mean,
        lower_bound: (mean - Z_95 * sd).round().max(0.0),
        upper_bound: (mean + Z_95 * sd).round(),
        confidence_level: 0.95,
    }
}

/// Relative closeness of two totals: 1 when equal, -1 when one is zero and the other isn't.
pub fn similarity(a: f64, b: f64) -> f64 {
    let scale = a.abs() + b.abs();
    if scale == 0.0 {
        return 1.0;
    }
    let s = 1.0 - 2.0 * (a - b).abs() / scale;
    (s.clamp(-1.0, 1.0) * 100.0).round() / 100.0
}

fn correlations(numeric: &[NumericMarket]) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for (i, a) in numeric.iter().enumerate() {
        for b in &numeric[i + 1..] {
            out.insert(format!("{}~{}", a.name, b.name), similarity(a.total, b.total));
        }
    }
    out
}
