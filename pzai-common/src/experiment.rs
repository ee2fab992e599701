//! A/B test result evaluation
//!
//! Aggregates personalization outcomes per variant, derives rate metrics,
//! and picks a winner once the test has enough participants.
//!
//! Evaluation is a pure function of the test configuration, the outcome
//! snapshot, and the decision from the previous evaluation. Calling it twice
//! with the same inputs yields the same output.
//!
//! # Winner selection
//!
//! - Only variants declared on the test are candidates. Outcomes tagged with
//!   undeclared codes are aggregated and counted but cannot win.
//! - Ties on the target metric go to the lexicographically smallest code.
//! - Significance is a heuristic: the winner's value must exceed the
//!   second-highest value by more than 10%.
//! - Below the minimum sample size the previous decision is kept as is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::TargetMetric;

/// Required lift of the best variant over the runner-up
pub const SIGNIFICANCE_LIFT: f64 = 1.1;

/// Test settings the evaluator depends on
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    pub variants: Vec<String>,
    pub target_metric: TargetMetric,
    pub minimum_sample_size: u32,
}

/// Outcome fields read from one personalization result
#[derive(Debug, Clone, PartialEq)]
pub struct VariantOutcome {
    pub variant: Option<String>,
    pub was_opened: bool,
    pub was_clicked: bool,
    pub conversion_value: f64,
}

/// Winner state carried over from the last evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorDecision {
    pub winning_variant: Option<String>,
    pub significance_reached: bool,
}

/// Aggregated counts and rates for one variant
///
/// Rates are percentages; `avg_value` is total conversion value per participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantMetrics {
    pub participants: u32,
    pub opens: u32,
    pub clicks: u32,
    pub conversions: u32,
    pub total_value: f64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub conversion_rate: f64,
    pub avg_value: f64,
}

impl VariantMetrics {
    fn record(&mut self, outcome: &VariantOutcome) {
        self.participants += 1;
        if outcome.was_opened {
            self.opens += 1;
        }
        if outcome.was_clicked {
            self.clicks += 1;
        }
        if outcome.conversion_value > 0.0 {
            self.conversions += 1;
            self.total_value += outcome.conversion_value;
        }
    }

    fn finalize(&mut self) {
        if self.participants == 0 {
            self.open_rate = 0.0;
            self.click_rate = 0.0;
            self.conversion_rate = 0.0;
            self.avg_value = 0.0;
            return;
        }
        let n = self.participants as f64;
        self.open_rate = self.opens as f64 / n * 100.0;
        self.click_rate = self.clicks as f64 / n * 100.0;
        self.conversion_rate = self.conversions as f64 / n * 100.0;
        self.avg_value = self.total_value / n;
    }

    /// Value of the given target metric
    pub fn metric(&self, metric: TargetMetric) -> f64 {
        match metric {
            TargetMetric::OpenRate => self.open_rate,
            TargetMetric::ClickRate => self.click_rate,
            TargetMetric::ConversionRate => self.conversion_rate,
            TargetMetric::AvgValue => self.avg_value,
        }
    }
}

/// Output of one evaluation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub per_variant: BTreeMap<String, VariantMetrics>,
    pub winning_variant: Option<String>,
    pub significance_reached: bool,
    pub total_participants: u32,
}

/// Evaluate a test over an outcome snapshot
///
/// Outcomes without a variant code are skipped.
pub fn evaluate(
    config: &ExperimentConfig,
    outcomes: &[VariantOutcome],
    prior: &PriorDecision,
) -> Evaluation {
    let mut per_variant: BTreeMap<String, VariantMetrics> = BTreeMap::new();
    for outcome in outcomes {
        if let Some(variant) = &outcome.variant {
            per_variant.entry(variant.clone()).or_default().record(outcome);
        }
    }
    for metrics in per_variant.values_mut() {
        metrics.finalize();
    }

    let total_participants: u32 = per_variant.values().map(|m| m.participants).sum();

    let mut evaluation = Evaluation {
        per_variant,
        winning_variant: prior.winning_variant.clone(),
        significance_reached: prior.significance_reached,
        total_participants,
    };

    if total_participants < config.minimum_sample_size {
        debug!(
            "Sample size {} below minimum {}; keeping previous decision",
            total_participants, config.minimum_sample_size
        );
        return evaluation;
    }

    // BTreeMap iteration is ordered by code, so a strict comparison keeps the
    // smallest code among equal values.
    let candidates: Vec<(&String, f64)> = evaluation
        .per_variant
        .iter()
        .filter(|(code, _)| config.variants.contains(code))
        .map(|(code, metrics)| (code, metrics.metric(config.target_metric)))
        .collect();

    let mut best: Option<(&String, f64)> = None;
    for &(code, value) in &candidates {
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((code, value)),
        }
    }

    if let Some((winner, max_value)) = best {
        let mut values: Vec<f64> = candidates.iter().map(|&(_, v)| v).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        let second_max = if values.len() > 1 { values[values.len() - 2] } else { 0.0 };

        evaluation.winning_variant = Some(winner.clone());
        evaluation.significance_reached = max_value > second_max * SIGNIFICANCE_LIFT;
        debug!(
            "Winner {} with {}={:.3} (runner-up {:.3}, significant={})",
            winner, config.target_metric, max_value, second_max, evaluation.significance_reached
        );
    }

    evaluation
}
