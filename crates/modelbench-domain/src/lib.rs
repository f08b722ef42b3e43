//! Domain logic for modelbench.
//!
//! This crate is intentionally I/O-free: it does math and policy.
//! Aggregation lives here; heuristic scoring, score composition and the
//! recommendation policy live in the submodules.

mod compose;
mod recommend;
mod scoring;

pub use compose::{
    PERFORMANCE_WEIGHT, QUALITY_WEIGHT, RELIABILITY_WEIGHT, compose, score_performance,
    score_quality, score_reliability,
};
pub use recommend::{Eligibility, SelectionCriteria, assess, comparison_matrix, recommend};
pub use scoring::{HeuristicScorer, QualityScorer, SimilarityScorer, TokenJaccard};

use modelbench_types::{ALL_ATTEMPTS_FAILED, InvocationOutcome, Measurement, TimingSummary};
use statrs::statistics::Statistics;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("no samples to summarize")]
    NoSamples,

    #[error("sample {index} is not a finite, non-negative time: {value}")]
    InvalidSample { index: usize, value: f64 },
}

/// Summarize elapsed times in seconds.
///
/// The mean is kept within `[min, max]` against float rounding; the standard
/// deviation is the sample deviation and is 0 with fewer than two values.
pub fn summarize_times(values: &[f64]) -> Result<TimingSummary, DomainError> {
    if values.is_empty() {
        return Err(DomainError::NoSamples);
    }
    if let Some((index, value)) = values
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(DomainError::InvalidSample {
            index,
            value: *value,
        });
    }

    let min = Statistics::min(values.iter());
    let max = Statistics::max(values.iter());
    let avg_time = values.iter().mean().clamp(min, max);
    let std_dev = if values.len() < 2 {
        0.0
    } else {
        values.iter().std_dev()
    };

    Ok(TimingSummary {
        avg_time,
        min_time: min,
        max_time: max,
        std_dev,
        samples: values.len() as u32,
    })
}

/// Reduce repeated invocations of one (configuration, test case) pair.
///
/// Only successful outcomes contribute. With none, the result is the explicit
/// all-attempts-failed marker rather than zeroed numbers.
pub fn aggregate_outcomes(outcomes: &[InvocationOutcome]) -> Measurement<TimingSummary> {
    let times: Vec<f64> = outcomes
        .iter()
        .filter(|o| o.succeeded)
        .map(|o| o.elapsed_secs)
        .collect();

    match summarize_times(&times) {
        Ok(summary) => Measurement::Value(summary),
        Err(DomainError::NoSamples) => Measurement::failed(ALL_ATTEMPTS_FAILED),
        Err(err) => Measurement::failed(err.to_string()),
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().mean())
    }
}
