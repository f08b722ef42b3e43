//! Score composition: four category results in, one [`ScoreSet`] out.
//!
//! Missing data penalizes: a sub-score with nothing usable behind it is 0, not skipped.

use crate::mean;
use modelbench_types::{PerformanceResult, QualityResult, ReliabilityResult, ScoreSet};

pub const PERFORMANCE_WEIGHT: f64 = 0.4;
pub const QUALITY_WEIGHT: f64 = 0.4;
pub const RELIABILITY_WEIGHT: f64 = 0.2;

/// Linear penalty from 1s (10 points) down to 6s (0 points), clamped to [0, 10].
pub fn score_performance(perf: &PerformanceResult) -> f64 {
    match mean(&perf.warm_means()) {
        Some(avg_time) => (10.0 - (avg_time - 1.0) * 2.0).clamp(0.0, 10.0),
        None => 0.0,
    }
}

pub fn score_quality(quality: &QualityResult) -> f64 {
    let scores: Vec<f64> = [&quality.code_explanation, &quality.question_answering]
        .into_iter()
        .filter_map(|m| m.value().map(|q| q.avg_score))
        .collect();
    mean(&scores).unwrap_or(0.0)
}

pub fn score_reliability(reliability: &ReliabilityResult) -> f64 {
    let mut scores = Vec::with_capacity(2);
    if let Some(c) = reliability.consistency.value() {
        scores.push(c.avg_similarity * 10.0);
    }
    scores.push(reliability.stability.success_rate * 10.0);
    mean(&scores).unwrap_or(0.0)
}

pub fn compose(
    performance: &PerformanceResult,
    quality: &QualityResult,
    reliability: &ReliabilityResult,
) -> ScoreSet {
    let performance = score_performance(performance);
    let quality = score_quality(quality);
    let reliability = score_reliability(reliability);

    ScoreSet {
        performance,
        quality,
        reliability,
        overall: PERFORMANCE_WEIGHT * performance
            + QUALITY_WEIGHT * quality
            + RELIABILITY_WEIGHT * reliability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelbench_types::{
        ColdStart, Consistency, Measurement, QualitySummary, Stability, TimingSummary,
    };
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn timing(avg: f64) -> Measurement<TimingSummary> {
        Measurement::Value(TimingSummary {
            avg_time: avg,
            min_time: avg,
            max_time: avg,
            std_dev: 0.0,
            samples: 3,
        })
    }

    fn perf(buckets: &[(&str, Measurement<TimingSummary>)]) -> PerformanceResult {
        PerformanceResult {
            cold_start: ColdStart {
                time_secs: 1.0,
                succeeded: true,
            },
            warm_queries: buckets
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            throughput: Measurement::failed("not measured"),
        }
    }

    fn quality(explain: Option<f64>, qa: Option<f64>) -> QualityResult {
        let to_m = |s: Option<f64>| -> Measurement<QualitySummary> {
            s.map(|avg_score| QualitySummary {
                avg_score,
                samples_tested: 2,
            })
            .into()
        };
        QualityResult {
            code_explanation: to_m(explain),
            question_answering: to_m(qa),
        }
    }

    fn reliability(similarity: Option<f64>, success_rate: f64) -> ReliabilityResult {
        ReliabilityResult {
            consistency: similarity
                .map(|avg_similarity| Consistency {
                    avg_similarity,
                    runs: 5,
                })
                .into(),
            edge_cases: BTreeMap::new(),
            stability: Stability {
                success_rate,
                successful_runs: (success_rate * 10.0) as u32,
                total_runs: 10,
            },
        }
    }

    #[test]
    fn performance_penalty_is_linear_between_one_and_six_seconds() {
        assert_eq!(score_performance(&perf(&[("small", timing(0.5))])), 10.0);
        assert_eq!(score_performance(&perf(&[("small", timing(1.0))])), 10.0);
        assert_eq!(score_performance(&perf(&[("small", timing(3.5))])), 5.0);
        assert_eq!(score_performance(&perf(&[("small", timing(6.0))])), 0.0);
        assert_eq!(score_performance(&perf(&[("small", timing(9.0))])), 0.0);
    }

    #[test]
    fn all_failed_bucket_is_excluded_not_zeroed() {
        let p = perf(&[
            ("large", Measurement::failed("All attempts failed")),
            ("medium", timing(2.0)),
            ("small", timing(2.0)),
        ]);
        // Averaging a zero in would give 1.33s; exclusion keeps it at 2s.
        assert_eq!(score_performance(&p), 8.0);
    }

    #[test]
    fn no_performance_data_scores_zero() {
        let p = perf(&[("small", Measurement::failed("All attempts failed"))]);
        assert_eq!(score_performance(&p), 0.0);
    }

    #[test]
    fn quality_uses_whatever_is_present() {
        assert_eq!(score_quality(&quality(Some(8.0), Some(6.0))), 7.0);
        assert_eq!(score_quality(&quality(None, Some(6.0))), 6.0);
        assert_eq!(score_quality(&quality(Some(9.0), None)), 9.0);
        assert_eq!(score_quality(&quality(None, None)), 0.0);
    }

    #[test]
    fn reliability_averages_consistency_and_stability() {
        assert_eq!(score_reliability(&reliability(Some(0.5), 1.0)), 7.5);
        assert_eq!(score_reliability(&reliability(None, 0.8)), 8.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_overall_is_exact_weighted_sum(
            avg in 0.0f64..10.0,
            explain in 5.0f64..10.0,
            qa in 5.0f64..10.0,
            sim in 0.0f64..1.0,
            rate in 0.0f64..1.0,
        ) {
            let s = compose(
                &perf(&[("small", timing(avg))]),
                &quality(Some(explain), Some(qa)),
                &reliability(Some(sim), rate),
            );
            prop_assert_eq!(s.overall, 0.4 * s.performance + 0.4 * s.quality + 0.2 * s.reliability);
            for sub in [s.performance, s.quality, s.reliability, s.overall] {
                prop_assert!((0.0..=10.0).contains(&sub), "sub-score out of range: {}", sub);
            }
        }
    }
}
