//! Cross-configuration comparison and the recommendation policy.
//!
//! Response time and quality have a tolerance band (noted, still eligible); memory has none.
//! The asymmetry is operational policy and is kept as is.

use crate::mean;
use modelbench_types::{ComparisonMatrix, ModelOutcome, ModelReport, Recommendation};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionCriteria {
    /// Average warm response time above this gets a note.
    pub target_response_secs: f64,

    /// Average warm response time at or above this disqualifies.
    pub max_response_secs: f64,

    /// Quality percentage (score x 10) below this gets a note.
    pub target_quality_pct: f64,

    /// Quality percentage below this disqualifies.
    pub min_quality_pct: f64,

    /// Peak memory at or above this disqualifies outright.
    pub memory_limit_mb: f64,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            target_response_secs: 2.0,
            max_response_secs: 3.0,
            target_quality_pct: 70.0,
            min_quality_pct: 60.0,
            memory_limit_mb: 4096.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Eligibility {
    pub meets_criteria: bool,
    pub notes: Vec<String>,
}

/// Evaluate one configuration against the criteria, independently of the others.
///
/// Checks without data (no warm timings) are skipped rather than failed; quality always
/// applies because a missing quality score is already 0.
pub fn assess(report: &ModelReport, criteria: &SelectionCriteria) -> Eligibility {
    let mut meets_criteria = true;
    let mut notes = Vec::new();

    if let Some(avg_time) = mean(&report.performance.warm_means()) {
        if avg_time > criteria.target_response_secs {
            notes.push(format!(
                "Response time {avg_time:.2}s > {target}s target",
                target = criteria.target_response_secs
            ));
            meets_criteria = avg_time < criteria.max_response_secs;
        }
    }

    let quality_pct = report.scores.quality * 10.0;
    if quality_pct < criteria.target_quality_pct {
        notes.push(format!(
            "Quality score {quality_pct:.0}% < {target}% target",
            target = criteria.target_quality_pct
        ));
        meets_criteria = meets_criteria && quality_pct >= criteria.min_quality_pct;
    }

    let peak_mb = report.resources.memory.peak_mb;
    if peak_mb >= criteria.memory_limit_mb {
        notes.push(format!(
            "Memory {peak_mb:.0}MB exceeds {limit}MB limit",
            limit = criteria.memory_limit_mb
        ));
        meets_criteria = false;
    }

    Eligibility {
        meets_criteria,
        notes,
    }
}

/// Pick the best configuration.
///
/// Candidates are ordered by overall score, descending (ties keep name order). The first
/// criteria-meeting candidate wins; if none qualifies, the top-scoring one is returned with
/// `meets_criteria == false` and its notes. Failed configurations never participate, so a
/// run where every configuration failed yields `None`.
pub fn recommend(
    models: &BTreeMap<String, ModelOutcome>,
    criteria: &SelectionCriteria,
) -> Option<Recommendation> {
    let mut candidates: Vec<Recommendation> = models
        .iter()
        .filter_map(|(name, outcome)| outcome.report().map(|r| (name, r)))
        .map(|(name, report)| {
            let Eligibility {
                meets_criteria,
                notes,
            } = assess(report, criteria);
            Recommendation {
                model: name.clone(),
                overall_score: report.scores.overall,
                tier: report.tier,
                meets_criteria,
                notes,
            }
        })
        .collect();

    candidates.sort_by(|a, b| b.overall_score.total_cmp(&a.overall_score));

    match candidates.iter().position(|c| c.meets_criteria) {
        Some(idx) => Some(candidates.swap_remove(idx)),
        None => candidates.into_iter().next(),
    }
}

/// Read-only projection of the completed configurations for side-by-side display.
pub fn comparison_matrix(models: &BTreeMap<String, ModelOutcome>) -> ComparisonMatrix {
    let mut matrix = ComparisonMatrix::default();

    for (name, outcome) in models {
        let Some(report) = outcome.report() else {
            continue;
        };

        if let Some(avg_time) = mean(&report.performance.warm_means()) {
            matrix.response_times.insert(name.clone(), avg_time);
        }
        matrix
            .quality_scores
            .insert(name.clone(), report.scores.quality);
        matrix
            .overall_scores
            .insert(name.clone(), report.scores.overall);
        matrix
            .resource_usage
            .insert(name.clone(), report.resources.memory.peak_mb);
    }

    matrix
}
