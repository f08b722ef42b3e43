//! Heuristic text scoring.
//!
//! These are surface-feature heuristics, not semantic judges. Scores are approximate and
//! only meaningful relative to each other within one run. Both strategies sit behind traits
//! so a stronger scorer can replace them without touching the category runners.

use std::collections::HashSet;

pub const MAX_QUALITY_SCORE: f64 = 10.0;

const BASE_SCORE: f64 = 5.0;

const TECH_TERMS: [&str; 7] = [
    "function",
    "variable",
    "return",
    "loop",
    "condition",
    "algorithm",
    "complexity",
];

const CODE_ELEMENTS: [&str; 3] = ["def ", "function", "method"];

/// Scores generated text on a 0-10 scale.
pub trait QualityScorer {
    /// Score an explanation of `code`.
    fn score_explanation(&self, output: &str, code: &str) -> f64;

    /// Score an answer to `question`.
    fn score_answer(&self, output: &str, question: &str) -> f64;
}

/// Scores the agreement of two outputs on a 0-1 scale.
pub trait SimilarityScorer {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Length milestones, term overlap and a structural bonus on top of a base of 5.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicScorer;

impl QualityScorer for HeuristicScorer {
    fn score_explanation(&self, output: &str, _code: &str) -> f64 {
        let len = output.chars().count();
        let lower = output.to_lowercase();

        let mut score = BASE_SCORE;
        if len > 100 {
            score += 1.0;
        }
        if len > 300 {
            score += 1.0;
        }

        let terms = TECH_TERMS.iter().filter(|t| lower.contains(*t)).count();
        score += (terms as f64 * 0.5).min(2.0);

        if CODE_ELEMENTS.iter().any(|e| output.contains(e)) {
            score += 1.0;
        }

        score.min(MAX_QUALITY_SCORE)
    }

    fn score_answer(&self, output: &str, question: &str) -> f64 {
        let len = output.chars().count();
        let lower = output.to_lowercase();

        let mut score = BASE_SCORE;
        if len > 50 {
            score += 1.0;
        }
        if len > 200 {
            score += 1.0;
        }

        // Repeated question words count each time, as in a plain word scan.
        let question = question.to_lowercase();
        let relevant = question
            .split_whitespace()
            .filter(|w| lower.contains(w))
            .count();
        score += (relevant as f64 * 0.3).min(2.0);

        if output.contains('\n') || output.contains('.') {
            score += 1.0;
        }

        score.min(MAX_QUALITY_SCORE)
    }
}

/// Jaccard index over lowercase whitespace-separated word sets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenJaccard;

impl SimilarityScorer for TokenJaccard {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a = a.to_lowercase();
        let b = b.to_lowercase();
        let set_a: HashSet<&str> = a.split_whitespace().collect();
        let set_b: HashSet<&str> = b.split_whitespace().collect();

        if set_a.is_empty() || set_b.is_empty() {
            return 0.0;
        }

        let intersection = set_a.intersection(&set_b).count();
        let union = set_a.union(&set_b).count();

        intersection as f64 / union as f64
    }
}
