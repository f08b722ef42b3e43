#![no_main]

use libfuzzer_sys::fuzz_target;
use modelbench_domain::{HeuristicScorer, QualityScorer, SimilarityScorer, TokenJaccard};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let (a, b) = text.split_at(text.char_indices().nth(text.chars().count() / 2).map_or(0, |(i, _)| i));

    let explain = HeuristicScorer.score_explanation(a, b);
    assert!((0.0..=10.0).contains(&explain), "explanation score {explain}");

    let answer = HeuristicScorer.score_answer(a, b);
    assert!((0.0..=10.0).contains(&answer), "answer score {answer}");

    let sim = TokenJaccard.similarity(a, b);
    assert!((0.0..=1.0).contains(&sim), "similarity {sim}");
});
