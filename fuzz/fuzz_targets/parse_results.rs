#![no_main]

use libfuzzer_sys::fuzz_target;
use modelbench_types::BenchmarkResults;

fuzz_target!(|data: &[u8]| {
    // Anything that parses must survive re-ranking and rendering.
    if let Ok(mut results) = serde_json::from_slice::<BenchmarkResults>(data) {
        let criteria = modelbench_domain::SelectionCriteria::default();
        results.recommendation = modelbench_domain::recommend(&results.models, &criteria);
        let _ = modelbench_domain::comparison_matrix(&results.models);
        let _ = modelbench_app::render_markdown(&results);
        let _ = modelbench_app::render_summary(&results);
    }
});
