#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let values: Vec<f64> = data
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();

    if let Ok(summary) = modelbench_domain::summarize_times(&values) {
        assert!(summary.min_time <= summary.avg_time || summary.avg_time.is_nan());
        assert!(summary.avg_time <= summary.max_time || summary.avg_time.is_nan());
        assert!(summary.std_dev >= 0.0 || summary.std_dev.is_nan());
        assert_eq!(summary.samples as usize, values.len());
    }
});
