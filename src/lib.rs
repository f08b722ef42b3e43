//! modelbench workspace-level test crate.
//!
//! Exists only to host `tests/integration`, which drives the real app and domain
//! crates through scripted adapters. The tool itself lives in the member crates:
//! - `modelbench-types`: versioned result and config contracts
//! - `modelbench-domain`: scoring, tiering and recommendation, no I/O
//! - `modelbench-adapters`: process execution, resource sampling, host probing
//! - `modelbench-app`: benchmark use cases, config resolution, report rendering
//! - `modelbench` (modelbench-cli): command-line interface
