//! Shared types for modelbench.
//!
//! Design goal: versioned, explicit, boring.
//! Everything the reporter renders is derivable from [`BenchmarkResults`] alone.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const RESULTS_SCHEMA_V1: &str = "modelbench.results.v1";
pub const QUICK_SCHEMA_V1: &str = "modelbench.quick.v1";

/// Error text recorded when the Invoker's wall-clock bound is hit.
pub const TIMEOUT_MARKER: &str = "TIMEOUT";

/// Error text recorded when every repeated attempt of a sub-metric failed.
pub const ALL_ATTEMPTS_FAILED: &str = "All attempts failed";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct HostInfo {
    pub os: String,
    pub arch: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RunMeta {
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub host: HostInfo,
}

/// The external program under test, as it was invoked.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ProgramMeta {
    pub program: String,

    /// Arguments after the program (no shell parsing at invocation time).
    pub args: Vec<String>,

    pub timeout_ms: u64,
}

/// Result of one spawn-feed-capture cycle.
///
/// Never persisted on its own; category runners reduce it immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub succeeded: bool,

    /// Wall time in seconds. Equals the timeout on timeout, `-1.0` when the
    /// process could not be run at all.
    pub elapsed_secs: f64,

    pub output: String,
    pub error: String,

    /// Character count of the full captured output.
    pub output_len: usize,
}

impl InvocationOutcome {
    pub fn timed_out(timeout_secs: f64) -> Self {
        Self {
            succeeded: false,
            elapsed_secs: timeout_secs,
            output: String::new(),
            error: TIMEOUT_MARKER.to_string(),
            output_len: 0,
        }
    }

    pub fn not_run(error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            elapsed_secs: -1.0,
            output: String::new(),
            error: error.into(),
            output_len: 0,
        }
    }

    /// The leading `chars` characters of the output, used for heuristic analysis.
    pub fn excerpt(&self, chars: usize) -> &str {
        match self.output.char_indices().nth(chars) {
            Some((idx, _)) => &self.output[..idx],
            None => &self.output,
        }
    }
}

/// One polling tick of a monitored invocation. Raw samples are reduced and dropped.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResourceSample {
    pub elapsed_secs: f64,
    pub rss_mb: f64,

    /// `None` when the probe had no earlier reading to measure CPU time against.
    pub cpu_percent: Option<f64>,
}

/// A sub-metric that was attempted: either a value, or an explicit "no data" marker.
///
/// An absent key means "not attempted"; `Failed` means "attempted, nothing usable".
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum Measurement<T> {
    Value(T),
    Failed { error: String },
}

impl<T> Measurement<T> {
    pub fn failed(error: impl Into<String>) -> Self {
        Measurement::Failed {
            error: error.into(),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Measurement::Value(v) => Some(v),
            Measurement::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Measurement::Failed { .. })
    }
}

impl<T> From<Option<T>> for Measurement<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Measurement::Value(v),
            None => Measurement::failed(ALL_ATTEMPTS_FAILED),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TimingSummary {
    pub avg_time: f64,
    pub min_time: f64,
    pub max_time: f64,

    /// Sample standard deviation; 0 with fewer than two samples.
    pub std_dev: f64,

    pub samples: u32,
}

// ----------------------------
// Category results
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ColdStart {
    pub time_secs: f64,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Throughput {
    pub tokens_per_second: f64,
    pub input_tokens: f64,
    pub output_tokens: f64,
    pub time_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PerformanceResult {
    pub cold_start: ColdStart,

    /// Keyed by prompt-size bucket ("small", "medium", "large").
    pub warm_queries: BTreeMap<String, Measurement<TimingSummary>>,

    pub throughput: Measurement<Throughput>,
}

impl PerformanceResult {
    /// Mean times of the buckets that produced data, in bucket-key order.
    pub fn warm_means(&self) -> Vec<f64> {
        self.warm_queries
            .values()
            .filter_map(|m| m.value().map(|t| t.avg_time))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QualitySummary {
    pub avg_score: f64,
    pub samples_tested: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QualityResult {
    pub code_explanation: Measurement<QualitySummary>,
    pub question_answering: Measurement<QualitySummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct MemoryUsage {
    pub initial_mb: f64,
    pub peak_mb: f64,
    pub delta_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CpuUsage {
    pub avg_percent: f64,
    pub max_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ResourceResult {
    pub memory: MemoryUsage,
    pub cpu: Measurement<CpuUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Consistency {
    pub avg_similarity: f64,
    pub runs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct EdgeCaseOutcome {
    pub handled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Stability {
    pub success_rate: f64,
    pub successful_runs: u32,
    pub total_runs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ReliabilityResult {
    pub consistency: Measurement<Consistency>,
    pub edge_cases: BTreeMap<String, EdgeCaseOutcome>,
    pub stability: Stability,
}

// ----------------------------
// Scores
// ----------------------------

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct ScoreSet {
    pub performance: f64,
    pub quality: f64,
    pub reliability: f64,
    pub overall: f64,
}

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Tier {
    S,
    A,
    B,
    C,
    D,
}

impl Tier {
    pub fn from_score(overall: f64) -> Self {
        if overall >= 9.0 {
            Tier::S
        } else if overall >= 8.0 {
            Tier::A
        } else if overall >= 7.0 {
            Tier::B
        } else if overall >= 6.0 {
            Tier::C
        } else {
            Tier::D
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::S => "S",
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
            Tier::D => "D",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------
// Per-model results and the full run
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ModelReport {
    pub performance: PerformanceResult,
    pub quality: QualityResult,
    pub resources: ResourceResult,
    pub reliability: ReliabilityResult,
    pub scores: ScoreSet,
    pub tier: Tier,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Completed(Box<ModelReport>),
    Failed { error: String },
}

impl ModelOutcome {
    pub fn report(&self) -> Option<&ModelReport> {
        match self {
            ModelOutcome::Completed(r) => Some(r),
            ModelOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct ComparisonMatrix {
    pub response_times: BTreeMap<String, f64>,
    pub quality_scores: BTreeMap<String, f64>,
    pub resource_usage: BTreeMap<String, f64>,
    pub overall_scores: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Recommendation {
    pub model: String,
    pub overall_score: f64,
    pub tier: Tier,

    /// False when no candidate met every criterion and this is the best-overall fallback.
    pub meets_criteria: bool,

    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BenchmarkResults {
    pub schema: String,
    pub tool: ToolInfo,
    pub run: RunMeta,
    pub program: ProgramMeta,
    pub models: BTreeMap<String, ModelOutcome>,
    pub comparison: ComparisonMatrix,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
}

// ----------------------------
// Quick (latency-only) mode
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QuickBucket {
    pub timing: Measurement<TimingSummary>,
    pub success_rate: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_output_length: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QuickTargets {
    pub overall_avg_time: f64,
    pub target_secs: f64,
    pub max_secs: f64,
    pub meets_target: bool,
    pub meets_max: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QuickModelResult {
    pub tests: BTreeMap<String, QuickBucket>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<QuickTargets>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QuickBest {
    pub model: String,
    pub avg_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QuickResults {
    pub schema: String,
    pub tool: ToolInfo,
    pub run: RunMeta,
    pub program: ProgramMeta,
    pub models: BTreeMap<String, QuickModelResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub best: Option<QuickBest>,
}

// ----------------------------
// Optional config file schema
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Configurations ("models") to benchmark, in run order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,

    #[serde(default)]
    pub env: EnvConfig,

    #[serde(default)]
    pub criteria: CriteriaConfig,

    #[serde(default)]
    pub plan: PlanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Argument string after the program, split with shell-words (e.g. "explain -").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Duration string parseable by humantime, e.g. "30s".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cap_bytes: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_chars: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chars_per_token: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_ceiling: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_grace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct EnvConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_var: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet_var: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_autostart_var: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_autostart: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CriteriaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_response_secs: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_secs: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_quality_pct: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_quality_pct: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit_mb: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warm_repeats: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation_samples: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_samples: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency_runs: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability_runs: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_failed_marker_serializes_as_error_object() {
        let m: Measurement<TimingSummary> = None.into();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"error":"All attempts failed"}"#);
    }

    #[test]
    fn measurement_value_deserializes_untagged() {
        let json = r#"{"avg_time":1.5,"min_time":1.0,"max_time":2.0,"std_dev":0.5,"samples":3}"#;
        let m: Measurement<TimingSummary> = serde_json::from_str(json).unwrap();
        assert_eq!(m.value().map(|t| t.samples), Some(3));

        let failed: Measurement<TimingSummary> =
            serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
        assert!(failed.is_failed());
    }

    #[test]
    fn model_outcome_is_tagged_by_status() {
        let failed = ModelOutcome::Failed {
            error: "probe unavailable".into(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "probe unavailable");
    }

    #[test]
    fn tier_thresholds_are_inclusive_lower_bounds() {
        assert_eq!(Tier::from_score(9.0), Tier::S);
        assert_eq!(Tier::from_score(8.99), Tier::A);
        assert_eq!(Tier::from_score(8.0), Tier::A);
        assert_eq!(Tier::from_score(7.0), Tier::B);
        assert_eq!(Tier::from_score(6.0), Tier::C);
        assert_eq!(Tier::from_score(5.99), Tier::D);
        assert_eq!(Tier::from_score(0.0), Tier::D);
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let outcome = InvocationOutcome {
            succeeded: true,
            elapsed_secs: 0.1,
            output: "λλλabc".into(),
            error: String::new(),
            output_len: 6,
        };
        assert_eq!(outcome.excerpt(2), "λλ");
        assert_eq!(outcome.excerpt(100), "λλλabc");
        assert_eq!(outcome.excerpt(0), "");
    }

    #[test]
    fn timeout_and_not_run_outcomes_follow_conventions() {
        let t = InvocationOutcome::timed_out(30.0);
        assert!(!t.succeeded);
        assert_eq!(t.elapsed_secs, 30.0);
        assert_eq!(t.error, TIMEOUT_MARKER);

        let n = InvocationOutcome::not_run("No such file or directory");
        assert_eq!(n.elapsed_secs, -1.0);
        assert_eq!(n.output_len, 0);
    }

    #[test]
    fn config_file_parses_from_toml() {
        let src = r#"
models = ["qwen2.5-0.5b", "qwen3-4b"]

[defaults]
program = "./scmd"
timeout = "20s"

[env]
no_autostart = true

[criteria]
memory_limit_mb = 2048.0

[plan]
warm_repeats = 2
"#;
        let cfg: ConfigFile = toml::from_str(src).unwrap();
        assert_eq!(cfg.models.as_ref().map(Vec::len), Some(2));
        assert_eq!(cfg.defaults.program.as_deref(), Some("./scmd"));
        assert_eq!(cfg.env.no_autostart, Some(true));
        assert_eq!(cfg.criteria.memory_limit_mb, Some(2048.0));
        assert_eq!(cfg.plan.warm_repeats, Some(2));
    }

    #[test]
    fn config_file_rejects_unknown_keys() {
        let src = "[defaults]\nprogramme = \"scmd\"\n";
        assert!(toml::from_str::<ConfigFile>(src).is_err());
    }
}
