//! Workspace integration tests: the real app and domain crates wired to scripted adapters.
//!
//! Each fake model gets its own pid, so the probe can report memory per model.

use modelbench_adapters::{
    AdapterError, CommandSpec, HostProbe, ProcessObserver, ProcessProbe, ProcessReading,
    ProcessRunner, RunResult,
};
use modelbench_app::{
    BenchSettings, BenchmarkUseCase, Clock, QuickUseCase, SettingsOverrides, parse_config,
    render_markdown, resolve_settings,
};
use modelbench_types::{BenchmarkResults, HostInfo, ModelOutcome, Tier, ToolInfo};
use std::path::PathBuf;
use std::time::Duration;

const REPLY: &[u8] = b"This function returns a value.\nThe loop checks a condition.";

struct Model {
    name: &'static str,
    pid: u32,
    latency: Option<Duration>,
    rss_mb: f64,
}

const MODELS: [Model; 3] = [
    Model {
        name: "hungry",
        pid: 101,
        latency: Some(Duration::from_millis(500)),
        rss_mb: 6000.0,
    },
    Model {
        name: "lean",
        pid: 102,
        latency: Some(Duration::from_millis(1500)),
        rss_mb: 800.0,
    },
    Model {
        name: "flaky",
        pid: 103,
        latency: None,
        rss_mb: 50.0,
    },
];

fn model_for(spec: &CommandSpec) -> Option<&'static Model> {
    let name = spec
        .env
        .iter()
        .find(|(k, _)| k == "SCMD_MODEL")
        .map(|(_, v)| v.as_str())?;
    MODELS.iter().find(|m| m.name == name)
}

struct ScriptedRunner;

impl ProcessRunner for ScriptedRunner {
    fn run_observed(
        &self,
        spec: &CommandSpec,
        observer: &mut dyn ProcessObserver,
    ) -> Result<RunResult, AdapterError> {
        let model = model_for(spec)
            .ok_or_else(|| AdapterError::Other(anyhow::anyhow!("unknown model")))?;
        observer.on_poll(model.pid);

        Ok(match model.latency {
            Some(wall) => RunResult {
                wall,
                exit_code: 0,
                timed_out: false,
                max_rss_kb: None,
                stdout: REPLY.to_vec(),
                stderr: Vec::new(),
            },
            None => RunResult {
                wall: Duration::from_millis(20),
                exit_code: 1,
                timed_out: false,
                max_rss_kb: None,
                stdout: Vec::new(),
                stderr: b"model failed to load\n".to_vec(),
            },
        })
    }

    fn locate(&self, program: &str) -> Result<PathBuf, AdapterError> {
        Ok(PathBuf::from("/opt/bin").join(program))
    }
}

struct PidProbe;

impl ProcessProbe for PidProbe {
    fn self_rss_mb(&self) -> Result<f64, AdapterError> {
        Ok(30.0)
    }

    fn sample(&self, pid: u32) -> Option<ProcessReading> {
        MODELS.iter().find(|m| m.pid == pid).map(|m| ProcessReading {
            rss_mb: m.rss_mb,
            cpu_percent: Some(50.0),
        })
    }
}

struct TestHost;

impl HostProbe for TestHost {
    fn probe(&self) -> HostInfo {
        HostInfo {
            os: "linux".into(),
            arch: "aarch64".into(),
            hostname: None,
            cpu_count: Some(4),
        }
    }
}

struct TestClock;

impl Clock for TestClock {
    fn now_rfc3339(&self) -> String {
        "2026-05-01T12:00:00Z".into()
    }
}

fn tool() -> ToolInfo {
    ToolInfo {
        name: "modelbench".into(),
        version: "test".into(),
    }
}

fn settings(config: &str) -> anyhow::Result<BenchSettings> {
    let file = parse_config(config)?;
    Ok(resolve_settings(&file, &SettingsOverrides::default())?)
}

const CONFIG: &str = r#"
models = ["hungry", "lean", "flaky"]

[defaults]
program = "scmd"
command = "explain -"

[plan]
warm_repeats = 2
explanation_samples = 2
question_samples = 2
consistency_runs = 3
stability_runs = 4
"#;

fn run(config: &str) -> anyhow::Result<BenchmarkResults> {
    BenchmarkUseCase::new(ScriptedRunner, PidProbe, TestHost, TestClock, tool())
        .execute(&settings(config)?)
}

#[test]
fn memory_limit_overrides_a_higher_overall_score() -> anyhow::Result<()> {
    let results = run(CONFIG)?;

    let hungry = results.models["hungry"].report().expect("hungry completed");
    let lean = results.models["lean"].report().expect("lean completed");
    assert!(hungry.scores.overall > lean.scores.overall);
    assert_eq!(hungry.resources.memory.peak_mb, 6000.0);

    let rec = results.recommendation.as_ref().expect("recommendation");
    assert_eq!(rec.model, "lean");
    assert!(rec.meets_criteria);
    assert_eq!(results.comparison.resource_usage["hungry"], 6000.0);
    Ok(())
}

#[test]
fn failing_model_is_scored_not_dropped() -> anyhow::Result<()> {
    let results = run(CONFIG)?;

    let flaky = match &results.models["flaky"] {
        ModelOutcome::Completed(report) => report,
        ModelOutcome::Failed { error } => panic!("flaky should complete with markers: {error}"),
    };
    assert!(flaky.performance.warm_queries.values().all(|m| m.is_failed()));
    assert!(!flaky.performance.cold_start.succeeded);
    assert_eq!(flaky.reliability.stability.total_runs, 4);
    assert_eq!(flaky.reliability.stability.successful_runs, 0);
    assert_eq!(flaky.scores.performance, 0.0);
    assert_eq!(flaky.tier, Tier::D);

    // No warm timings, so it has no response time column.
    assert!(!results.comparison.response_times.contains_key("flaky"));
    Ok(())
}

#[test]
fn strict_memory_limit_falls_back_to_best_overall() -> anyhow::Result<()> {
    let results = run(&format!("{CONFIG}\n[criteria]\nmemory_limit_mb = 100.0\n"))?;

    let rec = results.recommendation.as_ref().expect("recommendation");
    assert_eq!(rec.model, "hungry");
    assert!(!rec.meets_criteria);
    assert!(
        rec.notes.iter().any(|n| n.starts_with("Memory 6000MB exceeds")),
        "notes: {:?}",
        rec.notes
    );
    Ok(())
}

#[test]
fn results_round_trip_through_json_and_render() -> anyhow::Result<()> {
    let results = run(CONFIG)?;

    let json = serde_json::to_string_pretty(&results)?;
    let back: BenchmarkResults = serde_json::from_str(&json)?;
    assert_eq!(back.models.keys().collect::<Vec<_>>(), ["flaky", "hungry", "lean"]);
    assert_eq!(back.recommendation.map(|r| r.model), Some("lean".to_string()));

    let value: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(value["run"]["host"]["cpu_count"], 4);
    assert_eq!(value["program"]["args"], serde_json::json!(["explain", "-"]));
    assert_eq!(
        value["models"]["flaky"]["quality"]["code_explanation"]["error"],
        "All attempts failed"
    );

    let md = render_markdown(&results);
    assert!(md.contains("**Recommended Model**: lean"));
    assert!(md.contains("Program: `scmd explain -`"));
    Ok(())
}

#[test]
fn quick_mode_ranks_by_latency() -> anyhow::Result<()> {
    let quick = QuickUseCase::new(ScriptedRunner, TestHost, TestClock, tool())
        .execute(&settings(CONFIG)?)?;

    let best = quick.best.as_ref().expect("best model");
    assert_eq!(best.model, "hungry");
    assert!((best.avg_time - 0.5).abs() < 1e-9);

    let lean = quick.models["lean"].targets.as_ref().expect("lean targets");
    assert!(lean.meets_target);

    assert!(quick.models["flaky"].targets.is_none());
    Ok(())
}
