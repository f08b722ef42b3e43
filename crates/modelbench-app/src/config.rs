//! Resolution of `modelbench.toml` plus command-line overrides into [`BenchSettings`].
//!
//! Precedence: CLI override, then file value, then built-in default.

use crate::invoker::EnvBinding;
use modelbench_domain::SelectionCriteria;
use modelbench_types::{ConfigFile, CriteriaConfig, PlanConfig};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PROGRAM: &str = "scmd";
pub const DEFAULT_COMMAND: &str = "explain -";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_OUT_DIR: &str = "modelbench-out";
pub const DEFAULT_OUTPUT_CAP_BYTES: usize = 1024 * 1024;
pub const DEFAULT_ANALYSIS_CHARS: usize = 500;
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MONITOR_CEILING: Duration = Duration::from_secs(10);
pub const DEFAULT_MONITOR_GRACE: Duration = Duration::from_secs(5);

pub const DEFAULT_MODELS: [&str; 4] = ["qwen2.5-1.5b", "qwen2.5-0.5b", "qwen2.5-3b", "qwen3-4b"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("invalid command string {value:?}")]
    InvalidCommand {
        value: String,
        #[source]
        source: shell_words::ParseError,
    },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },

    #[error("no models to benchmark")]
    NoModels,
}

/// How many times each catalog battery is exercised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestPlan {
    pub warm_repeats: u32,
    pub explanation_samples: usize,
    pub question_samples: usize,
    pub consistency_runs: u32,
    pub stability_runs: u32,
}

impl Default for TestPlan {
    fn default() -> Self {
        Self {
            warm_repeats: 3,
            explanation_samples: 2,
            question_samples: 3,
            consistency_runs: 5,
            stability_runs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,

    /// Sampling stops after this long.
    pub ceiling: Duration,

    /// Extra wait for the child after the ceiling before it is killed.
    pub grace: Duration,
}

impl MonitorSettings {
    /// Wall-clock bound for the monitored invocation.
    pub fn invocation_timeout(&self) -> Duration {
        self.ceiling + self.grace
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            ceiling: DEFAULT_MONITOR_CEILING,
            grace: DEFAULT_MONITOR_GRACE,
        }
    }
}

/// Everything a run needs, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchSettings {
    pub program: String,
    pub args: Vec<String>,
    pub models: Vec<String>,
    pub timeout: Duration,
    pub out_dir: PathBuf,
    pub output_cap_bytes: usize,
    pub analysis_chars: usize,
    pub chars_per_token: f64,
    pub monitor: MonitorSettings,
    pub env: EnvBinding,
    pub criteria: SelectionCriteria,
    pub plan: TestPlan,
}

/// Values given on the command line; `None` leaves the file or default in charge.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub program: Option<String>,
    pub command: Option<String>,
    pub models: Vec<String>,
    pub timeout: Option<String>,
    pub out_dir: Option<PathBuf>,
    pub no_autostart: bool,
    pub warm_repeats: Option<u32>,
}

pub fn parse_config(src: &str) -> Result<ConfigFile, ConfigError> {
    Ok(toml::from_str(src)?)
}

pub fn resolve_settings(
    file: &ConfigFile,
    overrides: &SettingsOverrides,
) -> Result<BenchSettings, ConfigError> {
    let d = &file.defaults;

    let program = overrides
        .program
        .clone()
        .or_else(|| d.program.clone())
        .unwrap_or_else(|| DEFAULT_PROGRAM.to_string());
    if program.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "program",
            reason: "must not be empty".to_string(),
        });
    }

    let command = overrides
        .command
        .as_deref()
        .or(d.command.as_deref())
        .unwrap_or(DEFAULT_COMMAND);
    let args = shell_words::split(command).map_err(|source| ConfigError::InvalidCommand {
        value: command.to_string(),
        source,
    })?;

    let models = if !overrides.models.is_empty() {
        overrides.models.clone()
    } else if let Some(models) = &file.models {
        models.clone()
    } else {
        DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
    };
    if models.is_empty() {
        return Err(ConfigError::NoModels);
    }

    let timeout = duration_field(
        "timeout",
        overrides.timeout.as_deref().or(d.timeout.as_deref()),
        DEFAULT_TIMEOUT,
    )?;
    if timeout.is_zero() {
        return Err(ConfigError::InvalidValue {
            field: "timeout",
            reason: "must be greater than zero".to_string(),
        });
    }

    let chars_per_token = d.chars_per_token.unwrap_or(DEFAULT_CHARS_PER_TOKEN);
    if !(chars_per_token.is_finite() && chars_per_token > 0.0) {
        return Err(ConfigError::InvalidValue {
            field: "chars_per_token",
            reason: format!("must be a positive number, got {chars_per_token}"),
        });
    }

    let monitor = MonitorSettings {
        poll_interval: duration_field(
            "poll_interval",
            d.poll_interval.as_deref(),
            DEFAULT_POLL_INTERVAL,
        )?,
        ceiling: duration_field(
            "monitor_ceiling",
            d.monitor_ceiling.as_deref(),
            DEFAULT_MONITOR_CEILING,
        )?,
        grace: duration_field(
            "monitor_grace",
            d.monitor_grace.as_deref(),
            DEFAULT_MONITOR_GRACE,
        )?,
    };

    let mut env = EnvBinding::default();
    if let Some(v) = &file.env.model_var {
        env.model_var = v.clone();
    }
    if let Some(v) = &file.env.quiet_var {
        env.quiet_var = v.clone();
    }
    if let Some(v) = &file.env.no_autostart_var {
        env.no_autostart_var = v.clone();
    }
    env.no_autostart = overrides.no_autostart || file.env.no_autostart.unwrap_or(false);

    let mut plan = resolve_plan(&file.plan);
    if let Some(n) = overrides.warm_repeats {
        plan.warm_repeats = n;
    }
    validate_plan(&plan)?;

    Ok(BenchSettings {
        program,
        args,
        models,
        timeout,
        out_dir: overrides
            .out_dir
            .clone()
            .or_else(|| d.out_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR)),
        output_cap_bytes: d.output_cap_bytes.unwrap_or(DEFAULT_OUTPUT_CAP_BYTES),
        analysis_chars: d.analysis_chars.unwrap_or(DEFAULT_ANALYSIS_CHARS),
        chars_per_token,
        monitor,
        env,
        criteria: resolve_criteria(&file.criteria),
        plan,
    })
}

pub fn resolve_criteria(c: &CriteriaConfig) -> SelectionCriteria {
    let d = SelectionCriteria::default();
    SelectionCriteria {
        target_response_secs: c.target_response_secs.unwrap_or(d.target_response_secs),
        max_response_secs: c.max_response_secs.unwrap_or(d.max_response_secs),
        target_quality_pct: c.target_quality_pct.unwrap_or(d.target_quality_pct),
        min_quality_pct: c.min_quality_pct.unwrap_or(d.min_quality_pct),
        memory_limit_mb: c.memory_limit_mb.unwrap_or(d.memory_limit_mb),
    }
}

fn resolve_plan(p: &PlanConfig) -> TestPlan {
    let d = TestPlan::default();
    TestPlan {
        warm_repeats: p.warm_repeats.unwrap_or(d.warm_repeats),
        explanation_samples: p.explanation_samples.unwrap_or(d.explanation_samples),
        question_samples: p.question_samples.unwrap_or(d.question_samples),
        consistency_runs: p.consistency_runs.unwrap_or(d.consistency_runs),
        stability_runs: p.stability_runs.unwrap_or(d.stability_runs),
    }
}

/// Every count must be positive; consistency needs two runs to compare.
fn validate_plan(plan: &TestPlan) -> Result<(), ConfigError> {
    let counts: [(&'static str, usize, usize); 5] = [
        ("warm_repeats", plan.warm_repeats as usize, 1),
        ("explanation_samples", plan.explanation_samples, 1),
        ("question_samples", plan.question_samples, 1),
        ("consistency_runs", plan.consistency_runs as usize, 2),
        ("stability_runs", plan.stability_runs as usize, 1),
    ];

    for (field, value, min) in counts {
        if value < min {
            return Err(ConfigError::InvalidValue {
                field,
                reason: format!("must be at least {min}, got {value}"),
            });
        }
    }
    Ok(())
}

fn duration_field(
    field: &'static str,
    value: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(s) => humantime::parse_duration(s).map_err(|source| ConfigError::InvalidDuration {
            field,
            value: s.to_string(),
            source,
        }),
    }
}
