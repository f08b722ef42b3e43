//! Application layer for modelbench.
//!
//! The app layer coordinates adapters and domain logic.
//! It does not parse CLI flags and it does not do filesystem I/O.

pub mod catalog;
mod categories;
mod config;
mod invoker;
mod quick;
mod report;

pub use categories::{CategoryError, CategoryRunner, RunnerSettings};
pub use config::{
    BenchSettings, ConfigError, DEFAULT_MODELS, MonitorSettings, SettingsOverrides, TestPlan,
    parse_config, resolve_criteria, resolve_settings,
};
pub use invoker::{EnvBinding, Invoker};
pub use quick::QuickUseCase;
pub use report::{render_markdown, render_quick_summary, render_summary};

use anyhow::Context;
use modelbench_adapters::{HostProbe, ProcessProbe, ProcessRunner};
use modelbench_domain::{
    HeuristicScorer, QualityScorer, SimilarityScorer, TokenJaccard, comparison_matrix, compose,
    recommend,
};
use modelbench_types::{
    BenchmarkResults, ModelOutcome, ModelReport, ProgramMeta, RESULTS_SCHEMA_V1, RunMeta, Tier,
    ToolInfo,
};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub trait Clock: Send + Sync {
    fn now_rfc3339(&self) -> String;
}

#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_rfc3339(&self) -> String {
        use time::format_description::well_known::Rfc3339;
        time::OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}

/// The program and its fixed arguments, resolved once before anything runs.
///
/// A missing program is the only fatal condition of a run.
pub(crate) fn resolve_argv<R: ProcessRunner + ?Sized>(
    runner: &R,
    settings: &BenchSettings,
) -> anyhow::Result<Vec<String>> {
    let located = runner
        .locate(&settings.program)
        .with_context(|| format!("cannot benchmark: {} is not available", settings.program))?;

    let mut argv = Vec::with_capacity(settings.args.len() + 1);
    argv.push(located.to_string_lossy().into_owned());
    argv.extend(settings.args.iter().cloned());
    Ok(argv)
}

pub(crate) fn program_meta(settings: &BenchSettings) -> ProgramMeta {
    ProgramMeta {
        program: settings.program.clone(),
        args: settings.args.clone(),
        timeout_ms: settings.timeout.as_millis() as u64,
    }
}

/// Configurations in run order, with repeats dropped.
pub(crate) fn unique_models(models: &[String]) -> Vec<&str> {
    let mut seen = std::collections::BTreeSet::new();
    models
        .iter()
        .filter(|m| {
            let fresh = seen.insert(m.as_str());
            if !fresh {
                warn!(model = %m, "duplicate model ignored");
            }
            fresh
        })
        .map(String::as_str)
        .collect()
}

/// Full benchmark: every category for every configuration, then scoring and recommendation.
pub struct BenchmarkUseCase<R: ProcessRunner, P: ProcessProbe, H: HostProbe, C: Clock> {
    runner: R,
    probe: P,
    host: H,
    clock: C,
    tool: ToolInfo,
    quality: Box<dyn QualityScorer>,
    similarity: Box<dyn SimilarityScorer>,
}

impl<R: ProcessRunner, P: ProcessProbe, H: HostProbe, C: Clock> BenchmarkUseCase<R, P, H, C> {
    pub fn new(runner: R, probe: P, host: H, clock: C, tool: ToolInfo) -> Self {
        Self {
            runner,
            probe,
            host,
            clock,
            tool,
            quality: Box::new(HeuristicScorer),
            similarity: Box::new(TokenJaccard),
        }
    }

    pub fn with_scorers(
        mut self,
        quality: Box<dyn QualityScorer>,
        similarity: Box<dyn SimilarityScorer>,
    ) -> Self {
        self.quality = quality;
        self.similarity = similarity;
        self
    }

    pub fn execute(&self, settings: &BenchSettings) -> anyhow::Result<BenchmarkResults> {
        let argv = resolve_argv(&self.runner, settings)?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = self.clock.now_rfc3339();
        let host = self.host.probe();

        let invoker = Invoker::new(
            &self.runner,
            argv,
            settings.env.clone(),
            settings.timeout,
            settings.output_cap_bytes,
        );
        let runners = CategoryRunner::new(
            &invoker,
            &self.probe,
            self.quality.as_ref(),
            self.similarity.as_ref(),
            RunnerSettings {
                plan: settings.plan,
                analysis_chars: settings.analysis_chars,
                chars_per_token: settings.chars_per_token,
                monitor: settings.monitor,
            },
        );

        let mut models = BTreeMap::new();
        for model in unique_models(&settings.models) {
            info!(model, "benchmarking");
            let outcome = match benchmark_model(&runners, model) {
                Ok(report) => {
                    info!(
                        model,
                        overall = report.scores.overall,
                        tier = %report.tier,
                        "model scored"
                    );
                    ModelOutcome::Completed(Box::new(report))
                }
                Err(err) => {
                    let error = format!("{:#}", anyhow::Error::from(err));
                    warn!(model, %error, "model excluded from comparison");
                    ModelOutcome::Failed { error }
                }
            };
            models.insert(model.to_string(), outcome);
        }

        let comparison = comparison_matrix(&models);
        let recommendation = recommend(&models, &settings.criteria);

        let ended_at = self.clock.now_rfc3339();

        Ok(BenchmarkResults {
            schema: RESULTS_SCHEMA_V1.to_string(),
            tool: self.tool.clone(),
            run: RunMeta {
                id: run_id,
                started_at,
                ended_at,
                host,
            },
            program: program_meta(settings),
            models,
            comparison,
            recommendation,
        })
    }
}

fn benchmark_model<R: ProcessRunner + ?Sized, P: ProcessProbe + ?Sized>(
    runners: &CategoryRunner<'_, R, P>,
    model: &str,
) -> Result<ModelReport, CategoryError> {
    let performance = runners.performance(model);
    let quality = runners.quality(model);
    let resources = runners.resources(model)?;
    let reliability = runners.reliability(model);

    let scores = compose(&performance, &quality, &reliability);
    let tier = Tier::from_score(scores.overall);

    Ok(ModelReport {
        performance,
        quality,
        resources,
        reliability,
        scores,
        tier,
    })
}
