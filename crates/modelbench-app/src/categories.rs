//! The four category runners: performance, quality, resources, reliability.
//!
//! Each runner drives the invoker across a fixed battery for one configuration. Failed
//! invocations are excluded from averages; a battery with no successes yields an explicit
//! [`Measurement::Failed`] instead of a made-up number.

use crate::catalog::{
    CODE_SAMPLES, CONSISTENCY_PROMPT, EDGE_CASES, MEDIUM_PROMPT, QUESTIONS, SIZE_PROMPTS,
    SMALL_PROMPT, stability_prompt,
};
use crate::config::{MonitorSettings, TestPlan};
use crate::invoker::Invoker;
use modelbench_adapters::{AdapterError, ProcessProbe, ProcessRunner, ResourceSampler};
use modelbench_domain::{QualityScorer, SimilarityScorer, aggregate_outcomes, mean};
use modelbench_types::{
    ColdStart, Consistency, CpuUsage, EdgeCaseOutcome, Measurement, MemoryUsage,
    PerformanceResult, QualityResult, QualitySummary, ReliabilityResult, ResourceResult,
    Stability, Throughput,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum CategoryError {
    #[error("resource baseline unavailable")]
    Baseline(#[source] AdapterError),
}

/// Knobs the runners share, resolved from settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerSettings {
    pub plan: TestPlan,

    /// Only this many leading characters of an output are scored or compared.
    pub analysis_chars: usize,

    /// Characters per token for the throughput estimate.
    pub chars_per_token: f64,

    pub monitor: MonitorSettings,
}

pub struct CategoryRunner<'a, R: ProcessRunner + ?Sized, P: ProcessProbe + ?Sized> {
    invoker: &'a Invoker<'a, R>,
    probe: &'a P,
    quality: &'a dyn QualityScorer,
    similarity: &'a dyn SimilarityScorer,
    settings: RunnerSettings,
}

impl<'a, R: ProcessRunner + ?Sized, P: ProcessProbe + ?Sized> CategoryRunner<'a, R, P> {
    pub fn new(
        invoker: &'a Invoker<'a, R>,
        probe: &'a P,
        quality: &'a dyn QualityScorer,
        similarity: &'a dyn SimilarityScorer,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            invoker,
            probe,
            quality,
            similarity,
            settings,
        }
    }

    pub fn performance(&self, model: &str) -> PerformanceResult {
        info!(model, "performance");

        let cold = self.invoker.invoke(model, SMALL_PROMPT.text);
        let cold_start = ColdStart {
            time_secs: cold.elapsed_secs,
            succeeded: cold.succeeded,
        };

        let mut warm_queries = BTreeMap::new();
        for case in SIZE_PROMPTS {
            let outcomes: Vec<_> = (0..self.settings.plan.warm_repeats)
                .map(|_| self.invoker.invoke(model, case.text))
                .collect();
            let summary = aggregate_outcomes(&outcomes);
            if summary.is_failed() {
                warn!(model, bucket = case.name, "all warm attempts failed");
            }
            warm_queries.insert(case.name.to_string(), summary);
        }

        let throughput = self.throughput(model);

        PerformanceResult {
            cold_start,
            warm_queries,
            throughput,
        }
    }

    fn throughput(&self, model: &str) -> Measurement<Throughput> {
        let prompt = MEDIUM_PROMPT.text;
        let outcome = self.invoker.invoke(model, prompt);
        if !outcome.succeeded {
            return Measurement::failed(outcome.error);
        }

        let cpt = self.settings.chars_per_token;
        let input_tokens = prompt.chars().count() as f64 / cpt;
        let output_tokens = outcome.output_len as f64 / cpt;
        let tokens_per_second = if outcome.elapsed_secs > 0.0 {
            (input_tokens + output_tokens) / outcome.elapsed_secs
        } else {
            0.0
        };

        Measurement::Value(Throughput {
            tokens_per_second,
            input_tokens,
            output_tokens,
            time_secs: outcome.elapsed_secs,
        })
    }

    pub fn quality(&self, model: &str) -> QualityResult {
        info!(model, "quality");
        let chars = self.settings.analysis_chars;

        let explanation_scores: Vec<f64> = CODE_SAMPLES
            .iter()
            .take(self.settings.plan.explanation_samples)
            .filter_map(|sample| {
                let outcome = self.invoker.invoke(model, &sample.explain_prompt());
                outcome
                    .succeeded
                    .then(|| self.quality.score_explanation(outcome.excerpt(chars), sample.code))
            })
            .collect();

        let answer_scores: Vec<f64> = QUESTIONS
            .iter()
            .take(self.settings.plan.question_samples)
            .filter_map(|question| {
                let outcome = self.invoker.invoke(model, question);
                outcome
                    .succeeded
                    .then(|| self.quality.score_answer(outcome.excerpt(chars), question))
            })
            .collect();

        QualityResult {
            code_explanation: quality_summary(&explanation_scores),
            question_answering: quality_summary(&answer_scores),
        }
    }

    /// One monitored invocation of the medium prompt.
    ///
    /// The only runner that can fail as a whole: without a baseline reading there is
    /// nothing to measure memory against.
    pub fn resources(&self, model: &str) -> Result<ResourceResult, CategoryError> {
        info!(model, "resources");
        let monitor = self.settings.monitor;

        let mut sampler =
            ResourceSampler::with_baseline(self.probe, monitor.poll_interval, monitor.ceiling)
                .map_err(CategoryError::Baseline)?;

        let outcome = self.invoker.invoke_observed(
            model,
            MEDIUM_PROMPT.text,
            monitor.invocation_timeout(),
            &mut sampler,
        );
        if !outcome.succeeded {
            warn!(model, error = %outcome.error, "monitored invocation did not succeed");
        }

        let summary = sampler.finish();
        debug!(model, ticks = summary.ticks, "resource sampling done");

        let cpu = match (summary.avg_cpu_percent, summary.max_cpu_percent) {
            (Some(avg_percent), Some(max_percent)) => Measurement::Value(CpuUsage {
                avg_percent,
                max_percent,
            }),
            _ => Measurement::failed("no CPU samples collected"),
        };

        Ok(ResourceResult {
            memory: MemoryUsage {
                initial_mb: summary.initial_mb,
                peak_mb: summary.peak_memory_mb,
                delta_mb: summary.peak_memory_mb - summary.initial_mb,
            },
            cpu,
        })
    }

    pub fn reliability(&self, model: &str) -> ReliabilityResult {
        info!(model, "reliability");
        let plan = self.settings.plan;

        let responses: Vec<String> = (0..plan.consistency_runs)
            .map(|_| self.invoker.invoke(model, CONSISTENCY_PROMPT))
            .filter(|o| o.succeeded)
            .map(|o| o.excerpt(self.settings.analysis_chars).to_string())
            .collect();

        let similarities: Vec<f64> = responses
            .windows(2)
            .map(|pair| self.similarity.similarity(&pair[0], &pair[1]))
            .collect();

        let consistency = match mean(&similarities) {
            Some(avg_similarity) => Measurement::Value(Consistency {
                avg_similarity,
                runs: responses.len() as u32,
            }),
            None => Measurement::failed(format!(
                "{} successful runs, need at least 2",
                responses.len()
            )),
        };

        let edge_cases = EDGE_CASES
            .iter()
            .map(|case| {
                let outcome = self.invoker.invoke(model, case.text);
                let record = EdgeCaseOutcome {
                    handled: outcome.succeeded,
                    time_secs: outcome.succeeded.then_some(outcome.elapsed_secs),
                };
                (case.name.to_string(), record)
            })
            .collect();

        let successful_runs = (0..plan.stability_runs)
            .filter(|i| self.invoker.invoke(model, &stability_prompt(*i)).succeeded)
            .count() as u32;
        let success_rate = if plan.stability_runs == 0 {
            0.0
        } else {
            f64::from(successful_runs) / f64::from(plan.stability_runs)
        };

        ReliabilityResult {
            consistency,
            edge_cases,
            stability: Stability {
                success_rate,
                successful_runs,
                total_runs: plan.stability_runs,
            },
        }
    }
}

fn quality_summary(scores: &[f64]) -> Measurement<QualitySummary> {
    mean(scores)
        .map(|avg_score| QualitySummary {
            avg_score,
            samples_tested: scores.len() as u32,
        })
        .into()
}
