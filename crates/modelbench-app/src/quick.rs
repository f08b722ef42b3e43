//! Latency-only benchmark: prompt-size buckets, no quality or resource battery.

use crate::catalog::QUICK_PROMPTS;
use crate::invoker::Invoker;
use crate::{BenchSettings, Clock, program_meta, resolve_argv, unique_models};
use modelbench_adapters::{HostProbe, ProcessRunner};
use modelbench_domain::{aggregate_outcomes, mean};
use modelbench_types::{
    QUICK_SCHEMA_V1, QuickBest, QuickBucket, QuickModelResult, QuickResults, QuickTargets,
    RunMeta, ToolInfo,
};
use std::collections::BTreeMap;
use tracing::info;

pub struct QuickUseCase<R: ProcessRunner, H: HostProbe, C: Clock> {
    runner: R,
    host: H,
    clock: C,
    tool: ToolInfo,
}

impl<R: ProcessRunner, H: HostProbe, C: Clock> QuickUseCase<R, H, C> {
    pub fn new(runner: R, host: H, clock: C, tool: ToolInfo) -> Self {
        Self {
            runner,
            host,
            clock,
            tool,
        }
    }

    pub fn execute(&self, settings: &BenchSettings) -> anyhow::Result<QuickResults> {
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
        let repeats = settings.plan.warm_repeats;

        let mut models = BTreeMap::new();
        for model in unique_models(&settings.models) {
            info!(model, "quick latency test");

            let mut tests = BTreeMap::new();
            for case in QUICK_PROMPTS {
                let outcomes: Vec<_> = (0..repeats)
                    .map(|_| invoker.invoke(model, case.text))
                    .collect();

                let lengths: Vec<f64> = outcomes
                    .iter()
                    .filter(|o| o.succeeded)
                    .map(|o| o.output_len as f64)
                    .collect();
                let success_rate = if repeats == 0 {
                    0.0
                } else {
                    lengths.len() as f64 / f64::from(repeats)
                };

                tests.insert(
                    case.name.to_string(),
                    QuickBucket {
                        timing: aggregate_outcomes(&outcomes),
                        success_rate,
                        avg_output_length: mean(&lengths),
                    },
                );
            }

            let bucket_means: Vec<f64> = tests
                .values()
                .filter_map(|b: &QuickBucket| b.timing.value().map(|t| t.avg_time))
                .collect();
            let targets = mean(&bucket_means).map(|overall_avg_time| QuickTargets {
                overall_avg_time,
                target_secs: settings.criteria.target_response_secs,
                max_secs: settings.criteria.max_response_secs,
                meets_target: overall_avg_time < settings.criteria.target_response_secs,
                meets_max: overall_avg_time < settings.criteria.max_response_secs,
            });

            models.insert(model.to_string(), QuickModelResult { tests, targets });
        }

        let best = fastest(&models);
        let ended_at = self.clock.now_rfc3339();

        Ok(QuickResults {
            schema: QUICK_SCHEMA_V1.to_string(),
            tool: self.tool.clone(),
            run: RunMeta {
                id: run_id,
                started_at,
                ended_at,
                host,
            },
            program: program_meta(settings),
            models,
            best,
        })
    }
}

/// Lowest overall average wins; ties keep name order.
fn fastest(models: &BTreeMap<String, QuickModelResult>) -> Option<QuickBest> {
    models
        .iter()
        .filter_map(|(name, r)| r.targets.as_ref().map(|t| (name, t.overall_avg_time)))
        .fold(None, |best: Option<(&String, f64)>, (name, avg)| match best {
            Some((_, b)) if b <= avg => best,
            _ => Some((name, avg)),
        })
        .map(|(name, avg_time)| QuickBest {
            model: name.clone(),
            avg_time,
        })
}
