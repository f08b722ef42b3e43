//! Text renderers. Everything here is derived from the result structures alone.

use modelbench_types::{BenchmarkResults, Measurement, ModelOutcome, ModelReport, QuickResults};

pub fn render_markdown(results: &BenchmarkResults) -> String {
    let mut out = String::new();

    out.push_str("# Model Benchmark Results\n\n");
    out.push_str(&format!(
        "Run `{}` started {}, finished {}.\n\n",
        results.run.id, results.run.started_at, results.run.ended_at
    ));
    out.push_str(&format!("Program: `{}`\n", command_line(results)));

    out.push_str("\n## Executive Summary\n\n");
    match &results.recommendation {
        Some(rec) => {
            out.push_str(&format!(
                "**Recommended Model**: {} (Tier {}, Score: {:.2}/10)\n",
                rec.model, rec.tier, rec.overall_score
            ));
            if rec.meets_criteria {
                out.push_str("\n✅ Meets all selection criteria.\n");
            } else {
                out.push_str(
                    "\n⚠️ No model met every selection criterion; this is the best overall score.\n",
                );
            }
            if !rec.notes.is_empty() {
                out.push_str("\n**Notes**:\n");
                for note in &rec.notes {
                    out.push_str(&format!("- {note}\n"));
                }
            }
        }
        None => out.push_str("No model produced usable scores.\n"),
    }

    out.push_str("\n## Model Comparison\n\n");
    out.push_str(
        "| Model | Tier | Overall | Performance | Quality | Reliability | Avg Response Time | Memory |\n",
    );
    out.push_str("|---|---|---:|---:|---:|---:|---:|---:|\n");
    for (name, outcome) in &results.models {
        let Some(report) = outcome.report() else {
            continue;
        };
        let avg_time = results
            .comparison
            .response_times
            .get(name)
            .map(|t| format!("{t:.2}s"))
            .unwrap_or_else(|| "N/A".to_string());
        let memory = results
            .comparison
            .resource_usage
            .get(name)
            .map(|m| format!("{m:.0}MB"))
            .unwrap_or_else(|| "N/A".to_string());
        let s = &report.scores;
        out.push_str(&format!(
            "| {name} | {tier} | {o:.2} | {p:.2} | {q:.2} | {r:.2} | {avg_time} | {memory} |\n",
            tier = report.tier,
            o = s.overall,
            p = s.performance,
            q = s.quality,
            r = s.reliability,
        ));
    }

    out.push_str("\n## Detailed Results\n");
    for (name, outcome) in &results.models {
        out.push_str(&format!("\n### {name}\n"));
        match outcome {
            ModelOutcome::Failed { error } => {
                out.push_str(&format!("\n**Error**: {error}\n"));
            }
            ModelOutcome::Completed(report) => render_details(&mut out, report),
        }
    }

    out
}

fn render_details(out: &mut String, report: &ModelReport) {
    let perf = &report.performance;
    out.push_str("\n**Performance**:\n");
    out.push_str(&format!(
        "- cold start: {}\n",
        if perf.cold_start.succeeded {
            format!("{:.2}s", perf.cold_start.time_secs)
        } else {
            "failed".to_string()
        }
    ));
    for (bucket, timing) in &perf.warm_queries {
        match timing {
            Measurement::Value(t) => out.push_str(&format!(
                "- {bucket}: {:.2}s avg ({:.2}-{:.2}s, n={})\n",
                t.avg_time, t.min_time, t.max_time, t.samples
            )),
            Measurement::Failed { error } => out.push_str(&format!("- {bucket}: {error}\n")),
        }
    }
    if let Some(t) = perf.throughput.value() {
        out.push_str(&format!(
            "- throughput: {:.1} tokens/s (estimated)\n",
            t.tokens_per_second
        ));
    }

    out.push_str("\n**Quality**:\n");
    if let Some(q) = report.quality.code_explanation.value() {
        out.push_str(&format!(
            "- Code Explanation: {:.1}/10 ({} samples)\n",
            q.avg_score, q.samples_tested
        ));
    }
    if let Some(q) = report.quality.question_answering.value() {
        out.push_str(&format!(
            "- Q&A: {:.1}/10 ({} samples)\n",
            q.avg_score, q.samples_tested
        ));
    }

    let mem = &report.resources.memory;
    out.push_str("\n**Resources**:\n");
    out.push_str(&format!(
        "- Peak memory: {:.0}MB (+{:.0}MB over baseline)\n",
        mem.peak_mb, mem.delta_mb
    ));
    if let Some(cpu) = report.resources.cpu.value() {
        out.push_str(&format!(
            "- CPU: {:.0}% avg, {:.0}% max\n",
            cpu.avg_percent, cpu.max_percent
        ));
    }

    let rel = &report.reliability;
    out.push_str("\n**Reliability**:\n");
    out.push_str(&format!(
        "- Stability: {:.0}% success rate\n",
        rel.stability.success_rate * 100.0
    ));
    if let Some(c) = rel.consistency.value() {
        out.push_str(&format!(
            "- Consistency: {:.2} similarity\n",
            c.avg_similarity
        ));
    }
    if !rel.edge_cases.is_empty() {
        let handled = rel.edge_cases.values().filter(|e| e.handled).count();
        out.push_str(&format!(
            "- Edge cases: {handled}/{} handled\n",
            rel.edge_cases.len()
        ));
    }
}

fn command_line(results: &BenchmarkResults) -> String {
    std::iter::once(results.program.program.as_str())
        .chain(results.program.args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Short terminal summary: the recommendation and its considerations.
pub fn render_summary(results: &BenchmarkResults) -> String {
    let mut out = String::new();

    let failed = results
        .models
        .values()
        .filter(|o| matches!(o, ModelOutcome::Failed { .. }))
        .count();
    out.push_str(&format!(
        "Benchmarked {} model(s), {} failed.\n",
        results.models.len(),
        failed
    ));

    match &results.recommendation {
        Some(rec) => {
            out.push_str(&format!("\nRecommended Model: {}\n", rec.model));
            out.push_str(&format!(
                "Overall Score: {:.2}/10 (Tier {})\n",
                rec.overall_score, rec.tier
            ));
            if !rec.meets_criteria {
                out.push_str("Does not meet every selection criterion.\n");
            }
            if !rec.notes.is_empty() {
                out.push_str("\nConsiderations:\n");
                for note in &rec.notes {
                    out.push_str(&format!("  - {note}\n"));
                }
            }
        }
        None => out.push_str("\nNo recommendation: no model produced usable scores.\n"),
    }

    out
}

pub fn render_quick_summary(results: &QuickResults) -> String {
    let mut out = String::new();

    match &results.best {
        Some(best) => {
            out.push_str(&format!("Best Model: {}\n", best.model));
            out.push_str(&format!(
                "Average Response Time: {:.2} seconds\n",
                best.avg_time
            ));
            let targets = results
                .models
                .get(&best.model)
                .and_then(|m| m.targets.as_ref());
            match targets {
                Some(t) if t.meets_target => {
                    out.push_str(&format!("✅ Meets <{}s target\n", t.target_secs));
                }
                Some(t) if t.meets_max => {
                    out.push_str(&format!("⚠️ Meets <{}s limit (acceptable)\n", t.max_secs));
                }
                _ => out.push_str("❌ Does not meet performance targets\n"),
            }
        }
        None => out.push_str("No model completed a successful run.\n"),
    }

    out.push_str("\nDetailed Results:\n");
    for (name, model) in &results.models {
        out.push_str(&format!("\n{name}:\n"));
        for (bucket, b) in &model.tests {
            match b.timing.value() {
                Some(t) => out.push_str(&format!(
                    "  {bucket}: {:.2}s (success rate: {:.0}%)\n",
                    t.avg_time,
                    b.success_rate * 100.0
                )),
                None => out.push_str(&format!("  {bucket}: FAILED\n")),
            }
        }
    }

    out
}
