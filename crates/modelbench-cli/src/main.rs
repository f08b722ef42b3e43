use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use modelbench_adapters::{StdHostProbe, StdProcessRunner, SysinfoProbe};
use modelbench_app::{
    BenchmarkUseCase, QuickUseCase, SettingsOverrides, SystemClock, parse_config,
    render_markdown, render_quick_summary, render_summary, resolve_criteria, resolve_settings,
};
use modelbench_domain::recommend;
use modelbench_types::{BenchmarkResults, ConfigFile, CriteriaConfig, ToolInfo};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;

/// Config file picked up from the working directory when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "modelbench.toml";

/// Exit code when `--fail-on-unmet` is set and the recommendation misses a criterion.
const EXIT_UNMET: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "modelbench",
    version,
    about = "Benchmark model configurations of an LLM command and recommend one"
)]
struct Cli {
    /// Debug-level logs on stderr
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Config file (default: ./modelbench.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// External program to benchmark
    #[arg(long)]
    program: Option<String>,

    /// Arguments after the program, as one shell-quoted string (e.g. "explain -")
    #[arg(long)]
    command: Option<String>,

    /// Model to benchmark. Repeatable; replaces the configured list.
    #[arg(long = "model")]
    models: Vec<String>,

    /// Per-invocation timeout (e.g. "30s")
    #[arg(long)]
    timeout: Option<String>,

    /// Warm repetitions per prompt size
    #[arg(long)]
    repeats: Option<u32>,

    /// Ask the program not to auto-start its background service
    #[arg(long, default_value_t = false)]
    no_autostart: bool,

    /// Output directory for results
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Pretty-print JSON
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

impl RunArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            program: self.program.clone(),
            command: self.command.clone(),
            models: self.models.clone(),
            timeout: self.timeout.clone(),
            out_dir: self.out_dir.clone(),
            no_autostart: self.no_autostart,
            warm_repeats: self.repeats,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full benchmark and write results JSON plus a Markdown report.
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Exit 2 when the recommended model does not meet every criterion
        #[arg(long, default_value_t = false)]
        fail_on_unmet: bool,
    },

    /// Latency-only benchmark across prompt sizes.
    Quick {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Render the Markdown report from a saved results file.
    Md {
        #[arg(long)]
        results: PathBuf,

        /// Output markdown path (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Recompute the recommendation from a saved results file.
    Recommend {
        #[arg(long)]
        results: PathBuf,

        /// Read the [criteria] section from this config file
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        target_response_secs: Option<f64>,

        #[arg(long)]
        max_response_secs: Option<f64>,

        #[arg(long)]
        target_quality_pct: Option<f64>,

        #[arg(long)]
        min_quality_pct: Option<f64>,

        #[arg(long)]
        memory_limit_mb: Option<f64>,

        /// Write the results with the new recommendation to this path
        #[arg(long)]
        out: Option<PathBuf>,

        /// Pretty-print JSON
        #[arg(long, default_value_t = false)]
        pretty: bool,

        /// Exit 2 when the recommended model does not meet every criterion
        #[arg(long, default_value_t = false)]
        fail_on_unmet: bool,
    },
}

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn real_main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.cmd {
        Command::Run {
            args,
            fail_on_unmet,
        } => {
            let config = load_config(args.config.as_deref())?;
            let settings = resolve_settings(&config, &args.overrides())?;

            let usecase = BenchmarkUseCase::new(
                StdProcessRunner,
                SysinfoProbe::default(),
                StdHostProbe,
                SystemClock,
                tool_info(),
            );
            let results = usecase.execute(&settings)?;

            let json_path = settings.out_dir.join("results.json");
            let md_path = settings.out_dir.join("results.md");
            write_json(&json_path, &results, args.pretty)?;
            write_text(&md_path, &render_markdown(&results))?;
            tracing::info!(
                results = %json_path.display(),
                report = %md_path.display(),
                "results saved"
            );

            print!("{}", render_summary(&results));
            Ok(exit_for(&results, fail_on_unmet))
        }

        Command::Quick { args } => {
            let config = load_config(args.config.as_deref())?;
            let settings = resolve_settings(&config, &args.overrides())?;

            let usecase = QuickUseCase::new(StdProcessRunner, StdHostProbe, SystemClock, tool_info());
            let results = usecase.execute(&settings)?;

            let json_path = settings.out_dir.join("quick.json");
            write_json(&json_path, &results, args.pretty)?;
            tracing::info!(results = %json_path.display(), "results saved");

            print!("{}", render_quick_summary(&results));
            Ok(ExitCode::SUCCESS)
        }

        Command::Md { results, out } => {
            let results: BenchmarkResults = read_json(&results)?;
            let md = render_markdown(&results);

            match out {
                Some(path) => write_text(&path, &md)?,
                None => print!("{md}"),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Recommend {
            results,
            config,
            target_response_secs,
            max_response_secs,
            target_quality_pct,
            min_quality_pct,
            memory_limit_mb,
            out,
            pretty,
            fail_on_unmet,
        } => {
            let mut saved: BenchmarkResults = read_json(&results)?;

            let file_criteria = match config {
                Some(path) => load_config(Some(&path))?.criteria,
                None => CriteriaConfig::default(),
            };
            let criteria = resolve_criteria(&CriteriaConfig {
                target_response_secs: target_response_secs.or(file_criteria.target_response_secs),
                max_response_secs: max_response_secs.or(file_criteria.max_response_secs),
                target_quality_pct: target_quality_pct.or(file_criteria.target_quality_pct),
                min_quality_pct: min_quality_pct.or(file_criteria.min_quality_pct),
                memory_limit_mb: memory_limit_mb.or(file_criteria.memory_limit_mb),
            });

            saved.recommendation = recommend(&saved.models, &criteria);

            if let Some(path) = out {
                write_json(&path, &saved, pretty)?;
            }

            print!("{}", render_summary(&saved));
            Ok(exit_for(&saved, fail_on_unmet))
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    // A subscriber may already be installed when embedded; keep the existing one.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn exit_for(results: &BenchmarkResults, fail_on_unmet: bool) -> ExitCode {
    match &results.recommendation {
        Some(rec) if fail_on_unmet && !rec.meets_criteria => ExitCode::from(EXIT_UNMET),
        _ => ExitCode::SUCCESS,
    }
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "modelbench".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// An explicit path must exist; the implicit default is optional.
fn load_config(path: Option<&Path>) -> anyhow::Result<ConfigFile> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                return Ok(ConfigFile::default());
            }
            default
        }
    };

    let src = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let config = parse_config(&src).with_context(|| format!("load {}", path.display()))?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let v =
        serde_json::from_slice(&bytes).with_context(|| format!("parse json {}", path.display()))?;
    Ok(v)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T, pretty: bool) -> anyhow::Result<()> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };

    write_bytes(path, &bytes)
}

fn write_text(path: &Path, text: &str) -> anyhow::Result<()> {
    write_bytes(path, text.as_bytes())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }

    atomic_write(path, bytes)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    use std::io::Write;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = parent.to_path_buf();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4()));

    {
        let mut f =
            fs::File::create(&tmp).with_context(|| format!("create temp {}", tmp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("write temp {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
