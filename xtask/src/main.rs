use anyhow::Context;
use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "xtask", about = "Repo automation for modelbench")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// (Re)generate JSON Schemas for results files and config.
    Schema {
        /// Output directory
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },

    /// Check a saved results file against the generated results schema.
    Validate {
        /// results.json (full run) or quick.json (quick mode)
        file: PathBuf,

        #[arg(long, default_value = "schemas")]
        schema_dir: PathBuf,
    },

    /// Run the "usual" repo checks (fmt, clippy, test, schema).
    Ci,

    /// Run mutation testing via cargo-mutants (must be installed).
    Mutants {
        /// Extra args forwarded to cargo-mutants
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
}

const RESULTS_SCHEMA_FILE: &str = "modelbench.results.v1.schema.json";
const QUICK_SCHEMA_FILE: &str = "modelbench.quick.v1.schema.json";
const CONFIG_SCHEMA_FILE: &str = "modelbench.config.v1.schema.json";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Schema { out_dir } => cmd_schema(&out_dir),
        Command::Validate { file, schema_dir } => cmd_validate(&file, &schema_dir),
        Command::Ci => cmd_ci(),
        Command::Mutants { args } => cmd_mutants(args),
    }
}

fn cmd_ci() -> anyhow::Result<()> {
    run("cargo", ["fmt", "--all", "--", "--check"])?;
    run(
        "cargo",
        ["clippy", "--all-targets", "--all-features", "--", "-D", "warnings"],
    )?;
    run("cargo", ["test", "--all"])?;
    run("cargo", ["run", "-p", "xtask", "--", "schema"])?;
    Ok(())
}

fn cmd_mutants(args: Vec<String>) -> anyhow::Result<()> {
    // Domain scoring is where surviving mutants matter most:
    // `cargo run -p xtask -- mutants -p modelbench-domain`.
    let status = std::process::Command::new("cargo")
        .arg("mutants")
        .args(args)
        .status()
        .context("running cargo mutants")?;
    if !status.success() {
        anyhow::bail!("cargo mutants failed: {status}");
    }
    Ok(())
}

fn run<const N: usize>(bin: &str, args: [&str; N]) -> anyhow::Result<()> {
    let status = std::process::Command::new(bin)
        .args(args)
        .status()
        .with_context(|| format!("running {bin}"))?;
    if !status.success() {
        anyhow::bail!("{bin} failed: {status}");
    }
    Ok(())
}

fn cmd_schema(out_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("create dir {}", out_dir.display()))?;

    write_schema(
        out_dir,
        RESULTS_SCHEMA_FILE,
        schema_for!(modelbench_types::BenchmarkResults),
    )?;
    write_schema(
        out_dir,
        QUICK_SCHEMA_FILE,
        schema_for!(modelbench_types::QuickResults),
    )?;
    write_schema(
        out_dir,
        CONFIG_SCHEMA_FILE,
        schema_for!(modelbench_types::ConfigFile),
    )?;

    Ok(())
}

fn write_schema<T: serde::Serialize>(out_dir: &Path, name: &str, schema: T) -> anyhow::Result<()> {
    let path = out_dir.join(name);
    let json = serde_json::to_vec_pretty(&schema)?;
    fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn cmd_validate(file: &Path, schema_dir: &Path) -> anyhow::Result<()> {
    let instance = read_json(file)?;

    let schema_file = match instance.get("schema").and_then(|s| s.as_str()) {
        Some(modelbench_types::RESULTS_SCHEMA_V1) => RESULTS_SCHEMA_FILE,
        Some(modelbench_types::QUICK_SCHEMA_V1) => QUICK_SCHEMA_FILE,
        Some(other) => anyhow::bail!("{}: unknown schema {other:?}", file.display()),
        None => anyhow::bail!("{}: no \"schema\" field", file.display()),
    };
    let schema = read_json(&schema_dir.join(schema_file))
        .context("schemas missing? run `cargo run -p xtask -- schema` first")?;

    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| anyhow::anyhow!("invalid schema {schema_file}: {e}"))?;

    let errors: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| format!("{}: {e}", e.instance_path))
        .collect();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  {e}");
        }
        anyhow::bail!("{} does not match {schema_file}", file.display());
    }

    println!("{}: ok ({schema_file})", file.display());
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse json {}", path.display()))
}
