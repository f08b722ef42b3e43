//! One spawn-feed-capture cycle against the external program.
//!
//! The configuration ("model") is an explicit argument; nothing here reads or mutates
//! the harness's own environment.

use modelbench_adapters::{CommandSpec, NoopObserver, ProcessObserver, ProcessRunner};
use modelbench_types::InvocationOutcome;
use std::time::Duration;
use tracing::{debug, warn};

/// Names of the environment variables the external program reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvBinding {
    pub model_var: String,
    pub quiet_var: String,
    pub no_autostart_var: String,
    pub no_autostart: bool,
}

impl Default for EnvBinding {
    fn default() -> Self {
        Self {
            model_var: "SCMD_MODEL".to_string(),
            quiet_var: "SCMD_QUIET".to_string(),
            no_autostart_var: "SCMD_NO_AUTOSTART".to_string(),
            no_autostart: false,
        }
    }
}

impl EnvBinding {
    pub fn vars_for(&self, model: &str) -> Vec<(String, String)> {
        let mut vars = vec![
            (self.model_var.clone(), model.to_string()),
            (self.quiet_var.clone(), "1".to_string()),
        ];
        if self.no_autostart {
            vars.push((self.no_autostart_var.clone(), "1".to_string()));
        }
        vars
    }
}

pub struct Invoker<'r, R: ProcessRunner + ?Sized> {
    runner: &'r R,
    argv: Vec<String>,
    env: EnvBinding,
    timeout: Duration,
    output_cap_bytes: usize,
}

impl<'r, R: ProcessRunner + ?Sized> Invoker<'r, R> {
    /// `argv` is the program followed by its fixed arguments (e.g. `scmd explain -`).
    pub fn new(
        runner: &'r R,
        argv: Vec<String>,
        env: EnvBinding,
        timeout: Duration,
        output_cap_bytes: usize,
    ) -> Self {
        Self {
            runner,
            argv,
            env,
            timeout,
            output_cap_bytes,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn invoke(&self, model: &str, input: &str) -> InvocationOutcome {
        self.invoke_observed(model, input, self.timeout, &mut NoopObserver)
    }

    /// Invoke with an explicit bound, letting `observer` watch the child while it runs.
    ///
    /// Never fails: timeouts, spawn errors and non-zero exits all become an unsuccessful
    /// [`InvocationOutcome`]. No retries.
    pub fn invoke_observed(
        &self,
        model: &str,
        input: &str,
        timeout: Duration,
        observer: &mut dyn ProcessObserver,
    ) -> InvocationOutcome {
        let spec = CommandSpec {
            argv: self.argv.clone(),
            cwd: None,
            env: self.env.vars_for(model),
            stdin: Some(input.as_bytes().to_vec()),
            timeout: Some(timeout),
            output_cap_bytes: self.output_cap_bytes,
        };

        let run = match self.runner.run_observed(&spec, observer) {
            Ok(run) => run,
            Err(err) => {
                warn!(model, error = %err, "invocation could not run");
                return InvocationOutcome::not_run(err.to_string());
            }
        };

        if run.timed_out {
            warn!(model, timeout = ?timeout, "invocation timed out");
            return InvocationOutcome::timed_out(timeout.as_secs_f64());
        }

        let output = String::from_utf8_lossy(&run.stdout).into_owned();
        let succeeded = run.exit_code == 0;
        let error = if succeeded {
            String::new()
        } else {
            let stderr = String::from_utf8_lossy(&run.stderr).trim().to_string();
            warn!(model, exit_code = run.exit_code, stderr = %stderr, "invocation failed");
            if stderr.is_empty() {
                format!("exit code {}", run.exit_code)
            } else {
                stderr
            }
        };

        let elapsed_secs = run.wall.as_secs_f64();
        debug!(
            model,
            elapsed_secs,
            exit_code = run.exit_code,
            output_bytes = run.stdout.len(),
            "invocation finished"
        );

        InvocationOutcome {
            succeeded,
            elapsed_secs,
            output_len: output.chars().count(),
            output,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelbench_adapters::{AdapterError, RunResult};
    use modelbench_types::TIMEOUT_MARKER;
    use std::sync::Mutex;

    struct CannedRunner {
        result: fn() -> Result<RunResult, AdapterError>,
        seen: Mutex<Vec<CommandSpec>>,
    }

    impl CannedRunner {
        fn new(result: fn() -> Result<RunResult, AdapterError>) -> Self {
            Self {
                result,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for CannedRunner {
        fn run_observed(
            &self,
            spec: &CommandSpec,
            _observer: &mut dyn ProcessObserver,
        ) -> Result<RunResult, AdapterError> {
            self.seen.lock().unwrap().push(spec.clone());
            (self.result)()
        }
    }

    fn run(exit_code: i32, stdout: &[u8], stderr: &[u8], timed_out: bool) -> RunResult {
        RunResult {
            wall: Duration::from_millis(1500),
            exit_code,
            timed_out,
            max_rss_kb: None,
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
        }
    }

    fn invoker(runner: &CannedRunner) -> Invoker<'_, CannedRunner> {
        Invoker::new(
            runner,
            vec!["scmd".into(), "explain".into(), "-".into()],
            EnvBinding::default(),
            Duration::from_secs(30),
            4096,
        )
    }

    #[test]
    fn success_captures_lossy_utf8_and_char_count() {
        let runner = CannedRunner::new(|| Ok(run(0, b"caf\xc3\xa9 \xff", b"", false)));
        let out = invoker(&runner).invoke("qwen3-4b", "What is a variable?");

        assert!(out.succeeded);
        assert_eq!(out.elapsed_secs, 1.5);
        assert_eq!(out.output, "café \u{FFFD}");
        assert_eq!(out.output_len, 6);
        assert!(out.error.is_empty());
    }

    #[test]
    fn model_and_prompt_are_passed_explicitly() {
        let runner = CannedRunner::new(|| Ok(run(0, b"ok", b"", false)));
        invoker(&runner).invoke("qwen2.5-0.5b", "hello");

        let seen = runner.seen.lock().unwrap();
        let spec = &seen[0];
        assert_eq!(spec.argv, vec!["scmd", "explain", "-"]);
        assert_eq!(spec.stdin.as_deref(), Some(&b"hello"[..]));
        assert!(spec
            .env
            .contains(&("SCMD_MODEL".to_string(), "qwen2.5-0.5b".to_string())));
        assert!(spec.env.contains(&("SCMD_QUIET".to_string(), "1".to_string())));
        assert!(!spec.env.iter().any(|(k, _)| k == "SCMD_NO_AUTOSTART"));
        assert_eq!(spec.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn timeout_reports_the_bound_and_marker() {
        let runner = CannedRunner::new(|| Ok(run(-1, b"partial", b"", true)));
        let out = invoker(&runner).invoke("m", "x");
        assert!(!out.succeeded);
        assert_eq!(out.elapsed_secs, 30.0);
        assert_eq!(out.error, TIMEOUT_MARKER);
        assert_eq!(out.output_len, 0);
    }

    #[test]
    fn spawn_failure_reports_minus_one() {
        let runner =
            CannedRunner::new(|| Err(AdapterError::Other(anyhow::anyhow!("No such file"))));
        let out = invoker(&runner).invoke("m", "x");
        assert!(!out.succeeded);
        assert_eq!(out.elapsed_secs, -1.0);
        assert_eq!(out.output_len, 0);
        assert!(out.error.contains("No such file"));
    }

    #[test]
    fn non_zero_exit_keeps_time_and_stderr() {
        let runner = CannedRunner::new(|| Ok(run(2, b"", b"model not found\n", false)));
        let out = invoker(&runner).invoke("m", "x");
        assert!(!out.succeeded);
        assert_eq!(out.elapsed_secs, 1.5);
        assert_eq!(out.error, "model not found");

        let silent = CannedRunner::new(|| Ok(run(7, b"", b"", false)));
        assert_eq!(invoker(&silent).invoke("m", "x").error, "exit code 7");
    }

    #[test]
    fn no_autostart_adds_its_variable() {
        let env = EnvBinding {
            no_autostart: true,
            ..EnvBinding::default()
        };
        assert!(env
            .vars_for("m")
            .contains(&("SCMD_NO_AUTOSTART".to_string(), "1".to_string())));
    }
}
