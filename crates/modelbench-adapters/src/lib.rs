//! Std adapters for modelbench.
//!
//! In clean-arch terms: this is where we touch the world.

mod host;
mod sampler;

pub use host::{HostProbe, StdHostProbe};
pub use sampler::{MonitorSummary, ProcessProbe, ProcessReading, ResourceSampler, SysinfoProbe};

use anyhow::Context;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

/// Sleep between liveness checks while waiting on a child.
const WAIT_POLL: Duration = Duration::from_millis(10);

/// How long captured pipes are drained after the child is gone. A descendant outside the
/// child's process group can hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,

    /// Bytes written to the child's stdin, which is then closed. `None` attaches null.
    pub stdin: Option<Vec<u8>>,

    pub timeout: Option<Duration>,
    pub output_cap_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub wall: Duration,
    pub exit_code: i32,
    pub timed_out: bool,
    pub max_rss_kb: Option<u64>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("command argv must not be empty")]
    EmptyArgv,

    #[error("program not found: {program}")]
    ProgramNotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("resource probe unavailable: {0}")]
    ProbeUnavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Called on every liveness check while a child runs.
pub trait ProcessObserver {
    fn on_poll(&mut self, pid: u32);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProcessObserver for NoopObserver {
    fn on_poll(&mut self, _pid: u32) {}
}

pub trait ProcessRunner {
    fn run_observed(
        &self,
        spec: &CommandSpec,
        observer: &mut dyn ProcessObserver,
    ) -> Result<RunResult, AdapterError>;

    fn run(&self, spec: &CommandSpec) -> Result<RunResult, AdapterError> {
        self.run_observed(spec, &mut NoopObserver)
    }

    /// Resolve the program once, before any measurement.
    fn locate(&self, program: &str) -> Result<PathBuf, AdapterError> {
        locate_program(program)
    }
}

pub fn locate_program(program: &str) -> Result<PathBuf, AdapterError> {
    which::which(program).map_err(|source| AdapterError::ProgramNotFound {
        program: program.to_string(),
        source,
    })
}

#[derive(Debug, Default, Clone)]
pub struct StdProcessRunner;

impl ProcessRunner for StdProcessRunner {
    fn run_observed(
        &self,
        spec: &CommandSpec,
        observer: &mut dyn ProcessObserver,
    ) -> Result<RunResult, AdapterError> {
        if spec.argv.is_empty() {
            return Err(AdapterError::EmptyArgv);
        }

        #[cfg(unix)]
        {
            run_unix(spec, observer)
        }

        #[cfg(not(unix))]
        {
            run_portable(spec, observer)
        }
    }
}

fn build_command(spec: &CommandSpec) -> std::process::Command {
    use std::process::{Command, Stdio};

    let mut cmd = Command::new(&spec.argv[0]);
    if spec.argv.len() > 1 {
        cmd.args(&spec.argv[1..]);
    }

    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    for (k, v) in &spec.env {
        cmd.env(k, v);
    }

    cmd.stdin(if spec.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    // The child leads a fresh process group so a timeout can take its descendants down too.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    cmd
}

/// Pipes handed to background threads so a chatty child never blocks on a full pipe.
///
/// The stdin writer is detached: it finishes on its own once the child closes the read end.
struct ChildIo {
    stdout: PipeCapture,
    stderr: PipeCapture,
}

impl ChildIo {
    fn attach(child: &mut std::process::Child, spec: &CommandSpec) -> Result<Self, AdapterError> {
        if let (Some(mut pipe), Some(bytes)) = (child.stdin.take(), spec.stdin.clone()) {
            thread::spawn(move || {
                // A child that exits without draining stdin yields EPIPE; that is its business.
                let _ = pipe.write_all(&bytes);
            });
        }

        let stdout = child
            .stdout
            .take()
            .context("stdout was not piped")
            .map_err(AdapterError::Other)?;
        let stderr = child
            .stderr
            .take()
            .context("stderr was not piped")
            .map_err(AdapterError::Other)?;

        let cap = spec.output_cap_bytes;
        Ok(Self {
            stdout: PipeCapture::spawn(stdout, cap),
            stderr: PipeCapture::spawn(stderr, cap),
        })
    }

    /// Collect output once the child has been reaped, waiting at most [`DRAIN_GRACE`].
    fn finish(self) -> (Vec<u8>, Vec<u8>) {
        let deadline = Instant::now() + DRAIN_GRACE;
        (self.stdout.finish(deadline), self.stderr.finish(deadline))
    }
}

struct PipeCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Receiver<()>,
}

impl PipeCapture {
    fn spawn<R: Read + Send + 'static>(mut reader: R, cap: usize) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let (tx, done) = mpsc::channel();

        thread::spawn(move || {
            copy_with_cap(&mut reader, cap, |chunk| {
                if let Ok(mut b) = sink.lock() {
                    b.extend_from_slice(chunk);
                }
            });
            let _ = tx.send(());
        });

        Self { buf, done }
    }

    /// Whatever arrived before EOF or `deadline`. A reader still blocked after that is left
    /// detached with its pipe.
    fn finish(self, deadline: Instant) -> Vec<u8> {
        let _ = self
            .done
            .recv_timeout(deadline.saturating_duration_since(Instant::now()));
        match self.buf.lock() {
            Ok(mut b) => std::mem::take(&mut *b),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

/// Read to EOF, handing at most `cap` bytes to `sink` and discarding the rest.
fn copy_with_cap<R: Read>(reader: &mut R, cap: usize, mut sink: impl FnMut(&[u8])) {
    let mut kept = 0usize;
    let mut tmp = [0u8; 8192];

    loop {
        match reader.read(&mut tmp) {
            Ok(0) => break,
            Ok(n) => {
                let take = cap.saturating_sub(kept).min(n);
                if take > 0 {
                    sink(&tmp[..take]);
                    kept += take;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
fn read_with_cap<R: Read>(reader: &mut R, cap: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    copy_with_cap(reader, cap, |chunk| buf.extend_from_slice(chunk));
    buf
}

#[cfg(not(unix))]
fn run_portable(
    spec: &CommandSpec,
    observer: &mut dyn ProcessObserver,
) -> Result<RunResult, AdapterError> {
    let start = Instant::now();

    let mut child = build_command(spec)
        .spawn()
        .with_context(|| format!("failed to spawn {:?}", spec.argv))
        .map_err(AdapterError::Other)?;
    let pid = child.id();
    let io = ChildIo::attach(&mut child, spec)?;

    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .context("try_wait failed")
            .map_err(AdapterError::Other)?
        {
            break status;
        }
        observer.on_poll(pid);
        if let Some(t) = spec.timeout {
            if start.elapsed() >= t {
                timed_out = true;
                let _ = child.kill();
                break child
                    .wait()
                    .context("wait after kill failed")
                    .map_err(AdapterError::Other)?;
            }
        }
        thread::sleep(WAIT_POLL);
    };

    let (stdout, stderr) = io.finish();

    Ok(RunResult {
        wall: start.elapsed(),
        exit_code: status.code().unwrap_or(-1),
        timed_out,
        max_rss_kb: None,
        stdout,
        stderr,
    })
}

#[cfg(unix)]
fn run_unix(
    spec: &CommandSpec,
    observer: &mut dyn ProcessObserver,
) -> Result<RunResult, AdapterError> {
    use std::os::unix::process::ExitStatusExt;

    let start = Instant::now();

    let mut child = build_command(spec)
        .spawn()
        .with_context(|| format!("failed to spawn {:?}", spec.argv))
        .map_err(AdapterError::Other)?;

    let pid = child.id() as libc::pid_t;
    let io = ChildIo::attach(&mut child, spec)?;

    let waited = wait4_with_timeout(pid, spec.timeout, observer);

    // Safety: the child was reaped via wait4 (or the wait failed); drop the handle without waiting.
    drop(child);

    let (status_raw, rusage, timed_out) = waited?;
    let (stdout, stderr) = io.finish();

    let wall = start.elapsed();

    let exit_status = std::process::ExitStatus::from_raw(status_raw);
    let exit_code = exit_status.code().unwrap_or(-1);

    let max_rss_kb = rusage.map(|ru| ru_maxrss_kb(&ru));

    Ok(RunResult {
        wall,
        exit_code,
        timed_out,
        max_rss_kb,
        stdout,
        stderr,
    })
}

#[cfg(unix)]
fn wait4_with_timeout(
    pid: libc::pid_t,
    timeout: Option<Duration>,
    observer: &mut dyn ProcessObserver,
) -> Result<(libc::c_int, Option<libc::rusage>, bool), AdapterError> {
    use std::mem;

    let start = Instant::now();
    let mut status: libc::c_int = 0;
    let mut ru: libc::rusage = unsafe { mem::zeroed() };

    let mut timed_out = false;

    loop {
        let res =
            unsafe { libc::wait4(pid, &mut status as *mut libc::c_int, libc::WNOHANG, &mut ru) };

        if res == pid {
            break;
        }

        if res == 0 {
            // still running
            observer.on_poll(pid as u32);
            if let Some(t) = timeout {
                if start.elapsed() >= t {
                    timed_out = true;
                    // The child leads its own process group (see `build_command`).
                    unsafe {
                        if libc::killpg(pid, libc::SIGKILL) != 0 {
                            libc::kill(pid, libc::SIGKILL);
                        }
                    }
                    // Reap it.
                    let res2 =
                        unsafe { libc::wait4(pid, &mut status as *mut libc::c_int, 0, &mut ru) };
                    if res2 != pid {
                        return Err(AdapterError::Other(anyhow::anyhow!(
                            "wait4 after kill failed: {:?}",
                            std::io::Error::last_os_error()
                        )));
                    }
                    break;
                }
            }
            thread::sleep(WAIT_POLL);
            continue;
        }

        if res == -1 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(AdapterError::Other(anyhow::anyhow!("wait4 failed: {err}")));
        }

        // Any other pid is unexpected.
        return Err(AdapterError::Other(anyhow::anyhow!(
            "wait4 returned unexpected pid: {res}"
        )));
    }

    Ok((status, Some(ru), timed_out))
}

#[cfg(unix)]
fn ru_maxrss_kb(ru: &libc::rusage) -> u64 {
    let raw = ru.ru_maxrss as u64;

    // On Linux, ru_maxrss is KB.
    // On macOS, ru_maxrss is bytes.
    #[cfg(target_os = "macos")]
    {
        raw / 1024
    }

    #[cfg(not(target_os = "macos"))]
    {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spec(argv: &[&str]) -> CommandSpec {
        CommandSpec {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            env: vec![],
            stdin: None,
            timeout: Some(Duration::from_secs(10)),
            output_cap_bytes: 1024,
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Captured length equals min(input_length, cap).
        #[test]
        fn capture_length_equals_min_of_input_and_cap(
            bytes in proptest::collection::vec(any::<u8>(), 0..20_000),
            cap in 0usize..20_000
        ) {
            let result = read_with_cap(&mut bytes.as_slice(), cap);
            prop_assert_eq!(result.len(), bytes.len().min(cap));
        }

        /// Captured content is a prefix of the input.
        #[test]
        fn capture_preserves_prefix(
            bytes in proptest::collection::vec(any::<u8>(), 0..20_000),
            cap in 0usize..20_000
        ) {
            let result = read_with_cap(&mut bytes.as_slice(), cap);
            prop_assert!(bytes.starts_with(&result));
        }
    }

    #[test]
    fn read_with_cap_stops_keeping_bytes_at_cap() {
        let data = vec![7u8; 20_000];
        let out = read_with_cap(&mut data.as_slice(), 100);
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn empty_argv_returns_error() {
        let result = StdProcessRunner.run(&spec(&[]));
        assert!(
            matches!(result, Err(AdapterError::EmptyArgv)),
            "Expected AdapterError::EmptyArgv, got {:?}",
            result
        );
    }

    #[test]
    fn empty_argv_check_is_immediate() {
        let mut s = spec(&[]);
        s.cwd = Some(PathBuf::from("/nonexistent/path"));
        s.stdin = Some(b"ignored".to_vec());
        assert!(matches!(
            StdProcessRunner.run(&s),
            Err(AdapterError::EmptyArgv)
        ));
    }

    #[test]
    fn missing_program_is_reported_by_name() {
        let err = locate_program("definitely-not-a-real-program-4711").unwrap_err();
        assert!(matches!(err, AdapterError::ProgramNotFound { .. }));
        assert!(err.to_string().contains("definitely-not-a-real-program-4711"));
    }

    #[test]
    fn spawn_failure_is_an_error_not_a_result() {
        let result = StdProcessRunner.run(&spec(&["/nonexistent/bin/scmd"]));
        assert!(matches!(result, Err(AdapterError::Other(_))));
    }

    #[cfg(unix)]
    #[test]
    fn stdin_is_fed_and_stdout_captured() {
        let mut s = spec(&["cat"]);
        s.stdin = Some(b"What is a variable?".to_vec());

        let run = StdProcessRunner.run(&s).expect("cat should run");
        assert_eq!(run.exit_code, 0);
        assert!(!run.timed_out);
        assert_eq!(run.stdout, b"What is a variable?");
    }

    #[cfg(unix)]
    #[test]
    fn env_and_exit_code_are_passed_through() {
        let mut s = spec(&["sh", "-c", "echo \"$SCMD_MODEL\" >&2; exit 3"]);
        s.env = vec![("SCMD_MODEL".into(), "qwen3-4b".into())];

        let run = StdProcessRunner.run(&s).unwrap();
        assert_eq!(run.exit_code, 3);
        assert_eq!(String::from_utf8_lossy(&run.stderr).trim(), "qwen3-4b");
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_long_running_command() {
        let mut s = spec(&["sleep", "10"]);
        s.timeout = Some(Duration::from_millis(100));

        let start = Instant::now();
        let run = StdProcessRunner.run(&s).expect("timeout is a result, not an error");
        assert!(run.timed_out);
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "Command should have been killed quickly, but took {:?}",
            start.elapsed()
        );
    }

    #[cfg(unix)]
    fn kill_if_alive(pid: &str) {
        if let Ok(pid) = pid.trim().parse::<libc::pid_t>() {
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
        }
    }

    /// False once the process is gone or is a zombie awaiting its reaper.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid.trim())) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => false,
        }
    }

    #[cfg(unix)]
    #[test]
    fn timeout_is_not_held_up_by_a_background_grandchild() {
        let mut s = spec(&["sh", "-c", "sleep 8 & sleep 30"]);
        s.timeout = Some(Duration::from_millis(500));

        let start = Instant::now();
        let run = StdProcessRunner.run(&s).expect("timeout is a result, not an error");
        assert!(run.timed_out);
        assert!(
            start.elapsed() < Duration::from_secs(3),
            "runner blocked {:?} past a 500ms timeout",
            start.elapsed()
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn timeout_kills_the_whole_process_group() {
        let mut s = spec(&["sh", "-c", "sleep 30 & echo $!; sleep 30"]);
        s.timeout = Some(Duration::from_millis(300));

        let run = StdProcessRunner.run(&s).expect("timeout is a result, not an error");
        assert!(run.timed_out);
        let grandchild = String::from_utf8_lossy(&run.stdout).to_string();
        assert!(!grandchild.trim().is_empty(), "background pid should be echoed");

        let deadline = Instant::now() + Duration::from_secs(2);
        while is_running(&grandchild) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        let alive = is_running(&grandchild);
        kill_if_alive(&grandchild);
        assert!(!alive, "background sleep {} survived the timeout", grandchild.trim());
    }

    #[cfg(unix)]
    #[test]
    fn normal_exit_does_not_wait_for_inherited_pipes() {
        // The background sleep keeps stdout open long after sh exits.
        let s = spec(&["sh", "-c", "sleep 30 & echo $!"]);

        let start = Instant::now();
        let run = StdProcessRunner.run(&s).expect("sh should run");
        let elapsed = start.elapsed();
        let background = String::from_utf8_lossy(&run.stdout).to_string();
        kill_if_alive(&background);

        assert_eq!(run.exit_code, 0);
        assert!(!run.timed_out);
        assert!(!background.trim().is_empty(), "output before exit is kept");
        assert!(
            elapsed < Duration::from_secs(3),
            "runner waited {elapsed:?} on a pipe held by a background process"
        );
    }

    #[cfg(unix)]
    #[test]
    fn empty_stdin_completes_normally() {
        let mut s = spec(&["cat"]);
        s.stdin = Some(Vec::new());

        let run = StdProcessRunner.run(&s).expect("cat should run");
        assert_eq!(run.exit_code, 0);
        assert!(!run.timed_out);
        assert!(run.stdout.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn empty_stdin_still_respects_the_timeout() {
        let mut s = spec(&["sh", "-c", "read x; sleep 5"]);
        s.stdin = Some(Vec::new());
        s.timeout = Some(Duration::from_millis(300));

        let start = Instant::now();
        let run = StdProcessRunner.run(&s).expect("timeout is a result, not an error");
        assert!(run.timed_out);
        assert!(
            start.elapsed() < Duration::from_secs(3),
            "empty prompt run took {:?}",
            start.elapsed()
        );
    }

    #[cfg(unix)]
    #[test]
    fn observer_sees_the_child_pid_while_it_runs() {
        struct Recorder(Vec<u32>);
        impl ProcessObserver for Recorder {
            fn on_poll(&mut self, pid: u32) {
                self.0.push(pid);
            }
        }

        let mut recorder = Recorder(Vec::new());
        let run = StdProcessRunner
            .run_observed(&spec(&["sleep", "0.2"]), &mut recorder)
            .unwrap();
        assert_eq!(run.exit_code, 0);
        assert!(!recorder.0.is_empty());
        assert!(recorder.0.windows(2).all(|w| w[0] == w[1]));
    }
}
