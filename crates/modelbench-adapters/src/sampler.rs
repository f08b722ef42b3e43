//! Resource sampling for one monitored invocation.
//!
//! Sampling piggybacks on the runner's wait loop: the runner calls
//! [`ProcessObserver::on_poll`] every few milliseconds and the sampler decides whether a
//! tick is due. A tick that cannot read the process is skipped, never fatal.

use crate::{AdapterError, ProcessObserver};
use modelbench_types::ResourceSample;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessReading {
    pub rss_mb: f64,

    /// `None` when usage cannot be computed yet, e.g. on the first look at a process.
    pub cpu_percent: Option<f64>,
}

/// OS-level process metrics.
pub trait ProcessProbe {
    /// Resident memory of the benchmarking process itself; the monitoring baseline.
    fn self_rss_mb(&self) -> Result<f64, AdapterError>;

    /// One reading of `pid`, or `None` if it vanished or cannot be read.
    fn sample(&self, pid: u32) -> Option<ProcessReading>;
}

/// [`ProcessProbe`] backed by `sysinfo`.
///
/// CPU usage is computed between consecutive refreshes. The first reading of a process
/// has nothing to compare against and carries no CPU figure.
#[derive(Debug)]
pub struct SysinfoProbe {
    sys: Mutex<System>,
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }
}

impl SysinfoProbe {
    fn refresh_and_read(&self, pid: Pid) -> Option<ProcessReading> {
        let mut sys = self.sys.lock().ok()?;
        let first_reading = sys.process(pid).is_none();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        let process = sys.process(pid)?;
        let cpu = f64::from(process.cpu_usage());
        Some(ProcessReading {
            rss_mb: process.memory() as f64 / BYTES_PER_MB,
            cpu_percent: (!first_reading && cpu.is_finite()).then_some(cpu),
        })
    }
}

impl ProcessProbe for SysinfoProbe {
    fn self_rss_mb(&self) -> Result<f64, AdapterError> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| AdapterError::ProbeUnavailable(e.to_string()))?;
        self.refresh_and_read(pid)
            .map(|r| r.rss_mb)
            .ok_or_else(|| {
                AdapterError::ProbeUnavailable(format!("cannot read own process {pid}"))
            })
    }

    fn sample(&self, pid: u32) -> Option<ProcessReading> {
        self.refresh_and_read(Pid::from_u32(pid))
    }
}

/// Peak memory and CPU statistics for one monitored invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSummary {
    pub initial_mb: f64,

    /// Running maximum, starting from the baseline.
    pub peak_memory_mb: f64,

    /// Over the ticks that carried a CPU figure; `None` when none did.
    pub avg_cpu_percent: Option<f64>,
    pub max_cpu_percent: Option<f64>,

    pub ticks: usize,
}

/// Polls a child at a fixed interval until it exits or the ceiling passes.
///
/// Past the ceiling the sampler goes quiet; the runner keeps waiting on the child
/// under its own timeout.
pub struct ResourceSampler<'a, P: ProcessProbe + ?Sized> {
    probe: &'a P,
    poll_interval: Duration,
    ceiling: Duration,
    initial_mb: f64,
    started: Option<Instant>,
    last_tick: Option<Instant>,
    samples: Vec<ResourceSample>,
}

impl<'a, P: ProcessProbe + ?Sized> ResourceSampler<'a, P> {
    pub fn new(probe: &'a P, initial_mb: f64, poll_interval: Duration, ceiling: Duration) -> Self {
        Self {
            probe,
            poll_interval,
            ceiling,
            initial_mb,
            started: None,
            last_tick: None,
            samples: Vec::new(),
        }
    }

    /// Take the baseline reading from the probe and start a sampler on it.
    pub fn with_baseline(
        probe: &'a P,
        poll_interval: Duration,
        ceiling: Duration,
    ) -> Result<Self, AdapterError> {
        let initial_mb = probe.self_rss_mb()?;
        Ok(Self::new(probe, initial_mb, poll_interval, ceiling))
    }

    pub fn samples(&self) -> &[ResourceSample] {
        &self.samples
    }

    pub fn finish(self) -> MonitorSummary {
        let peak_memory_mb = self
            .samples
            .iter()
            .map(|s| s.rss_mb)
            .fold(self.initial_mb, f64::max);

        let cpu: Vec<f64> = self.samples.iter().filter_map(|s| s.cpu_percent).collect();
        let (avg_cpu_percent, max_cpu_percent) = if cpu.is_empty() {
            (None, None)
        } else {
            let total: f64 = cpu.iter().sum();
            let max = cpu.iter().copied().fold(f64::MIN, f64::max);
            (Some(total / cpu.len() as f64), Some(max))
        };

        MonitorSummary {
            initial_mb: self.initial_mb,
            peak_memory_mb,
            avg_cpu_percent,
            max_cpu_percent,
            ticks: self.samples.len(),
        }
    }
}

impl<P: ProcessProbe + ?Sized> ProcessObserver for ResourceSampler<'_, P> {
    fn on_poll(&mut self, pid: u32) {
        let now = Instant::now();
        let started = *self.started.get_or_insert(now);
        let elapsed = now.duration_since(started);

        if elapsed >= self.ceiling {
            return;
        }
        if let Some(last) = self.last_tick {
            if now.duration_since(last) < self.poll_interval {
                return;
            }
        }
        self.last_tick = Some(now);

        if let Some(reading) = self.probe.sample(pid) {
            self.samples.push(ResourceSample {
                elapsed_secs: elapsed.as_secs_f64(),
                rss_mb: reading.rss_mb,
                cpu_percent: reading.cpu_percent,
            });
        }
    }
}
