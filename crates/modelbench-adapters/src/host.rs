use modelbench_types::HostInfo;

/// Describes the machine a run executes on.
pub trait HostProbe {
    fn probe(&self) -> HostInfo;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdHostProbe;

impl HostProbe for StdHostProbe {
    fn probe(&self) -> HostInfo {
        let hostname = hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().into_owned())
            .filter(|h| !h.is_empty());

        HostInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            hostname,
            cpu_count: u32::try_from(num_cpus::get()).ok(),
        }
    }
}
