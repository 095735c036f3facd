//! Process resource sampling from `/proc/self`.
//!
//! Memory is the `VmRSS` line of `/proc/self/status`. CPU is derived from the
//! cumulative on-CPU time in `/proc/self/schedstat`, or from `utime + stime`
//! in `/proc/self/stat` on kernels without schedstat. Each sample reports the
//! utilisation since the previous sample, and the first sample reports `0.0`.
//!
//! The two metrics are read independently: if no CPU source can be read the
//! sample still carries memory, with `0.0` CPU. Only an unreadable memory
//! source fails the sample. On platforms without procfs every sample fails
//! with [`SampleError::Unsupported`].

use crate::application::ports::{Clock, ResourceSampler, SampleError};
use crate::domain::resources::ResourceUsage;
use crate::infrastructure::clock::SystemClock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::debug;

const PROC_SELF: &str = "/proc/self";

/// `USER_HZ`, the unit of the tick counters in `/proc/<pid>/stat`.
const TICKS_PER_SECOND: u64 = 100;
const NANOS_PER_TICK: u64 = 1_000_000_000 / TICKS_PER_SECOND;

/// Reads resident memory and CPU time of the current process.
#[derive(Debug)]
pub struct ProcSampler {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    previous: Mutex<Option<CpuReading>>,
}

#[derive(Debug, Clone, Copy)]
struct CpuReading {
    at: Instant,
    cpu_nanos: u64,
}

impl ProcSampler {
    /// Create a sampler using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create a sampler with a custom clock for the CPU interval.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_root(PROC_SELF, clock)
    }

    /// Create a sampler reading `status`, `schedstat` and `stat` under `root`
    /// instead of `/proc/self`.
    pub fn with_root(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
            previous: Mutex::new(None),
        }
    }

    /// Directory the sampler reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_memory(&self) -> Result<u64, SampleError> {
        let status = fs::read_to_string(self.root.join("status"))?;
        parse_vm_rss(&status)
    }

    fn read_cpu_nanos(&self) -> Result<u64, SampleError> {
        self.read_schedstat().or_else(|_| self.read_stat())
    }

    fn read_schedstat(&self) -> Result<u64, SampleError> {
        let schedstat = fs::read_to_string(self.root.join("schedstat"))?;
        parse_schedstat(&schedstat)
    }

    fn read_stat(&self) -> Result<u64, SampleError> {
        let stat = fs::read_to_string(self.root.join("stat"))?;
        Ok(parse_stat_cpu_ticks(&stat)?.saturating_mul(NANOS_PER_TICK))
    }

    /// Utilisation between the previous reading and this one.
    fn cpu_percent(&self, reading: CpuReading) -> f64 {
        let mut previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner);
        let percent = match *previous {
            Some(prev) => {
                let wall = reading.at.saturating_duration_since(prev.at).as_nanos();
                if wall == 0 {
                    0.0
                } else {
                    let cpu = reading.cpu_nanos.saturating_sub(prev.cpu_nanos);
                    cpu as f64 / wall as f64 * 100.0
                }
            }
            None => 0.0,
        };
        *previous = Some(reading);
        percent
    }
}

impl Default for ProcSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for ProcSampler {
    fn sample(&self) -> Result<ResourceUsage, SampleError> {
        if cfg!(not(target_os = "linux")) {
            return Err(SampleError::Unsupported);
        }

        let memory_bytes = self.read_memory()?;
        let cpu_percent = match self.read_cpu_nanos() {
            Ok(cpu_nanos) => self.cpu_percent(CpuReading {
                at: self.clock.now(),
                cpu_nanos,
            }),
            Err(e) => {
                debug!(error = %e, "cpu time unavailable, reporting 0% cpu");
                0.0
            }
        };

        Ok(ResourceUsage {
            memory_bytes,
            cpu_percent,
        })
    }
}

/// Parse resident memory in bytes from the contents of `/proc/<pid>/status`.
pub fn parse_vm_rss(status: &str) -> Result<u64, SampleError> {
    let line = status
        .lines()
        .find(|l| l.starts_with("VmRSS:"))
        .ok_or_else(|| SampleError::Parse("no VmRSS line".to_string()))?;

    let mut parts = line["VmRSS:".len()..].split_whitespace();
    let value: u64 = parts
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| SampleError::Parse(format!("bad VmRSS value: {}", line)))?;

    match parts.next() {
        Some("kB") | None => Ok(value.saturating_mul(1024)),
        Some(unit) => Err(SampleError::Parse(format!("unexpected VmRSS unit: {}", unit))),
    }
}

/// Parse cumulative on-CPU nanoseconds from `/proc/<pid>/schedstat`.
pub fn parse_schedstat(schedstat: &str) -> Result<u64, SampleError> {
    schedstat
        .split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| SampleError::Parse(format!("bad schedstat: {:?}", schedstat.trim())))
}

/// Parse cumulative `utime + stime` clock ticks from `/proc/<pid>/stat`.
///
/// The command name may contain spaces and parentheses, so fields are
/// counted from the last `)`.
pub fn parse_stat_cpu_ticks(stat: &str) -> Result<u64, SampleError> {
    let bad = || SampleError::Parse(format!("bad stat: {:?}", stat.trim()));
    let after_comm = stat.rfind(')').map(|i| &stat[i + 1..]).ok_or_else(bad)?;

    // Field 3 (state) is index 0 here; utime and stime are fields 14 and 15.
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let ticks = |i: usize| fields.get(i).and_then(|v| v.parse::<u64>().ok());
    match (ticks(11), ticks(12)) {
        (Some(utime), Some(stime)) => Ok(utime.saturating_add(stime)),
        _ => Err(bad()),
    }
}
