//! Linux system statistics from `/proc`.
//!
//! CPU load and interrupt count are interval values: they cover the time
//! since the last [`SysStatSampler::reset_interval`].

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::RedrobResult;

/// Snapshot published to remote clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SysStats {
    /// Percent, 0..=100
    pub cpu_load: u8,
    pub mem_used_kb: u32,
    /// Interrupts during the last interval
    pub irq_count: u16,
    pub uptime_s: u32,
}

/// Aggregate jiffies from the `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
}

impl CpuTimes {
    fn total(&self) -> u64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq
    }
}

pub fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(7)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if fields.len() < 7 {
        return None;
    }
    Some(CpuTimes {
        user: fields[0],
        nice: fields[1],
        system: fields[2],
        idle: fields[3],
        iowait: fields[4],
        irq: fields[5],
        softirq: fields[6],
    })
}

/// Total interrupts serviced since boot, first field of the `intr` line.
pub fn parse_intr_total(stat: &str) -> Option<u64> {
    let line = stat
        .lines()
        .find(|l| l.split_whitespace().next() == Some("intr"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

/// `MemTotal - MemFree` in KiB.
pub fn parse_mem_used_kb(meminfo: &str) -> Option<u32> {
    let field = |name: &str| -> Option<u64> {
        meminfo
            .lines()
            .find(|l| l.split_whitespace().next() == Some(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total = field("MemTotal:")?;
    let free = field("MemFree:")?;
    u32::try_from(total.saturating_sub(free)).ok()
}

pub fn parse_uptime_s(uptime: &str) -> Option<u32> {
    let secs: f64 = uptime.split_whitespace().next()?.parse().ok()?;
    Some(secs as u32)
}

/// Busy share of the interval between two samples, in percent.
pub fn cpu_load_percent(prev: &CpuTimes, cur: &CpuTimes) -> Option<f32> {
    let total = cur.total().checked_sub(prev.total())?;
    let idle = cur.idle.checked_sub(prev.idle)?;
    if total == 0 {
        return None;
    }
    let busy = total.saturating_sub(idle);
    Some(busy as f32 / total as f32 * 100.0)
}

/// Samples `/proc` (or a stand-in directory with the same layout).
#[derive(Debug)]
pub struct SysStatSampler {
    root: PathBuf,
    last_cpu: Option<CpuTimes>,
    last_irq: Option<u64>,
}

impl Default for SysStatSampler {
    fn default() -> Self {
        Self::with_root("/proc")
    }
}

impl SysStatSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            last_cpu: None,
            last_irq: None,
        }
    }

    fn read(&self, name: &str) -> RedrobResult<String> {
        Ok(fs::read_to_string(self.root.join(name))?)
    }

    /// Take a snapshot. Any field that cannot be read is reported as 0.
    pub fn sample(&self) -> SysStats {
        let stat = self.read("stat").ok();

        let cpu_load = stat
            .as_deref()
            .and_then(parse_cpu_times)
            .zip(self.last_cpu)
            .and_then(|(cur, prev)| cpu_load_percent(&prev, &cur))
            .map(|load| load.clamp(0.0, 100.0) as u8)
            .unwrap_or(0);

        let irq_count = stat
            .as_deref()
            .and_then(parse_intr_total)
            .zip(self.last_irq)
            .map(|(cur, prev)| cur.saturating_sub(prev).min(u64::from(u16::MAX)) as u16)
            .unwrap_or(0);

        let mem_used_kb = self
            .read("meminfo")
            .ok()
            .as_deref()
            .and_then(parse_mem_used_kb)
            .unwrap_or(0);

        let uptime_s = self
            .read("uptime")
            .ok()
            .as_deref()
            .and_then(parse_uptime_s)
            .unwrap_or(0);

        SysStats {
            cpu_load,
            mem_used_kb,
            irq_count,
            uptime_s,
        }
    }

    /// Start a new measurement interval.
    pub fn reset_interval(&mut self) -> RedrobResult<()> {
        let stat = self.read("stat")?;
        self.last_cpu = parse_cpu_times(&stat);
        self.last_irq = parse_intr_total(&stat);
        Ok(())
    }
}
