//! System resource sampling and pressure levels.

use std::fmt;
use std::fs;
use std::sync::{Mutex, PoisonError};
use std::thread;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    Normal,
    Elevated,
    High,
    Critical,
    Emergency,
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PressureLevel::Normal => "normal",
            PressureLevel::Elevated => "elevated",
            PressureLevel::High => "high",
            PressureLevel::Critical => "critical",
            PressureLevel::Emergency => "emergency",
        })
    }
}

/// Usage ratios at which each level starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureThresholds {
    pub elevated: f64,
    pub high: f64,
    pub critical: f64,
    pub emergency: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            elevated: 0.65,
            high: 0.75,
            critical: 0.85,
            emergency: 0.95,
        }
    }
}

impl PressureThresholds {
    #[must_use]
    pub fn level(&self, snapshot: &ResourceSnapshot) -> PressureLevel {
        let usage = snapshot.memory_ratio.max(snapshot.cpu_ratio);
        if usage >= self.emergency {
            PressureLevel::Emergency
        } else if usage >= self.critical {
            PressureLevel::Critical
        } else if usage >= self.high {
            PressureLevel::High
        } else if usage >= self.elevated {
            PressureLevel::Elevated
        } else {
            PressureLevel::Normal
        }
    }
}

/// Point-in-time system usage. Ratios are in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub memory_ratio: f64,
    pub cpu_ratio: f64,
    pub memory_available_mb: f64,
}

impl ResourceSnapshot {
    #[must_use]
    pub fn memory_percent(&self) -> f64 {
        self.memory_ratio * 100.0
    }

    #[must_use]
    pub fn cpu_percent(&self) -> f64 {
        self.cpu_ratio * 100.0
    }
}

pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> ResourceSnapshot;
}

/// Reads `/proc/meminfo` and `/proc/loadavg`. Missing files sample as idle.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcProbe;

impl ResourceProbe for ProcProbe {
    fn sample(&self) -> ResourceSnapshot {
        let (memory_ratio, memory_available_mb) = fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|text| parse_meminfo(&text))
            .unwrap_or((0.0, 0.0));
        let cpus = thread::available_parallelism().map_or(1, usize::from);
        let cpu_ratio = fs::read_to_string("/proc/loadavg")
            .ok()
            .and_then(|text| parse_loadavg(&text))
            .map_or(0.0, |load| (load / cpus as f64).clamp(0.0, 1.0));
        ResourceSnapshot {
            memory_ratio,
            cpu_ratio,
            memory_available_mb,
        }
    }
}

fn meminfo_kb(text: &str, key: &str) -> Option<f64> {
    text.lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}

/// `(used ratio, available MB)` from `/proc/meminfo`.
fn parse_meminfo(text: &str) -> Option<(f64, f64)> {
    let total = meminfo_kb(text, "MemTotal")?;
    let available = meminfo_kb(text, "MemAvailable")?;
    if total <= 0.0 {
        return None;
    }
    let used = ((total - available) / total).clamp(0.0, 1.0);
    Some((used, available / 1024.0))
}

/// One-minute load average.
fn parse_loadavg(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

/// A probe whose reading is set by hand. For embedding applications that
/// already monitor the host, and for tests.
#[derive(Debug, Default)]
pub struct StaticProbe {
    snapshot: Mutex<ResourceSnapshot>,
}

impl StaticProbe {
    #[must_use]
    pub fn new(snapshot: ResourceSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn set(&self, snapshot: ResourceSnapshot) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

impl ResourceProbe for StaticProbe {
    fn sample(&self) -> ResourceSnapshot {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resident set size of this process in MB.
#[cfg(target_os = "linux")]
#[must_use]
pub fn process_memory_mb() -> Option<f64> {
    let statm = fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: f64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    // SAFETY: sysconf has no preconditions and only reads a constant.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(resident_pages * page_size as f64 / (1024.0 * 1024.0))
}

#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn process_memory_mb() -> Option<f64> {
    None
}

#[cfg(test)]
mod tests {
    use super::{
        PressureLevel, PressureThresholds, ResourceProbe, ResourceSnapshot, StaticProbe,
        parse_loadavg, parse_meminfo,
    };

    fn snapshot(memory_ratio: f64, cpu_ratio: f64) -> ResourceSnapshot {
        ResourceSnapshot {
            memory_ratio,
            cpu_ratio,
            memory_available_mb: 1024.0,
        }
    }

    #[test]
    fn level_follows_the_busier_resource() {
        let t = PressureThresholds::default();
        assert_eq!(t.level(&snapshot(0.10, 0.20)), PressureLevel::Normal);
        assert_eq!(t.level(&snapshot(0.65, 0.10)), PressureLevel::Elevated);
        assert_eq!(t.level(&snapshot(0.10, 0.80)), PressureLevel::High);
        assert_eq!(t.level(&snapshot(0.86, 0.10)), PressureLevel::Critical);
        assert_eq!(t.level(&snapshot(0.50, 0.99)), PressureLevel::Emergency);
    }

    #[test]
    fn meminfo_and_loadavg_parse() {
        let meminfo = "MemTotal:       16000000 kB\nMemFree:  100 kB\nMemAvailable:    4000000 kB\n";
        let (ratio, available_mb) = parse_meminfo(meminfo).unwrap();
        assert_eq!(ratio, 0.75);
        assert_eq!(available_mb, 4_000_000.0 / 1024.0);
        assert!(parse_meminfo("MemFree: 1 kB\n").is_none());

        assert_eq!(parse_loadavg("1.50 0.80 0.40 2/900 1234\n"), Some(1.5));
        assert_eq!(parse_loadavg(""), None);
    }

    #[test]
    fn static_probe_returns_what_was_set() {
        let probe = StaticProbe::default();
        assert_eq!(probe.sample(), ResourceSnapshot::default());
        probe.set(snapshot(0.9, 0.1));
        assert_eq!(probe.sample().memory_ratio, 0.9);
    }
}
