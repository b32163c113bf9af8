//! Host-level gauges. This module contains the [`Sampler`] struct.

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::trace;

/// Reads CPU load and memory usage from the OS on demand.
///
/// Nothing is cached between reads: every call asks the OS again. When the
/// platform cannot report a value (no CPUs listed, zero total memory) the
/// reading is `0.0` rather than an error.
#[derive(Debug)]
pub struct Sampler {
    system: System,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler {
    /// Create a sampler that only tracks the CPU list and RAM.
    pub fn new() -> Self {
        let refresh = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        Self {
            system: System::new_with_specifics(refresh),
        }
    }

    /// One-minute load average divided by the logical core count, as a
    /// percentage rounded to two decimals.
    pub fn cpu_load_percent(&self) -> f64 {
        let load = System::load_average().one;
        let cores = self.system.cpus().len();
        trace!(load, cores, "read load average");
        load_percent(load, cores)
    }

    /// Used RAM over total RAM, as a percentage rounded to two decimals.
    pub fn memory_usage_percent(&mut self) -> f64 {
        self.system.refresh_memory();
        let used = self.system.used_memory();
        let total = self.system.total_memory();
        trace!(used, total, "refreshed memory information");
        memory_percent(used, total)
    }
}

/// `load / cores * 100`, rounded to two decimals. Zero cores reads as `0.0`.
pub fn load_percent(load: f64, cores: usize) -> f64 {
    if cores == 0 {
        return 0.0;
    }
    round2(load / cores as f64 * 100.0)
}

/// `used / total * 100`, rounded to two decimals. Zero total reads as `0.0`.
pub fn memory_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(used as f64 / total as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn load_is_normalized_by_cores() {
        assert_eq!(load_percent(2.0, 4), 50.0);
        assert_eq!(load_percent(1.0, 3), 33.33);
        assert_eq!(load_percent(6.5, 4), 162.5);
    }

    #[test]
    fn memory_ratio() {
        assert_eq!(memory_percent(512, 1024), 50.0);
        assert_eq!(memory_percent(2, 3), 66.67);
    }

    #[test]
    fn unavailable_platform_reads_zero() {
        assert_eq!(load_percent(1.5, 0), 0.0);
        assert_eq!(memory_percent(100, 0), 0.0);
    }

    #[test]
    fn live_readings_are_finite_percentages() {
        let mut sampler = Sampler::new();
        let cpu = sampler.cpu_load_percent();
        let mem = sampler.memory_usage_percent();
        assert!(cpu.is_finite() && cpu >= 0.0);
        assert!((0.0..=100.0).contains(&mem));
    }
}
