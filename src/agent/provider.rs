use std::sync::atomic::{AtomicI64, Ordering};

use rand_distr::{Distribution, Exp};
use sysinfo::{Pid, System};

/// Closed vocabulary of runtime-memory-like field names the server and its
/// tests key off of (spec §4.7). Where Rust has no direct analogue for a
/// Go-runtime counter, the provider reports a stable `0.0` placeholder
/// rather than omitting the field.
pub const MEM_STAT_FIELDS: &[&str] = &[
    "Alloc",
    "BuckHashSys",
    "Frees",
    "GCCPUFraction",
    "HeapAlloc",
    "HeapIdle",
    "HeapInuse",
    "HeapReleased",
    "HeapObjects",
    "HeapSys",
    "LastGC",
    "Lookups",
    "MCacheInuse",
    "MCacheSys",
    "MSpanInuse",
    "Mallocs",
    "NextGC",
    "NumForcedGC",
    "NumGC",
    "OtherSys",
    "PauseTotalNs",
    "StackInuse",
    "StackSys",
    "MSpanSys",
    "Sys",
    "TotalAlloc",
    "GCSys",
];

/// Samples process- and OS-level counters/gauges once per poll.
///
/// `System` is refreshed on every `sample()` call; `sysinfo` documents this
/// as cheap relative to a full `System::new_all()` rebuild.
pub struct ProcessProvider {
    system: System,
    pid: Pid,
    poll_count: AtomicI64,
    exp: Exp<f64>,
}

impl ProcessProvider {
    pub fn new() -> Self {
        let pid = Pid::from_u32(std::process::id());
        Self {
            system: System::new_all(),
            pid,
            poll_count: AtomicI64::new(0),
            exp: Exp::new(1.0).expect("rate parameter 1.0 is valid"),
        }
    }

    /// One poll: runtime-memory-shaped fields, `RandomValue`, `PollCount`,
    /// and OS-level gauges, as a flat `{name -> value}` map.
    pub fn sample(&mut self) -> Vec<(String, f64)> {
        self.system.refresh_all();

        let mut out: Vec<(String, f64)> = Vec::with_capacity(MEM_STAT_FIELDS.len() + 8);

        let (mem, virt) = self
            .system
            .process(self.pid)
            .map(|p| (p.memory() as f64, p.virtual_memory() as f64))
            .unwrap_or((0.0, 0.0));

        for &field in MEM_STAT_FIELDS {
            let value = match field {
                "Alloc" | "HeapAlloc" | "HeapInuse" | "HeapSys" => mem,
                "Sys" | "StackSys" | "TotalAlloc" => virt,
                _ => 0.0,
            };
            out.push((field.to_string(), value));
        }

        out.push(("RandomValue".to_string(), self.exp.sample(&mut rand::thread_rng())));

        let poll_count = self.poll_count.fetch_add(1, Ordering::SeqCst) + 1;
        out.push(("PollCount".to_string(), poll_count as f64));

        self.sample_os_metrics(&mut out);

        out
    }

    /// OS-level gauges. A failure here is logged and skipped; it must not
    /// abort the rest of the sample (spec §4.7).
    fn sample_os_metrics(&self, out: &mut Vec<(String, f64)>) {
        let total_memory = self.system.total_memory();
        if total_memory == 0 {
            tracing::warn!("sysinfo reported zero total memory; skipping OS metrics");
        } else {
            out.push(("TotalMemory".to_string(), total_memory as f64));
            out.push(("FreeMemory".to_string(), self.system.free_memory() as f64));
        }

        let cpus = self.system.cpus();
        if cpus.is_empty() {
            tracing::warn!("sysinfo reported no CPUs; skipping per-cpu utilization");
            return;
        }
        for (i, cpu) in cpus.iter().enumerate() {
            out.push((format!("CPUutilization{}", i + 1), cpu.cpu_usage() as f64));
        }
    }

    pub fn poll_count(&self) -> i64 {
        self.poll_count.load(Ordering::SeqCst)
    }
}

impl Default for ProcessProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_reports_every_canonical_field() {
        let mut provider = ProcessProvider::new();
        let sample = provider.sample();
        let names: Vec<&str> = sample.iter().map(|(k, _)| k.as_str()).collect();
        for field in MEM_STAT_FIELDS {
            assert!(names.contains(field), "missing field {field}");
        }
        assert!(names.contains(&"RandomValue"));
        assert!(names.contains(&"PollCount"));
    }

    #[test]
    fn poll_count_increments_every_sample() {
        let mut provider = ProcessProvider::new();
        provider.sample();
        provider.sample();
        assert_eq!(provider.poll_count(), 2);
    }
}
