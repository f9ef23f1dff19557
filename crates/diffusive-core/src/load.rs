//! Load calculators
//!
//! A load is a unit-less, non-negative scalar: 0 is idle, 1.0 is roughly
//! saturated and anything above is overloaded. The diffuser compares it to
//! its threshold on every submission, so each calculator must be cheap and
//! safe to call from many tasks at once.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use sysinfo::System;

use diffusive_common::protocol::error::{DiffusiveError, Result};

use crate::cache::ResultsCache;

/// CPU usage readings closer together than this reuse the previous sample.
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

/// Source of the current load.
pub trait LoadCalculator: Send + Sync {
    fn load(&self) -> f64;
}

impl<F> LoadCalculator for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn load(&self) -> f64 {
        self()
    }
}

/// Which calculator a server uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadCalculatorKind {
    /// Running invocations divided by worker threads
    #[default]
    TaskThread,
    /// One-minute host load average per CPU
    SystemAverage,
    /// Instantaneous host CPU usage
    SystemCpu,
    /// CPU usage of this process per CPU
    ProcessCpu,
}

impl LoadCalculatorKind {
    /// Builds the calculator.
    ///
    /// # Arguments
    ///
    /// * `cache` - Results cache whose running entries are counted by `TaskThread`
    /// * `threads` - Size of the worker pool
    pub fn build(self, cache: Arc<ResultsCache>, threads: usize) -> Result<Arc<dyn LoadCalculator>> {
        Ok(match self {
            LoadCalculatorKind::TaskThread => Arc::new(TaskThreadLoad::new(cache, threads)?),
            LoadCalculatorKind::SystemAverage => Arc::new(SystemAverageLoad::new()),
            LoadCalculatorKind::SystemCpu => Arc::new(SystemCpuLoad::new()),
            LoadCalculatorKind::ProcessCpu => Arc::new(ProcessCpuLoad::new()?),
        })
    }
}

fn cpu_count(system: &System) -> f64 {
    system.cpus().len().max(1) as f64
}

/// Ratio of running invocations to pool capacity.
pub struct TaskThreadLoad {
    cache: Arc<ResultsCache>,
    threads: usize,
}

impl TaskThreadLoad {
    pub fn new(cache: Arc<ResultsCache>, threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(DiffusiveError::Config(
                "Task/thread load needs a pool of at least one thread".to_string(),
            ));
        }
        Ok(Self { cache, threads })
    }
}

impl LoadCalculator for TaskThreadLoad {
    fn load(&self) -> f64 {
        self.cache.num_running() as f64 / self.threads as f64
    }
}

/// Host one-minute load average divided by the number of CPUs.
///
/// Reports 0 on platforms without a load average.
pub struct SystemAverageLoad {
    cpus: f64,
}

impl SystemAverageLoad {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self {
            cpus: cpu_count(&system),
        }
    }
}

impl Default for SystemAverageLoad {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadCalculator for SystemAverageLoad {
    fn load(&self) -> f64 {
        (System::load_average().one / self.cpus).max(0.0)
    }
}

struct Sampler {
    system: System,
    sampled_at: Instant,
    last: f64,
}

impl Sampler {
    fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self {
            system,
            sampled_at: Instant::now(),
            last: 0.0,
        }
    }

    fn fresh(&self) -> bool {
        self.sampled_at.elapsed() < MIN_SAMPLE_INTERVAL
    }
}

/// Host CPU usage averaged over all CPUs, in [0, 1].
pub struct SystemCpuLoad {
    sampler: Mutex<Sampler>,
}

impl SystemCpuLoad {
    pub fn new() -> Self {
        Self {
            sampler: Mutex::new(Sampler::new()),
        }
    }
}

impl Default for SystemCpuLoad {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadCalculator for SystemCpuLoad {
    fn load(&self) -> f64 {
        let mut sampler = self.sampler.lock().unwrap_or_else(PoisonError::into_inner);
        if sampler.fresh() {
            return sampler.last;
        }

        sampler.system.refresh_cpu();
        let cpus = sampler.system.cpus();
        let usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|cpu| cpu.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64
        };

        sampler.last = (usage / 100.0).max(0.0);
        sampler.sampled_at = Instant::now();
        sampler.last
    }
}

/// CPU usage of the current process divided by the number of CPUs.
pub struct ProcessCpuLoad {
    pid: sysinfo::Pid,
    sampler: Mutex<Sampler>,
}

impl ProcessCpuLoad {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| DiffusiveError::Config(format!("Cannot determine own process id: {}", e)))?;
        let mut sampler = Sampler::new();
        sampler.system.refresh_process(pid);
        Ok(Self {
            pid,
            sampler: Mutex::new(sampler),
        })
    }
}

impl LoadCalculator for ProcessCpuLoad {
    fn load(&self) -> f64 {
        let mut sampler = self.sampler.lock().unwrap_or_else(PoisonError::into_inner);
        if sampler.fresh() {
            return sampler.last;
        }

        sampler.system.refresh_process(self.pid);
        let cpus = cpu_count(&sampler.system);
        let usage = sampler
            .system
            .process(self.pid)
            .map(|process| process.cpu_usage() as f64)
            .unwrap_or(0.0);

        sampler.last = (usage / 100.0 / cpus).max(0.0);
        sampler.sampled_at = Instant::now();
        sampler.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::handle;
    use diffusive_common::serializer::SerializerKind;

    #[test]
    fn test_task_thread_ratio() {
        let cache = Arc::new(ResultsCache::new(10));
        let load = TaskThreadLoad::new(cache.clone(), 4).unwrap();
        assert_eq!(load.load(), 0.0);

        let mut completers = Vec::new();
        for i in 0..6 {
            let (completer, pending) = handle::pending(format!("r{}", i));
            cache.add(format!("r{}", i), CacheEntry::new(pending, SerializerKind::Json, "T:m()"));
            completers.push(completer);
        }
        assert_eq!(load.load(), 1.5);

        for completer in completers.drain(..3) {
            let id = completer.request_id().to_string();
            completer.complete(diffusive_common::protocol::InvocationResult::ok(id, "()", vec![]));
        }
        assert_eq!(load.load(), 0.75);
    }

    #[test]
    fn test_task_thread_rejects_zero_threads() {
        assert!(TaskThreadLoad::new(Arc::new(ResultsCache::default()), 0).is_err());
    }

    #[test]
    fn test_system_calculators_are_non_negative() {
        let calculators: Vec<Box<dyn LoadCalculator>> = vec![
            Box::new(SystemAverageLoad::new()),
            Box::new(SystemCpuLoad::new()),
            Box::new(ProcessCpuLoad::new().unwrap()),
        ];
        for calculator in &calculators {
            let load = calculator.load();
            assert!(load >= 0.0 && load.is_finite(), "load {}", load);
        }
    }

    #[test]
    fn test_cpu_load_reuses_recent_sample() {
        let calculator = SystemCpuLoad::new();
        let first = calculator.load();
        let second = calculator.load();
        assert_eq!(first, second);
    }

    #[test]
    fn test_closure_calculator() {
        let fixed = || 0.9;
        assert_eq!(LoadCalculator::load(&fixed), 0.9);
    }

    #[test]
    fn test_kind_serde() {
        let kind: LoadCalculatorKind = serde_json::from_str("\"system-cpu\"").unwrap();
        assert_eq!(kind, LoadCalculatorKind::SystemCpu);
        assert_eq!(LoadCalculatorKind::default(), LoadCalculatorKind::TaskThread);

        let built = LoadCalculatorKind::TaskThread
            .build(Arc::new(ResultsCache::default()), 2)
            .unwrap();
        assert_eq!(built.load(), 0.0);
    }
}
