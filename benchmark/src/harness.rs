// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark harness for timing dictionary operations.
//!
//! Operations receive their iteration index so each call can touch a
//! distinct key. Warmup iterations use the first indices and measured ones
//! continue from there, so a set benchmark never measures an update.

use std::time::{Duration, Instant};

/// A benchmark harness for measuring per-operation latency.
pub struct BenchmarkHarness {
    warmup_iterations: u64,
    measurement_iterations: u64,
}

impl BenchmarkHarness {
    /// 10 warmup and 100 measured iterations.
    pub fn new() -> Self {
        Self {
            warmup_iterations: 10,
            measurement_iterations: 100,
        }
    }

    pub fn warmup(mut self, iterations: u64) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    pub fn iterations(mut self, iterations: u64) -> Self {
        self.measurement_iterations = iterations;
        self
    }

    /// Indices the harness will pass, warmup included.
    pub fn total_iterations(&self) -> u64 {
        self.warmup_iterations + self.measurement_iterations
    }

    /// Run `operation` once per index and return measured latencies in ns.
    pub fn run<F>(&self, mut operation: F) -> Vec<u64>
    where
        F: FnMut(u64),
    {
        for i in 0..self.warmup_iterations {
            operation(i);
        }

        let mut samples = Vec::with_capacity(self.measurement_iterations as usize);
        for i in self.warmup_iterations..self.total_iterations() {
            let start = Instant::now();
            operation(i);
            samples.push(start.elapsed().as_nanos() as u64);
        }

        samples
    }
}

impl Default for BenchmarkHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `worker(thread_index)` on `threads` threads at once and return the
/// wall time until the last one finishes.
pub fn measure_parallel<F>(threads: usize, worker: F) -> Duration
where
    F: Fn(usize) + Sync,
{
    let start = Instant::now();
    std::thread::scope(|scope| {
        for index in 0..threads {
            let worker = &worker;
            scope.spawn(move || worker(index));
        }
    });
    start.elapsed()
}

/// Measure the execution time of a closure.
pub fn measure<F, T>(f: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_harness_indices() {
        let harness = BenchmarkHarness::new().warmup(3).iterations(5);
        let mut seen = Vec::new();

        let samples = harness.run(|i| seen.push(i));

        assert_eq!(samples.len(), 5);
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
        assert_eq!(harness.total_iterations(), 8);
    }

    #[test]
    fn test_harness_measures() {
        let harness = BenchmarkHarness::new().warmup(1).iterations(10);

        let samples = harness.run(|_| thread::sleep(Duration::from_micros(100)));

        for sample in &samples {
            assert!(*sample >= 100_000, "Sample {} < 100μs", sample);
        }
    }

    #[test]
    fn test_measure_parallel_runs_every_thread() {
        let calls = AtomicUsize::new(0);
        let elapsed = measure_parallel(4, |_| {
            thread::sleep(Duration::from_millis(5));
            calls.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(calls.load(Ordering::Relaxed), 4);
        assert!(elapsed >= Duration::from_millis(5));
    }

    #[test]
    fn test_measure() {
        let (result, duration) = measure(|| {
            thread::sleep(Duration::from_millis(5));
            42
        });

        assert_eq!(result, 42);
        assert!(duration >= Duration::from_millis(5));
    }
}
