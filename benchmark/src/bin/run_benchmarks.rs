// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI tool to run all benchmarks and generate reports.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mpdict_benchmark::fixtures::{self, BenchDict, BenchTable};
use mpdict_benchmark::harness::{self, BenchmarkHarness};
use mpdict_benchmark::{
    BenchmarkCategory, BenchmarkReport, BenchmarkResult, JsonReporter, LatencyMetrics,
    ThroughputMetrics,
};
use mpdict_core::{Backend, Dictionary, LocalMap};

/// Value sizes for the set and get benchmarks.
const VALUE_SIZES: &[usize] = &[8, 64, 512];

/// Writer thread counts for the contention benchmark.
const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];

const BACKENDS: [Backend; 2] = [Backend::Shm, Backend::Local];

#[derive(Parser)]
#[command(name = "run_benchmarks")]
#[command(about = "Run mpdict benchmarks and generate JSON reports")]
struct Args {
    /// Output directory for benchmark data (defaults to the crate's data/)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of iterations for each benchmark
    #[arg(short, long, default_value_t = 10_000)]
    iterations: u64,

    /// Categories to run (all if not specified)
    #[arg(short, long)]
    category: Option<Vec<BenchmarkCategory>>,

    /// Write one report file per category
    #[arg(long)]
    split: bool,

    /// Run in quick mode (fewer iterations)
    #[arg(long)]
    quick: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let iterations = if args.quick { 500 } else { args.iterations.max(1) };

    println!("mpdict Benchmark Suite");
    println!("======================");
    println!("Iterations: {}", iterations);
    println!();

    let reporter = match &args.output {
        Some(dir) => JsonReporter::new(dir)?,
        None => JsonReporter::default_location()?,
    };
    let mut report = BenchmarkReport::new();

    let categories = args
        .category
        .unwrap_or_else(|| BenchmarkCategory::ALL.to_vec());

    for category in categories {
        println!("Running {} benchmarks...", category);
        match category {
            BenchmarkCategory::Set => run_set_benchmarks(&mut report, iterations)?,
            BenchmarkCategory::Get => run_get_benchmarks(&mut report, iterations)?,
            BenchmarkCategory::Iterate => run_iterate_benchmarks(&mut report, iterations)?,
            BenchmarkCategory::Contention => run_contention_benchmarks(&mut report, iterations)?,
        }
    }

    // Save report
    let paths = if args.split {
        reporter.save_by_category(&report)?
    } else {
        vec![reporter.save(&report)?]
    };
    println!();
    for path in paths {
        println!("Benchmark report saved to: {:?}", path);
    }
    println!();

    print_summary(&report);

    Ok(())
}

fn run_set_benchmarks(report: &mut BenchmarkReport, iterations: u64) -> anyhow::Result<()> {
    let harness = BenchmarkHarness::new()
        .warmup(iterations / 10)
        .iterations(iterations);

    for backend in BACKENDS {
        for &size in VALUE_SIZES {
            // Half full at the end of the run.
            let dict = BenchDict::create(backend, harness.total_iterations() * 2, size)?;
            let value = fixtures::value_of(size);
            let target = dict.dictionary();

            let mut failures = 0u64;
            let samples = harness.run(|i| {
                if target.set(fixtures::key_for(i).as_bytes(), &value).is_err() {
                    failures += 1;
                }
            });
            anyhow::ensure!(failures == 0, "{} set operations failed", failures);

            let name = format!("set_{}_{}", backend, size);
            report.add_result(
                BenchmarkResult::latency(&name, BenchmarkCategory::Set, samples, true)
                    .with_metadata("backend", backend.to_string())
                    .with_metadata("value_size_bytes", size),
            );
            println!("  ✓ {}", name);
        }
    }
    Ok(())
}

fn run_get_benchmarks(report: &mut BenchmarkReport, iterations: u64) -> anyhow::Result<()> {
    let harness = BenchmarkHarness::new()
        .warmup(iterations / 10)
        .iterations(iterations);
    let entries = iterations;

    for backend in BACKENDS {
        for &size in VALUE_SIZES {
            let dict = BenchDict::create(backend, entries * 2, size)?;
            let value = fixtures::value_of(size);
            dict.prefill(entries, &value)?;
            let target = dict.dictionary();

            let mut misses = 0u64;
            let samples = harness.run(|i| {
                match target.get(fixtures::key_for(i % entries).as_bytes()) {
                    Ok(Some(_)) => {}
                    _ => misses += 1,
                }
            });
            anyhow::ensure!(misses == 0, "{} lookups missed", misses);

            let name = format!("get_{}_{}", backend, size);
            report.add_result(
                BenchmarkResult::latency(&name, BenchmarkCategory::Get, samples, true)
                    .with_metadata("backend", backend.to_string())
                    .with_metadata("value_size_bytes", size)
                    .with_metadata("entries", entries),
            );
            println!("  ✓ {}", name);
        }
    }
    Ok(())
}

fn run_iterate_benchmarks(report: &mut BenchmarkReport, iterations: u64) -> anyhow::Result<()> {
    // Each pass touches every slot, so far fewer passes are needed.
    let passes = (iterations / 100).clamp(5, 100);
    let harness = BenchmarkHarness::new().warmup(1).iterations(passes);
    let entries = iterations;
    let value = fixtures::value_of(64);

    for backend in BACKENDS {
        let dict = BenchDict::create(backend, entries * 2, value.len())?;
        dict.prefill(entries, &value)?;

        let mut short_passes = 0u64;
        let samples = match &dict {
            BenchDict::Shm(table) => harness.run(|_| {
                let mut seen = 0u64;
                table.map().foreach(|_, _| seen += 1);
                if seen != entries {
                    short_passes += 1;
                }
            }),
            BenchDict::Local(map) => harness.run(|_| {
                if map.keys().len() as u64 != entries {
                    short_passes += 1;
                }
            }),
        };
        anyhow::ensure!(short_passes == 0, "{} passes missed entries", short_passes);

        let name = format!("iterate_{}_{}", backend, entries);
        report.add_result(
            BenchmarkResult::latency(&name, BenchmarkCategory::Iterate, samples, true)
                .with_metadata("backend", backend.to_string())
                .with_metadata("entries", entries)
                .with_metadata("capacity", entries * 2),
        );
        println!("  ✓ {}", name);
    }
    Ok(())
}

fn run_contention_benchmarks(report: &mut BenchmarkReport, iterations: u64) -> anyhow::Result<()> {
    let value = fixtures::value_of(64);

    for &threads in THREAD_COUNTS {
        let per_thread = (iterations / threads as u64).max(1);
        let total = per_thread * threads as u64;
        let bytes = total * (fixtures::thread_key(0, 0).len() + value.len()) as u64;

        // Shared table: every thread attaches its own handle.
        let table = BenchTable::create(total * 2, value.len())?;
        let handles = (0..threads)
            .map(|_| table.attach())
            .collect::<Result<Vec<_>, _>>()?;
        let elapsed = harness::measure_parallel(threads, |t| {
            for i in 0..per_thread {
                // Capacity is twice the total, so a set can only fail on lock timeout.
                let _ = handles[t].set(fixtures::thread_key(t, i), &value);
            }
        });
        anyhow::ensure!(
            table.map().len() == total,
            "expected {} entries, found {}",
            total,
            table.map().len()
        );
        add_contention_result(report, Backend::Shm, threads, total, bytes, elapsed);

        let local = LocalMap::new();
        let elapsed = harness::measure_parallel(threads, |t| {
            for i in 0..per_thread {
                let _ = local.set(fixtures::thread_key(t, i).as_bytes(), &value);
            }
        });
        add_contention_result(report, Backend::Local, threads, total, bytes, elapsed);
    }
    Ok(())
}

fn add_contention_result(
    report: &mut BenchmarkReport,
    backend: Backend,
    threads: usize,
    ops: u64,
    bytes: u64,
    elapsed: Duration,
) {
    let name = format!("contention_{}_{}t", backend, threads);
    let duration_ns = elapsed.as_nanos() as u64;
    report.add_result(
        BenchmarkResult::throughput(&name, BenchmarkCategory::Contention, ops, bytes, duration_ns)
            .with_metadata("backend", backend.to_string())
            .with_metadata("threads", threads),
    );
    println!("  ✓ {}", name);
}

fn print_summary(report: &BenchmarkReport) {
    println!("Summary");
    println!("-------");
    println!();

    for result in &report.results {
        if let Some(latency) = &result.latency {
            println!(
                "{}: median={}, p99={}",
                result.name,
                LatencyMetrics::format_latency(latency.median_ns),
                LatencyMetrics::format_latency(latency.p99_ns)
            );
        }
        if let Some(throughput) = &result.throughput {
            println!(
                "{}: {}, {}",
                result.name,
                ThroughputMetrics::format_ops_per_sec(throughput.ops_per_sec),
                ThroughputMetrics::format_bytes_per_sec(throughput.bytes_per_sec)
            );
        }
    }
}
