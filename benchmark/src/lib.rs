// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! mpdict Benchmarking Framework
//!
//! Measures the shared-memory table against a process-local map baseline.
//!
//! # Benchmark Categories
//!
//! - **Set**: insert latency on fresh keys at several value sizes
//! - **Get**: lookup latency on present keys
//! - **Iterate**: full passes over a prefilled table
//! - **Contention**: throughput of concurrent writers on disjoint keys
//!
//! # Data Output
//!
//! All benchmarks output JSON files with standardized metrics for visualization.

pub mod fixtures;
pub mod harness;
pub mod metrics;
pub mod reporter;

pub use fixtures::{BenchDict, BenchTable};
pub use harness::BenchmarkHarness;
pub use metrics::{
    BenchmarkCategory, BenchmarkReport, BenchmarkResult, LatencyMetrics, SystemInfo,
    ThroughputMetrics,
};
pub use reporter::JsonReporter;
