// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! JSON report generation for benchmark results.
//!
//! Reports are written as `{category}_{timestamp}.json`, where the category
//! is `mixed` when a report spans several categories.

use crate::metrics::BenchmarkReport;
use chrono::Utc;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Report I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// JSON reporter for benchmark results.
pub struct JsonReporter {
    /// Output directory for benchmark data
    output_dir: PathBuf,
}

impl JsonReporter {
    /// Create a new JSON reporter with the specified output directory.
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, ReporterError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    /// Create a reporter using the default data directory.
    pub fn default_location() -> Result<Self, ReporterError> {
        let manifest_dir = env!("CARGO_MANIFEST_DIR");
        let data_dir = Path::new(manifest_dir).join("data");
        Self::new(data_dir)
    }

    /// Save a benchmark report to a JSON file.
    ///
    /// Returns the path to the created file.
    pub fn save(&self, report: &BenchmarkReport) -> Result<PathBuf, ReporterError> {
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT);
        let filename = format!("{}_{}.json", Self::report_label(report), timestamp);
        self.write(&filename, report)
    }

    /// `mixed` unless every result shares one category.
    fn report_label(report: &BenchmarkReport) -> String {
        let mut categories = report.results.iter().map(|r| r.category);
        match categories.next() {
            Some(first) if categories.all(|c| c == first) => first.to_string(),
            _ => "mixed".to_string(),
        }
    }

    fn write(&self, filename: &str, report: &BenchmarkReport) -> Result<PathBuf, ReporterError> {
        let filepath = self.output_dir.join(filename);
        let file = File::create(&filepath)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, report)?;
        Ok(filepath)
    }

    /// Save multiple reports, one per category.
    pub fn save_by_category(
        &self,
        report: &BenchmarkReport,
    ) -> Result<Vec<PathBuf>, ReporterError> {
        use std::collections::HashMap;

        // Group results by category
        let mut by_category: HashMap<_, Vec<_>> = HashMap::new();
        for result in &report.results {
            by_category
                .entry(result.category)
                .or_default()
                .push(result.clone());
        }

        let mut paths = Vec::new();
        for (category, results) in by_category {
            let category_report = BenchmarkReport {
                results,
                ..report.clone()
            };
            let timestamp = report.timestamp.format(TIMESTAMP_FORMAT);
            let filename = format!("{}_{}.json", category, timestamp);
            paths.push(self.write(&filename, &category_report)?);
        }
        paths.sort();

        Ok(paths)
    }

    /// List all existing benchmark files in the output directory.
    pub fn list_reports(&self) -> Result<Vec<PathBuf>, ReporterError> {
        let mut reports = Vec::new();
        for entry in fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                reports.push(path);
            }
        }
        reports.sort();
        Ok(reports)
    }

    /// Load an existing benchmark report from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<BenchmarkReport, ReporterError> {
        let file = File::open(path)?;
        let report = serde_json::from_reader(file)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{BenchmarkCategory, BenchmarkResult};
    use tempfile::TempDir;

    fn result(name: &str, category: BenchmarkCategory) -> BenchmarkResult {
        BenchmarkResult::latency(name, category, vec![100, 200, 300], false)
    }

    #[test]
    fn test_reporter_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = JsonReporter::new(temp_dir.path()).unwrap();

        let mut report = BenchmarkReport::new();
        report.add_result(result("get_shm_64", BenchmarkCategory::Get));

        let path = reporter.save(&report).unwrap();
        assert!(path.exists());
        let filename = path.file_name().unwrap().to_str().unwrap();
        assert!(filename.starts_with("get_"), "{}", filename);

        let loaded = JsonReporter::load(&path).unwrap();
        assert_eq!(loaded.results.len(), 1);
        assert_eq!(loaded.results[0].name, "get_shm_64");
        assert_eq!(reporter.list_reports().unwrap(), vec![path]);
    }

    #[test]
    fn test_mixed_report_label() {
        let mut report = BenchmarkReport::new();
        report.add_result(result("set_shm_64", BenchmarkCategory::Set));
        report.add_result(result("get_shm_64", BenchmarkCategory::Get));
        assert_eq!(JsonReporter::report_label(&report), "mixed");
    }

    #[test]
    fn test_save_by_category() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = JsonReporter::new(temp_dir.path()).unwrap();

        let mut report = BenchmarkReport::new();
        report.add_result(result("set_shm_64", BenchmarkCategory::Set));
        report.add_result(result("set_local_64", BenchmarkCategory::Set));
        report.add_result(result("iterate_shm", BenchmarkCategory::Iterate));

        let paths = reporter.save_by_category(&report).unwrap();
        assert_eq!(paths.len(), 2);

        let sets = paths
            .iter()
            .map(|p| JsonReporter::load(p).unwrap())
            .find(|r| r.results[0].category == BenchmarkCategory::Set)
            .unwrap();
        assert_eq!(sets.results.len(), 2);
        assert_eq!(sets.timestamp, report.timestamp);
    }
}
