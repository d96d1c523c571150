// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Cross-process tests driving the `mpdict` binary.
//!
//! Each test works on a table named after this process and the test, and
//! destroys it before returning.

use std::collections::HashSet;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use serde_json::Value;
use tempfile::TempDir;

const MPDICT: &str = env!("CARGO_BIN_EXE_mpdict");

fn table_name(tag: &str) -> String {
    format!("mpdict-cli-{}-{}", std::process::id(), tag)
}

fn mpdict(args: &[&str]) -> Output {
    Command::new(MPDICT)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("Failed to run mpdict")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn expected_mark(key: &str) -> String {
    if key.starts_with("Foreground") {
        "Foreground".to_string()
    } else {
        key[..1].repeat(10)
    }
}

/// Three processes writing disjoint keys into one table.
#[test]
fn test_bench_three_processes_share_table() {
    let name = table_name("bench");
    let output = mpdict(&[
        "bench",
        "--processes",
        "3",
        "--worksize",
        "3000",
        "--name",
        &name,
        "--json",
    ]);
    assert!(
        output.status.success(),
        "bench failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let summary: Value = serde_json::from_str(&stdout(&output)).expect("bench prints JSON");
    assert_eq!(summary["per_worker"], 1000);
    assert_eq!(summary["len"], 3000);

    let samples = summary["samples"].as_array().expect("samples array");
    assert_eq!(samples.len(), 9);
    for sample in samples {
        let key = sample["key"].as_str().unwrap();
        assert_eq!(sample["value"].as_str().unwrap(), expected_mark(key));
    }

    // A full pass from a fresh process sees every written key exactly once.
    let output = mpdict(&[
        "inspect",
        "--entries",
        "5000",
        "--json",
        "--name",
        &name,
        "--capacity",
        "3000",
    ]);
    assert!(output.status.success());
    let stats: Value = serde_json::from_str(&stdout(&output)).expect("inspect prints JSON");
    let entries = stats["entries"].as_array().expect("entries array");
    assert_eq!(entries.len(), 3000);

    let seen: HashSet<&str> = entries
        .iter()
        .map(|entry| entry["key"].as_str().unwrap())
        .collect();
    let expected: HashSet<String> = ["a", "b", "Foreground"]
        .iter()
        .flat_map(|id| (0..1000).map(move |i| format!("{}{}", id, i)))
        .collect();
    assert_eq!(seen.len(), 3000);
    assert!(expected.iter().all(|key| seen.contains(key.as_str())));
    for entry in entries {
        let key = entry["key"].as_str().unwrap();
        assert_eq!(entry["value"].as_str().unwrap(), expected_mark(key));
    }

    // Every worker's last key is readable from a fresh process.
    for (key, mark) in [
        ("a999", "aaaaaaaaaa"),
        ("b999", "bbbbbbbbbb"),
        ("Foreground999", "Foreground"),
    ] {
        let output = mpdict(&["get", key, "--name", &name, "--capacity", "3000"]);
        assert!(output.status.success());
        assert_eq!(stdout(&output), mark);
    }

    assert!(mpdict(&["destroy", "--name", &name]).status.success());
}

#[test]
fn test_killed_writer_does_not_wedge_table() {
    let name = table_name("killed");
    let table = [
        "--name",
        name.as_str(),
        "--capacity",
        "200000",
        "--max-key-bytes",
        "16",
        "--max-value-bytes",
        "16",
        "--lock-timeout-ms",
        "10000",
    ];

    let mut args = vec!["bench", "--processes", "1", "--worksize", "10"];
    args.extend_from_slice(&table);
    assert!(mpdict(&args).status.success());

    let mut worker = Command::new(MPDICT)
        .args(["worker", "--id", "k", "--count", "150000"])
        .args(table)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn worker");

    std::thread::sleep(Duration::from_millis(200));
    // Possibly mid-set, holding the mutation lock.
    let _ = worker.kill();
    // Reap it: an unreaped holder still looks alive.
    worker.wait().expect("Failed to reap worker");

    let start = Instant::now();
    let mut args = vec!["set", "after", "crash"];
    args.extend_from_slice(&table);
    let output = mpdict(&args);
    assert!(
        output.status.success(),
        "set after crash failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(start.elapsed() < Duration::from_secs(10));

    let mut args = vec!["inspect", "--json"];
    args.extend_from_slice(&table);
    let stats: Value = serde_json::from_str(&stdout(&mpdict(&args))).expect("inspect prints JSON");
    assert!(stats["lock_holder"].is_null());
    assert!(stats["len"].as_u64().unwrap() >= 11);

    let mut args = vec!["get", "after"];
    args.extend_from_slice(&table);
    assert_eq!(stdout(&mpdict(&args)), "crash");

    let mut args = vec!["get", "Foreground9"];
    args.extend_from_slice(&table);
    assert_eq!(stdout(&mpdict(&args)), "Foreground");

    assert!(mpdict(&["destroy", "--name", &name]).status.success());
}

#[test]
fn test_same_key_from_many_processes_leaves_one_value() {
    let name = table_name("samekey");
    let table = ["--name", name.as_str(), "--capacity", "64"];

    let mut args = vec!["bench", "--processes", "1", "--worksize", "4"];
    args.extend_from_slice(&table);
    assert!(mpdict(&args).status.success());

    let values: Vec<String> = (0..8).map(|i| format!("writer-{}", i)).collect();
    for _round in 0..5 {
        let children: Vec<_> = values
            .iter()
            .map(|value| {
                Command::new(MPDICT)
                    .args(["set", "contested", value.as_str()])
                    .args(table)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .expect("Failed to spawn set")
            })
            .collect();
        for mut child in children {
            assert!(child.wait().expect("Failed to wait for set").success());
        }

        let mut args = vec!["get", "contested"];
        args.extend_from_slice(&table);
        let winner = stdout(&mpdict(&args));
        assert!(values.contains(&winner), "unexpected value {:?}", winner);
    }

    let mut args = vec!["inspect", "--entries", "64", "--json"];
    args.extend_from_slice(&table);
    let stats: Value = serde_json::from_str(&stdout(&mpdict(&args))).expect("inspect prints JSON");
    assert_eq!(stats["len"], 5);
    assert!(stats["lock_holder"].is_null());
    let contested: Vec<&Value> = stats["entries"]
        .as_array()
        .expect("entries array")
        .iter()
        .filter(|entry| entry["key"] == "contested")
        .collect();
    assert_eq!(contested.len(), 1);
    assert!(values.iter().any(|v| contested[0]["value"] == v.as_str()));

    assert!(mpdict(&["destroy", "--name", &name]).status.success());
}

#[test]
fn test_operator_commands() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = dir.path().join("mpdict.yaml");
    let name = table_name("ops");
    std::fs::write(
        &config_path,
        format!("table:\n  name: {}\n  capacity: 64\n", name),
    )
    .expect("Failed to write config");
    let config = config_path.to_str().unwrap();

    let output = mpdict(&["validate", config]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Capacity:        64 entries"));

    // No table yet: attach-only commands fail.
    assert!(!mpdict(&["-c", config, "get", "k"]).status.success());

    let mut args = vec!["bench", "-c", config, "--processes", "2", "--worksize", "20"];
    args.push("--json");
    assert!(mpdict(&args).status.success());

    assert!(mpdict(&["-c", config, "set", "k", "v1"]).status.success());
    assert!(mpdict(&["-c", config, "set", "k", "v2"]).status.success());
    assert_eq!(stdout(&mpdict(&["-c", config, "get", "k"])), "v2");

    assert!(mpdict(&["-c", config, "del", "k"]).status.success());
    assert!(!mpdict(&["-c", config, "get", "k"]).status.success());
    assert!(!mpdict(&["-c", config, "del", "k"]).status.success());

    let output = mpdict(&["-c", config, "recover"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Live entries:         20"));

    let stats: Value =
        serde_json::from_str(&stdout(&mpdict(&["-c", config, "inspect", "--json"]))).unwrap();
    assert_eq!(stats["len"], 20);
    assert_eq!(stats["recoveries"], 1);
    assert_eq!(stats["capacity"], 64);

    assert!(mpdict(&["-c", config, "destroy"]).status.success());
    assert!(!mpdict(&["-c", config, "destroy"]).status.success());
}

#[test]
fn test_bench_rejects_too_many_processes() {
    let output = mpdict(&["bench", "--processes", "17", "--name", &table_name("many")]);
    assert!(!output.status.success());
}
