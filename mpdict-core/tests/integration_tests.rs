// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Integration tests for the public SharedMap API.
//!
//! Every test uses a segment name unique to this process and destroys it
//! before returning.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use mpdict_core::shm::Segment;
use mpdict_core::table::Table;
use mpdict_core::{
    Capacity, ConfigLoader, SegmentError, SegmentName, SharedMap, TableConfig, TableError,
};
use tempfile::TempDir;

fn unique_name(tag: &str) -> SegmentName {
    SegmentName::new(format!("mpdict-it-{}-{}", std::process::id(), tag)).expect("valid name")
}

fn config(capacity: u64) -> TableConfig {
    TableConfig::new(Capacity::new(capacity).expect("valid capacity"))
}

/// PID of a process that has exited and been reaped.
fn dead_pid() -> u32 {
    let mut child = std::process::Command::new("true")
        .spawn()
        .expect("Failed to spawn true");
    let pid = child.id();
    child.wait().expect("Failed to reap child");
    pid
}

#[test]
fn test_entries_survive_close_and_reopen() {
    let name = unique_name("reopen");
    let map = SharedMap::open(&name, &config(256), true).unwrap();
    for i in 0..100 {
        map.set(format!("key{}", i), format!("value{}", i)).unwrap();
    }
    map.close();

    let map = SharedMap::open(&name, &config(256), false).unwrap();
    assert_eq!(map.len(), 100);
    assert_eq!(map.get("key42").unwrap(), b"value42");
    assert_eq!(map.keys().count(), 100);
    map.close();

    SharedMap::destroy(&name).unwrap();
}

#[test]
fn test_reset_discards_entries() {
    let name = unique_name("reset");
    let map = SharedMap::open(&name, &config(16), true).unwrap();
    map.set("stale", "entry").unwrap();
    drop(map);

    let map = SharedMap::open(&name, &config(16), true).unwrap();
    assert!(map.is_empty());
    assert_eq!(map.get("stale"), Err(TableError::NotFound));

    SharedMap::destroy(&name).unwrap();
}

#[test]
fn test_attach_after_destroy_fails() {
    let name = unique_name("destroyed");
    let map = SharedMap::open(&name, &config(8), true).unwrap();
    SharedMap::destroy(&name).unwrap();

    // The orphaned mapping still works for the process holding it.
    map.set("k", "v").unwrap();
    assert_eq!(map.get("k").unwrap(), b"v");

    assert!(matches!(
        SharedMap::attach(&name, &config(8)),
        Err(SegmentError::SegmentNotFound { .. })
    ));
    assert!(matches!(
        SharedMap::destroy(&name),
        Err(SegmentError::SegmentNotFound { .. })
    ));
}

#[test]
fn test_fill_to_capacity() {
    let name = unique_name("full");
    let map = SharedMap::open(&name, &config(32), true).unwrap();
    for i in 0..32 {
        map.set(format!("k{}", i), "x").unwrap();
    }
    assert_eq!(
        map.set("one-more", "x"),
        Err(TableError::CapacityExceeded { capacity: 32 })
    );
    // Updates still succeed on a full table.
    map.set("k0", "y").unwrap();
    assert_eq!(map.get("k0").unwrap(), b"y");

    // A delete frees room for a new key.
    map.delete("k1").unwrap();
    map.set("one-more", "x").unwrap();
    assert_eq!(map.len(), 32);

    SharedMap::destroy(&name).unwrap();
}

#[test]
fn test_bounds_from_config_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("mpdict.yaml");
    let name = unique_name("yaml");
    std::fs::write(
        &path,
        format!(
            "table:\n  name: {}\n  capacity: 64\n  max_key_bytes: 8\n  max_value_bytes: 4\n",
            name
        ),
    )
    .expect("Failed to write config");

    let loaded = ConfigLoader::load_file(&path).unwrap();
    let map = SharedMap::open(&loaded.name, &loaded.table, true).unwrap();

    map.set("12345678", "abcd").unwrap();
    assert_eq!(
        map.set("123456789", "a"),
        Err(TableError::KeyTooLong { len: 9, max: 8 })
    );
    assert_eq!(
        map.set("k", "abcde"),
        Err(TableError::ValueTooLong { len: 5, max: 4 })
    );

    // A process with different bounds cannot attach.
    assert!(matches!(
        SharedMap::attach(&loaded.name, &config(64)),
        Err(SegmentError::IncompatibleLayout { .. })
    ));

    SharedMap::destroy(&loaded.name).unwrap();
}

#[test]
fn test_concurrent_handles_disjoint_keys() {
    let name = unique_name("threads");
    let cfg = config(4096);
    let _owner = SharedMap::open(&name, &cfg, true).unwrap();

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let name = &name;
            let cfg = &cfg;
            scope.spawn(move || {
                let map = SharedMap::attach(name, cfg).unwrap();
                for i in 0..500 {
                    map.set(format!("w{}-{}", worker, i), worker.to_string())
                        .unwrap();
                }
            });
        }
    });

    let map = SharedMap::attach(&name, &cfg).unwrap();
    assert_eq!(map.len(), 2000);
    for worker in 0..4 {
        assert_eq!(
            map.get(format!("w{}-499", worker)).unwrap(),
            worker.to_string().as_bytes()
        );
    }
    assert_eq!(map.iter().count(), 2000);

    SharedMap::destroy(&name).unwrap();
}

#[test]
fn test_dead_lock_holder_recovered_by_next_writer() {
    let name = unique_name("deadholder");
    let cfg = config(16).with_lock_timeout(Duration::from_secs(5)).unwrap();
    let map = SharedMap::open(&name, &cfg, true).unwrap();
    map.set("before", "crash").unwrap();

    // Leave the lock owned by a process that no longer exists.
    let segment = Segment::attach(&name, &cfg).unwrap();
    let table = unsafe { Table::new(segment.base(), segment.geometry(), cfg.lock_timeout()) };
    table.header().lock.store(dead_pid(), Ordering::Release);
    assert!(map.stats().lock_holder.is_some());

    let start = Instant::now();
    map.set("after", "recovery").unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));

    let stats = map.stats();
    assert_eq!(stats.recoveries, 1);
    assert_eq!(stats.lock_holder, None);
    assert_eq!(stats.len, 2);
    assert_eq!(map.get("before").unwrap(), b"crash");

    drop(table);
    drop(segment);
    SharedMap::destroy(&name).unwrap();
}

#[test]
fn test_live_holder_times_out_then_recover() {
    let name = unique_name("hung");
    let cfg = config(16)
        .with_lock_timeout(Duration::from_millis(50))
        .unwrap();
    let map = SharedMap::open(&name, &cfg, true).unwrap();

    // This process is alive, so a lock it "holds" looks like a hung writer.
    let segment = Segment::attach(&name, &cfg).unwrap();
    let table = unsafe { Table::new(segment.base(), segment.geometry(), cfg.lock_timeout()) };
    table
        .header()
        .lock
        .store(std::process::id(), Ordering::Release);

    assert!(matches!(
        map.set("k", "v"),
        Err(TableError::LockTimeout { .. })
    ));

    let report = map.recover();
    assert_eq!(report.live, 0);
    map.set("k", "v").unwrap();
    assert_eq!(map.stats().recoveries, 1);

    drop(table);
    drop(segment);
    SharedMap::destroy(&name).unwrap();
}
