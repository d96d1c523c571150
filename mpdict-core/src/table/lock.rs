// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Process-shared mutation lock with dead-holder recovery.
//!
//! The lock is a single `AtomicU32` in the segment header holding the PID of
//! its holder (0 = free). Waiters spin, then yield, then sleep. While
//! waiting they periodically probe the holder with `kill(pid, 0)`; a holder
//! that no longer exists is taken over by compare-and-swap and the caller is
//! told to repair the table before mutating it.
//!
//! Limitations: a holder that has exited but is not yet reaped by its parent
//! (a zombie) still counts as alive, and a recycled PID makes a dead holder
//! look alive. Both are bounded by the caller's lock timeout.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

use crate::error::TableError;

/// Snoozes between liveness probes of the holder.
const LIVENESS_INTERVAL: u32 = 16;

/// How the lock was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// The lock was free or released normally.
    Clean,
    /// The previous holder died while holding the lock.
    TakenOver { dead_holder: u32 },
}

/// Releases the mutation lock on drop.
pub struct LockGuard<'a> {
    word: &'a AtomicU32,
    pid: u32,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self
            .word
            .compare_exchange(self.pid, 0, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            tracing::warn!(pid = self.pid, "Mutation lock was broken while held");
        }
    }
}

/// Whether a process with this PID currently exists.
pub fn process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        // Exists but belongs to another user.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Acquire the lock word, waiting at most `timeout` for a live holder.
pub fn acquire(word: &AtomicU32, timeout: Duration) -> Result<(LockGuard<'_>, Acquired), TableError> {
    let me = std::process::id();
    let start = Instant::now();
    let mut backoff = Backoff::new();

    loop {
        let holder = match word.compare_exchange_weak(0, me, Ordering::Acquire, Ordering::Relaxed) {
            Ok(_) => return Ok((LockGuard { word, pid: me }, Acquired::Clean)),
            Err(holder) => holder,
        };

        if holder != 0 && backoff.should_probe() && !process_alive(holder) {
            if word
                .compare_exchange(holder, me, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                tracing::warn!(
                    dead_holder = holder,
                    pid = me,
                    "Mutation lock holder is gone, taking over"
                );
                return Ok((
                    LockGuard { word, pid: me },
                    Acquired::TakenOver {
                        dead_holder: holder,
                    },
                ));
            }
            continue;
        }

        let waited = start.elapsed();
        if waited >= timeout {
            return Err(TableError::LockTimeout {
                holder,
                waited_ms: waited.as_millis() as u64,
            });
        }
        backoff.snooze();
    }
}

/// Take the lock regardless of its holder. Returns the previous holder.
pub fn force(word: &AtomicU32) -> (LockGuard<'_>, u32) {
    let me = std::process::id();
    let previous = word.swap(me, Ordering::AcqRel);
    (LockGuard { word, pid: me }, previous)
}

/// Current holder, if any.
pub fn holder(word: &AtomicU32) -> Option<u32> {
    match word.load(Ordering::Acquire) {
        0 => None,
        pid => Some(pid),
    }
}

/// Spin, then yield, then sleep with a capped exponential delay.
struct Backoff {
    step: u32,
    snoozes: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 10;
    const MAX_SLEEP: Duration = Duration::from_millis(2);

    fn new() -> Self {
        Self {
            step: 0,
            snoozes: 0,
        }
    }

    fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                std::hint::spin_loop();
            }
        } else if self.step <= Self::YIELD_LIMIT {
            std::thread::yield_now();
        } else {
            let micros = 50u64 << (self.step - Self::YIELD_LIMIT).min(6);
            std::thread::sleep(Duration::from_micros(micros).min(Self::MAX_SLEEP));
        }
        self.step = self.step.saturating_add(1);
        self.snoozes = self.snoozes.wrapping_add(1);
    }

    /// Probe the holder once spinning is over and then every few snoozes.
    fn should_probe(&self) -> bool {
        self.step > Self::SPIN_LIMIT && self.snoozes % LIVENESS_INTERVAL == 0
    }
}
