//! Tests that run part of their work in a second OS process
//!
//! These tests verify:
//! - An exclusive lock held by another process excludes this one
//! - A holder that dies without releasing is reclaimed, naming its pid
//! - Appends from two processes interleave without losing rows
//! - A failed append leaves earlier rows readable (Unix only)
//!
//! Each test re-runs this test binary filtered to itself. The child sees
//! `CHILD_ROLE_ENV` set and does its half of the work instead.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use slotdb::lock::{FileLockManager, LockManager, LockMode, RetryPolicy};
use slotdb::{record, Engine, FindOptions, SlotError};
use tempfile::TempDir;

const CHILD_ROLE_ENV: &str = "SLOTDB_CHILD_ROLE";
const CHILD_DIR_ENV: &str = "SLOTDB_CHILD_DIR";
const READY_FILE: &str = "child.ready";

// =============================================================================
// Helper Functions
// =============================================================================

fn short_policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_millis(100),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(10),
    }
}

fn patient_policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(10),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(20),
    }
}

/// Role and working directory when running as a child
fn child_role() -> Option<(String, PathBuf)> {
    let role = env::var(CHILD_ROLE_ENV).ok()?;
    let dir = env::var_os(CHILD_DIR_ENV)?;
    Some((role, PathBuf::from(dir)))
}

fn spawn_child(test_name: &str, role: &str, dir: &Path) -> Child {
    Command::new(env::current_exe().unwrap())
        .args([test_name, "--exact", "--nocapture", "--test-threads", "1"])
        .env(CHILD_ROLE_ENV, role)
        .env(CHILD_DIR_ENV, dir)
        .stdout(Stdio::null())
        .spawn()
        .unwrap()
}

fn wait_until_ready(child: &mut Child, dir: &Path) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while !dir.join(READY_FILE).exists() {
        if let Some(status) = child.try_wait().unwrap() {
            panic!("child exited before it was ready: {}", status);
        }
        assert!(Instant::now() < deadline, "child never became ready");
        thread::sleep(Duration::from_millis(10));
    }
}

fn assert_child_succeeded(mut child: Child) {
    let status = child.wait().unwrap();
    assert!(status.success(), "child failed: {}", status);
}

/// Take an exclusive lock and announce it. The guard is never dropped.
fn hold_exclusive(dir: &Path) -> slotdb::lock::LockGuard {
    let locks = FileLockManager::with_policy(patient_policy());
    let guard = locks.acquire(dir, LockMode::Exclusive).unwrap();
    fs::write(dir.join(READY_FILE), b"").unwrap();
    guard
}

// =============================================================================
// Cross-process Lock Tests
// =============================================================================

#[test]
fn test_lock_held_by_other_process_excludes_and_is_reclaimed_after_kill() {
    if let Some((_, dir)) = child_role() {
        let _guard = hold_exclusive(&dir);
        // Killed by the parent long before this runs out
        thread::sleep(Duration::from_secs(60));
        std::process::exit(0);
    }

    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let mut child = spawn_child(
        "test_lock_held_by_other_process_excludes_and_is_reclaimed_after_kill",
        "hold",
        dir,
    );
    wait_until_ready(&mut child, dir);

    let locks = FileLockManager::with_policy(short_policy());
    match locks.acquire(dir, LockMode::Exclusive) {
        Err(SlotError::LockTimeout { holder_pid, .. }) => {
            assert_eq!(holder_pid, Some(child.id()));
        }
        other => panic!("expected LockTimeout, got {:?}", other),
    }
    assert!(matches!(
        locks.acquire(dir, LockMode::Shared),
        Err(SlotError::LockTimeout { .. })
    ));

    child.kill().unwrap();
    child.wait().unwrap();

    let locks = FileLockManager::with_policy(patient_policy());
    let guard = locks.acquire(dir, LockMode::Exclusive).unwrap();
    assert_eq!(guard.reclaimed_from().map(|r| r.pid), Some(child.id()));
    assert_eq!(guard.reclaimed_from().map(|r| r.mode), Some(LockMode::Exclusive));
}

#[test]
fn test_lock_of_exited_holder_is_reclaimed() {
    if let Some((_, dir)) = child_role() {
        let _guard = hold_exclusive(&dir);
        // Exits without running destructors, so nothing is released
        std::process::exit(0);
    }

    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let child = spawn_child("test_lock_of_exited_holder_is_reclaimed", "exit", dir);
    let pid = child.id();
    assert_child_succeeded(child);

    assert_eq!(FileLockManager::read_owner(dir).map(|r| r.pid), Some(pid));

    let locks = FileLockManager::with_policy(short_policy());
    let guard = locks.acquire(dir, LockMode::Exclusive).unwrap();
    assert_eq!(guard.reclaimed_from().map(|r| r.pid), Some(pid));
    drop(guard);

    // Released cleanly this time, so the next holder finds nothing stale
    let guard = locks.acquire(dir, LockMode::Exclusive).unwrap();
    assert!(guard.reclaimed_from().is_none());
}

// =============================================================================
// Cross-process Table Tests
// =============================================================================

const APPENDS_PER_PROCESS: usize = 50;

fn append_events(engine: &Engine, source: &str) {
    let events = engine.open("events").unwrap();
    for seq in 0..APPENDS_PER_PROCESS {
        let seq = seq.to_string();
        events
            .create(&record([("source", source), ("seq", seq.as_str())]))
            .unwrap();
    }
}

#[test]
fn test_appends_from_two_processes_interleave() {
    if let Some((_, dir)) = child_role() {
        let engine = Engine::open_path(&dir).unwrap();
        fs::write(dir.join(READY_FILE), b"").unwrap();
        append_events(&engine, "child");
        return;
    }

    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let engine = Engine::open_path(dir).unwrap();
    engine
        .create_table("events", &[("source", 8), ("seq", 8)])
        .unwrap();

    let mut child = spawn_child("test_appends_from_two_processes_interleave", "append", dir);
    wait_until_ready(&mut child, dir);
    append_events(&engine, "parent");
    assert_child_succeeded(child);

    let events = engine.open("events").unwrap();
    let stats = events.verify().unwrap();
    assert_eq!(stats.rows, 2 * APPENDS_PER_PROCESS as u64);
    assert_eq!(stats.live_rows, 2 * APPENDS_PER_PROCESS as u64);
    for source in ["parent", "child"] {
        let ids = events
            .find(&record([("source", source)]), FindOptions::exact())
            .unwrap();
        assert_eq!(ids.len(), APPENDS_PER_PROCESS);
    }
}

// =============================================================================
// Failed Write Tests
// =============================================================================

/// Cap the size of any file this process writes, turning the overflow into
/// an `EFBIG` error instead of a signal
#[cfg(unix)]
fn cap_file_size(bytes: u64) {
    unsafe {
        libc::signal(libc::SIGXFSZ, libc::SIG_IGN);
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        assert_eq!(libc::getrlimit(libc::RLIMIT_FSIZE, &mut limit), 0);
        limit.rlim_cur = bytes as libc::rlim_t;
        assert_eq!(libc::setrlimit(libc::RLIMIT_FSIZE, &limit), 0);
    }
}

#[cfg(unix)]
#[test]
fn test_failed_append_keeps_earlier_rows() {
    if let Some((_, dir)) = child_role() {
        // Column `a` can still grow to two slots (22 bytes); column `b`
        // cannot (202 bytes), so the append fails after `a` was extended
        cap_file_size(150);
        let engine = Engine::open_path(&dir).unwrap();
        let table = engine.open("t").unwrap();

        let result = table.create(&record([("a", "second"), ("b", "y")]));
        assert!(matches!(result, Err(SlotError::Io(_))), "got {:?}", result);

        let rows = table.get(&[0]).unwrap();
        assert_eq!(rows[0].get("a"), Some("first"));
        assert_eq!(table.row_count().unwrap(), 1);
        return;
    }

    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let engine = Engine::open_path(dir).unwrap();
    let table = engine.create_table("t", &[("a", 10), ("b", 100)]).unwrap();
    table.create(&record([("a", "first"), ("b", "x")])).unwrap();

    let child = spawn_child("test_failed_append_keeps_earlier_rows", "capped", dir);
    assert_child_succeeded(child);

    let stats = table.verify().unwrap();
    assert_eq!(stats.rows, 1);
    assert_eq!(table.get(&[0]).unwrap()[0].get("b"), Some("x"));

    let schema = table.schema().unwrap();
    for (name, width) in [("a", 11), ("b", 101)] {
        let path = table.path().join(schema.column(name).unwrap().file_name());
        assert_eq!(fs::metadata(path).unwrap().len(), width);
    }

    // Without the cap the same append goes through at the next id
    let id = table.create(&record([("a", "second"), ("b", "y")])).unwrap();
    assert_eq!(id, 1);
    assert_eq!(table.verify().unwrap().rows, 2);
}
