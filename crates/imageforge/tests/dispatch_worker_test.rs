// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dispatch gate tests against real worker stub processes.
//!
//! Stubs are `/bin/sh` scripts run through the gate exactly like the real
//! worker (`<program> <script> <args...>`), so these tests exercise the
//! full spawn / capture / parse path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use imageforge::{DispatchConfig, DispatchError, DispatchGate, GenerationParam};
use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn gate(script: &Path, jobs: usize, timeout: Duration) -> DispatchGate {
    DispatchGate::new(DispatchConfig {
        worker_program: "sh".to_string(),
        script_path: script.to_path_buf(),
        max_concurrent_jobs: jobs,
        worker_timeout: timeout,
    })
}

fn count_started(markers: &Path) -> usize {
    std::fs::read_dir(markers)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with("started."))
                .count()
        })
        .unwrap_or(0)
}

#[tokio::test]
async fn worker_output_parses_into_images() {
    let tmp = TempDir::new().unwrap();
    let script = write_script(
        tmp.path(),
        "ok.sh",
        r#"echo '[{"Pixels":[1,2,3],"IsNSFW":false},{"Pixels":[4],"IsNSFW":true}]'
"#,
    );

    let gate = gate(&script, 2, Duration::from_secs(10));
    let images = gate.generate(&[]).await.unwrap();

    assert_eq!(images.len(), 2);
    assert_eq!(images[0].pixels, vec![1, 2, 3]);
    assert!(!images[0].is_nsfw);
    assert!(images[1].is_nsfw);
}

#[tokio::test]
async fn params_arrive_as_individual_argv_entries() {
    let tmp = TempDir::new().unwrap();
    // Reports the number of received arguments back as a pixel value.
    let script = write_script(
        tmp.path(),
        "argcount.sh",
        r#"echo "[{\"Pixels\":[$#],\"IsNSFW\":false}]"
"#,
    );

    let gate = gate(&script, 2, Duration::from_secs(10));
    let params = vec![
        GenerationParam::Str("a castle at dusk".into()),
        GenerationParam::Num(512.into()),
        GenerationParam::List(vec![GenerationParam::Num(256.into()), GenerationParam::Num(384.into())]),
    ];
    let images = gate.generate(&params).await.unwrap();

    // One string + one number + a two-element list flattened = 4 argv entries.
    assert_eq!(images[0].pixels, vec![4]);
}

#[tokio::test]
async fn nonzero_exit_is_reported_with_code() {
    let tmp = TempDir::new().unwrap();
    let script = write_script(tmp.path(), "fail.sh", "exit 7\n");

    let gate = gate(&script, 2, Duration::from_secs(10));
    match gate.generate(&[]).await {
        Err(DispatchError::ExitCode { exit_code }) => assert_eq!(exit_code, 7),
        other => panic!("expected ExitCode error, got {other:?}"),
    }
}

#[tokio::test]
async fn slots_are_released_after_failures() {
    let tmp = TempDir::new().unwrap();
    let script = write_script(tmp.path(), "fail.sh", "exit 3\n");

    let gate = gate(&script, 2, Duration::from_secs(10));

    // More sequential failing calls than slots: any leaked permit would
    // deadlock the later calls.
    for _ in 0..4 {
        assert!(matches!(
            gate.generate(&[]).await,
            Err(DispatchError::ExitCode { exit_code: 3 })
        ));
    }
    assert_eq!(gate.available_slots(), 2);
}

#[tokio::test]
async fn malformed_output_is_an_error_not_a_crash() {
    let tmp = TempDir::new().unwrap();
    let script = write_script(tmp.path(), "garbage.sh", "echo 'this is not json'\n");

    let gate = gate(&script, 2, Duration::from_secs(10));
    assert!(matches!(
        gate.generate(&[]).await,
        Err(DispatchError::MalformedOutput(_))
    ));
    assert_eq!(gate.available_slots(), 2);
}

#[tokio::test]
async fn hung_worker_is_killed_on_timeout() {
    let tmp = TempDir::new().unwrap();
    let script = write_script(tmp.path(), "hang.sh", "sleep 30\necho '[]'\n");

    let gate = gate(&script, 1, Duration::from_millis(300));

    let start = Instant::now();
    assert!(matches!(
        gate.generate(&[]).await,
        Err(DispatchError::Timeout)
    ));
    assert!(start.elapsed() < Duration::from_secs(10));

    // The slot must be free again; a second call would otherwise block.
    assert_eq!(gate.available_slots(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_is_bounded_by_slot_count() {
    let tmp = TempDir::new().unwrap();
    // Records that it started, then blocks until the release file appears.
    // The first argument is the marker directory (quoted per the argv
    // contract, so strip the quotes).
    let script = write_script(
        tmp.path(),
        "blocking.sh",
        r#"DIR=${1#\"}
DIR=${DIR%\"}
touch "$DIR/started.$$"
while [ ! -f "$DIR/release" ]; do sleep 0.05; done
echo '[]'
"#,
    );

    let markers = tmp.path().join("markers");
    std::fs::create_dir_all(&markers).unwrap();

    let gate = Arc::new(gate(&script, 2, Duration::from_secs(30)));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let gate = Arc::clone(&gate);
        let dir_param = GenerationParam::Str(markers.to_string_lossy().into_owned());
        handles.push(tokio::spawn(
            async move { gate.generate(&[dir_param]).await },
        ));
    }

    // Wait for the first two workers to start.
    let deadline = Instant::now() + Duration::from_secs(10);
    while count_started(&markers) < 2 {
        assert!(Instant::now() < deadline, "workers never started");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Give the queued calls a chance to (incorrectly) start a third worker.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(count_started(&markers), 2, "concurrency bound exceeded");
    assert_eq!(gate.available_slots(), 0);

    // Unblock everyone; all five calls must complete.
    std::fs::write(markers.join("release"), b"").unwrap();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(count_started(&markers), 5);
    assert_eq!(gate.available_slots(), 2);
}
