// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

#![allow(clippy::disallowed_methods)]

use std::process::Command;

fn host() -> Command {
    Command::new(env!("CARGO_BIN_EXE_userfs-fuse-host"))
}

#[test]
fn help_runs_without_mounting() {
    let status = host().arg("--help").status().expect("able to execute userfs-fuse-host");
    assert!(status.success(), "--help should succeed");
}

#[test]
fn no_users_exits_with_one() {
    let mount_point = tempfile::tempdir().unwrap();
    let output = host().env("RUST_LOG", "error").arg(mount_point.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no users"), "stderr: {stderr}");
    assert_eq!(stderr.trim().lines().count(), 1);
}

#[test]
fn unknown_local_user_exits_with_one() {
    if !std::path::Path::new("/dev/fuse").exists() {
        eprintln!("Skipping: /dev/fuse not present");
        return;
    }
    let mount_point = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    let output = host()
        .arg(mount_point.path())
        .args(["-u", "nobody-here", "--backend", "local", "--data-dir"])
        .arg(data_dir.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("constructing filesystem"), "stderr: {stderr}");
}
