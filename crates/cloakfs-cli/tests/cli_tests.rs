//! CLI surface tests: argument validation and keygen output.
//!
//! Mounting itself needs a FUSE device, so these stop at the point where
//! `mount` would touch the kernel; every failure here must exit 1.

use assert_cmd::Command;
use predicates::prelude::*;

fn cloakfs() -> Command {
    Command::cargo_bin("cloakfs").unwrap()
}

#[test]
fn keygen_emits_64_hex_digits_by_default() {
    cloakfs()
        .arg("keygen")
        .assert()
        .success()
        .stdout(predicate::str::is_match("^[0-9a-f]{64}\n$").unwrap());
}

#[test]
fn keygen_honors_length() {
    cloakfs()
        .args(["keygen", "16"])
        .assert()
        .success()
        .stdout(predicate::str::is_match("^[0-9a-f]{32}\n$").unwrap());
}

#[test]
fn keygen_output_varies() {
    let first = cloakfs().arg("keygen").assert().success();
    let second = cloakfs().arg("keygen").assert().success();
    assert_ne!(
        first.get_output().stdout,
        second.get_output().stdout
    );
}

#[test]
fn keygen_rejects_zero_length() {
    cloakfs()
        .args(["keygen", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("positive"));
}

#[test]
fn keygen_rejects_negative_length() {
    cloakfs().args(["keygen", "--", "-4"]).assert().code(1);
}

#[test]
fn keygen_rejects_non_integer_length() {
    cloakfs()
        .args(["keygen", "many"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("integer"));
}

#[test]
fn mount_rejects_non_hex_key() {
    let dir = tempfile::tempdir().unwrap();
    cloakfs()
        .args([
            "mount",
            dir.path().to_str().unwrap(),
            dir.path().to_str().unwrap(),
            "zz".repeat(32).as_str(),
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid mount key"));
}

#[test]
fn mount_rejects_odd_length_key() {
    let dir = tempfile::tempdir().unwrap();
    cloakfs()
        .args([
            "mount",
            dir.path().to_str().unwrap(),
            dir.path().to_str().unwrap(),
            "abc",
        ])
        .assert()
        .code(1);
}

#[test]
fn mount_rejects_short_key() {
    let dir = tempfile::tempdir().unwrap();
    cloakfs()
        .args([
            "mount",
            dir.path().to_str().unwrap(),
            dir.path().to_str().unwrap(),
            "aabb",
        ])
        .assert()
        .code(1);
}

#[test]
fn mount_rejects_bad_block_size() {
    let dir = tempfile::tempdir().unwrap();
    cloakfs()
        .args([
            "mount",
            dir.path().to_str().unwrap(),
            dir.path().to_str().unwrap(),
            "00".repeat(32).as_str(),
            "--block-size",
            "100",
        ])
        .assert()
        .code(1);
}

#[test]
fn mount_requires_existing_storage_directory() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent");
    cloakfs()
        .args([
            "mount",
            missing.to_str().unwrap(),
            dir.path().to_str().unwrap(),
            "00".repeat(32).as_str(),
        ])
        .assert()
        .code(1);
}
