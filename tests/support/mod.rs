//! Shared helpers for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Variables that would otherwise leak the developer's settings into a run
const SCRUBBED_VARS: &[&str] = &[
    "SLIMBOX_BUILDER_IMAGE",
    "SLIMBOX_RUNTIME_IMAGE",
    "SLIMBOX_POETRY_VERSION",
    "SLIMBOX_ENV_PATH",
    "SLIMBOX_WORKDIR",
    "SLIMBOX_SOURCE_DIR",
    "SLIMBOX_USER",
    "SLIMBOX_GROUP",
    "SLIMBOX_UID",
    "SLIMBOX_GID",
    "SLIMBOX_PORT",
    "SLIMBOX_APP_MODULE",
    "SLIMBOX_ENVIRONMENT",
    "SLIMBOX_RELOAD",
    "SLIMBOX_MAINTENANCE_COMMAND",
    "SLIMBOX_HEALTHCHECK_PATH",
    "SLIMBOX_TAG",
    "SLIMBOX_LOG_JSON",
    "RUST_LOG",
];

pub fn slimbox_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_slimbox"))
}

/// A `slimbox` command with a clean configuration environment
pub fn slimbox() -> Command {
    let mut cmd = Command::new(slimbox_bin());
    for var in SCRUBBED_VARS {
        cmd.env_remove(var);
    }
    cmd.env("SLIMBOX_LOG_LEVEL", "error");
    cmd
}

pub fn run(args: &[&str]) -> Output {
    slimbox().args(args).output().expect("Failed to execute slimbox")
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Copy a fixture project into a fresh temporary directory
pub fn copy_fixture(name: &str) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    copy_tree(&fixture_path(name), dir.path());
    dir
}

fn copy_tree(from: &Path, to: &Path) {
    fs::create_dir_all(to).expect("Failed to create directory");
    for entry in fs::read_dir(from).expect("Failed to read fixture") {
        let entry = entry.expect("Failed to read entry");
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_tree(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).expect("Failed to copy fixture file");
        }
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
