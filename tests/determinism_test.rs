//! Reproducibility of planning and packing
//!
//! The same project must produce byte-identical Dockerfiles and build
//! contexts regardless of where it is checked out or how often it is planned.

mod support;

use slimbox::context;
use slimbox::{PipelineOrchestrator, SlimboxConfig};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use support::copy_fixture;

async fn plan(root: &Path) -> slimbox::PlanOutput {
    PipelineOrchestrator::default()
        .execute(root, SlimboxConfig::default())
        .await
        .expect("planning should succeed")
}

#[tokio::test]
async fn test_dockerfile_is_identical_across_checkouts() {
    let first = copy_fixture("valid");
    let second = copy_fixture("valid");

    let a = plan(first.path()).await;
    let b = plan(second.path()).await;
    assert_eq!(a.dockerfile, b.dockerfile);
    assert_eq!(a.plan, b.plan);
}

#[tokio::test]
async fn test_context_digest_ignores_mtime_and_location() {
    let first = copy_fixture("valid");
    let second = copy_fixture("valid");
    let output = plan(first.path()).await;

    let a = context::pack(first.path(), &output.dockerfile).unwrap();

    thread::sleep(Duration::from_millis(20));
    let main = second.path().join("src/app/main.py");
    let content = fs::read(&main).unwrap();
    fs::write(&main, content).unwrap();

    let b = context::pack(second.path(), &output.dockerfile).unwrap();
    assert_eq!(a.digest, b.digest);
    assert_eq!(a.entries, b.entries);
    assert_eq!(a.archive, b.archive);
}

#[tokio::test]
async fn test_lock_change_changes_plan() {
    let first = copy_fixture("valid");
    let second = copy_fixture("valid");
    let lock = second.path().join("poetry.lock");
    let content = fs::read_to_string(&lock).unwrap();
    fs::write(&lock, content.replace("content-hash = \"5f1c\"", "content-hash = \"5f1d\"")).unwrap();

    let a = plan(first.path()).await;
    let b = plan(second.path()).await;
    assert_ne!(a.plan.metadata.lock_digest, b.plan.metadata.lock_digest);
    assert_ne!(a.dockerfile, b.dockerfile);
}

#[tokio::test]
async fn test_context_excludes_local_environment() {
    let project = copy_fixture("valid");
    fs::create_dir_all(project.path().join(".venv/bin")).unwrap();
    fs::write(project.path().join(".venv/bin/python"), "").unwrap();
    fs::create_dir_all(project.path().join("src/app/__pycache__")).unwrap();
    fs::write(project.path().join("src/app/__pycache__/main.cpython-311.pyc"), "").unwrap();

    let output = plan(project.path()).await;
    let packed = context::pack(project.path(), &output.dockerfile).unwrap();

    assert!(packed.entries.iter().any(|e| e == "src/app/main.py"));
    assert!(packed.entries.iter().any(|e| e == "Dockerfile"));
    assert!(!packed.entries.iter().any(|e| e.starts_with(".venv")));
    assert!(!packed.entries.iter().any(|e| e.contains("__pycache__")));
}
