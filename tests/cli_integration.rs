//! CLI integration tests
//!
//! These tests spawn the slimbox binary against fixture projects and check
//! output formats, written files and exit codes.

mod support;

use std::fs;
use support::{copy_fixture, fixture_path, run, slimbox, stderr, stdout};

#[test]
fn test_cli_help() {
    let output = run(&["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["plan", "lock", "build", "inspect", "config"] {
        assert!(text.contains(command), "help should list {}", command);
    }
}

#[test]
fn test_cli_version() {
    let output = run(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_plan_dockerfile_to_stdout() {
    let project = fixture_path("valid");
    let output = run(&["plan", project.to_str().unwrap(), "--format", "dockerfile"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let dockerfile = stdout(&output);
    assert!(dockerfile.starts_with("# syntax=docker/dockerfile:1"));
    let resolver = dockerfile.find("AS resolver").expect("resolver stage");
    let runtime = dockerfile.find("AS runtime").expect("runtime stage");
    assert!(resolver < runtime);

    assert!(dockerfile.contains("COPY --from=resolver --chown=appuser:appgroup"));
    assert!(dockerfile.contains("EXPOSE 8000"));
    assert!(dockerfile.contains(
        r#"CMD ["uvicorn","app.main:app","--host","0.0.0.0","--port","8000"]"#
    ));
    assert!(!dockerfile.contains("--reload"));

    let last_user = dockerfile
        .lines()
        .filter(|l| l.starts_with("USER "))
        .last()
        .expect("USER line");
    assert_eq!(last_user, "USER appuser");
}

#[test]
fn test_plan_json_output() {
    let project = fixture_path("valid");
    let output = run(&["plan", project.to_str().unwrap(), "-f", "json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let plan: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(plan["stages"].as_array().map(Vec::len), Some(2));
    assert_eq!(plan["runtime"]["port"], 8000);
    assert_eq!(plan["runtime"]["identity"]["user"], "appuser");
    assert_eq!(plan["metadata"]["locked_packages"], 7);
}

#[test]
fn test_plan_writes_output_file() {
    let project = copy_fixture("valid");
    let target = project.path().join("Dockerfile");
    let output = run(&[
        "plan",
        project.path().to_str().unwrap(),
        "--format",
        "dockerfile",
        "-o",
        target.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).is_empty());

    let written = fs::read_to_string(&target).unwrap();
    assert!(written.contains("AS runtime"));
}

#[test]
fn test_plan_development_enables_reload() {
    let project = fixture_path("valid");
    let output = run(&[
        "plan",
        project.to_str().unwrap(),
        "--format",
        "dockerfile",
        "--environment",
        "development",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains(r#""--reload"]"#));
}

#[test]
fn test_plan_port_override() {
    let project = fixture_path("valid");
    let output = run(&[
        "plan",
        project.to_str().unwrap(),
        "--format",
        "dockerfile",
        "--port",
        "9000",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let dockerfile = stdout(&output);
    assert!(dockerfile.contains("EXPOSE 9000"));
    assert!(dockerfile.contains(r#""--port","9000""#));
}

#[test]
fn test_lock_json_report() {
    let project = fixture_path("valid");
    let output = run(&["lock", project.to_str().unwrap(), "--format", "json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["packages"], 7);
    assert_eq!(report["digest"].as_str().map(str::len), Some(64));
}

#[test]
fn test_config_reads_project_file() {
    let project = copy_fixture("valid");
    fs::write(project.path().join("slimbox.toml"), "port = 8080\n").unwrap();

    let output = run(&["config", project.path().to_str().unwrap(), "--format", "json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let config: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(config["port"], "8080");
}

#[test]
fn test_environment_variables_override_file() {
    let project = copy_fixture("valid");
    fs::write(project.path().join("slimbox.toml"), "port = 8080\n").unwrap();

    let output = slimbox()
        .args(["config", project.path().to_str().unwrap(), "-f", "json"])
        .env("SLIMBOX_PORT", "9100")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let config: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(config["port"], "9100");
}

#[test]
fn test_dockerfile_format_only_for_plan() {
    let project = fixture_path("valid");
    let output = run(&["lock", project.to_str().unwrap(), "--format", "dockerfile"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("only applies to `plan`"));
}
