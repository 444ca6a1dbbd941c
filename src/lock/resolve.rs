//! Lock consistency checking
//!
//! The resolver stage never re-resolves: it installs exactly what the lock
//! names. That is only reproducible if the lock is closed under its own
//! dependency edges, so this module proves it before a plan exists.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{LockDescriptor, LockError, LockedPackage, Requirement};

/// Lock formats written by Poetry 1.x
const SUPPORTED_LOCK_MAJORS: [&str; 2] = ["1", "2"];

/// Summary of a successful consistency check
#[derive(Debug, Clone, Serialize)]
pub struct LockReport {
    pub packages: usize,
    pub direct: usize,
    pub edges_checked: usize,
    /// Optional or marker-gated edges absent from the lock
    pub skipped_conditional: Vec<String>,
    /// Packages locked once per marker branch
    pub marker_split: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_version: Option<String>,
    /// Interpreter range from the manifest, else from the lock metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,
    pub digest: String,
}

/// Verify that every pinned package and every direct dependency is satisfied
/// by the locked versions.
///
/// A package may be locked more than once only when marker-gated branches
/// select each of its versions, the way Poetry splits a lock across
/// interpreter versions.
pub fn check(descriptor: &LockDescriptor) -> Result<LockReport, LockError> {
    let lock = &descriptor.lock;
    if let Some(ref format) = lock.metadata.lock_version {
        let major = format.split('.').next().unwrap_or_default();
        if !SUPPORTED_LOCK_MAJORS.contains(&major) {
            warn!(lock_version = %format, "Lock format is newer than any known Poetry release");
        }
    }

    let mut issues = Vec::new();
    let mut index: BTreeMap<&str, Vec<&LockedPackage>> = BTreeMap::new();
    for package in &lock.packages {
        index.entry(package.name.as_str()).or_default().push(package);
    }

    let edges: Vec<&Requirement> = lock
        .packages
        .iter()
        .flat_map(|p| p.dependencies.iter())
        .chain(descriptor.manifest.dependencies.iter())
        .collect();

    let mut marker_split = Vec::new();
    for (name, entries) in &index {
        let mut versions: Vec<String> = entries.iter().map(|p| p.version.to_string()).collect();
        versions.sort();
        versions.dedup();
        if versions.len() < 2 {
            continue;
        }
        let justified = entries.iter().all(|entry| {
            edges
                .iter()
                .any(|e| e.name == *name && e.selects_under_marker(&entry.version))
        });
        if justified {
            debug!(package = %name, versions = ?versions, "Package is split across marker branches");
            marker_split.push(name.to_string());
        } else {
            issues.push(LockError::DuplicatePackage {
                package: name.to_string(),
                versions,
            });
        }
    }

    let mut edges_checked = 0;
    let mut skipped_conditional = Vec::new();

    for package in &lock.packages {
        for requirement in &package.dependencies {
            edges_checked += 1;
            match check_edge(&index, requirement) {
                Edge::Satisfied => {}
                Edge::Missing if requirement.is_conditional() => {
                    debug!(
                        package = %package.name,
                        dependency = %requirement.name,
                        "Conditional dependency not locked, skipping"
                    );
                    skipped_conditional.push(format!("{} -> {}", package.name, requirement.name));
                }
                Edge::Missing => issues.push(LockError::MissingDependency {
                    package: package.name.clone(),
                    dependency: requirement.name.clone(),
                    constraint: requirement.constraint.to_string(),
                }),
                Edge::Conflict { constraint, locked } => issues.push(LockError::Conflict {
                    package: package.name.clone(),
                    dependency: requirement.name.clone(),
                    constraint,
                    locked,
                }),
            }
        }
    }

    for requirement in &descriptor.manifest.dependencies {
        edges_checked += 1;
        match check_edge(&index, requirement) {
            Edge::Satisfied => {}
            Edge::Missing if requirement.is_conditional() => {
                skipped_conditional.push(format!("(project) -> {}", requirement.name));
            }
            Edge::Missing => issues.push(LockError::MissingDirect {
                dependency: requirement.name.clone(),
                constraint: requirement.constraint.to_string(),
            }),
            Edge::Conflict { constraint, locked } => issues.push(LockError::DirectConflict {
                dependency: requirement.name.clone(),
                constraint,
                locked,
            }),
        }
    }

    match issues.len() {
        0 => {
            debug!(
                packages = lock.packages.len(),
                edges = edges_checked,
                "Lock descriptor is consistent"
            );
            Ok(LockReport {
                packages: index.len(),
                direct: descriptor.manifest.dependencies.len(),
                edges_checked,
                skipped_conditional,
                marker_split,
                lock_version: lock.metadata.lock_version.clone(),
                python: descriptor
                    .manifest
                    .python
                    .clone()
                    .or_else(|| lock.metadata.python_versions.clone()),
                digest: descriptor.digest.clone(),
            })
        }
        1 => Err(issues.remove(0)),
        n => {
            warn!(problems = n, "Lock descriptor is inconsistent");
            Err(LockError::Multiple(issues))
        }
    }
}

enum Edge {
    Satisfied,
    Missing,
    Conflict { constraint: String, locked: String },
}

/// Every branch of the edge must be met by at least one locked entry
fn check_edge(index: &BTreeMap<&str, Vec<&LockedPackage>>, requirement: &Requirement) -> Edge {
    let Some(entries) = index.get(requirement.name.as_str()) else {
        return Edge::Missing;
    };
    let unmet = requirement
        .branches
        .iter()
        .find(|b| !entries.iter().any(|p| b.constraint.matches(&p.version)));
    match unmet {
        None => Edge::Satisfied,
        Some(branch) => Edge::Conflict {
            constraint: branch.constraint.to_string(),
            locked: entries
                .iter()
                .map(|p| p.version.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{fixtures, LockFile, ProjectManifest};
    use std::path::PathBuf;

    fn descriptor(manifest: &str, lock: &str) -> LockDescriptor {
        LockDescriptor {
            root: PathBuf::from("."),
            manifest: ProjectManifest::parse(manifest).unwrap(),
            lock: LockFile::parse(lock).unwrap(),
            digest: "0".repeat(64),
        }
    }

    #[test]
    fn test_consistent_fixture() {
        let report = check(&descriptor(fixtures::MANIFEST, fixtures::LOCK)).unwrap();
        assert_eq!(report.packages, 7);
        assert_eq!(report.direct, 2);
        assert_eq!(report.skipped_conditional, vec!["uvicorn -> colorama".to_string()]);
    }

    #[test]
    fn test_transitive_conflict() {
        // starlette 0.36.3 needs anyio <5
        let lock = fixtures::LOCK.replace(
            "name = \"anyio\"\nversion = \"4.3.0\"",
            "name = \"anyio\"\nversion = \"5.0.0\"",
        );
        let err = check(&descriptor(fixtures::MANIFEST, &lock)).unwrap_err();
        match err {
            LockError::Conflict {
                package,
                dependency,
                locked,
                ..
            } => {
                assert_eq!(package, "starlette");
                assert_eq!(dependency, "anyio");
                assert_eq!(locked, "5.0.0");
            }
            other => panic!("Expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_transitive_dependency() {
        let lock = fixtures::LOCK.replace(
            "[[package]]\nname = \"click\"\nversion = \"8.1.7\"\noptional = false\npython-versions = \">=3.7\"\n",
            "",
        );
        let err = check(&descriptor(fixtures::MANIFEST, &lock)).unwrap_err();
        assert!(matches!(err, LockError::MissingDependency { ref dependency, .. } if dependency == "click"));
    }

    #[test]
    fn test_direct_dependency_outside_lock_range() {
        let manifest = fixtures::MANIFEST.replace("fastapi = \"^0.110.0\"", "fastapi = \"^0.111.0\"");
        let err = check(&descriptor(&manifest, fixtures::LOCK)).unwrap_err();
        assert!(matches!(err, LockError::DirectConflict { ref dependency, .. } if dependency == "fastapi"));
    }

    #[test]
    fn test_duplicate_and_conflict_are_reported_together() {
        let lock = format!(
            "{}\n[[package]]\nname = \"Click\"\nversion = \"6.0\"\n",
            fixtures::LOCK
                .replace("[metadata]\nlock-version = \"2.0\"\npython-versions = \"^3.11\"\ncontent-hash = \"5f1c\"\n", "")
                .replace("name = \"anyio\"\nversion = \"4.3.0\"", "name = \"anyio\"\nversion = \"5.0.0\"")
        );
        let err = check(&descriptor(fixtures::MANIFEST, &lock)).unwrap_err();
        match err {
            LockError::Multiple(issues) => {
                assert!(issues
                    .iter()
                    .any(|e| matches!(e, LockError::DuplicatePackage { .. })));
                assert!(issues.iter().any(|e| matches!(e, LockError::Conflict { .. })));
            }
            other => panic!("Expected Multiple, got {other:?}"),
        }
    }

    const SPLIT_MANIFEST: &str = r#"
[tool.poetry]
name = "analytics"
version = "0.1.0"

[tool.poetry.dependencies]
python = ">=3.10"
pandas = "^2.2"
"#;

    fn split_lock(pandas_numpy: &str) -> String {
        format!(
            r#"
[[package]]
name = "numpy"
version = "1.24.4"
python-versions = ">=3.8,<3.12"

[[package]]
name = "numpy"
version = "1.26.4"
python-versions = ">=3.12"

[[package]]
name = "pandas"
version = "2.2.1"
python-versions = ">=3.9"

[package.dependencies]
numpy = {pandas_numpy}

[metadata]
lock-version = "2.0"
python-versions = ">=3.10"
"#
        )
    }

    #[test]
    fn test_marker_split_versions_are_accepted() {
        let lock = split_lock(
            r#"[
    {version = ">=1.22.4,<2", markers = "python_version < \"3.12\""},
    {version = ">=1.26.0,<2", markers = "python_version >= \"3.12\""},
]"#,
        );
        let report = check(&descriptor(SPLIT_MANIFEST, &lock)).unwrap();
        assert_eq!(report.packages, 2);
        assert_eq!(report.marker_split, vec!["numpy".to_string()]);
        assert_eq!(report.python.as_deref(), Some(">=3.10"));
        assert_eq!(report.lock_version.as_deref(), Some("2.0"));
    }

    #[test]
    fn test_unmet_marker_branch_is_a_conflict() {
        let lock = split_lock(
            r#"[
    {version = ">=1.22.4,<2", markers = "python_version < \"3.12\""},
    {version = ">=2.0", markers = "python_version >= \"3.12\""},
]"#,
        );
        let err = check(&descriptor(SPLIT_MANIFEST, &lock)).unwrap_err();
        match err {
            LockError::Conflict {
                dependency,
                constraint,
                locked,
                ..
            } => {
                assert_eq!(dependency, "numpy");
                assert_eq!(constraint, ">=2.0");
                assert_eq!(locked, "1.24.4, 1.26.4");
            }
            other => panic!("Expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_without_markers_is_rejected() {
        let lock = split_lock(r#"">=1.22.4,<2""#);
        let err = check(&descriptor(SPLIT_MANIFEST, &lock)).unwrap_err();
        assert!(matches!(
            err,
            LockError::DuplicatePackage { ref package, ref versions }
                if package == "numpy" && versions.len() == 2
        ));
    }

    #[test]
    fn test_report_falls_back_to_lock_python() {
        let manifest = fixtures::MANIFEST.replace("python = \"^3.11\"\n", "");
        let report = check(&descriptor(&manifest, fixtures::LOCK)).unwrap();
        assert_eq!(report.python.as_deref(), Some("^3.11"));
        assert!(report.marker_split.is_empty());
    }
}
