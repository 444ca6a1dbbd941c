//! `pyproject.toml` parsing
//!
//! Reads the project name, version and main dependency group from either the
//! Poetry table (`[tool.poetry]`) or PEP 621 metadata (`[project]`). Only the
//! main group matters: the resolver stage installs nothing else.

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

use super::poetry::{RawDependency, Requirement};
use super::version::Constraint;
use super::{normalize_name, LockError, MANIFEST_FILE};

#[derive(Debug, Clone, Default)]
pub struct ProjectManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    /// Interpreter constraint (`python = "^3.11"` or `requires-python`)
    pub python: Option<String>,
    pub dependencies: Vec<Requirement>,
}

#[derive(Deserialize, Default)]
struct RawPyproject {
    #[serde(default)]
    project: Option<RawProject>,
    #[serde(default)]
    tool: Option<RawTool>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct RawProject {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    requires_python: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawTool {
    #[serde(default)]
    poetry: Option<RawPoetry>,
}

#[derive(Deserialize, Default)]
struct RawPoetry {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, RawDependency>,
}

fn pep508_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?P<name>[A-Za-z0-9][A-Za-z0-9._-]*)\s*(?P<extras>\[[^\]]*\])?\s*(?:@\s*(?P<url>\S+)|\(?(?P<version>[^;()@]*)\)?)\s*(?:;\s*(?P<markers>.+))?$",
        )
        .expect("static regex")
    })
}

/// Parse a PEP 508 requirement string such as `uvicorn[standard]>=0.29; python_version >= "3.8"`
/// or a direct reference such as `mylib @ https://example.com/mylib-1.0.tar.gz`
fn parse_pep508(spec: &str) -> Result<Requirement, LockError> {
    let caps = pep508_regex().captures(spec).ok_or_else(|| LockError::Malformed {
        file: MANIFEST_FILE.to_string(),
        reason: format!("unrecognized requirement '{}'", spec),
    })?;
    let name = normalize_name(&caps["name"]);
    let version = caps.name("version").map(|m| m.as_str().trim()).unwrap_or("");
    let constraint = match caps.name("url") {
        // The lock decides which artifact the reference resolved to
        Some(url) => {
            debug!(dependency = %name, url = url.as_str(), "Direct reference accepts any locked version");
            Constraint::any()
        }
        None if version.is_empty() => Constraint::any(),
        None => version.parse()?,
    };
    let markers = caps.name("markers").map(|m| m.as_str().trim().to_string());
    Ok(Requirement::new(name, constraint, false, markers))
}

impl ProjectManifest {
    pub fn parse(content: &str) -> Result<Self, LockError> {
        let raw: RawPyproject = toml::from_str(content).map_err(|e| LockError::Malformed {
            file: MANIFEST_FILE.to_string(),
            reason: e.to_string(),
        })?;

        let project = raw.project.unwrap_or_default();
        let poetry = raw.tool.and_then(|t| t.poetry).unwrap_or_default();

        let mut python = project.requires_python;
        let mut dependencies = Vec::new();

        for (name, value) in poetry.dependencies {
            if name.eq_ignore_ascii_case("python") {
                if let RawDependency::Constraint(c) = value {
                    python = Some(c);
                }
                continue;
            }
            dependencies.push(value.into_requirement(&name)?);
        }

        for spec in &project.dependencies {
            let requirement = parse_pep508(spec)?;
            if !dependencies.iter().any(|d: &Requirement| d.name == requirement.name) {
                dependencies.push(requirement);
            }
        }

        if poetry.name.is_none() && project.name.is_none() {
            return Err(LockError::Malformed {
                file: MANIFEST_FILE.to_string(),
                reason: "neither [tool.poetry] nor [project] declares a name".to_string(),
            });
        }

        Ok(Self {
            name: poetry.name.or(project.name),
            version: poetry.version.or(project.version),
            python,
            dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::fixtures;

    #[test]
    fn test_parse_poetry_manifest() {
        let manifest = ProjectManifest::parse(fixtures::MANIFEST).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("hackathon-api"));
        assert_eq!(manifest.version.as_deref(), Some("0.1.0"));
        assert_eq!(manifest.python.as_deref(), Some("^3.11"));

        let names: Vec<&str> = manifest.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["fastapi", "uvicorn"]);
    }

    #[test]
    fn test_parse_pep621_manifest() {
        let content = r#"
[project]
name = "svc"
version = "1.2.0"
requires-python = ">=3.11"
dependencies = [
    "fastapi>=0.110,<0.111",
    "uvicorn[standard] (>=0.29)",
    "colorama; sys_platform == 'win32'",
]
"#;
        let manifest = ProjectManifest::parse(content).unwrap();
        assert_eq!(manifest.python.as_deref(), Some(">=3.11"));
        assert_eq!(manifest.dependencies.len(), 3);

        let uvicorn = &manifest.dependencies[1];
        assert_eq!(uvicorn.name, "uvicorn");
        assert!(uvicorn.constraint.matches(&"0.29.0".parse().unwrap()));

        let colorama = &manifest.dependencies[2];
        assert!(colorama.markers.is_some());
        assert!(colorama.is_conditional());
    }

    #[test]
    fn test_direct_reference() {
        let content = r#"
[project]
name = "svc"
dependencies = [
    "mylib @ https://example.com/mylib-1.0.tar.gz",
    "other[extra] @ git+https://example.com/other.git@v2 ; python_version >= '3.11'",
]
"#;
        let manifest = ProjectManifest::parse(content).unwrap();
        let mylib = &manifest.dependencies[0];
        assert_eq!(mylib.name, "mylib");
        assert!(mylib.constraint.matches(&"1.0".parse().unwrap()));
        assert!(mylib.markers.is_none());

        let other = &manifest.dependencies[1];
        assert_eq!(other.name, "other");
        assert_eq!(other.markers.as_deref(), Some("python_version >= '3.11'"));
    }

    #[test]
    fn test_manifest_without_name() {
        let err = ProjectManifest::parse("[build-system]\nrequires = []\n").unwrap_err();
        assert!(err.to_string().contains("name"));
    }
}
