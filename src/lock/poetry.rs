//! `poetry.lock` parsing

use serde::Deserialize;
use std::collections::BTreeMap;

use super::version::{Constraint, Version};
use super::{normalize_name, LockError, LOCK_FILE};

/// One marker branch of a dependency edge
#[derive(Debug, Clone)]
pub struct Branch {
    pub constraint: Constraint,
    pub markers: Option<String>,
}

/// A dependency edge: a name plus the versions it accepts
#[derive(Debug, Clone)]
pub struct Requirement {
    /// Normalized distribution name
    pub name: String,
    /// Union of every branch
    pub constraint: Constraint,
    /// Only installed when an extra asks for it
    pub optional: bool,
    /// Environment markers limiting where the edge applies
    pub markers: Option<String>,
    /// Never empty; more than one when the edge is split by markers
    pub branches: Vec<Branch>,
}

impl Requirement {
    pub fn new(
        name: String,
        constraint: Constraint,
        optional: bool,
        markers: Option<String>,
    ) -> Self {
        Self {
            branches: vec![Branch {
                constraint: constraint.clone(),
                markers: markers.clone(),
            }],
            name,
            constraint,
            optional,
            markers,
        }
    }

    /// Edges that may legitimately be absent from a lock
    pub fn is_conditional(&self) -> bool {
        self.optional || self.markers.is_some()
    }

    /// Whether a marker-gated branch of this edge accepts `version`
    pub fn selects_under_marker(&self, version: &Version) -> bool {
        self.branches
            .iter()
            .any(|b| b.markers.is_some() && b.constraint.matches(version))
    }
}

#[derive(Debug, Clone)]
pub struct LockedPackage {
    pub name: String,
    pub version: Version,
    pub optional: bool,
    pub dependencies: Vec<Requirement>,
}

#[derive(Debug, Clone, Default)]
pub struct LockMetadata {
    pub lock_version: Option<String>,
    /// Interpreter range the lock was resolved for
    pub python_versions: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LockFile {
    pub packages: Vec<LockedPackage>,
    pub metadata: LockMetadata,
}

#[derive(Deserialize)]
struct RawLock {
    #[serde(default)]
    package: Vec<RawPackage>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

#[derive(Deserialize)]
struct RawPackage {
    name: String,
    version: String,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, RawDependency>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawMetadata {
    lock_version: Option<String>,
    python_versions: Option<String>,
}

/// Dependency value in either lock or manifest form
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawDependency {
    Constraint(String),
    Detailed(RawDetail),
    Multiple(Vec<RawDetail>),
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDetail {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    markers: Option<String>,
}

impl RawDetail {
    fn constraint(&self) -> Result<Constraint, LockError> {
        // Path, git and url sources carry no version
        match self.version {
            Some(ref v) => v.parse(),
            None => Ok(Constraint::any()),
        }
    }
}

impl RawDependency {
    pub(crate) fn into_requirement(self, name: &str) -> Result<Requirement, LockError> {
        let name = normalize_name(name);
        match self {
            RawDependency::Constraint(c) => Ok(Requirement::new(name, c.parse()?, false, None)),
            RawDependency::Detailed(detail) => Ok(Requirement::new(
                name,
                detail.constraint()?,
                detail.optional,
                detail.markers,
            )),
            RawDependency::Multiple(details) => {
                let constraint = details
                    .iter()
                    .map(|d| d.version.as_deref().unwrap_or("*"))
                    .collect::<Vec<_>>()
                    .join(" || ");
                let markers = details
                    .iter()
                    .filter_map(|d| d.markers.as_deref())
                    .collect::<Vec<_>>();
                let branches = details
                    .iter()
                    .map(|d| {
                        Ok(Branch {
                            constraint: d.constraint()?,
                            markers: d.markers.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, LockError>>()?;
                if branches.is_empty() {
                    return Err(LockError::InvalidConstraint(format!("{} = []", name)));
                }
                Ok(Requirement {
                    name,
                    constraint: constraint.parse()?,
                    optional: details.iter().all(|d| d.optional),
                    markers: if markers.is_empty() {
                        None
                    } else {
                        Some(markers.join(" or "))
                    },
                    branches,
                })
            }
        }
    }
}

/// Parse a version that must be an exact pin
pub(crate) fn parse_pin(package: &str, raw: &str) -> Result<Version, LockError> {
    let unpinned = || LockError::Unpinned {
        package: package.to_string(),
        version: raw.to_string(),
    };
    let constraint: Constraint = raw
        .parse()
        .map_err(|_| LockError::InvalidVersion(raw.to_string()))?;
    if raw.trim().is_empty() || !constraint.is_exact() {
        return Err(unpinned());
    }
    raw.trim().trim_start_matches('=').parse()
}

impl LockFile {
    pub fn parse(content: &str) -> Result<Self, LockError> {
        let raw: RawLock = toml::from_str(content).map_err(|e| LockError::Malformed {
            file: LOCK_FILE.to_string(),
            reason: e.to_string(),
        })?;

        let packages = raw
            .package
            .into_iter()
            .map(|p| {
                let version = parse_pin(&p.name, &p.version)?;
                let dependencies = p
                    .dependencies
                    .into_iter()
                    .map(|(dep, value)| value.into_requirement(&dep))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(LockedPackage {
                    name: normalize_name(&p.name),
                    version,
                    optional: p.optional,
                    dependencies,
                })
            })
            .collect::<Result<Vec<_>, LockError>>()?;

        let metadata = raw
            .metadata
            .map(|m| LockMetadata {
                lock_version: m.lock_version,
                python_versions: m.python_versions,
            })
            .unwrap_or_default();

        Ok(Self { packages, metadata })
    }

    pub fn get(&self, name: &str) -> Option<&LockedPackage> {
        let name = normalize_name(name);
        self.packages.iter().find(|p| p.name == name)
    }
}
