//! Package versions and version constraints
//!
//! Covers the subset of PEP 440 that shows up in lock files (epochs, release
//! segments, pre/post/dev releases, local labels) and both constraint dialects
//! found in `pyproject.toml`: PEP 440 specifiers (`>=1.0,<2`, `~=1.4`,
//! `==1.2.*`) and Poetry's shorthand (`^1.2`, `~1.2`, `*`, bare versions,
//! space separated ranges and `||` alternatives).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::LockError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreKind {
    Alpha,
    Beta,
    Rc,
}

/// Ordering key for the pre-release slot.
///
/// A bare dev release sorts before every pre-release of the same release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    DevOnly,
    Pre(PreKind, u64),
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PostKey {
    None,
    Post(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DevKey {
    Dev(u64),
    None,
}

/// A single exact package version
#[derive(Debug, Clone)]
pub struct Version {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<(PreKind, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    raw: String,
}

impl Version {
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    fn release_at(&self, idx: usize) -> u64 {
        self.release.get(idx).copied().unwrap_or(0)
    }

    fn cmp_release(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        (0..len)
            .map(|i| self.release_at(i).cmp(&other.release_at(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    fn key(&self) -> (PreKey, PostKey, DevKey) {
        let pre = match (self.pre, self.post, self.dev) {
            (Some((kind, n)), _, _) => PreKey::Pre(kind, n),
            (None, None, Some(_)) => PreKey::DevOnly,
            _ => PreKey::Final,
        };
        let post = self.post.map(PostKey::Post).unwrap_or(PostKey::None);
        let dev = self.dev.map(DevKey::Dev).unwrap_or(DevKey::None);
        (pre, post, dev)
    }

    /// Same version with only the release segment kept
    fn base(&self) -> Version {
        Version {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
            raw: self.raw.clone(),
        }
    }

    fn from_release(epoch: u64, release: Vec<u64>) -> Version {
        let raw = release
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".");
        Version {
            epoch,
            release,
            pre: None,
            post: None,
            dev: None,
            raw,
        }
    }

    /// Lowest version that is not in the release series bumped at `idx`
    fn bump(&self, idx: usize) -> Version {
        let mut release: Vec<u64> = (0..=idx).map(|i| self.release_at(i)).collect();
        release[idx] += 1;
        Version {
            // `.dev0` keeps pre-releases of the next series out of range
            dev: Some(0),
            ..Version::from_release(self.epoch, release)
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.cmp_release(other))
            .then_with(|| self.key().cmp(&other.key()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_number(s: &str) -> (&str, &str) {
    let digits = s.trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == '-' || c == '_');
    let label = &s[..s.len() - digits.len()];
    (label.trim_matches(|c: char| c == '-' || c == '_'), digits)
}

impl FromStr for Version {
    type Err = LockError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || LockError::InvalidVersion(input.to_string());
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        let mut rest = lower.strip_prefix('v').unwrap_or(lower.as_str());

        // Local labels never take part in resolution
        if let Some((head, _local)) = rest.split_once('+') {
            rest = head;
        }

        let (epoch, rest) = match rest.split_once('!') {
            Some((e, r)) => (e.parse::<u64>().map_err(|_| invalid())?, r),
            None => (0, rest),
        };

        let release_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let release_str = rest[..release_end].trim_end_matches('.');
        if release_str.is_empty() {
            return Err(invalid());
        }
        let release = release_str
            .split('.')
            .map(|seg| seg.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut pre = None;
        let mut post = None;
        let mut dev = None;

        let suffix = rest[release_end..].trim_start_matches(['.', '-', '_']);
        let mut parts = suffix
            .split(['.', '-', '_'])
            .filter(|p| !p.is_empty())
            .flat_map(split_labels)
            .peekable();
        while let Some(part) = parts.next() {
            let (label, digits) = split_number(&part);
            // `beta.1`, `post-2`: the number may follow its label as its own segment
            let detached = if digits.is_empty() && !label.is_empty() {
                parts.next_if(|p| p.bytes().all(|b| b.is_ascii_digit()))
            } else {
                None
            };
            let digits = detached.as_deref().unwrap_or(digits);
            let number = if digits.is_empty() {
                0
            } else {
                digits.parse::<u64>().map_err(|_| invalid())?
            };
            match label {
                "a" | "alpha" => pre = Some((PreKind::Alpha, number)),
                "b" | "beta" => pre = Some((PreKind::Beta, number)),
                "rc" | "c" | "pre" | "preview" => pre = Some((PreKind::Rc, number)),
                "post" | "rev" | "r" | "" => post = Some(number),
                "dev" => dev = Some(number),
                _ => return Err(invalid()),
            }
        }

        Ok(Version {
            epoch,
            release,
            pre,
            post,
            dev,
            raw: trimmed.to_string(),
        })
    }
}

/// Split `rc1post2` style runs into `rc1`, `post2`
fn split_labels(part: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut seen_digit = false;
    for c in part.chars() {
        if c.is_ascii_alphabetic() && seen_digit {
            out.push(std::mem::take(&mut current));
            seen_digit = false;
        }
        if c.is_ascii_digit() {
            seen_digit = true;
        }
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
    Arbitrary,
}

#[derive(Debug, Clone)]
enum Clause {
    Any,
    Cmp(Op, Version),
    /// `==1.2.*` (or `!=1.2.*` when negated)
    Prefix { prefix: Version, negated: bool },
}

impl Clause {
    fn matches(&self, v: &Version) -> bool {
        match self {
            Clause::Any => true,
            Clause::Prefix { prefix, negated } => {
                let hit = v.epoch == prefix.epoch
                    && prefix
                        .release
                        .iter()
                        .enumerate()
                        .all(|(i, seg)| v.release_at(i) == *seg);
                hit != *negated
            }
            Clause::Cmp(op, bound) => match op {
                Op::Eq => v == bound,
                Op::Ne => v != bound,
                Op::Ge => v >= bound,
                Op::Le => v <= bound,
                Op::Gt => {
                    v > bound
                        && !(v.post.is_some() && bound.post.is_none() && v.base() == bound.base())
                }
                Op::Lt => {
                    v < bound
                        && !(v.is_prerelease()
                            && !bound.is_prerelease()
                            && v.base() == bound.base())
                }
                Op::Arbitrary => v.raw == bound.raw,
            },
        }
    }
}

/// A version constraint: alternatives of conjunctive clause lists
#[derive(Debug, Clone)]
pub struct Constraint {
    alternatives: Vec<Vec<Clause>>,
    raw: String,
}

impl Constraint {
    pub fn any() -> Self {
        Self {
            alternatives: vec![vec![Clause::Any]],
            raw: "*".to_string(),
        }
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|clauses| clauses.iter().all(|c| c.matches(version)))
    }

    /// A constraint that names exactly one version
    pub fn is_exact(&self) -> bool {
        matches!(
            self.alternatives.as_slice(),
            [clauses] if matches!(clauses.as_slice(), [Clause::Cmp(Op::Eq | Op::Arbitrary, _)])
        )
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Constraint {
    type Err = LockError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let raw = input.trim();
        if raw.is_empty() {
            return Ok(Constraint::any());
        }

        let mut alternatives = Vec::new();
        for alternative in raw.split("||").flat_map(|a| a.split('|')) {
            let mut clauses = Vec::new();
            for token in tokenize(alternative) {
                clauses.extend(parse_clause(&token, input)?);
            }
            if clauses.is_empty() {
                return Err(LockError::InvalidConstraint(input.to_string()));
            }
            alternatives.push(clauses);
        }

        Ok(Constraint {
            alternatives,
            raw: raw.to_string(),
        })
    }
}

/// Split one alternative on commas and whitespace, re-attaching operators
/// that were separated from their version (`>= 1.0`)
fn tokenize(alternative: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for piece in alternative.split([',', ' ', '\t']).filter(|p| !p.is_empty()) {
        match tokens.last_mut() {
            Some(last) if last.chars().all(|c| "<>=!~^".contains(c)) => last.push_str(piece),
            _ => tokens.push(piece.to_string()),
        }
    }
    tokens
}

fn parse_clause(token: &str, whole: &str) -> Result<Vec<Clause>, LockError> {
    let invalid = || LockError::InvalidConstraint(whole.to_string());
    let version = |s: &str| s.trim().parse::<Version>().map_err(|_| invalid());

    if token == "*" {
        return Ok(vec![Clause::Any]);
    }

    let ops = [
        ("===", None),
        ("==", Some(Op::Eq)),
        ("!=", Some(Op::Ne)),
        (">=", Some(Op::Ge)),
        ("<=", Some(Op::Le)),
        ("~=", None),
        (">", Some(Op::Gt)),
        ("<", Some(Op::Lt)),
        ("^", None),
        ("~", None),
        ("=", Some(Op::Eq)),
    ];

    for (prefix, op) in ops {
        let Some(rest) = token.strip_prefix(prefix) else {
            continue;
        };
        let rest = rest.trim();
        return match (prefix, op) {
            ("===", _) => Ok(vec![Clause::Cmp(
                Op::Arbitrary,
                Version {
                    raw: rest.to_string(),
                    ..Version::from_release(0, vec![0])
                },
            )]),
            ("==" | "!=" | "=", Some(op)) if rest.ends_with(".*") || rest == "*" => {
                let stem = rest.trim_end_matches('*').trim_end_matches('.');
                if stem.is_empty() {
                    return Ok(vec![Clause::Any]);
                }
                Ok(vec![Clause::Prefix {
                    prefix: version(stem)?,
                    negated: op == Op::Ne,
                }])
            }
            ("~=", _) => {
                let v = version(rest)?;
                if v.release.len() < 2 {
                    return Err(invalid());
                }
                let upper = v.bump(v.release.len() - 2);
                Ok(vec![Clause::Cmp(Op::Ge, v), Clause::Cmp(Op::Lt, upper)])
            }
            ("^", _) => {
                let v = version(rest)?;
                let idx = v
                    .release
                    .iter()
                    .position(|seg| *seg != 0)
                    .unwrap_or(v.release.len() - 1);
                let upper = v.bump(idx);
                Ok(vec![Clause::Cmp(Op::Ge, v), Clause::Cmp(Op::Lt, upper)])
            }
            ("~", _) => {
                let v = version(rest)?;
                let idx = if v.release.len() > 1 { 1 } else { 0 };
                let upper = v.bump(idx);
                Ok(vec![Clause::Cmp(Op::Ge, v), Clause::Cmp(Op::Lt, upper)])
            }
            (_, Some(op)) => Ok(vec![Clause::Cmp(op, version(rest)?)]),
            _ => Err(invalid()),
        };
    }

    // Poetry treats a bare version as an exact pin; `1.2.*` is a prefix
    if token.ends_with(".*") {
        return Ok(vec![Clause::Prefix {
            prefix: version(token.trim_end_matches(".*"))?,
            negated: false,
        }]);
    }
    Ok(vec![Clause::Cmp(Op::Eq, version(token)?)])
}
