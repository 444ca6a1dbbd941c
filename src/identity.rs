//! Non-privileged execution identity for the runtime image

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::OnceLock;
use thiserror::Error;

/// Ids reserved for system accounts on Debian-based images
pub const SYSTEM_ID_RANGE: RangeInclusive<u32> = 100..=999;

/// Names that already exist in the base image or carry privilege
const RESERVED_NAMES: &[&str] = &[
    "root", "daemon", "bin", "sys", "sync", "games", "man", "lp", "mail", "news", "uucp",
    "proxy", "www-data", "backup", "list", "irc", "gnats", "nobody", "nogroup", "sudo",
    "adm", "wheel", "shadow", "staff", "users", "disk", "tty",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("'{0}' is not a valid account name")]
    InvalidName(String),

    #[error("'{0}' collides with an account that already exists or is privileged")]
    ReservedName(String),

    #[error("{kind} {id} is privileged")]
    Privileged { kind: &'static str, id: u32 },

    #[error("{kind} {id} is outside the system range {}-{}", SYSTEM_ID_RANGE.start(), SYSTEM_ID_RANGE.end())]
    OutOfRange { kind: &'static str, id: u32 },
}

/// User and group the service process runs as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionIdentity {
    pub user: String,
    pub group: String,
    pub uid: u32,
    pub gid: u32,
}

impl Default for ExecutionIdentity {
    fn default() -> Self {
        Self {
            user: "appuser".to_string(),
            group: "appgroup".to_string(),
            uid: 999,
            gid: 999,
        }
    }
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("static regex"))
}

impl ExecutionIdentity {
    pub fn new(user: impl Into<String>, group: impl Into<String>, uid: u32, gid: u32) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
            uid,
            gid,
        }
    }

    pub fn validate(&self) -> Result<(), IdentityError> {
        for name in [&self.user, &self.group] {
            if !name_regex().is_match(name) {
                return Err(IdentityError::InvalidName(name.clone()));
            }
            if RESERVED_NAMES.contains(&name.as_str()) {
                return Err(IdentityError::ReservedName(name.clone()));
            }
        }
        for (kind, id) in [("uid", self.uid), ("gid", self.gid)] {
            if id == 0 {
                return Err(IdentityError::Privileged { kind, id });
            }
            if !SYSTEM_ID_RANGE.contains(&id) {
                return Err(IdentityError::OutOfRange { kind, id });
            }
        }
        Ok(())
    }

    /// `user:group` as used by `--chown` and `USER`
    pub fn owner(&self) -> String {
        format!("{}:{}", self.user, self.group)
    }

    /// Shell command creating the group and user in a fresh Debian-based image
    pub fn create_command(&self) -> String {
        format!(
            "groupadd --system --gid {gid} {group} && \
             useradd --system --uid {uid} --gid {group} --no-create-home --shell /usr/sbin/nologin {user}",
            gid = self.gid,
            group = self.group,
            uid = self.uid,
            user = self.user,
        )
    }
}

impl fmt::Display for ExecutionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}):{}({})", self.user, self.uid, self.group, self.gid)
    }
}
