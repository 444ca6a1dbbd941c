//! Scoped privilege elevation
//!
//! The runtime stage needs root for exactly one thing after the execution
//! identity exists: system package maintenance. Elevation is modelled as a
//! guard borrowed from the stage builder. Creating it switches to root,
//! dropping it switches back, so no code path can leave the stage privileged.

use super::builder::{StageBuilder, ROOT_USER};
use super::schema::Instruction;

/// Transient state a maintenance command leaves behind
pub fn cleanup_for(command: &str) -> &'static str {
    if command.contains("apt-get") || command.contains("apt ") {
        "rm -rf /var/lib/apt/lists/*"
    } else if command.contains("apk ") {
        "rm -rf /var/cache/apk/*"
    } else {
        "rm -rf /tmp/* /var/tmp/*"
    }
}

#[derive(Debug)]
pub struct PrivilegedWindow<'a> {
    stage: &'a mut StageBuilder,
    restore: String,
}

impl<'a> PrivilegedWindow<'a> {
    pub(super) fn open(stage: &'a mut StageBuilder, restore: String) -> Self {
        if stage.current_user() != ROOT_USER {
            stage.push(Instruction::User {
                name: ROOT_USER.to_string(),
            });
        }
        Self { stage, restore }
    }

    /// Run a maintenance command and remove what it caches in the same layer
    pub fn run(&mut self, command: &str) -> &mut Self {
        let command = command.trim();
        self.stage.push(Instruction::Run {
            command: format!("{} && {}", command, cleanup_for(command)),
            privileged: true,
        });
        self
    }
}

impl Drop for PrivilegedWindow<'_> {
    fn drop(&mut self) {
        self.stage.push(Instruction::User {
            name: std::mem::take(&mut self.restore),
        });
    }
}
