use super::privilege::PrivilegedWindow;
use super::schema::{Healthcheck, Instruction, Stage, StageRole};
use crate::identity::ExecutionIdentity;

pub const ROOT_USER: &str = "root";

/// Accumulates the instructions of one stage while tracking which user the
/// next instruction would run as
#[derive(Debug)]
pub struct StageBuilder {
    name: String,
    role: StageRole,
    base: String,
    instructions: Vec<Instruction>,
    current_user: String,
}

impl StageBuilder {
    /// A fresh stage runs as the base image's default user, root
    pub fn new(name: impl Into<String>, role: StageRole, base: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            base: base.into(),
            instructions: Vec::new(),
            current_user: ROOT_USER.to_string(),
        }
    }

    pub fn current_user(&self) -> &str {
        &self.current_user
    }

    pub(super) fn push(&mut self, instruction: Instruction) -> &mut Self {
        if let Instruction::User { ref name } = instruction {
            self.current_user = name.clone();
        }
        self.instructions.push(instruction);
        self
    }

    pub fn env(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.push(Instruction::Env {
            key: key.to_string(),
            value: value.into(),
        })
    }

    pub fn label(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.push(Instruction::Label {
            key: key.to_string(),
            value: value.into(),
        })
    }

    pub fn workdir(&mut self, path: &str) -> &mut Self {
        self.push(Instruction::Workdir {
            path: path.to_string(),
        })
    }

    pub fn run(&mut self, command: impl Into<String>) -> &mut Self {
        self.push(Instruction::Run {
            command: command.into(),
            privileged: false,
        })
    }

    /// Copy from the build context
    pub fn copy(&mut self, sources: &[&str], dest: &str, chown: Option<&ExecutionIdentity>) -> &mut Self {
        self.push(Instruction::Copy {
            from_stage: None,
            sources: sources.iter().map(|s| s.to_string()).collect(),
            dest: dest.to_string(),
            chown: chown.map(|i| i.owner()),
        })
    }

    /// Copy a path out of another stage to the same location
    pub fn copy_from(&mut self, stage: &str, path: &str, chown: Option<&ExecutionIdentity>) -> &mut Self {
        self.push(Instruction::Copy {
            from_stage: Some(stage.to_string()),
            sources: vec![path.to_string()],
            dest: path.to_string(),
            chown: chown.map(|i| i.owner()),
        })
    }

    pub fn user(&mut self, name: &str) -> &mut Self {
        self.push(Instruction::User {
            name: name.to_string(),
        })
    }

    pub fn expose(&mut self, port: u16) -> &mut Self {
        self.push(Instruction::Expose { port })
    }

    pub fn healthcheck(&mut self, healthcheck: Healthcheck) -> &mut Self {
        self.push(Instruction::Healthcheck(healthcheck))
    }

    pub fn cmd(&mut self, argv: Vec<String>) -> &mut Self {
        self.push(Instruction::Cmd { argv })
    }

    /// Enter a privileged maintenance window. The returned guard switches
    /// back to `restore` when it goes out of scope, however the scope exits.
    pub fn elevate(&mut self, restore: &ExecutionIdentity) -> PrivilegedWindow<'_> {
        PrivilegedWindow::open(self, restore.user.clone())
    }

    pub fn finish(self) -> Stage {
        Stage {
            name: self.name,
            role: self.role,
            base: self.base,
            instructions: self.instructions,
        }
    }
}
