use crate::entrypoint::{self, BIND_HOST};
use crate::error::BuildError;
use crate::lock::{LOCK_FILE, MANIFEST_FILE};
use crate::plan::{BuildPlan, Instruction, Stage, ROOT_USER};

pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, plan: &BuildPlan) -> Result<(), BuildError>;
}

fn invalid(msg: impl Into<String>) -> Result<(), BuildError> {
    Err(BuildError::Validation(msg.into()))
}

fn denied(msg: impl Into<String>) -> Result<(), BuildError> {
    Err(BuildError::Permission(msg.into()))
}

fn runtime_stage(plan: &BuildPlan) -> Result<&Stage, BuildError> {
    plan.runtime_stage()
        .ok_or_else(|| BuildError::Validation("Plan has no runtime stage".to_string()))
}

fn resolver_stage(plan: &BuildPlan) -> Result<&Stage, BuildError> {
    plan.resolver()
        .ok_or_else(|| BuildError::Validation("Plan has no resolver stage".to_string()))
}

pub struct RequiredFieldsRule;

impl ValidationRule for RequiredFieldsRule {
    fn name(&self) -> &'static str {
        "RequiredFields"
    }

    fn validate(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        if plan.version.is_empty() {
            return invalid("Version cannot be empty");
        }
        if plan.metadata.lock_digest.is_empty() {
            return invalid("Lock digest cannot be empty");
        }
        for stage in &plan.stages {
            if stage.base.trim().is_empty() {
                return invalid(format!("Stage '{}' has no base image", stage.name));
            }
        }
        if plan.runtime.command.is_empty() {
            return invalid("Runtime command cannot be empty");
        }
        Ok(())
    }
}

/// The graph must describe exactly the stages the plan carries
pub struct StageGraphRule;

impl ValidationRule for StageGraphRule {
    fn name(&self) -> &'static str {
        "StageGraph"
    }

    fn validate(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        plan.graph.validate_pipeline()?;
        if plan.graph.nodes().len() != plan.stages.len() {
            return invalid(format!(
                "Graph declares {} stages but the plan has {}",
                plan.graph.nodes().len(),
                plan.stages.len()
            ));
        }
        for node in plan.graph.nodes() {
            match plan.stages.iter().find(|s| s.name == node.name) {
                Some(stage) if stage.role == node.role => {}
                Some(_) => return invalid(format!("Stage '{}' role differs from the graph", node.name)),
                None => return invalid(format!("Stage '{}' has no instructions", node.name)),
            }
        }
        Ok(())
    }
}

/// Only the environment artifact crosses from the resolver into the runtime
/// image, and the resolver sees nothing of the application source
pub struct ArtifactIsolationRule;

impl ValidationRule for ArtifactIsolationRule {
    fn name(&self) -> &'static str {
        "ArtifactIsolation"
    }

    fn validate(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        let resolver = resolver_stage(plan)?;
        let runtime = runtime_stage(plan)?;

        for copy in resolver.copies() {
            if let Instruction::Copy {
                from_stage: None,
                sources,
                ..
            } = copy
            {
                if let Some(other) = sources
                    .iter()
                    .find(|s| s.as_str() != MANIFEST_FILE && s.as_str() != LOCK_FILE)
                {
                    return invalid(format!(
                        "Resolver stage copies '{}' from the build context; only {} and {} are allowed",
                        other, MANIFEST_FILE, LOCK_FILE
                    ));
                }
            }
        }

        let mut imported = 0;
        for copy in runtime.copies() {
            if let Instruction::Copy {
                from_stage: Some(from),
                sources,
                dest,
                ..
            } = copy
            {
                if from != &resolver.name {
                    return invalid(format!("Runtime stage copies from unknown stage '{}'", from));
                }
                if sources.as_slice() != [plan.artifact.path.as_str()] || dest != &plan.artifact.path {
                    return invalid(format!(
                        "Runtime stage may only import {} from the resolver, found {} -> {}",
                        plan.artifact.path,
                        sources.join(" "),
                        dest
                    ));
                }
                imported += 1;
            }
        }
        if imported != 1 {
            return Err(BuildError::transfer(
                plan.artifact.path.as_str(),
                format!("runtime stage imports the environment artifact {} times", imported),
            ));
        }

        let edge_matches = plan
            .graph
            .inputs_of(&runtime.name)
            .all(|e| e.from == resolver.name && e.path == plan.artifact.path);
        if !edge_matches {
            return invalid("Artifact edge does not match the environment artifact");
        }
        Ok(())
    }
}

/// Every file copied into the runtime image belongs to the execution identity
pub struct OwnershipRule;

impl ValidationRule for OwnershipRule {
    fn name(&self) -> &'static str {
        "Ownership"
    }

    fn validate(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        let owner = plan.runtime.identity.owner();
        for copy in runtime_stage(plan)?.copies() {
            if let Instruction::Copy { sources, chown, .. } = copy {
                if chown.as_deref() != Some(owner.as_str()) {
                    return denied(format!(
                        "Copy of {} is owned by {} instead of {}",
                        sources.join(" "),
                        chown.as_deref().unwrap_or(ROOT_USER),
                        owner
                    ));
                }
            }
        }
        Ok(())
    }
}

pub struct NonRootUserRule;

impl ValidationRule for NonRootUserRule {
    fn name(&self) -> &'static str {
        "NonRootUser"
    }

    fn validate(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        let identity = &plan.runtime.identity;
        if identity.user == ROOT_USER || identity.uid == 0 || identity.gid == 0 {
            return denied(format!("Execution identity {} is privileged", identity));
        }
        match runtime_stage(plan)?.final_user() {
            Some(user) if user == identity.user => Ok(()),
            Some(user) => denied(format!(
                "Runtime stage finishes as '{}' instead of '{}'",
                user, identity.user
            )),
            None => denied("Runtime stage never leaves the base image's root user"),
        }
    }
}

/// After the identity exists, root is only used for a single maintenance
/// step that cleans up after itself
pub struct PrivilegeWindowRule;

impl ValidationRule for PrivilegeWindowRule {
    fn name(&self) -> &'static str {
        "PrivilegeWindow"
    }

    fn validate(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        let identity = &plan.runtime.identity.user;
        let mut current = ROOT_USER;
        let mut identity_active = false;
        let mut windows = 0;

        for instruction in &runtime_stage(plan)?.instructions {
            match instruction {
                Instruction::User { name } => {
                    current = name.as_str();
                    if current == identity {
                        identity_active = true;
                    }
                }
                Instruction::Run {
                    command,
                    privileged: true,
                } => {
                    if current != ROOT_USER {
                        return denied("Privileged step does not run as root");
                    }
                    if !command.contains("rm -rf") {
                        return denied(format!(
                            "Privileged step '{}' leaves transient state behind",
                            command
                        ));
                    }
                    windows += 1;
                }
                Instruction::Run { command, .. } if identity_active && current == ROOT_USER => {
                    return denied(format!(
                        "'{}' runs as root outside the maintenance window",
                        command
                    ));
                }
                _ => {}
            }
        }

        if windows > 1 {
            return denied(format!("Found {} privileged steps, at most one is allowed", windows));
        }
        if current != identity {
            return denied("Privileged window is never reverted");
        }
        Ok(())
    }
}

/// Declared port, entrypoint and runtime contract agree
pub struct PortContractRule;

impl ValidationRule for PortContractRule {
    fn name(&self) -> &'static str {
        "PortContract"
    }

    fn validate(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        let runtime = runtime_stage(plan)?;
        let exposed: Vec<u16> = runtime
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Expose { port } => Some(*port),
                _ => None,
            })
            .collect();
        if exposed != [plan.runtime.port] {
            return invalid(format!(
                "Expected exactly one exposed port {}, found {:?}",
                plan.runtime.port, exposed
            ));
        }

        let commands: Vec<&Vec<String>> = runtime
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Cmd { argv } => Some(argv),
                _ => None,
            })
            .collect();
        let argv = match commands.as_slice() {
            [argv] => *argv,
            _ => return invalid(format!("Expected one CMD, found {}", commands.len())),
        };
        if argv != &plan.runtime.command {
            return invalid("CMD differs from the runtime contract");
        }
        if entrypoint::port_of(argv) != Some(plan.runtime.port) {
            return invalid(format!(
                "Entrypoint listens on {:?} but the image declares {}",
                entrypoint::port_of(argv),
                plan.runtime.port
            ));
        }
        if entrypoint::host_of(argv) != Some(BIND_HOST) {
            return invalid(format!("Entrypoint must bind {}", BIND_HOST));
        }
        if entrypoint::reloads(argv) != plan.runtime.reload {
            return invalid("Entrypoint reload flag differs from the runtime contract");
        }
        Ok(())
    }
}

/// The environment's executables resolve first
pub struct EnvironmentPathRule;

impl ValidationRule for EnvironmentPathRule {
    fn name(&self) -> &'static str {
        "EnvironmentPath"
    }

    fn validate(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        let bin = plan.artifact.bin_dir();
        let path = runtime_stage(plan)?
            .instructions
            .iter()
            .rev()
            .find_map(|i| match i {
                Instruction::Env { key, value } if key == "PATH" => Some(value.as_str()),
                _ => None,
            });
        match path {
            Some(value) if value.split(':').next() == Some(bin.as_str()) => Ok(()),
            Some(value) => invalid(format!("PATH '{}' does not start with {}", value, bin)),
            None => invalid(format!("Runtime stage never puts {} on PATH", bin)),
        }
    }
}
