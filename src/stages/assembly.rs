//! Runtime assembly stage
//!
//! Builds the final image from a clean base: create the execution identity,
//! import the environment artifact, overlay the application source, run the
//! single privileged maintenance step and declare the network and process
//! contract. Everything after identity creation runs as that identity except
//! the maintenance window.

use tracing::{debug, info};

use crate::config::SlimboxConfig;
use crate::entrypoint::Entrypoint;
use crate::error::BuildError;
use crate::lock::LockDescriptor;
use crate::plan::{
    EnvironmentArtifact, Healthcheck, PrivilegedWindow, RuntimeContract, Stage, StageBuilder,
    StageRole,
};

pub const STAGE_NAME: &str = "runtime";

pub const LABEL_TITLE: &str = "org.opencontainers.image.title";
pub const LABEL_VERSION: &str = "org.opencontainers.image.version";
pub const LABEL_LOCK_DIGEST: &str = "io.slimbox.lock-digest";

#[derive(Debug, Clone)]
pub struct AssemblyStage {
    pub stage: Stage,
    pub runtime: RuntimeContract,
}

/// Plan the runtime stage importing `artifact` from the stage named `resolver`.
pub fn plan(
    config: &SlimboxConfig,
    descriptor: &LockDescriptor,
    resolver: &str,
    artifact: &EnvironmentArtifact,
) -> Result<AssemblyStage, BuildError> {
    let identity = &config.identity;
    identity.validate()?;

    let source_path = descriptor.root.join(&config.source_dir);
    if !source_path.is_dir() {
        return Err(BuildError::transfer(
            source_path,
            "application source directory not found",
        ));
    }
    let source = source_tree(config);

    let mut stage = StageBuilder::new(STAGE_NAME, StageRole::Runtime, config.runtime_image.as_str());

    if let Some(ref name) = descriptor.manifest.name {
        stage.label(LABEL_TITLE, name.as_str());
    }
    if let Some(ref version) = descriptor.manifest.version {
        stage.label(LABEL_VERSION, version.as_str());
    }
    stage.label(LABEL_LOCK_DIGEST, descriptor.digest.as_str());

    stage
        .run(identity.create_command())
        .user(&identity.user)
        .copy_from(resolver, &artifact.path, Some(identity))
        .env("VIRTUAL_ENV", artifact.path.as_str())
        .env("PATH", format!("{}:$PATH", artifact.bin_dir()))
        .env("PYTHONDONTWRITEBYTECODE", "1")
        .env("PYTHONUNBUFFERED", "1")
        .copy(&[source.as_str()], &config.workdir, Some(identity))
        .workdir(&config.workdir);

    {
        let mut window = stage.elevate(identity);
        maintain(&mut window, &config.maintenance_command)?;
    }

    let reload = config.reload_enabled();
    let command = Entrypoint::new(config.app_module.as_str(), config.port)
        .with_reload(reload)
        .argv();

    stage.expose(config.port);
    if let Some(ref path) = config.healthcheck_path {
        stage.healthcheck(healthcheck(artifact, config.port, path));
    }
    stage.cmd(command.clone());

    let stage = stage.finish();
    info!(
        identity = %identity,
        port = config.port,
        reload,
        "Planned runtime stage"
    );

    Ok(AssemblyStage {
        stage,
        runtime: RuntimeContract {
            identity: identity.clone(),
            port: config.port,
            command,
            workdir: config.workdir.clone(),
            source_dest: config.workdir.clone(),
            reload,
        },
    })
}

/// Source tree as a context-relative path with forward slashes
fn source_tree(config: &SlimboxConfig) -> String {
    let parts: Vec<String> = config
        .source_dir
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|c| c != ".")
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Emit the maintenance step inside an open privileged window
fn maintain(window: &mut PrivilegedWindow<'_>, command: &str) -> Result<(), BuildError> {
    let command = command.trim();
    if command.contains('\n') || command.contains('\r') {
        return Err(BuildError::Validation(
            "Maintenance command must be a single line".to_string(),
        ));
    }
    let switches_user = command
        .split(|c: char| c.is_whitespace() || c == ';' || c == '&' || c == '|')
        .any(|word| matches!(word, "su" | "sudo" | "runuser" | "setpriv"));
    if switches_user {
        return Err(BuildError::Permission(format!(
            "Maintenance command '{}' changes user inside the privileged window",
            command
        )));
    }
    debug!(command, "Adding privileged maintenance step");
    window.run(command);
    Ok(())
}

/// Query the service with the environment's own interpreter so the runtime
/// image needs no extra packages
fn healthcheck(artifact: &EnvironmentArtifact, port: u16, path: &str) -> Healthcheck {
    Healthcheck {
        test: vec![
            "CMD".to_string(),
            format!("{}/python", artifact.bin_dir()),
            "-c".to_string(),
            format!(
                "import urllib.request; urllib.request.urlopen('http://127.0.0.1:{}{}', timeout=4)",
                port, path
            ),
        ],
        interval: "30s".to_string(),
        timeout: "5s".to_string(),
        retries: 3,
    }
}
