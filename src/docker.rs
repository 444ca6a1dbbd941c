//! Docker daemon integration
//!
//! Hands the packed build context to the daemon, streams its output and
//! checks the resulting image against the plan it was built from.

use bollard::image::BuildImageOptions;
use bollard::Docker;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::context::{BuildContext, DOCKERFILE};
use crate::error::BuildError;
use crate::plan::BuildPlan;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::stages::assembly::LABEL_LOCK_DIGEST;

const DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";

fn daemon(err: bollard::errors::Error) -> BuildError {
    BuildError::Daemon(err.to_string())
}

/// Whether a daemon answers on the local socket or `DOCKER_HOST`
pub async fn is_available() -> bool {
    if env::var_os("DOCKER_HOST").is_none() && !Path::new(DOCKER_SOCKET_PATH).exists() {
        debug!("Docker socket not found at {}", DOCKER_SOCKET_PATH);
        return false;
    }
    match DockerClient::connect() {
        Ok(client) => client.version().await.is_ok(),
        Err(e) => {
            debug!("Failed to connect to Docker: {}", e);
            false
        }
    }
}

/// What an image actually declares, as reported by the daemon
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageFacts {
    pub id: Option<String>,
    pub user: Option<String>,
    pub exposed_ports: Vec<String>,
    pub cmd: Vec<String>,
    pub working_dir: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl ImageFacts {
    /// Compare the image with the plan's runtime contract
    pub fn verify(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        let contract = &plan.runtime;

        if self.user.as_deref() != Some(contract.identity.user.as_str()) {
            return Err(BuildError::Permission(format!(
                "Image runs as {:?}, expected '{}'",
                self.user.as_deref().unwrap_or("root"),
                contract.identity.user
            )));
        }
        let expected_port = format!("{}/tcp", contract.port);
        if self.exposed_ports != [expected_port.as_str()] {
            return Err(BuildError::Validation(format!(
                "Image exposes {:?}, expected [{}]",
                self.exposed_ports, expected_port
            )));
        }
        if self.cmd != contract.command {
            return Err(BuildError::Validation(format!(
                "Image command {:?} differs from planned {:?}",
                self.cmd, contract.command
            )));
        }
        if self.working_dir.as_deref() != Some(contract.workdir.as_str()) {
            return Err(BuildError::Validation(format!(
                "Image working directory {:?} differs from planned '{}'",
                self.working_dir, contract.workdir
            )));
        }
        match self.labels.get(LABEL_LOCK_DIGEST) {
            Some(digest) if digest == &plan.metadata.lock_digest => Ok(()),
            Some(digest) => Err(BuildError::Validation(format!(
                "Image was built from lock {}, plan uses {}",
                digest, plan.metadata.lock_digest
            ))),
            None => Err(BuildError::Validation(format!(
                "Image has no {} label",
                LABEL_LOCK_DIGEST
            ))),
        }
    }
}

pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    pub fn connect() -> Result<Self, BuildError> {
        let docker = Docker::connect_with_local_defaults().map_err(daemon)?;
        Ok(Self { docker })
    }

    pub async fn version(&self) -> Result<String, BuildError> {
        let version = self.docker.version().await.map_err(daemon)?;
        let api_version = version.api_version.unwrap_or_else(|| "0.0".to_string());
        debug!("Docker API version: {}", api_version);
        Ok(api_version)
    }

    /// Build `context` and tag the result.
    ///
    /// The first error the daemon reports aborts the build; nothing is
    /// retried.
    pub async fn build(
        &self,
        context: &BuildContext,
        tag: &str,
        handler: &dyn ProgressHandler,
        show_progress: bool,
    ) -> Result<ImageFacts, BuildError> {
        let options = BuildImageOptions {
            dockerfile: DOCKERFILE.to_string(),
            t: tag.to_string(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let bar = if show_progress {
            spinner(tag)
        } else {
            ProgressBar::hidden()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(context.archive.clone().into()));

        while let Some(item) = stream.next().await {
            let info = match item {
                Ok(info) => info,
                Err(e) => {
                    bar.abandon_with_message("build failed");
                    return Err(daemon(e));
                }
            };
            if let Some(error) = info.error {
                bar.abandon_with_message("build failed");
                return Err(BuildError::Daemon(error.trim().to_string()));
            }
            if let Some(output) = info.stream {
                for line in output.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
                    bar.set_message(line.to_string());
                    handler.on_progress(&ProgressEvent::DaemonOutput {
                        line: line.to_string(),
                    });
                }
            }
        }
        bar.finish_and_clear();

        let facts = self.inspect(tag).await?;
        handler.on_progress(&ProgressEvent::ImageBuilt {
            tag: tag.to_string(),
            id: facts.id.clone(),
        });
        Ok(facts)
    }

    pub async fn inspect(&self, image: &str) -> Result<ImageFacts, BuildError> {
        let inspected = self.docker.inspect_image(image).await.map_err(daemon)?;
        let config = inspected.config.unwrap_or_default();

        let mut exposed_ports: Vec<String> = config
            .exposed_ports
            .map(|ports| ports.into_keys().collect())
            .unwrap_or_default();
        exposed_ports.sort();

        Ok(ImageFacts {
            id: inspected.id,
            user: config.user.filter(|u| !u.is_empty()),
            exposed_ports,
            cmd: config.cmd.unwrap_or_default(),
            working_dir: config.working_dir.filter(|w| !w.is_empty()),
            labels: config.labels.unwrap_or_default().into_iter().collect(),
        })
    }
}

fn spinner(tag: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {prefix:.bold} {wide_msg}") {
        bar.set_style(style);
    }
    bar.set_prefix(format!("building {}", tag));
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
