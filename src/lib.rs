//! slimbox - hardened two-stage container images for ASGI services
//!
//! slimbox takes a Poetry project serving a FastAPI (or any ASGI) application
//! and turns it into a build plan with exactly two stages:
//!
//! - a **resolver** stage that installs the locked dependency set into an
//!   isolated virtual environment and nothing else
//! - a **runtime** stage that imports only that environment plus the
//!   application source, runs as a dedicated non-root identity and starts
//!   uvicorn on a fixed port
//!
//! Every step is fatal on failure: a lock that does not close over its own
//! dependency edges, a missing input, a privileged identity or a plan that
//! breaks an ownership rule aborts the run before anything is written or
//! built.
//!
//! # Example Usage
//!
//! ```no_run
//! use slimbox::{PipelineOrchestrator, SlimboxConfig};
//! use std::path::Path;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let root = Path::new("./service");
//! let config = SlimboxConfig::load(root)?;
//! let output = PipelineOrchestrator::default().execute(root, config).await?;
//! println!("{}", output.dockerfile);
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`lock`]: `pyproject.toml` / `poetry.lock` parsing and consistency checks
//! - [`plan`]: stage graph, instruction builder and privilege windows
//! - [`stages`]: the resolver and runtime stage planners
//! - [`validation`]: plan-level invariant rules
//! - [`render`]: Dockerfile and `.dockerignore` rendering
//! - [`context`]: deterministic build context archives
//! - [`docker`]: building and inspecting images with the Docker daemon
//! - [`pipeline`]: phase orchestration

pub mod cli;
pub mod config;
pub mod context;
pub mod docker;
pub mod entrypoint;
pub mod error;
pub mod identity;
pub mod lock;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod render;
pub mod stages;
pub mod util;
pub mod validation;

pub use config::{ConfigError, SlimboxConfig, TargetEnvironment};
pub use context::BuildContext;
pub use docker::{DockerClient, ImageFacts};
pub use entrypoint::Entrypoint;
pub use error::BuildError;
pub use identity::ExecutionIdentity;
pub use lock::{LockDescriptor, LockReport};
pub use pipeline::{PipelineOrchestrator, PlanOutput};
pub use plan::{BuildPlan, StageBuilder};
pub use stages::{AssemblyStage, ResolverStage};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};
pub use validation::Validator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_slimbox() {
        assert_eq!(NAME, "slimbox");
    }
}
