use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{SlimboxConfig, TargetEnvironment};

/// Plans, renders and builds hardened two-stage images for ASGI services
#[derive(Parser, Debug)]
#[command(
    name = "slimbox",
    about = "Plan, render and build hardened two-stage images for ASGI services",
    version,
    author,
    long_about = "slimbox reads a Poetry project (pyproject.toml + poetry.lock), proves the lock \
                  is consistent and plans a two-stage image: a resolver stage that installs the \
                  locked dependencies into a virtual environment, and a runtime stage that \
                  imports only that environment, runs as a non-root identity and starts uvicorn."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Plan the image and print it",
        long_about = "Checks the lock, plans both stages, validates the plan and prints it.\n\n\
                      Examples:\n  \
                      slimbox plan\n  \
                      slimbox plan ./service --format dockerfile -o Dockerfile\n  \
                      slimbox plan --format json --environment development"
    )]
    Plan(PlanArgs),

    #[command(
        about = "Check that poetry.lock is consistent",
        long_about = "Verifies every locked package is an exact pin, that packages locked more \
                      than once are split by environment markers, and that every dependency edge, \
                      including the project's direct dependencies, is satisfied by the lock.\n\n\
                      Examples:\n  \
                      slimbox lock\n  \
                      slimbox lock ./service --format json"
    )]
    Lock(LockArgs),

    #[command(
        about = "Build the image with the local Docker daemon",
        long_about = "Plans the image, packs a deterministic build context and builds it with \
                      the Docker daemon, then checks the built image against the plan.\n\n\
                      Examples:\n  \
                      slimbox build --tag api:latest\n  \
                      slimbox build ./service --tag api:dev --environment development"
    )]
    Build(BuildArgs),

    #[command(
        about = "Compare a built image with the plan",
        long_about = "Reads user, exposed ports, command and labels from an existing image and \
                      checks them against the plan for the project.\n\n\
                      Examples:\n  \
                      slimbox inspect api:latest\n  \
                      slimbox inspect api:latest ./service --format json"
    )]
    Inspect(InspectArgs),

    #[command(about = "Show the effective configuration")]
    Config(ConfigArgs),
}

/// Settings that override `slimbox.toml` and `SLIMBOX_*` variables
#[derive(Args, Debug, Clone, Default)]
pub struct PlanOverrides {
    #[arg(long, value_name = "PORT", help = "Service port")]
    pub port: Option<u16>,

    #[arg(long, value_name = "MODULE:ATTR", help = "ASGI application object")]
    pub app_module: Option<String>,

    #[arg(long, value_enum, help = "Target environment")]
    pub environment: Option<EnvironmentArg>,

    #[arg(
        long,
        action = ArgAction::SetTrue,
        conflicts_with = "no_reload",
        help = "Restart the server on source changes"
    )]
    pub reload: bool,

    #[arg(long, action = ArgAction::SetTrue, help = "Never restart the server on source changes")]
    pub no_reload: bool,

    #[arg(long, value_name = "IMAGE", help = "Base image of the resolver stage")]
    pub builder_image: Option<String>,

    #[arg(long, value_name = "IMAGE", help = "Base image of the runtime stage")]
    pub runtime_image: Option<String>,

    #[arg(long, value_name = "DIR", help = "Application source directory")]
    pub source_dir: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "HTTP path requested by the image healthcheck")]
    pub healthcheck_path: Option<String>,
}

impl PlanOverrides {
    pub fn apply(&self, config: &mut SlimboxConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ref module) = self.app_module {
            config.app_module = module.clone();
        }
        if let Some(environment) = self.environment {
            config.environment = environment.into();
        }
        if self.reload {
            config.reload = Some(true);
        } else if self.no_reload {
            config.reload = Some(false);
        }
        if let Some(ref image) = self.builder_image {
            config.builder_image = image.clone();
        }
        if let Some(ref image) = self.runtime_image {
            config.runtime_image = image.clone();
        }
        if let Some(ref dir) = self.source_dir {
            config.source_dir = dir.clone();
        }
        if let Some(ref path) = self.healthcheck_path {
            config.healthcheck_path = Some(path.clone());
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[arg(value_name = "PATH", help = "Project directory (defaults to current directory)")]
    pub project_path: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: PlanOverrides,
}

#[derive(Parser, Debug, Clone)]
pub struct LockArgs {
    #[arg(value_name = "PATH", help = "Project directory (defaults to current directory)")]
    pub project_path: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(value_name = "PATH", help = "Project directory (defaults to current directory)")]
    pub project_path: Option<PathBuf>,

    #[arg(short = 't', long, value_name = "TAG", help = "Image tag")]
    pub tag: Option<String>,

    #[arg(long, help = "Also write the rendered Dockerfile into the project")]
    pub write_dockerfile: bool,

    #[arg(long, help = "Disable the progress spinner")]
    pub no_progress: bool,

    #[command(flatten)]
    pub overrides: PlanOverrides,
}

#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    #[arg(value_name = "IMAGE", help = "Image name or id")]
    pub image: String,

    #[arg(value_name = "PATH", help = "Project directory (defaults to current directory)")]
    pub project_path: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[command(flatten)]
    pub overrides: PlanOverrides,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(value_name = "PATH", help = "Project directory (defaults to current directory)")]
    pub project_path: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[command(flatten)]
    pub overrides: PlanOverrides,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentArg {
    Production,
    Development,
}

impl From<EnvironmentArg> for TargetEnvironment {
    fn from(arg: EnvironmentArg) -> Self {
        match arg {
            EnvironmentArg::Production => TargetEnvironment::Production,
            EnvironmentArg::Development => TargetEnvironment::Development,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
    Dockerfile,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
            OutputFormatArg::Dockerfile => super::output::OutputFormat::Dockerfile,
        }
    }
}
