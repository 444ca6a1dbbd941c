//! Subcommand handlers
//!
//! Each handler runs to completion or stops at the first error, prints the
//! error chain to stderr and returns the process exit code for its class.

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::commands::{BuildArgs, ConfigArgs, InspectArgs, LockArgs, PlanArgs, PlanOverrides};
use super::output::{Inspection, OutputFormatter};
use crate::config::SlimboxConfig;
use crate::context::{self, DOCKERFILE, DOCKERIGNORE};
use crate::docker::{self, DockerClient};
use crate::error::BuildError;
use crate::lock::{self, LockDescriptor};
use crate::pipeline::{PipelineOrchestrator, PlanOutput};
use crate::progress::{LoggingHandler, ProgressEvent, ProgressHandler};

/// Exit code for failures outside the build error taxonomy
pub const GENERIC_FAILURE: i32 = 1;

/// Map a failed run to its exit code, printing the error chain
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    eprintln!("Error: {:#}", err);
    BuildError::find(err)
        .map(BuildError::exit_code)
        .unwrap_or(GENERIC_FAILURE)
}

fn finish(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => exit_code_for(&e),
    }
}

fn project_root(path: Option<&PathBuf>) -> Result<PathBuf> {
    let root = match path {
        Some(path) => path.clone(),
        None => env::current_dir().context("Failed to determine current directory")?,
    };
    if !root.is_dir() {
        return Err(BuildError::transfer(&root, "project directory does not exist").into());
    }
    Ok(root)
}

fn load_config(root: &Path, overrides: &PlanOverrides) -> Result<SlimboxConfig> {
    let mut config = SlimboxConfig::load(root).map_err(BuildError::from)?;
    overrides.apply(&mut config);
    config.validate().map_err(BuildError::from)?;
    debug!("Effective configuration loaded for {}", root.display());
    Ok(config)
}

async fn run_pipeline(root: &Path, config: SlimboxConfig) -> Result<PlanOutput> {
    PipelineOrchestrator::new(Arc::new(LoggingHandler))
        .execute(root, config)
        .await
}

fn emit(text: &str, destination: Option<&Path>) -> Result<()> {
    match destination {
        Some(path) => {
            fs::write(path, text)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => {
            print!("{}", text);
            if !text.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}

pub async fn handle_plan(args: PlanArgs) -> i32 {
    finish(plan(args).await)
}

async fn plan(args: PlanArgs) -> Result<()> {
    let root = project_root(args.project_path.as_ref())?;
    let config = load_config(&root, &args.overrides)?;
    let output = run_pipeline(&root, config).await?;

    // Formatting happens before anything is written so a failed run leaves
    // no partial output behind.
    let text = OutputFormatter::new(args.format.into()).format_plan(&output)?;
    emit(&text, args.output.as_deref())
}

pub fn handle_lock(args: LockArgs) -> i32 {
    finish(check_lock(args))
}

fn check_lock(args: LockArgs) -> Result<()> {
    let root = project_root(args.project_path.as_ref())?;
    let descriptor = LockDescriptor::load(&root)?;
    let report = lock::check(&descriptor).map_err(BuildError::from)?;
    let text = OutputFormatter::new(args.format.into()).format_lock(&report)?;
    emit(&text, None)
}

pub fn handle_config(args: ConfigArgs) -> i32 {
    finish(show_config(args))
}

fn show_config(args: ConfigArgs) -> Result<()> {
    let root = project_root(args.project_path.as_ref())?;
    let config = load_config(&root, &args.overrides)?;
    let text = OutputFormatter::new(args.format.into()).format_config(&config)?;
    emit(&text, None)
}

pub async fn handle_build(args: BuildArgs, quiet: bool) -> i32 {
    finish(build(args, quiet).await)
}

fn default_tag(output: &PlanOutput) -> String {
    let name = output
        .plan
        .metadata
        .project_name
        .clone()
        .unwrap_or_else(|| "slimbox-app".to_string());
    let digest = &output.plan.metadata.lock_digest;
    format!("{}:{}", name, digest.get(..12).unwrap_or(digest))
}

async fn build(args: BuildArgs, quiet: bool) -> Result<()> {
    let root = project_root(args.project_path.as_ref())?;
    let config = load_config(&root, &args.overrides)?;
    let configured_tag = args.tag.clone().or_else(|| config.tag.clone());
    let output = run_pipeline(&root, config).await?;
    let tag = configured_tag.unwrap_or_else(|| default_tag(&output));

    let handler = LoggingHandler;
    let build_context = context::pack(&root, &output.dockerfile)?;
    handler.on_progress(&ProgressEvent::ContextPacked {
        entries: build_context.entries.len(),
        bytes: build_context.size(),
    });

    if !docker::is_available().await {
        return Err(BuildError::Daemon("Docker daemon is not reachable".to_string()).into());
    }
    let client = DockerClient::connect()?;
    let facts = client
        .build(&build_context, &tag, &handler, !(args.no_progress || quiet))
        .await?;
    facts.verify(&output.plan)?;

    if args.write_dockerfile {
        emit(&output.dockerfile, Some(&root.join(DOCKERFILE)))?;
        emit(&output.dockerignore, Some(&root.join(DOCKERIGNORE)))?;
    }

    if !quiet {
        println!(
            "\u{2713} Built {} ({})",
            tag,
            facts.id.as_deref().unwrap_or("unknown id")
        );
    }
    Ok(())
}

pub async fn handle_inspect(args: InspectArgs) -> i32 {
    finish(inspect(args).await)
}

async fn inspect(args: InspectArgs) -> Result<()> {
    let root = project_root(args.project_path.as_ref())?;
    let config = load_config(&root, &args.overrides)?;
    let output = run_pipeline(&root, config).await?;

    let client = DockerClient::connect()?;
    let facts = client.inspect(&args.image).await?;
    let verdict = facts.verify(&output.plan);

    let inspection = Inspection {
        image: &args.image,
        facts: &facts,
        matches_plan: verdict.is_ok(),
        mismatch: verdict.as_ref().err().map(ToString::to_string),
    };
    let text = OutputFormatter::new(args.format.into()).format_inspection(&inspection)?;
    emit(&text, None)?;

    verdict.map_err(Into::into)
}
