//! Output formatting for the CLI
//!
//! Plans, lock reports, configuration and image facts can each be printed as
//! JSON, YAML or human-readable text. Plans additionally render straight to a
//! Dockerfile.
//!
//! # Example
//!
//! ```ignore
//! use slimbox::cli::output::{OutputFormat, OutputFormatter};
//!
//! let formatter = OutputFormatter::new(OutputFormat::Dockerfile);
//! let text = formatter.format_plan(&output)?;
//! print!("{}", text);
//! ```

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::config::SlimboxConfig;
use crate::docker::ImageFacts;
use crate::lock::LockReport;
use crate::pipeline::PlanOutput;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (version-control friendly)
    Yaml,
    /// Human-readable formatted text
    Human,
    /// Rendered Dockerfile; only meaningful for plans
    Dockerfile,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

/// Result of comparing an image with the plan it should match
#[derive(Debug, Serialize)]
pub struct Inspection<'a> {
    pub image: &'a str,
    pub facts: &'a ImageFacts,
    pub matches_plan: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<String>,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_plan(&self, output: &PlanOutput) -> Result<String> {
        match self.format {
            OutputFormat::Json => output.plan.to_json(),
            OutputFormat::Yaml => output.plan.to_yaml(),
            OutputFormat::Human => Ok(format!(
                "{}\nDockerfile\n{}\n{}",
                output.plan, RULE, output.dockerfile
            )),
            OutputFormat::Dockerfile => Ok(output.dockerfile.clone()),
        }
    }

    pub fn format_lock(&self, report: &LockReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(report, "lock report"),
            OutputFormat::Yaml => to_yaml(report, "lock report"),
            OutputFormat::Human => {
                let mut out = String::new();
                out.push_str("\u{2713} Lock is consistent\n");
                out.push_str(RULE);
                out.push_str("\n\n");
                out.push_str(&format!("Packages:         {}\n", report.packages));
                out.push_str(&format!("Direct deps:      {}\n", report.direct));
                out.push_str(&format!("Edges checked:    {}\n", report.edges_checked));
                out.push_str(&format!("Lock digest:      {}\n", report.digest));
                if let Some(ref format) = report.lock_version {
                    out.push_str(&format!("Lock format:      {}\n", format));
                }
                if let Some(ref python) = report.python {
                    out.push_str(&format!("Python:           {}\n", python));
                }
                if !report.marker_split.is_empty() {
                    out.push_str(&format!(
                        "Marker split:     {}\n",
                        report.marker_split.join(", ")
                    ));
                }
                if !report.skipped_conditional.is_empty() {
                    out.push_str("\nConditional edges not in lock:\n");
                    for (i, edge) in report.skipped_conditional.iter().enumerate() {
                        let connector = if i + 1 == report.skipped_conditional.len() {
                            "\u{2514}"
                        } else {
                            "\u{251C}"
                        };
                        out.push_str(&format!("{}\u{2500} {}\n", connector, edge));
                    }
                }
                Ok(out)
            }
            OutputFormat::Dockerfile => bail!("--format dockerfile only applies to `plan`"),
        }
    }

    pub fn format_config(&self, config: &SlimboxConfig) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(&config.to_display_map(), "configuration"),
            OutputFormat::Yaml => to_yaml(&config.to_display_map(), "configuration"),
            OutputFormat::Human => Ok(config.to_string()),
            OutputFormat::Dockerfile => bail!("--format dockerfile only applies to `plan`"),
        }
    }

    pub fn format_inspection(&self, inspection: &Inspection<'_>) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(inspection, "inspection"),
            OutputFormat::Yaml => to_yaml(inspection, "inspection"),
            OutputFormat::Human => {
                let facts = inspection.facts;
                let mut out = String::new();
                if inspection.matches_plan {
                    out.push_str(&format!("\u{2713} {} matches the plan\n", inspection.image));
                } else {
                    out.push_str(&format!(
                        "\u{26A0} {} does not match the plan\n",
                        inspection.image
                    ));
                }
                out.push_str(RULE);
                out.push_str("\n\n");
                out.push_str(&format!("Id:        {}\n", facts.id.as_deref().unwrap_or("-")));
                out.push_str(&format!("User:      {}\n", facts.user.as_deref().unwrap_or("root")));
                out.push_str(&format!("Ports:     {}\n", facts.exposed_ports.join(", ")));
                out.push_str(&format!("Command:   {}\n", facts.cmd.join(" ")));
                out.push_str(&format!(
                    "Workdir:   {}\n",
                    facts.working_dir.as_deref().unwrap_or("/")
                ));
                if !facts.labels.is_empty() {
                    out.push_str("Labels:\n");
                    for (key, value) in &facts.labels {
                        out.push_str(&format!("  {} = {}\n", key, value));
                    }
                }
                if let Some(ref mismatch) = inspection.mismatch {
                    out.push_str(&format!("\n\u{26A0} {}\n", mismatch));
                }
                Ok(out)
            }
            OutputFormat::Dockerfile => bail!("--format dockerfile only applies to `plan`"),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string_pretty(value).with_context(|| format!("Failed to serialize {} to JSON", what))
}

fn to_yaml<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<String> {
    serde_yaml::to_string(value).with_context(|| format!("Failed to serialize {} to YAML", what))
}
