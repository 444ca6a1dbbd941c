//! Dockerfile rendering
//!
//! Output depends only on the plan: stages in dependency order, instructions
//! in plan order, no timestamps or host details. Rendering the same plan twice
//! yields the same bytes.

use std::fmt::Write as _;

use crate::error::BuildError;
use crate::plan::{BuildPlan, Healthcheck, Instruction, Stage};

pub const SYNTAX: &str = "docker/dockerfile:1";

pub fn render(plan: &BuildPlan) -> Result<String, BuildError> {
    let order = plan.graph.topological_order()?;

    let mut out = String::new();
    let _ = writeln!(out, "# syntax={}", SYNTAX);
    let _ = writeln!(
        out,
        "# Generated by slimbox from lock {}. Do not edit.",
        plan.metadata.lock_digest
    );

    for name in order {
        let stage = plan
            .stages
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| BuildError::Validation(format!("Stage '{}' has no instructions", name)))?;
        out.push('\n');
        render_stage(&mut out, stage);
    }
    Ok(out)
}

fn render_stage(out: &mut String, stage: &Stage) {
    let _ = writeln!(out, "FROM {} AS {}", stage.base, stage.name);
    for instruction in &stage.instructions {
        out.push_str(&render_instruction(instruction));
        out.push('\n');
    }
}

/// One Dockerfile line for an instruction
pub fn render_instruction(instruction: &Instruction) -> String {
    match instruction {
        Instruction::Env { key, value } => format!("ENV {}={}", key, quote(value)),
        Instruction::Label { key, value } => format!("LABEL {}={}", key, quote(value)),
        Instruction::Workdir { path } => format!("WORKDIR {}", path),
        Instruction::Run { command, .. } => format!("RUN {}", command),
        Instruction::Copy {
            from_stage,
            sources,
            dest,
            chown,
        } => {
            let mut line = String::from("COPY");
            if let Some(stage) = from_stage {
                let _ = write!(line, " --from={}", stage);
            }
            if let Some(owner) = chown {
                let _ = write!(line, " --chown={}", owner);
            }
            for source in sources {
                let _ = write!(line, " {}", source);
            }
            let _ = write!(line, " {}", dest);
            line
        }
        Instruction::User { name } => format!("USER {}", name),
        Instruction::Expose { port } => format!("EXPOSE {}", port),
        Instruction::Healthcheck(check) => render_healthcheck(check),
        Instruction::Cmd { argv } => format!("CMD {}", exec_form(argv)),
    }
}

fn render_healthcheck(check: &Healthcheck) -> String {
    let args = match check.test.split_first() {
        Some((kind, args)) if kind == "CMD" => args,
        _ => check.test.as_slice(),
    };
    format!(
        "HEALTHCHECK --interval={} --timeout={} --retries={} CMD {}",
        check.interval,
        check.timeout,
        check.retries,
        exec_form(args)
    )
}

/// JSON array form, which Docker runs without a shell
fn exec_form(argv: &[String]) -> String {
    serde_json::to_string(argv).unwrap_or_else(|_| "[]".to_string())
}

/// Double-quoted value; `$` is left alone so references like `$PATH` expand
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plan() {
        let plan = crate::validation::test_support::valid_plan();
        let dockerfile = render(&plan).unwrap();

        assert!(dockerfile.starts_with("# syntax=docker/dockerfile:1\n"));
        let resolver = dockerfile.find("FROM python:3.11-slim AS resolver").unwrap();
        let runtime = dockerfile.find("FROM python:3.11-slim AS runtime").unwrap();
        assert!(resolver < runtime);
        assert!(dockerfile.contains("COPY pyproject.toml poetry.lock ./\n"));
        assert!(dockerfile.contains("USER root\nRUN apt-get update && rm -rf /var/lib/apt/lists/*\nUSER appuser\n"));
        assert!(dockerfile.ends_with(
            "CMD [\"uvicorn\",\"app.main:app\",\"--host\",\"0.0.0.0\",\"--port\",\"8000\"]\n"
        ));
        assert_eq!(dockerfile, render(&plan).unwrap());
    }

    #[test]
    fn test_copy_line() {
        let line = render_instruction(&Instruction::Copy {
            from_stage: Some("resolver".to_string()),
            sources: vec!["/app/.venv".to_string()],
            dest: "/app/.venv".to_string(),
            chown: Some("appuser:appgroup".to_string()),
        });
        assert_eq!(
            line,
            "COPY --from=resolver --chown=appuser:appgroup /app/.venv /app/.venv"
        );
    }

    #[test]
    fn test_env_keeps_variable_reference() {
        let line = render_instruction(&Instruction::Env {
            key: "PATH".to_string(),
            value: "/app/.venv/bin:$PATH".to_string(),
        });
        assert_eq!(line, r#"ENV PATH="/app/.venv/bin:$PATH""#);
    }

    #[test]
    fn test_exec_form_escapes() {
        let line = render_instruction(&Instruction::Cmd {
            argv: vec!["uvicorn".to_string(), "a\"b".to_string()],
        });
        assert_eq!(line, r#"CMD ["uvicorn","a\"b"]"#);
    }

    #[test]
    fn test_healthcheck_line() {
        let line = render_instruction(&Instruction::Healthcheck(Healthcheck {
            test: vec!["CMD".to_string(), "true".to_string()],
            interval: "30s".to_string(),
            timeout: "5s".to_string(),
            retries: 3,
        }));
        assert_eq!(
            line,
            r#"HEALTHCHECK --interval=30s --timeout=5s --retries=3 CMD ["true"]"#
        );
    }
}
