//! `.dockerignore` rendering
//!
//! The same pattern list filters the build context archive with gitignore
//! rules. Docker anchors every pattern at the context root, so patterns that
//! gitignore matches at any depth are rendered with a `**/` prefix and a plain
//! `docker build` excludes the same files.

use std::fs;
use std::path::Path;
use tracing::debug;

/// Always excluded from the build context
pub const STANDARD_EXCLUDES: &[&str] = &[
    ".git",
    ".gitignore",
    ".dockerignore",
    "*.md",
    "LICENSE",
    ".vscode",
    ".idea",
    "*.swp",
    "*.swo",
    "*~",
    ".DS_Store",
    ".venv",
    "**/__pycache__",
    "**/*.pyc",
    ".pytest_cache",
    ".mypy_cache",
    "slimbox.toml",
];

/// Exclusion patterns for a project: the standard list, then its `.gitignore`
pub fn patterns(project_root: &Path) -> Vec<String> {
    let mut patterns: Vec<String> = STANDARD_EXCLUDES.iter().map(|p| p.to_string()).collect();

    let gitignore = project_root.join(".gitignore");
    if let Ok(content) = fs::read_to_string(&gitignore) {
        let before = patterns.len();
        for line in content.lines() {
            let line = line.trim();
            if !line.is_empty() && !line.starts_with('#') && !patterns.iter().any(|p| p == line) {
                patterns.push(line.to_string());
            }
        }
        debug!("Loaded {} patterns from .gitignore", patterns.len() - before);
    }
    patterns
}

/// Translate one gitignore pattern into `.dockerignore` syntax
fn docker_pattern(pattern: &str) -> String {
    let (negation, body) = match pattern.strip_prefix('!') {
        Some(body) => ("!", body),
        None => ("", pattern),
    };
    // A slash anywhere but the end anchors the pattern at the root
    if body.trim_end_matches('/').contains('/') {
        format!("{}{}", negation, body.trim_start_matches('/'))
    } else {
        format!("{}**/{}", negation, body)
    }
}

pub fn render(project_root: &Path) -> String {
    let mut out = String::from("# Generated by slimbox\n");
    for pattern in patterns(project_root) {
        out.push_str(&docker_pattern(&pattern));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_standard_patterns_without_gitignore() {
        let dir = TempDir::new().unwrap();
        let rendered = render(dir.path());
        assert!(rendered.lines().any(|l| l == "**/.venv"));
        assert!(rendered.lines().any(|l| l == "**/.git"));
        assert!(rendered.lines().any(|l| l == "**/__pycache__"));
        assert_eq!(patterns(dir.path()).len(), STANDARD_EXCLUDES.len());
    }

    #[test]
    fn test_gitignore_appended_once() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".gitignore"),
            "# local\n.env\n\n.venv\ndist/\n",
        )
        .unwrap();
        let patterns = patterns(dir.path());
        assert_eq!(&patterns[STANDARD_EXCLUDES.len()..], &[".env", "dist/"]);
    }

    #[test]
    fn test_rendered_patterns_match_at_the_same_depth() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".gitignore"),
            "dist/\n/build\ndocs/*.tmp\n!keep.md\n",
        )
        .unwrap();
        let rendered = render(dir.path());
        let lines: Vec<&str> = rendered.lines().collect();
        for expected in ["**/*.md", "**/dist/", "build", "docs/*.tmp", "!**/keep.md"] {
            assert!(lines.contains(&expected), "missing {expected} in\n{rendered}");
        }
        assert!(!lines.contains(&"*.md"));
    }
}
