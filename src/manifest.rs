//! The `group/name: command` task grammar used by `--task` and manifest files.

use std::path::Path;

use anyhow::{Context, Result};

use crate::error::SpecError;
use crate::task::TaskSpec;

/// Parses one task definition. `line` is 1-based and only used in errors.
///
/// The label runs up to the first `:`; within it, the last `/` separates the
/// group from the name. The group is optional.
pub fn parse_task_line(text: &str, line: usize) -> std::result::Result<TaskSpec, SpecError> {
    let Some((label, command)) = text.split_once(':') else {
        return Err(SpecError::Malformed {
            line,
            text: text.to_string(),
        });
    };
    let (group, name) = label.trim().rsplit_once('/').unwrap_or(("", label.trim()));
    let spec = TaskSpec::new(group.trim(), name.trim(), command.trim());
    spec.validate()?;
    Ok(spec)
}

/// Parses a manifest, skipping blank lines and `#` comments.
pub fn parse_manifest(text: &str) -> std::result::Result<Vec<TaskSpec>, SpecError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(index, line)| parse_task_line(line, index + 1))
        .collect()
}

pub fn load_manifest(path: &Path) -> Result<Vec<TaskSpec>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    parse_manifest(&raw).with_context(|| format!("invalid manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    #[case("grp/A: printf 'stdout\\n'", "grp", "A", "printf 'stdout\\n'")]
    #[case("lint: cargo clippy", "", "lint", "cargo clippy")]
    #[case("  ci/test :  cargo test -- --nocapture ", "ci", "test", "cargo test -- --nocapture")]
    #[case("web/api/build: make -C api", "web/api", "build", "make -C api")]
    #[case("check: echo a:b", "", "check", "echo a:b")]
    fn parses_task_lines(
        #[case] text: &str,
        #[case] group: &str,
        #[case] name: &str,
        #[case] command: &str,
    ) {
        let spec = parse_task_line(text, 1).unwrap();
        assert_eq!(spec, TaskSpec::new(group, name, command));
    }

    #[test]
    fn rejects_lines_without_label() {
        assert_eq!(
            parse_task_line("cargo build", 3),
            Err(SpecError::Malformed {
                line: 3,
                text: "cargo build".into()
            })
        );
    }

    #[test]
    fn rejects_empty_parts() {
        assert!(matches!(
            parse_task_line("grp/: make", 1),
            Err(SpecError::MissingName { .. })
        ));
        assert!(matches!(
            parse_task_line("grp/build:   ", 1),
            Err(SpecError::MissingCommand { .. })
        ));
    }

    #[test]
    fn manifest_skips_comments_and_reports_real_line_numbers() {
        let text = "# build matrix\n\nfmt/check: cargo fmt --check\n\n  # lints\noops\n";
        let err = parse_manifest(text).unwrap_err();
        assert_eq!(
            err,
            SpecError::Malformed {
                line: 6,
                text: "oops".into()
            }
        );

        let specs = parse_manifest("# only\na: true\nb/c: false\n").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].label(), "b/c");
    }

    #[test]
    fn loads_manifest_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "build/app: cargo build").unwrap();
        writeln!(file, "test/app: cargo test").unwrap();
        let specs = load_manifest(file.path()).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].command, "cargo build");
    }
}
