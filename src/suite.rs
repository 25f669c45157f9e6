//! The top-level entry point: a set of tasks plus how to show them.

use std::io::{self, IsTerminal, Write};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::format::FormatterRegistry;
use crate::render::{run_non_tty, RenderOptions};
use crate::runner::Shell;
use crate::task::TaskSpec;
use crate::theme::Theme;
use crate::tui::run_dashboard;

/// Builder for one invocation.
///
/// ```no_run
/// # async fn demo() -> buildrack::Result<()> {
/// let cancel = tokio_util::sync::CancellationToken::new();
/// buildrack::Suite::new()
///     .task("build", "app", "cargo build")
///     .task("lint", "clippy", "cargo clippy")
///     .run(&cancel)
///     .await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Suite {
    specs: Vec<TaskSpec>,
    options: RenderOptions,
    no_ui: bool,
}

impl Suite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(
        self,
        group: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        self.add(TaskSpec::new(group, name, command))
    }

    pub fn add(mut self, spec: TaskSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn tasks(mut self, specs: impl IntoIterator<Item = TaskSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    pub fn max_lines(mut self, max_lines: usize) -> Self {
        self.options.run.max_lines = max_lines;
        self
    }

    pub fn shell(mut self, shell: Shell) -> Self {
        self.options.run.shell = shell;
        self
    }

    /// Unicode glyphs when `true`, ASCII otherwise.
    pub fn symbols(mut self, use_symbols: bool) -> Self {
        self.options.theme = Theme::new(use_symbols);
        self
    }

    /// Formatter width for plain output.
    pub fn width(mut self, width: usize) -> Self {
        self.options.width = width;
        self
    }

    /// Forces plain output even when stdout is a terminal.
    pub fn no_ui(mut self, no_ui: bool) -> Self {
        self.no_ui = no_ui;
        self
    }

    pub fn registry(mut self, registry: FormatterRegistry) -> Self {
        self.options.registry = registry;
        self
    }

    fn validate(&self) -> Result<()> {
        for spec in &self.specs {
            spec.validate()?;
        }
        Ok(())
    }

    /// Runs every task, with the dashboard when stdout is a terminal.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        self.validate()?;
        if self.specs.is_empty() {
            return Ok(());
        }
        if io::stdout().is_terminal() && !self.no_ui {
            debug!(tasks = self.specs.len(), "running with dashboard");
            let code = run_dashboard(cancel, &self.specs, &self.options).await?;
            return outcome(code);
        }
        debug!(tasks = self.specs.len(), "running with plain output");
        let mut stdout = io::stdout();
        self.run_plain(cancel, &mut stdout).await
    }

    /// Runs every task with plain output written to `out`.
    pub async fn run_with_writer(
        &self,
        cancel: &CancellationToken,
        out: &mut (dyn Write + Send),
    ) -> Result<()> {
        self.validate()?;
        if self.specs.is_empty() {
            return Ok(());
        }
        self.run_plain(cancel, out).await
    }

    async fn run_plain(&self, cancel: &CancellationToken, out: &mut (dyn Write + Send)) -> Result<()> {
        let code = run_non_tty(cancel, &self.specs, out, &self.options).await?;
        outcome(code)
    }
}

fn outcome(exit_code: i32) -> Result<()> {
    if exit_code == 0 {
        Ok(())
    } else {
        Err(Error::TasksFailed { exit_code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpecError;
    use crate::format::{Formatter, IndicatorStatus};

    async fn run(suite: Suite) -> (Result<()>, String) {
        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        let result = suite.run_with_writer(&cancel, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn all_passing_tasks_are_ok() {
        let suite = Suite::new().task("t", "a", "true").task("t", "b", "echo hi");
        let (result, text) = run(suite).await;
        assert!(result.is_ok());
        assert!(text.contains("[t/b] hi"));
    }

    #[tokio::test]
    async fn a_failing_task_is_a_typed_error() {
        let suite = Suite::new().task("t", "ok", "true").task("t", "bad", "exit 7");
        let (result, text) = run(suite).await;
        match result {
            Err(Error::TasksFailed { exit_code }) => assert_eq!(exit_code, 1),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(text.contains("1 task(s) failed"));
    }

    #[tokio::test]
    async fn zero_tasks_is_success() {
        let (result, text) = run(Suite::new()).await;
        assert!(result.is_ok());
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn spec_errors_stop_before_anything_runs() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let suite = Suite::new()
            .task("t", "touch", format!("touch '{}'", marker.display()))
            .task("t", "empty", "  ");
        let (result, _) = run(suite).await;

        assert!(matches!(
            result,
            Err(Error::Spec(SpecError::MissingCommand { .. }))
        ));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn custom_formatters_take_part_in_the_verdict() {
        struct Smoke;

        impl Formatter for Smoke {
            fn name(&self) -> &'static str {
                "smoke"
            }

            fn matches(&self, command: &str) -> bool {
                command.contains("smoke")
            }

            fn format(&self, lines: &[String], _width: usize) -> String {
                format!("{} smoke line(s)", lines.len())
            }

            fn status(&self, lines: &[String]) -> IndicatorStatus {
                if lines.iter().any(|line| line.contains("FAIL")) {
                    IndicatorStatus::Error
                } else {
                    IndicatorStatus::Default
                }
            }
        }

        let suite = Suite::new()
            .registry(FormatterRegistry::default().register(Smoke))
            .task("qa", "smoke", "echo FAIL; true # smoke");
        let (result, text) = run(suite).await;

        assert!(matches!(result, Err(Error::TasksFailed { exit_code: 1 })));
        assert!(text.contains("== qa/smoke =="));
        assert!(text.contains("1 smoke line(s)"));
    }

    #[tokio::test]
    async fn ascii_symbols_reach_the_summary() {
        let suite = Suite::new().symbols(false).task("", "ok", "true");
        let (result, text) = run(suite).await;
        assert!(result.is_ok());
        assert!(text.contains("+ ok"));
    }
}
