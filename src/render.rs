//! Plain-text rendering for when stdout is not a terminal.
//!
//! Lines are echoed as they arrive, prefixed with the task label. Once every
//! task has finished, formatted blocks and a summary follow.

use std::io::{self, Write};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::{TaskUpdate, TaskView};
use crate::format::{differs_from_raw, Formatter, FormatterRegistry};
use crate::output::sanitize_text;
use crate::runner::{start_tasks, RunOptions};
use crate::task::{format_duration, Task, TaskSpec};
use crate::theme::{Theme, Verdict};

/// Formatter width used when the terminal width is unknown.
pub const DEFAULT_WIDTH: usize = 100;

/// Everything a renderer needs besides the tasks themselves.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub run: RunOptions,
    /// Column budget handed to formatters.
    pub width: usize,
    pub theme: Theme,
    pub registry: FormatterRegistry,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            run: RunOptions::default(),
            width: DEFAULT_WIDTH,
            theme: Theme::default(),
            registry: FormatterRegistry::default(),
        }
    }
}

/// Content-aware verdict for a finished (or still running) task.
pub fn task_verdict(task: &Task, view: &TaskView, formatter: &dyn Formatter) -> Verdict {
    if !view.status.is_terminal() {
        return Verdict::resolve(view.status, Default::default());
    }
    Verdict::resolve(view.status, formatter.status(&task.output()))
}

/// Runs `specs` and renders them as plain text into `out`.
///
/// Returns 1 if any task failed under the content-aware check, else 0.
pub async fn run_non_tty(
    cancel: &CancellationToken,
    specs: &[TaskSpec],
    out: &mut (dyn Write + Send),
    options: &RenderOptions,
) -> io::Result<i32> {
    let cancel = cancel.child_token();
    let (tasks, mut updates) = start_tasks(&cancel, specs, &options.run);
    let mut report = Report::new(&tasks, &options.registry);

    while let Some(update) = updates.recv().await {
        if let Err(err) = report.echo(&update, out) {
            // Nobody can read the output any more; stop the subprocesses too.
            cancel.cancel();
            return Err(err);
        }
    }

    report.finish(out, options)
}

struct Report {
    tasks: Vec<Arc<Task>>,
    labels: Vec<String>,
    formatters: Vec<Arc<dyn Formatter>>,
    views: Vec<TaskView>,
}

impl Report {
    fn new(tasks: &[Arc<Task>], registry: &FormatterRegistry) -> Self {
        let formatters: Vec<Arc<dyn Formatter>> = tasks
            .iter()
            .map(|task| registry.find(&task.spec().command))
            .collect();
        for (task, formatter) in tasks.iter().zip(&formatters) {
            debug!(task = %task.label(), formatter = formatter.name(), "formatter selected");
        }
        Self {
            tasks: tasks.to_vec(),
            labels: tasks.iter().map(|task| task.label()).collect(),
            formatters,
            views: vec![TaskView::default(); tasks.len()],
        }
    }

    fn echo(&mut self, update: &TaskUpdate, out: &mut dyn Write) -> io::Result<()> {
        let Some(view) = self.views.get_mut(update.index) else {
            return Ok(());
        };
        view.apply(update);
        let Some(line) = update.line.as_deref() else {
            return Ok(());
        };
        if self.formatters[update.index].prefers_batch() {
            return Ok(());
        }
        writeln!(
            out,
            "[{}] {}",
            self.labels[update.index],
            sanitize_text(line, true)
        )
    }

    fn finish(&self, out: &mut dyn Write, options: &RenderOptions) -> io::Result<i32> {
        let theme = &options.theme;
        let mut verdicts = Vec::with_capacity(self.tasks.len());

        for (index, task) in self.tasks.iter().enumerate() {
            let formatter = &self.formatters[index];
            let lines = task.output();
            verdicts.push(task_verdict(task, &self.views[index], formatter.as_ref()));
            if lines.is_empty() {
                continue;
            }
            let formatted = formatter.format(&lines, options.width);
            if formatter.prefers_batch() || differs_from_raw(&formatted, &lines) {
                writeln!(out)?;
                writeln!(out, "== {} ==", self.labels[index])?;
                writeln!(out, "{}", sanitize_text(&formatted, true))?;
            }
        }

        writeln!(out)?;
        writeln!(out, "Summary:")?;
        for (index, verdict) in verdicts.iter().enumerate() {
            let view = &self.views[index];
            writeln!(
                out,
                "{} {} ({})",
                theme.glyph(*verdict, view.duration()),
                self.labels[index],
                format_duration(view.duration())
            )?;
        }

        let failed = verdicts.iter().filter(|verdict| verdict.is_failure()).count();
        if failed > 0 {
            writeln!(out, "{} task(s) failed", failed)?;
        }
        out.flush()?;
        Ok(if failed > 0 { 1 } else { 0 })
    }
}
