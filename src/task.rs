//! Data structures for tracking task state.
//!
//! This module defines the definition of a task (`TaskSpec`), its lifecycle
//! status (`TaskStatus`), and the shared runtime object (`Task`) that holds the
//! captured output and timing information.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::SpecError;
use crate::output::LineBuffer;

/// Exit code reported before a task reaches a terminal status.
pub const EXIT_CODE_UNSET: i32 = -1;

/// Definition of a task to be run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Group the task is listed under.
    pub group: String,
    /// Display name of the task.
    pub name: String,
    /// Shell command line to execute.
    pub command: String,
}

impl TaskSpec {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            command: command.into(),
        }
    }

    /// `group/name`, or just `name` for ungrouped tasks.
    pub fn label(&self) -> String {
        if self.group.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.group, self.name)
        }
    }

    /// Checks that the spec can be run at all.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.trim().is_empty() {
            return Err(SpecError::MissingName {
                command: self.command.clone(),
            });
        }
        if self.command.trim().is_empty() {
            return Err(SpecError::MissingCommand {
                label: self.label(),
            });
        }
        Ok(())
    }
}

/// The lifecycle status of a task.
///
/// Statuses only move forward: `Pending` → `Running` → `Success | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Success | TaskStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    exit_code: i32,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    output: LineBuffer,
}

/// Runtime state of a single task.
///
/// All fields sit behind one lock. The runner is the only writer; everyone
/// else reads through the copying accessors.
#[derive(Debug)]
pub struct Task {
    index: usize,
    spec: TaskSpec,
    state: Mutex<TaskState>,
}

impl Task {
    /// Creates a `Pending` task from a specification.
    pub fn new(index: usize, spec: TaskSpec, max_lines: usize) -> Self {
        Self {
            index,
            spec,
            state: Mutex::new(TaskState {
                status: TaskStatus::Pending,
                exit_code: EXIT_CODE_UNSET,
                started_at: None,
                finished_at: None,
                output: LineBuffer::new(max_lines),
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn label(&self) -> String {
        self.spec.label()
    }

    pub fn status(&self) -> TaskStatus {
        self.lock().status
    }

    pub fn exit_code(&self) -> i32 {
        self.lock().exit_code
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.lock().started_at
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.lock().finished_at
    }

    /// Returns a copy of the captured output.
    pub fn output(&self) -> Vec<String> {
        self.lock().output.to_vec()
    }

    /// Elapsed run time: zero before start, live while running, frozen once finished.
    pub fn duration(&self) -> Duration {
        let state = self.lock();
        elapsed_between(state.started_at, state.finished_at)
    }

    pub(crate) fn append_line(&self, line: String) {
        self.lock().output.push(line);
    }

    /// Marks the task as running. Returns `false` if it had already started.
    pub(crate) fn mark_started(&self, at: Instant) -> bool {
        let mut state = self.lock();
        if !state.status.can_advance_to(TaskStatus::Running) {
            return false;
        }
        state.status = TaskStatus::Running;
        state.started_at = Some(at);
        true
    }

    /// Records the terminal status. Returns `false` if the task already finished.
    pub(crate) fn mark_finished(&self, status: TaskStatus, exit_code: i32, at: Instant) -> bool {
        let mut state = self.lock();
        if !status.is_terminal() || !state.status.can_advance_to(status) {
            return false;
        }
        state.status = status;
        state.exit_code = exit_code;
        if state.started_at.is_none() {
            state.started_at = Some(at);
        }
        state.finished_at = Some(at);
        true
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Duration between two optional instants, measuring up to now when unfinished.
pub fn elapsed_between(started_at: Option<Instant>, finished_at: Option<Instant>) -> Duration {
    match (started_at, finished_at) {
        (None, _) => Duration::ZERO,
        (Some(start), Some(end)) => end.saturating_duration_since(start),
        (Some(start), None) => start.elapsed(),
    }
}

/// Formats a duration compactly for list and summary lines.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        return format!("{}m{:02}s", secs / 60, secs % 60);
    }
    if secs >= 10 {
        return format!("{}s", secs);
    }
    format!("{:.1}s", duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task() -> Task {
        Task::new(0, TaskSpec::new("build", "compile", "make"), 100)
    }

    #[test]
    fn new_task_is_pending_with_sentinel_exit_code() {
        let task = make_task();
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.exit_code(), EXIT_CODE_UNSET);
        assert!(task.started_at().is_none());
        assert_eq!(task.duration(), Duration::ZERO);
    }

    #[test]
    fn label_omits_empty_group() {
        assert_eq!(TaskSpec::new("lint", "clippy", "cargo clippy").label(), "lint/clippy");
        assert_eq!(TaskSpec::new("", "fmt", "cargo fmt").label(), "fmt");
    }

    #[test]
    fn validate_rejects_missing_fields() {
        assert!(matches!(
            TaskSpec::new("g", "", "echo").validate(),
            Err(SpecError::MissingName { .. })
        ));
        assert!(matches!(
            TaskSpec::new("g", "n", "  ").validate(),
            Err(SpecError::MissingCommand { .. })
        ));
        assert!(TaskSpec::new("g", "n", "true").validate().is_ok());
    }

    #[test]
    fn status_only_moves_forward() {
        let task = make_task();
        let now = Instant::now();
        assert!(task.mark_started(now));
        assert!(task.mark_finished(TaskStatus::Failed, 3, now));
        assert!(!task.mark_started(now));
        assert!(!task.mark_finished(TaskStatus::Success, 0, now));
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.exit_code(), 3);
    }

    #[test]
    fn output_copy_is_isolated_from_buffer() {
        let task = make_task();
        task.append_line("one".into());
        let mut copy = task.output();
        copy.push("mutated".into());
        copy[0] = "changed".into();
        assert_eq!(task.output(), vec!["one"]);
    }

    #[test]
    fn duration_grows_while_running_and_freezes_when_finished() {
        let task = make_task();
        task.mark_started(Instant::now());
        let first = task.duration();
        std::thread::sleep(Duration::from_millis(20));
        let second = task.duration();
        assert!(second > first);

        task.mark_finished(TaskStatus::Success, 0, Instant::now());
        let frozen = task.duration();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(task.duration(), frozen);
        let expected = task
            .finished_at()
            .unwrap()
            .duration_since(task.started_at().unwrap());
        assert_eq!(frozen, expected);
    }

    #[test]
    fn format_duration_scales_units() {
        assert_eq!(format_duration(Duration::from_millis(1234)), "1.2s");
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }
}
