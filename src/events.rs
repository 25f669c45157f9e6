//! Event definitions shared by the runner and its consumers.
//!
//! `TaskUpdate` is the single wire event produced by the runner. `Msg` is the
//! input alphabet of the dashboard state machine.

use std::time::{Duration, Instant};

use crossterm::event::KeyEvent;

use crate::task::{elapsed_between, TaskStatus, EXIT_CODE_UNSET};

/// A state or output change for one task.
///
/// Updates from different tasks interleave in no particular order; consumers
/// must key all state by `index`. Updates for one task arrive in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    /// Position of the task in the spec list.
    pub index: usize,
    /// New status, or `Running` when the update only carries a line.
    pub status: TaskStatus,
    /// Output line; `None` for pure status transitions.
    pub line: Option<String>,
    pub exit_code: i32,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl TaskUpdate {
    pub fn started(index: usize, at: Instant) -> Self {
        Self {
            index,
            status: TaskStatus::Running,
            line: None,
            exit_code: EXIT_CODE_UNSET,
            started_at: Some(at),
            finished_at: None,
        }
    }

    pub fn line(index: usize, line: String, started_at: Option<Instant>) -> Self {
        Self {
            index,
            status: TaskStatus::Running,
            line: Some(line),
            exit_code: EXIT_CODE_UNSET,
            started_at,
            finished_at: None,
        }
    }

    pub fn finished(
        index: usize,
        status: TaskStatus,
        exit_code: i32,
        started_at: Option<Instant>,
        finished_at: Instant,
    ) -> Self {
        Self {
            index,
            status,
            line: None,
            exit_code,
            started_at,
            finished_at: Some(finished_at),
        }
    }

    pub fn has_line(&self) -> bool {
        self.line.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// What a consumer knows about one task, rebuilt purely from its updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskView {
    pub status: TaskStatus,
    pub exit_code: i32,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl Default for TaskView {
    fn default() -> Self {
        Self {
            status: TaskStatus::Pending,
            exit_code: EXIT_CODE_UNSET,
            started_at: None,
            finished_at: None,
        }
    }
}

impl TaskView {
    /// Folds one update in. Backward status moves are ignored.
    pub fn apply(&mut self, update: &TaskUpdate) {
        if self.started_at.is_none() {
            self.started_at = update.started_at;
        }
        if !self.status.can_advance_to(update.status) {
            return;
        }
        self.status = update.status;
        if update.is_terminal() {
            self.exit_code = update.exit_code;
            self.finished_at = update.finished_at;
        }
    }

    pub fn duration(&self) -> Duration {
        elapsed_between(self.started_at, self.finished_at)
    }
}

/// Everything that can drive a dashboard transition.
#[derive(Debug, Clone)]
pub enum Msg {
    /// The terminal was resized.
    Resize { width: u16, height: u16 },
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// An update from the runner.
    Task(TaskUpdate),
    /// The update channel closed: every task has finished.
    AllDone,
    /// Animation clock.
    Tick,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_follows_lifecycle_updates() {
        let start = Instant::now();
        let end = start + Duration::from_secs(3);
        let mut view = TaskView::default();

        view.apply(&TaskUpdate::started(0, start));
        view.apply(&TaskUpdate::line(0, "hello".into(), Some(start)));
        assert_eq!(view.status, TaskStatus::Running);
        assert_eq!(view.exit_code, EXIT_CODE_UNSET);

        view.apply(&TaskUpdate::finished(0, TaskStatus::Failed, 2, Some(start), end));
        assert_eq!(view.status, TaskStatus::Failed);
        assert_eq!(view.exit_code, 2);
        assert_eq!(view.duration(), Duration::from_secs(3));
    }

    #[test]
    fn view_ignores_late_running_updates() {
        let start = Instant::now();
        let mut view = TaskView::default();
        view.apply(&TaskUpdate::finished(0, TaskStatus::Success, 0, Some(start), start));
        view.apply(&TaskUpdate::line(0, "late".into(), Some(start)));
        assert_eq!(view.status, TaskStatus::Success);
        assert_eq!(view.exit_code, 0);
    }

    #[test]
    fn blank_lines_are_still_lines() {
        let update = TaskUpdate::line(1, String::new(), None);
        assert!(update.has_line());
        assert!(!update.is_terminal());
    }
}
