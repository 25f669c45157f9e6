//! Glyphs and colors for both renderers.
//!
//! A `Theme` is built once from settings before any task starts and is then
//! shared read-only by the dashboard and the plain renderer.

use std::time::Duration;

use ratatui::style::{Color, Modifier, Style};

use crate::format::IndicatorStatus;
use crate::task::TaskStatus;

/// Time each spinner frame stays on screen.
pub const SPINNER_INTERVAL: Duration = Duration::from_millis(80);

const UNICODE_SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const ASCII_SPINNER: &[&str] = &["|", "/", "-", "\\"];

/// Final verdict for a task, combining exit status and content inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pending,
    Running,
    Success,
    Warning,
    Failed,
}

impl Verdict {
    /// Lets a formatter's content verdict downgrade a successful exit.
    ///
    /// A failed exit stays failed whatever the content says.
    pub fn resolve(status: TaskStatus, indicator: IndicatorStatus) -> Self {
        match status {
            TaskStatus::Pending => Verdict::Pending,
            TaskStatus::Running => Verdict::Running,
            TaskStatus::Failed => Verdict::Failed,
            TaskStatus::Success => match indicator {
                IndicatorStatus::Error => Verdict::Failed,
                IndicatorStatus::Warning => Verdict::Warning,
                IndicatorStatus::Success | IndicatorStatus::Default => Verdict::Success,
            },
        }
    }

    pub fn is_failure(self) -> bool {
        self == Verdict::Failed
    }

    pub fn label(self) -> &'static str {
        match self {
            Verdict::Pending => "pending",
            Verdict::Running => "running",
            Verdict::Success => "success",
            Verdict::Warning => "warning",
            Verdict::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Theme {
    pub pending: &'static str,
    pub success: &'static str,
    pub warning: &'static str,
    pub failure: &'static str,
    pub separator: &'static str,
    spinner: &'static [&'static str],
    pub accent: Color,
    pub muted: Color,
    pub success_color: Color,
    pub warning_color: Color,
    pub failure_color: Color,
    pub running_color: Color,
}

impl Theme {
    /// Unicode glyphs when `use_symbols` is set, plain ASCII otherwise.
    pub fn new(use_symbols: bool) -> Self {
        let base = Self {
            pending: "○",
            success: "✓",
            warning: "⚠",
            failure: "✗",
            separator: "│",
            spinner: UNICODE_SPINNER,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            success_color: Color::Green,
            warning_color: Color::Yellow,
            failure_color: Color::Red,
            running_color: Color::Blue,
        };
        if use_symbols {
            return base;
        }
        Self {
            pending: "o",
            success: "+",
            warning: "!",
            failure: "x",
            separator: "|",
            spinner: ASCII_SPINNER,
            ..base
        }
    }

    /// Spinner frame for a task that has been running for `elapsed`.
    pub fn spinner_frame(&self, elapsed: Duration) -> &'static str {
        let tick = elapsed.as_millis() / SPINNER_INTERVAL.as_millis();
        self.spinner[(tick % self.spinner.len() as u128) as usize]
    }

    pub fn spinner_len(&self) -> usize {
        self.spinner.len()
    }

    /// Glyph for a verdict; running tasks animate by elapsed time.
    pub fn glyph(&self, verdict: Verdict, elapsed: Duration) -> &'static str {
        match verdict {
            Verdict::Pending => self.pending,
            Verdict::Running => self.spinner_frame(elapsed),
            Verdict::Success => self.success,
            Verdict::Warning => self.warning,
            Verdict::Failed => self.failure,
        }
    }

    pub fn verdict_style(&self, verdict: Verdict) -> Style {
        match verdict {
            Verdict::Pending => Style::default().fg(self.muted),
            Verdict::Running => Style::default().fg(self.running_color),
            Verdict::Success => Style::default().fg(self.success_color),
            Verdict::Warning => Style::default().fg(self.warning_color),
            Verdict::Failed => Style::default()
                .fg(self.failure_color)
                .add_modifier(Modifier::BOLD),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_verdict_overrides_exit_status() {
        assert_eq!(
            Verdict::resolve(TaskStatus::Success, IndicatorStatus::Warning),
            Verdict::Warning
        );
        assert_eq!(
            Verdict::resolve(TaskStatus::Success, IndicatorStatus::Error),
            Verdict::Failed
        );
        assert_eq!(
            Verdict::resolve(TaskStatus::Failed, IndicatorStatus::Default),
            Verdict::Failed
        );
        assert_eq!(
            Verdict::resolve(TaskStatus::Running, IndicatorStatus::Error),
            Verdict::Running
        );
    }

    #[test]
    fn content_never_hides_a_failed_exit() {
        for indicator in [
            IndicatorStatus::Default,
            IndicatorStatus::Success,
            IndicatorStatus::Warning,
            IndicatorStatus::Error,
        ] {
            let verdict = Verdict::resolve(TaskStatus::Failed, indicator);
            assert_eq!(verdict, Verdict::Failed);
            assert!(verdict.is_failure());
        }
    }

    #[test]
    fn spinner_cycles_with_elapsed_time() {
        let theme = Theme::new(true);
        let first = theme.spinner_frame(Duration::ZERO);
        let second = theme.spinner_frame(SPINNER_INTERVAL);
        let wrapped = theme.spinner_frame(SPINNER_INTERVAL * theme.spinner_len() as u32);
        assert_ne!(first, second);
        assert_eq!(first, wrapped);
    }

    #[test]
    fn ascii_theme_avoids_unicode_glyphs() {
        let theme = Theme::new(false);
        for glyph in [theme.pending, theme.success, theme.warning, theme.failure] {
            assert!(glyph.is_ascii());
        }
        assert!(theme.spinner_frame(Duration::from_millis(500)).is_ascii());
    }
}
