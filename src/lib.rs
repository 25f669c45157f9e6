//! buildrack: run build tasks concurrently and watch them on a live dashboard.
//!
//! Tasks are shell commands. Their output is streamed into a dashboard when
//! stdout is a terminal, or printed as prefixed lines followed by a summary
//! otherwise.

pub mod ansi;
pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod manifest;
pub mod output;
pub mod render;
pub mod runner;
pub mod suite;
pub mod task;
pub mod theme;
pub mod tui;

pub use error::{Error, Result, SpecError};
pub use events::{TaskUpdate, TaskView};
pub use format::{Formatter, FormatterRegistry, IndicatorStatus};
pub use render::{run_non_tty, RenderOptions};
pub use runner::{shell_command, start_tasks, RunOptions, Shell};
pub use suite::Suite;
pub use task::{Task, TaskSpec, TaskStatus};
pub use theme::{Theme, Verdict};
