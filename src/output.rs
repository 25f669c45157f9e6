//! Output buffering and text cleanup for task logs.
//!
//! This module provides the sliding-window buffer that holds a task's captured
//! lines (`LineBuffer`) and the helpers used to sanitize text before it is
//! written to a plain (non-terminal) destination.

use std::collections::VecDeque;

use strip_ansi_escapes::strip;

/// Default number of lines retained per task.
pub const DEFAULT_MAX_LINES: usize = 50_000;

/// A fixed-capacity sliding window of output lines.
///
/// Appending to a full buffer evicts the oldest line, so the buffer always
/// holds the most recent `max_lines` lines in arrival order.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    max_lines: usize,
    lines: VecDeque<String>,
}

impl LineBuffer {
    /// Creates a new `LineBuffer` with the specified maximum capacity.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(max_lines: usize) -> Self {
        let max_lines = max_lines.max(1);
        Self {
            max_lines,
            lines: VecDeque::with_capacity(max_lines.min(1024)),
        }
    }

    /// Adds a line to the buffer.
    ///
    /// Returns `true` if an old line was dropped to make room.
    pub fn push(&mut self, line: String) -> bool {
        let mut dropped = false;
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
            dropped = true;
        }
        dropped
    }

    /// Returns an owned copy of every line currently held.
    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

/// Sanitizes text for display, optionally stripping ANSI escape codes.
///
/// If `strip_ansi` is true, ANSI codes are removed. Invalid UTF-8 sequences are replaced.
pub fn sanitize_text(text: &str, strip_ansi: bool) -> String {
    if !strip_ansi {
        return text.to_string();
    }
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}

/// Keeps only the text after the last carriage return, the way a terminal
/// would show a progress line that rewrites itself.
pub fn strip_carriage(text: &str) -> &str {
    text.rsplit('\r').next().unwrap_or("")
}
