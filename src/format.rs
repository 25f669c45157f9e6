//! Output formatters.
//!
//! A formatter turns a task's accumulated lines into display text. The
//! registry picks one per task from the literal command string: entries are
//! tried in order and the first match wins, with `PlainFormatter` as the
//! catch-all. Formatters are pure and must never fail; anything they cannot
//! parse is rendered as plain text.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;

use crate::output::{sanitize_text, strip_carriage};

/// Verdict derived from inspecting output instead of the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndicatorStatus {
    /// No opinion; fall back to the exit code.
    #[default]
    Default,
    Success,
    Warning,
    Error,
}

/// A pluggable renderer for one tool's output shape.
pub trait Formatter: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Whether this formatter handles output of `command`.
    fn matches(&self, command: &str) -> bool;

    /// Renders `lines` for a pane `width` columns wide.
    fn format(&self, lines: &[String], width: usize) -> String;

    /// Content-aware verdict; `Default` defers to the exit code.
    fn status(&self, _lines: &[String]) -> IndicatorStatus {
        IndicatorStatus::Default
    }

    /// Whether live line-by-line echo should be suppressed in plain mode.
    fn prefers_batch(&self) -> bool {
        false
    }
}

/// Ordered list of formatters, most specific first.
#[derive(Clone)]
pub struct FormatterRegistry {
    formatters: Vec<Arc<dyn Formatter>>,
    fallback: Arc<dyn Formatter>,
}

impl FormatterRegistry {
    /// An empty registry that renders everything as plain text.
    pub fn plain() -> Self {
        Self {
            formatters: Vec::new(),
            fallback: Arc::new(PlainFormatter),
        }
    }

    /// Appends a formatter; earlier registrations take precedence.
    pub fn register(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatters.push(Arc::new(formatter));
        self
    }

    /// Returns the first formatter matching `command`, or the plain fallback.
    pub fn find(&self, command: &str) -> Arc<dyn Formatter> {
        self.formatters
            .iter()
            .find(|formatter| formatter.matches(command))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::plain().register(LintFormatter).register(JsonFormatter)
    }
}

impl std::fmt::Debug for FormatterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.formatters.iter().map(|fmt| fmt.name()).collect();
        f.debug_struct("FormatterRegistry")
            .field("formatters", &names)
            .finish()
    }
}

/// Whether formatted text says anything beyond the raw lines.
///
/// Styling and whitespace (wrapping, indentation) do not count as a difference.
pub fn differs_from_raw(formatted: &str, lines: &[String]) -> bool {
    let squash = |text: &str| -> String {
        sanitize_text(text, true)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    };
    squash(formatted) != squash(&lines.join("\n"))
}

/// Pass-through rendering, hard-wrapped to the pane width.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormatter;

impl Formatter for PlainFormatter {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn matches(&self, _command: &str) -> bool {
        true
    }

    fn format(&self, lines: &[String], width: usize) -> String {
        let mut out = Vec::with_capacity(lines.len());
        for line in lines {
            out.extend(wrap_line(strip_carriage(line), width));
        }
        out.join("\n")
    }
}

/// Splits a line into chunks of at most `width` visible characters.
///
/// ANSI escape sequences are carried along without counting toward the width.
/// Each chunk is drawn on its own, so the SGR sequences active at a wrap point
/// are repeated at the start of the next chunk.
fn wrap_line(line: &str, width: usize) -> Vec<String> {
    if width == 0 || line.is_empty() {
        return vec![line.to_string()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut active = String::new();
    let mut visible = 0;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            let mut sequence = String::from(ch);
            if chars.peek() == Some(&'[') {
                for next in chars.by_ref() {
                    sequence.push(next);
                    if ('@'..='~').contains(&next) && next != '[' {
                        break;
                    }
                }
            }
            if sequence == "\x1b[0m" || sequence == "\x1b[m" {
                active.clear();
            } else if sequence.len() > 2 && sequence.ends_with('m') {
                active.push_str(&sequence);
            }
            current.push_str(&sequence);
            continue;
        }
        if visible == width {
            chunks.push(std::mem::replace(&mut current, active.clone()));
            visible = 0;
        }
        current.push(ch);
        visible += 1;
    }
    chunks.push(current);
    chunks
}

/// Pretty-prints JSON emitted by `--json` style commands.
///
/// Accepts either one document spanning the whole output or one document per
/// line; anything else is rendered as plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn matches(&self, command: &str) -> bool {
        json_flag_regex().is_match(command)
    }

    fn format(&self, lines: &[String], width: usize) -> String {
        let joined = lines.join("\n");
        if let Ok(value) = serde_json::from_str::<Value>(&joined) {
            if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                return pretty;
            }
        }

        let mut documents = Vec::new();
        for line in lines.iter().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<Value>(line) {
                Ok(value) => documents.push(value),
                Err(_) => return PlainFormatter.format(lines, width),
            }
        }
        if documents.is_empty() {
            return PlainFormatter.format(lines, width);
        }
        documents
            .iter()
            .filter_map(|value| serde_json::to_string_pretty(value).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn prefers_batch(&self) -> bool {
        true
    }
}

/// Counts diagnostics from common linters and flags them in the verdict.
#[derive(Debug, Clone, Copy, Default)]
pub struct LintFormatter;

#[derive(Debug, Default, PartialEq, Eq)]
struct LintCounts {
    errors: usize,
    warnings: usize,
}

impl LintFormatter {
    fn count(lines: &[String]) -> LintCounts {
        let mut counts = LintCounts::default();
        for line in lines {
            let plain = sanitize_text(line, true).to_lowercase();
            let plain = plain.trim_start();
            if is_diagnostic(plain, "error") {
                counts.errors += 1;
            } else if is_diagnostic(plain, "warning") {
                counts.warnings += 1;
            }
        }
        counts
    }
}

/// `error: ...`, `error[E0308]: ...`, `file.rs:1:2: warning ...` and similar.
fn is_diagnostic(line: &str, level: &str) -> bool {
    if let Some(rest) = line.strip_prefix(level) {
        return rest.starts_with(':') || rest.starts_with('[');
    }
    line.contains(&format!(": {}:", level)) || line.contains(&format!(": {} ", level))
}

impl Formatter for LintFormatter {
    fn name(&self) -> &'static str {
        "lint"
    }

    fn matches(&self, command: &str) -> bool {
        lint_command_regex().is_match(command)
    }

    fn format(&self, lines: &[String], width: usize) -> String {
        let mut out = Vec::with_capacity(lines.len() + 2);
        for line in lines {
            let plain = sanitize_text(line, true);
            let lowered = plain.to_lowercase();
            let lowered = lowered.trim_start();
            let styled = if is_diagnostic(lowered, "error") {
                format!("\u{1b}[31m{}\u{1b}[0m", plain)
            } else if is_diagnostic(lowered, "warning") {
                format!("\u{1b}[33m{}\u{1b}[0m", plain)
            } else {
                line.clone()
            };
            out.extend(wrap_line(strip_carriage(&styled), width));
        }
        let counts = Self::count(lines);
        if counts != LintCounts::default() {
            out.push(String::new());
            out.push(format!(
                "{} error(s), {} warning(s)",
                counts.errors, counts.warnings
            ));
        }
        out.join("\n")
    }

    fn status(&self, lines: &[String]) -> IndicatorStatus {
        let counts = Self::count(lines);
        if counts.errors > 0 {
            IndicatorStatus::Error
        } else if counts.warnings > 0 {
            IndicatorStatus::Warning
        } else {
            IndicatorStatus::Default
        }
    }
}

fn json_flag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)--?json\b|--(?:format|output|reporter|message-format)[= ]json\b")
            .expect("static regex")
    })
}

fn lint_command_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:clippy|eslint|golangci-lint|ruff|shellcheck|flake8|pylint)\b")
            .expect("static regex")
    })
}
