//! Dashboard state and transitions.
//!
//! `Model` holds everything the dashboard shows. It changes only through
//! `Model::update`, which takes one `Msg` and returns the `Action` the event
//! loop must carry out. Drawing lives in `tui` and only reads the model.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::events::{Msg, TaskUpdate, TaskView};
use crate::format::{Formatter, FormatterRegistry, IndicatorStatus};
use crate::task::Task;
use crate::theme::{Theme, Verdict};

/// Rows taken by the title bar.
pub const TITLE_HEIGHT: u16 = 1;
/// Top plus bottom border of a pane.
const BORDER_SIZE: u16 = 2;
/// Borders, selection marker and glyph column around a list label.
const LIST_PADDING: u16 = BORDER_SIZE + 4;

/// Side effects requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// Kill every running task.
    Cancel,
    /// Leave the dashboard.
    Quit,
}

/// Pane geometry derived from the terminal size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Layout {
    pub width: u16,
    pub height: u16,
    pub list_width: u16,
    pub detail_width: u16,
    /// Rows of task output visible in the detail pane.
    pub content_height: u16,
}

impl Layout {
    pub fn compute(width: u16, height: u16, labels: &[String]) -> Self {
        let longest = labels
            .iter()
            .map(|label| label.chars().count())
            .max()
            .unwrap_or(0);
        let wanted = u16::try_from(longest)
            .unwrap_or(u16::MAX)
            .saturating_add(LIST_PADDING);
        let list_width = wanted.min(width / 2);
        Self {
            width,
            height,
            list_width,
            detail_width: width - list_width,
            content_height: height.saturating_sub(TITLE_HEIGHT + BORDER_SIZE),
        }
    }

    /// Columns available to a formatter inside the detail pane.
    pub fn detail_inner_width(&self) -> usize {
        usize::from(self.detail_width.saturating_sub(BORDER_SIZE))
    }
}

/// A scrolling window over formatted output.
///
/// While `follow` is set the window sticks to the tail as content grows.
#[derive(Debug, Clone)]
pub struct Viewport {
    lines: Vec<String>,
    offset: usize,
    follow: bool,
    height: usize,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            offset: 0,
            follow: true,
            height: 0,
        }
    }
}

impl Viewport {
    pub fn set_content(&mut self, text: &str) {
        self.lines = if text.is_empty() {
            Vec::new()
        } else {
            text.split('\n').map(str::to_string).collect()
        };
        self.clamp();
    }

    pub fn set_height(&mut self, height: usize) {
        self.height = height;
        self.clamp();
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_following(&self) -> bool {
        self.follow
    }

    fn max_offset(&self) -> usize {
        self.lines.len().saturating_sub(self.height)
    }

    fn clamp(&mut self) {
        let max = self.max_offset();
        self.offset = if self.follow { max } else { self.offset.min(max) };
    }

    pub fn scroll_up(&mut self, amount: usize) {
        self.offset = self.offset.saturating_sub(amount);
        self.follow = false;
    }

    pub fn scroll_down(&mut self, amount: usize) {
        let max = self.max_offset();
        self.offset = (self.offset + amount).min(max);
        self.follow = self.offset == max;
    }

    pub fn top(&mut self) {
        self.offset = 0;
        self.follow = self.max_offset() == 0;
    }

    pub fn bottom(&mut self) {
        self.follow = true;
        self.clamp();
    }

    /// Exactly `height` rows: visible content, then blank padding.
    pub fn visible(&self) -> Vec<&str> {
        let mut rows: Vec<&str> = self
            .lines
            .iter()
            .skip(self.offset)
            .take(self.height)
            .map(String::as_str)
            .collect();
        rows.resize(self.height, "");
        rows
    }
}

/// One row of the task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRow {
    Group(String),
    /// Task index, and whether it is selected.
    Task(usize, bool),
}

/// Dashboard session state.
pub struct Model {
    tasks: Vec<Arc<Task>>,
    labels: Vec<String>,
    formatters: Vec<Arc<dyn Formatter>>,
    views: Vec<TaskView>,
    indicators: Vec<IndicatorStatus>,
    /// Task indices in display order: grouped, spec order within a group.
    order: Vec<usize>,
    /// Position in `order`.
    selected: usize,
    layout: Layout,
    viewport: Viewport,
    viewport_stale: bool,
    ready: bool,
    done: bool,
    quit_when_done: bool,
    should_quit: bool,
    started: Instant,
    finished: Option<Instant>,
    now: Instant,
    theme: Theme,
}

impl Model {
    pub fn new(tasks: Vec<Arc<Task>>, theme: Theme, registry: &FormatterRegistry) -> Self {
        let labels: Vec<String> = tasks.iter().map(|task| task.label()).collect();
        let formatters = tasks
            .iter()
            .map(|task| registry.find(&task.spec().command))
            .collect();
        let order = display_order(&tasks);
        let now = Instant::now();
        Self {
            views: vec![TaskView::default(); tasks.len()],
            indicators: vec![IndicatorStatus::Default; tasks.len()],
            tasks,
            labels,
            formatters,
            order,
            selected: 0,
            layout: Layout::default(),
            viewport: Viewport::default(),
            viewport_stale: false,
            ready: false,
            done: false,
            quit_when_done: false,
            should_quit: false,
            started: now,
            finished: None,
            now,
            theme,
        }
    }

    /// The single transition function.
    pub fn update(&mut self, msg: Msg) -> Action {
        match msg {
            Msg::Resize { width, height } => {
                self.layout = Layout::compute(width, height, &self.labels);
                self.viewport
                    .set_height(usize::from(self.layout.content_height));
                self.ready = true;
                self.refresh_viewport();
                Action::None
            }
            Msg::Key(key) => self.handle_key(key),
            Msg::Task(update) => {
                self.apply_update(&update);
                Action::None
            }
            Msg::AllDone => {
                self.done = true;
                self.finished = Some(Instant::now());
                self.refresh_viewport();
                if self.quit_when_done {
                    self.should_quit = true;
                    return Action::Quit;
                }
                Action::None
            }
            Msg::Tick => {
                self.now = Instant::now();
                if self.viewport_stale {
                    self.refresh_viewport();
                }
                Action::None
            }
        }
    }

    fn apply_update(&mut self, update: &TaskUpdate) {
        let Some(view) = self.views.get_mut(update.index) else {
            return;
        };
        view.apply(update);
        let selected = self.selected_task() == Some(update.index);
        if update.is_terminal() {
            let task = &self.tasks[update.index];
            self.indicators[update.index] = self.formatters[update.index].status(&task.output());
            if selected {
                self.refresh_viewport();
            }
        } else if selected && update.has_line() {
            // Reformatting on every line is quadratic; coalesce to the next tick.
            self.viewport_stale = true;
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.kind == KeyEventKind::Release {
            return Action::None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let page = usize::from(self.layout.content_height).max(1);
        match key.code {
            KeyCode::Char('c') if ctrl => {
                if self.done {
                    self.should_quit = true;
                    return Action::Quit;
                }
                self.quit_when_done = true;
                return Action::Cancel;
            }
            KeyCode::Char('u') if ctrl => self.viewport.scroll_up((page / 2).max(1)),
            KeyCode::Char('d') if ctrl => self.viewport.scroll_down((page / 2).max(1)),
            KeyCode::Char('q') | KeyCode::Esc => {
                if self.done {
                    self.should_quit = true;
                    return Action::Quit;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => self.select(self.selected.saturating_sub(1)),
            KeyCode::Down | KeyCode::Char('j') => self.select(self.selected + 1),
            KeyCode::PageUp => self.viewport.scroll_up(page),
            KeyCode::PageDown => self.viewport.scroll_down(page),
            KeyCode::Home | KeyCode::Char('g') => self.viewport.top(),
            KeyCode::End | KeyCode::Char('G') => self.viewport.bottom(),
            _ => {}
        }
        Action::None
    }

    fn select(&mut self, position: usize) {
        let position = position.min(self.order.len().saturating_sub(1));
        if position == self.selected {
            return;
        }
        self.selected = position;
        self.viewport = Viewport::default();
        self.viewport
            .set_height(usize::from(self.layout.content_height));
        self.refresh_viewport();
    }

    fn refresh_viewport(&mut self) {
        self.viewport_stale = false;
        let Some(index) = self.selected_task() else {
            return;
        };
        let lines = self.tasks[index].output();
        let text = self.formatters[index].format(&lines, self.layout.detail_inner_width());
        self.viewport.set_content(&text);
    }

    pub fn selected_task(&self) -> Option<usize> {
        self.order.get(self.selected).copied()
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn task(&self, index: usize) -> Arc<Task> {
        Arc::clone(&self.tasks[index])
    }

    pub fn label(&self, index: usize) -> &str {
        &self.labels[index]
    }

    /// Task name without its group, for rows under a group header.
    pub fn task_name(&self, index: usize) -> &str {
        &self.tasks[index].spec().name
    }

    pub fn view(&self, index: usize) -> &TaskView {
        &self.views[index]
    }

    /// Verdict for display; content inspection applies once a task finished.
    pub fn verdict(&self, index: usize) -> Verdict {
        let view = &self.views[index];
        if view.status.is_terminal() {
            Verdict::resolve(view.status, self.indicators[index])
        } else {
            Verdict::resolve(view.status, IndicatorStatus::Default)
        }
    }

    /// Status glyph, with the spinner frame picked from the model clock.
    pub fn glyph(&self, index: usize) -> &'static str {
        let view = &self.views[index];
        let running_for = view
            .started_at
            .map(|at| self.now.saturating_duration_since(at))
            .unwrap_or_default();
        self.theme.glyph(self.verdict(index), running_for)
    }

    /// Task duration as of the model clock.
    pub fn duration(&self, index: usize) -> Duration {
        let view = &self.views[index];
        match (view.started_at, view.finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => self.now.saturating_duration_since(start),
            (None, _) => Duration::ZERO,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.finished
            .unwrap_or(self.now)
            .saturating_duration_since(self.started)
    }

    pub fn list_rows(&self) -> Vec<ListRow> {
        let mut rows = Vec::with_capacity(self.order.len());
        let mut group: Option<&str> = None;
        for (position, &index) in self.order.iter().enumerate() {
            let task_group = self.tasks[index].spec().group.as_str();
            if !task_group.is_empty() && group != Some(task_group) {
                rows.push(ListRow::Group(task_group.to_string()));
            }
            group = Some(task_group);
            rows.push(ListRow::Task(index, position == self.selected));
        }
        rows
    }

    /// Running, finished and failed task counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        let mut running = 0;
        let mut finished = 0;
        let mut failed = 0;
        for index in 0..self.tasks.len() {
            match self.verdict(index) {
                Verdict::Running => running += 1,
                Verdict::Pending => {}
                verdict => {
                    finished += 1;
                    if verdict.is_failure() {
                        failed += 1;
                    }
                }
            }
        }
        (running, finished, failed)
    }

    pub fn exit_code(&self) -> i32 {
        let (_, _, failed) = self.counts();
        if failed > 0 {
            1
        } else {
            0
        }
    }
}

/// Groups tasks by first appearance of their group, keeping spec order inside.
fn display_order(tasks: &[Arc<Task>]) -> Vec<usize> {
    let mut groups: Vec<&str> = Vec::new();
    for task in tasks {
        let group = task.spec().group.as_str();
        if !groups.contains(&group) {
            groups.push(group);
        }
    }
    groups
        .iter()
        .flat_map(|group| {
            tasks
                .iter()
                .filter(move |task| task.spec().group == *group)
                .map(|task| task.index())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskSpec, TaskStatus};
    use crossterm::event::KeyEventState;

    fn model(specs: &[(&str, &str, &str)]) -> Model {
        let tasks = specs
            .iter()
            .enumerate()
            .map(|(index, (group, name, cmd))| {
                Arc::new(Task::new(index, TaskSpec::new(*group, *name, *cmd), 100))
            })
            .collect();
        let mut model = Model::new(tasks, Theme::default(), &FormatterRegistry::default());
        model.update(Msg::Resize {
            width: 80,
            height: 10,
        });
        model
    }

    fn key(code: KeyCode) -> Msg {
        Msg::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> Msg {
        Msg::Key(KeyEvent {
            code: KeyCode::Char(c),
            modifiers: KeyModifiers::CONTROL,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn list_width_is_clamped_to_half_the_terminal() {
        let long = vec!["x".repeat(70)];
        let layout = Layout::compute(80, 24, &long);
        assert_eq!(layout.list_width, 40);
        assert_eq!(layout.detail_width, 40);

        let short = vec!["build/app".to_string()];
        let layout = Layout::compute(80, 24, &short);
        assert_eq!(layout.list_width, 9 + LIST_PADDING);
        assert_eq!(layout.width, layout.list_width + layout.detail_width);
        assert_eq!(layout.content_height, 24 - TITLE_HEIGHT - 2);
    }

    #[test]
    fn tiny_terminal_does_not_underflow() {
        let layout = Layout::compute(1, 1, &["a".to_string()]);
        assert_eq!(layout.content_height, 0);
        assert_eq!(layout.list_width + layout.detail_width, 1);
    }

    #[test]
    fn selection_stays_in_bounds() {
        let mut model = model(&[("g", "a", "true"), ("g", "b", "true")]);
        model.update(key(KeyCode::Up));
        assert_eq!(model.selected_task(), Some(0));
        model.update(key(KeyCode::Char('j')));
        model.update(key(KeyCode::Down));
        model.update(key(KeyCode::Down));
        assert_eq!(model.selected_task(), Some(1));
        model.update(key(KeyCode::Char('k')));
        assert_eq!(model.selected_task(), Some(0));
    }

    #[test]
    fn selection_follows_grouped_display_order() {
        let mut model = model(&[("a", "one", "true"), ("b", "two", "true"), ("a", "three", "true")]);
        model.update(key(KeyCode::Down));
        assert_eq!(model.selected_task(), Some(2));
        assert_eq!(
            model.list_rows(),
            vec![
                ListRow::Group("a".into()),
                ListRow::Task(0, false),
                ListRow::Task(2, true),
                ListRow::Group("b".into()),
                ListRow::Task(1, false),
            ]
        );
    }

    #[test]
    fn quit_waits_for_completion() {
        let mut model = model(&[("", "a", "true")]);
        assert_eq!(model.update(key(KeyCode::Char('q'))), Action::None);
        assert_eq!(model.update(key(KeyCode::Esc)), Action::None);
        assert!(!model.should_quit());

        model.update(Msg::AllDone);
        assert_eq!(model.update(key(KeyCode::Char('q'))), Action::Quit);
        assert!(model.should_quit());
    }

    #[test]
    fn ctrl_c_cancels_then_quits_on_close() {
        let mut model = model(&[("", "a", "sleep 30")]);
        assert_eq!(model.update(ctrl('c')), Action::Cancel);
        assert!(!model.should_quit());
        assert_eq!(model.update(Msg::AllDone), Action::Quit);
        assert!(model.should_quit());
    }

    #[test]
    fn key_release_is_ignored() {
        let mut model = model(&[("", "a", "true")]);
        model.update(Msg::AllDone);
        let mut release = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(model.update(Msg::Key(release)), Action::None);
    }

    #[test]
    fn viewport_pads_to_height() {
        let mut viewport = Viewport::default();
        viewport.set_height(4);
        viewport.set_content("one\ntwo");
        assert_eq!(viewport.visible(), vec!["one", "two", "", ""]);
    }

    #[test]
    fn viewport_follows_tail_until_scrolled() {
        let mut viewport = Viewport::default();
        viewport.set_height(2);
        viewport.set_content("1\n2\n3\n4");
        assert_eq!(viewport.visible(), vec!["3", "4"]);

        viewport.scroll_up(1);
        assert!(!viewport.is_following());
        viewport.set_content("1\n2\n3\n4\n5");
        assert_eq!(viewport.visible(), vec!["2", "3"]);

        viewport.bottom();
        assert_eq!(viewport.visible(), vec!["4", "5"]);
        viewport.top();
        assert_eq!(viewport.offset(), 0);
        viewport.scroll_down(10);
        assert!(viewport.is_following());
    }

    #[test]
    fn task_updates_drive_view_and_verdict() {
        let mut model = model(&[("lint", "clippy", "cargo clippy")]);
        let task = Arc::clone(&model.tasks[0]);
        let start = Instant::now();

        model.update(Msg::Task(TaskUpdate::started(0, start)));
        assert_eq!(model.verdict(0), Verdict::Running);

        task.append_line("warning: unused variable".into());
        model.update(Msg::Task(TaskUpdate::line(0, "warning: unused variable".into(), Some(start))));
        model.update(Msg::Tick);
        assert!(model.viewport().visible().iter().any(|row| row.contains("unused variable")));

        model.update(Msg::Task(TaskUpdate::finished(
            0,
            TaskStatus::Success,
            0,
            Some(start),
            start + Duration::from_secs(1),
        )));
        assert_eq!(model.verdict(0), Verdict::Warning);
        assert_eq!(model.duration(0), Duration::from_secs(1));
        assert_eq!(model.exit_code(), 0);
    }

    #[test]
    fn selected_task_lines_appear_on_the_next_tick() {
        let mut model = model(&[("", "build", "make")]);
        let task = Arc::clone(&model.tasks[0]);
        let start = Instant::now();
        model.update(Msg::Task(TaskUpdate::started(0, start)));

        task.append_line("compiling".into());
        model.update(Msg::Task(TaskUpdate::line(0, "compiling".into(), Some(start))));
        assert!(model.viewport().visible().iter().all(|row| row.is_empty()));

        model.update(Msg::Tick);
        assert_eq!(model.viewport().visible()[0], "compiling");

        task.append_line("linking".into());
        model.update(Msg::Task(TaskUpdate::line(0, "linking".into(), Some(start))));
        assert!(!model.viewport().visible().contains(&"linking"));
        model.update(Msg::Tick);
        assert_eq!(&model.viewport().visible()[..2], &["compiling", "linking"]);
    }

    #[test]
    fn failed_task_sets_exit_code() {
        let mut model = model(&[("", "a", "true"), ("", "b", "false")]);
        let now = Instant::now();
        model.update(Msg::Task(TaskUpdate::finished(0, TaskStatus::Success, 0, Some(now), now)));
        model.update(Msg::Task(TaskUpdate::finished(1, TaskStatus::Failed, 1, Some(now), now)));
        assert_eq!(model.counts(), (0, 2, 1));
        assert_eq!(model.exit_code(), 1);
    }
}
