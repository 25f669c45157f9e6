//! Terminal dashboard: setup, drawing and the event loop.
//!
//! Drawing is a pure function of the `Model`; the loop turns terminal input,
//! runner updates and clock ticks into `Msg`s and applies the resulting
//! `Action`s.

use std::io::{self, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, List, ListItem, Paragraph};
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ansi::ansi_spans;
use crate::app::{Action, ListRow, Model, TITLE_HEIGHT};
use crate::error::{Error, Result};
use crate::events::Msg;
use crate::render::RenderOptions;
use crate::runner::start_tasks;
use crate::task::{format_duration, TaskSpec};
use crate::theme::SPINNER_INTERVAL;

pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

const INPUT_POLL: Duration = Duration::from_millis(100);

/// Enables raw mode and switches to the alternate screen.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

/// Undoes `init_terminal`.
pub fn restore_terminal(terminal: &mut TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

/// Runs `specs` under the interactive dashboard and returns the exit code.
pub async fn run_dashboard(
    cancel: &CancellationToken,
    specs: &[TaskSpec],
    options: &RenderOptions,
) -> Result<i32> {
    let mut terminal = init_terminal().map_err(Error::Terminal)?;
    let result = drive(&mut terminal, cancel, specs, options).await;
    let restored = restore_terminal(&mut terminal).map_err(Error::Terminal);
    let code = result?;
    restored?;
    Ok(code)
}

async fn drive<B: Backend>(
    terminal: &mut Terminal<B>,
    cancel: &CancellationToken,
    specs: &[TaskSpec],
    options: &RenderOptions,
) -> Result<i32> {
    let cancel = cancel.child_token();
    let (tasks, mut updates) = start_tasks(&cancel, specs, &options.run);
    let mut model = Model::new(tasks, options.theme.clone(), &options.registry);

    let size = terminal.size().map_err(Error::Terminal)?;
    model.update(Msg::Resize {
        width: size.width,
        height: size.height,
    });

    let (input_tx, mut input_rx) = mpsc::channel(64);
    let stop_input = Arc::new(AtomicBool::new(false));
    spawn_input_listener(input_tx, Arc::clone(&stop_input));

    let mut ticker = tokio::time::interval(SPINNER_INTERVAL);
    let mut updates_open = true;
    let mut redraw = true;

    let outcome = loop {
        if redraw {
            if let Err(err) = terminal.draw(|frame| view(frame, &model)) {
                break Err(Error::Terminal(err));
            }
        }

        let msg = tokio::select! {
            update = updates.recv(), if updates_open => match update {
                Some(update) => Msg::Task(update),
                None => {
                    updates_open = false;
                    Msg::AllDone
                }
            },
            Some(msg) = input_rx.recv() => msg,
            _ = ticker.tick() => Msg::Tick,
        };
        // Plain line updates show up on the next tick.
        redraw = !matches!(&msg, Msg::Task(update) if !update.is_terminal());

        match model.update(msg) {
            Action::Cancel => {
                debug!("cancelling run from dashboard");
                cancel.cancel();
            }
            Action::Quit => break Ok(model.exit_code()),
            Action::None => {}
        }
        if model.should_quit() {
            break Ok(model.exit_code());
        }
    };

    stop_input.store(true, Ordering::Relaxed);
    if outcome.is_err() {
        cancel.cancel();
    }
    outcome
}

/// Forwards key and resize events from a blocking reader thread.
fn spawn_input_listener(tx: mpsc::Sender<Msg>, stop: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            if !crossterm::event::poll(INPUT_POLL).unwrap_or(false) {
                continue;
            }
            let msg = match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key)) => Msg::Key(key),
                Ok(crossterm::event::Event::Resize(width, height)) => {
                    Msg::Resize { width, height }
                }
                Ok(_) => continue,
                Err(err) => {
                    debug!(error = %err, "terminal input closed");
                    break;
                }
            };
            if tx.blocking_send(msg).is_err() {
                break;
            }
        }
    });
}

/// Draws the whole dashboard from the model.
pub fn view(frame: &mut Frame, model: &Model) {
    let area = frame.size();
    if !model.is_ready() || area.height == 0 {
        return;
    }
    let layout = model.layout();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(TITLE_HEIGHT), Constraint::Min(0)])
        .split(area);
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(layout.list_width),
            Constraint::Min(0),
        ])
        .split(rows[1]);

    frame.render_widget(title_bar(model), rows[0]);
    frame.render_widget(task_list(model), panes[0]);
    render_detail(frame, model, panes[1]);
}

fn title_bar(model: &Model) -> Paragraph<'static> {
    let theme = model.theme();
    let (running, finished, failed) = model.counts();
    let hints = if model.is_done() {
        "↑↓ select · PgUp/PgDn scroll · q quit"
    } else {
        "↑↓ select · PgUp/PgDn scroll · ctrl-c cancel"
    };
    let mut spans = vec![
        Span::styled(
            " buildrack ",
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            "{}/{} done · {} running",
            finished,
            model.task_count(),
            running
        )),
    ];
    if failed > 0 {
        spans.push(Span::styled(
            format!(" · {} failed", failed),
            Style::default().fg(theme.failure_color),
        ));
    }
    spans.push(Span::raw(format!(
        " · {} ",
        format_duration(model.elapsed())
    )));
    spans.push(Span::styled(hints, Style::default().fg(theme.muted)));
    Paragraph::new(Line::from(spans))
}

fn task_list(model: &Model) -> List<'static> {
    let theme = model.theme();
    let items: Vec<ListItem> = model
        .list_rows()
        .into_iter()
        .map(|row| match row {
            ListRow::Group(group) => ListItem::new(Line::from(Span::styled(
                group,
                Style::default().fg(theme.muted),
            ))),
            ListRow::Task(index, selected) => {
                let verdict = model.verdict(index);
                let marker = if selected { "▶ " } else { "  " };
                let name = model.task_name(index).to_string();
                let name_style = if selected {
                    Style::default().add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(vec![
                    Span::styled(marker, Style::default().fg(theme.accent)),
                    Span::styled(
                        format!("{} ", model.glyph(index)),
                        theme.verdict_style(verdict),
                    ),
                    Span::styled(name, name_style),
                ]))
            }
        })
        .collect();

    List::new(items).block(
        Block::default()
            .title("Tasks")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(theme.muted)),
    )
}

fn render_detail(frame: &mut Frame, model: &Model, area: Rect) {
    let theme = model.theme();
    let title = match model.selected_task() {
        Some(index) => {
            let verdict = model.verdict(index);
            Line::from(vec![
                Span::raw(format!(" {} ", model.label(index))),
                Span::styled(
                    format!("{} {}", model.glyph(index), verdict.label()),
                    theme.verdict_style(verdict),
                ),
                Span::raw(format!(" {} ", format_duration(model.duration(index)))),
            ])
        }
        None => Line::from(" no tasks "),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.muted));

    let lines: Vec<Line> = model
        .viewport()
        .visible()
        .into_iter()
        .map(|row| Line::from(ansi_spans(row)))
        .collect();
    frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TaskUpdate;
    use crate::format::FormatterRegistry;
    use crate::task::{Task, TaskStatus};
    use crate::theme::Theme;
    use ratatui::backend::TestBackend;
    use std::time::Instant;

    fn screen(terminal: &Terminal<TestBackend>) -> Vec<String> {
        let buffer = terminal.backend().buffer();
        (0..buffer.area.height)
            .map(|y| {
                (0..buffer.area.width)
                    .map(|x| buffer.get(x, y).symbol().to_string())
                    .collect()
            })
            .collect()
    }

    fn model_with(width: u16, height: u16) -> Model {
        let tasks = vec![
            Arc::new(Task::new(0, TaskSpec::new("grp", "A", "printf ok"), 100)),
            Arc::new(Task::new(1, TaskSpec::new("grp", "B", "exit 2"), 100)),
        ];
        let mut model = Model::new(tasks, Theme::default(), &FormatterRegistry::default());
        model.update(Msg::Resize { width, height });
        model
    }

    #[test]
    fn renders_grouped_list_and_title() {
        let mut model = model_with(60, 8);
        let now = Instant::now();
        model.update(Msg::Task(TaskUpdate::finished(0, TaskStatus::Success, 0, Some(now), now)));
        model.update(Msg::Task(TaskUpdate::finished(1, TaskStatus::Failed, 2, Some(now), now)));
        model.update(Msg::AllDone);

        let mut terminal = Terminal::new(TestBackend::new(60, 8)).unwrap();
        terminal.draw(|frame| view(frame, &model)).unwrap();
        let rows = screen(&terminal);

        assert!(rows[0].contains("buildrack"));
        assert!(rows[0].contains("2/2 done"));
        assert!(rows[0].contains("1 failed"));
        let all = rows.join("\n");
        assert!(all.contains("grp"));
        assert!(all.contains("✓ A"));
        assert!(all.contains("✗ B"));
    }

    #[test]
    fn detail_pane_shows_selected_output() {
        let mut model = model_with(60, 8);
        let task = model.task(0);
        let now = Instant::now();
        task.append_line("hello from A".into());
        model.update(Msg::Task(TaskUpdate::started(0, now)));
        model.update(Msg::Task(TaskUpdate::finished(0, TaskStatus::Success, 0, Some(now), now)));

        let mut terminal = Terminal::new(TestBackend::new(60, 8)).unwrap();
        terminal.draw(|frame| view(frame, &model)).unwrap();
        let all = screen(&terminal).join("\n");
        assert!(all.contains("grp/A"));
        assert!(all.contains("hello from A"));
        assert_eq!(model.viewport().visible().len(), 8 - 3);
    }

    #[test]
    fn nothing_is_drawn_before_first_resize() {
        let tasks = vec![Arc::new(Task::new(0, TaskSpec::new("", "a", "true"), 10))];
        let model = Model::new(tasks, Theme::default(), &FormatterRegistry::default());
        let mut terminal = Terminal::new(TestBackend::new(20, 4)).unwrap();
        terminal.draw(|frame| view(frame, &model)).unwrap();
        assert!(screen(&terminal).iter().all(|row| row.trim().is_empty()));
    }
}
