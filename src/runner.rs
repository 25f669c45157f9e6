//! Task execution and update fan-in.
//!
//! `start_tasks` spawns one subprocess per spec and returns the shared tasks
//! together with the single channel every update flows through. Each task
//! unit owns a clone of the channel's sender; the receiver sees the channel
//! close only once the last unit has sent its terminal update and dropped its
//! clone, which makes closure the one reliable "all done" signal.
//!
//! There is no ordering across tasks on the shared channel. Lines of a single
//! task keep their order end to end, so consumers key everything by
//! `TaskUpdate::index`.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::TaskUpdate;
use crate::output::DEFAULT_MAX_LINES;
use crate::task::{Task, TaskSpec, TaskStatus};

/// Longest single line kept from a stream; the rest of an overlong line is dropped.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Capacity of the shared update channel. Kept at the minimum so a slow
/// consumer throttles the readers and, through the pipe, the subprocess.
const UPDATE_CHANNEL_CAPACITY: usize = 1;

const MERGE_CHANNEL_CAPACITY: usize = 16;

/// The shell every task command is handed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    pub program: String,
    pub args: Vec<String>,
}

impl Shell {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for Shell {
    #[cfg(windows)]
    fn default() -> Self {
        Self::new("cmd", vec!["/C".to_string()])
    }

    #[cfg(not(windows))]
    fn default() -> Self {
        Self::new("sh", vec!["-c".to_string()])
    }
}

/// Settings for one batch of tasks.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Max lines retained per task.
    pub max_lines: usize,
    pub shell: Shell,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
            shell: Shell::default(),
        }
    }
}

/// Builds the process for a shell command line.
///
/// This is the only place a task command meets the OS; swapping the
/// invocation strategy means changing this function alone.
pub fn shell_command(shell: &Shell, command: &str) -> Command {
    let mut cmd = Command::new(&shell.program);
    cmd.args(&shell.args).arg(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    #[cfg(unix)]
    unsafe {
        // Own process group, so cancellation can take down whole pipelines.
        cmd.pre_exec(|| {
            let _ = libc::setpgid(0, 0);
            Ok(())
        });
    }

    cmd
}

/// Starts every task and returns them with the shared update stream.
///
/// Must be called from within a tokio runtime.
pub fn start_tasks(
    cancel: &CancellationToken,
    specs: &[TaskSpec],
    options: &RunOptions,
) -> (Vec<Arc<Task>>, mpsc::Receiver<TaskUpdate>) {
    let tasks: Vec<Arc<Task>> = specs
        .iter()
        .enumerate()
        .map(|(index, spec)| Arc::new(Task::new(index, spec.clone(), options.max_lines)))
        .collect();

    let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
    for task in &tasks {
        tokio::spawn(run_task(
            Arc::clone(task),
            options.shell.clone(),
            tx.clone(),
            cancel.clone(),
        ));
    }
    // Only the task units hold senders from here on.
    drop(tx);

    (tasks, rx)
}

async fn run_task(
    task: Arc<Task>,
    shell: Shell,
    tx: mpsc::Sender<TaskUpdate>,
    cancel: CancellationToken,
) {
    let index = task.index();
    let label = task.label();

    if cancel.is_cancelled() {
        info!(task = %label, "run cancelled before start");
        fail_to_launch(&task, &tx, "cancelled before start".to_string()).await;
        return;
    }

    let mut child = match shell_command(&shell, &task.spec().command).spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(task = %label, error = %err, "failed to start task");
            fail_to_launch(&task, &tx, format!("failed to start: {}", err)).await;
            return;
        }
    };

    let started_at = Instant::now();
    task.mark_started(started_at);
    debug!(task = %label, pid = ?child.id(), "task started");
    let _ = tx.send(TaskUpdate::started(index, started_at)).await;

    let (merge_tx, merge_rx) = mpsc::channel(MERGE_CHANNEL_CAPACITY);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(read_lines(stdout, merge_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(read_lines(stderr, merge_tx.clone()));
    }
    // The merge channel closes once both readers hit EOF.
    drop(merge_tx);
    let mut combiner = tokio::spawn(forward_lines(
        Arc::clone(&task),
        merge_rx,
        tx.clone(),
        started_at,
    ));

    // Saved up front: the group outlives its leader when background jobs hold the pipes.
    let pgid = child.id();
    let mut cancelled = false;
    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };
    let status = match waited {
        Some(status) => status,
        None => {
            info!(task = %label, "cancelling task");
            cancelled = true;
            terminate(&mut child, pgid).await;
            child.wait().await
        }
    };

    // Every line must be forwarded before the terminal update goes out.
    let joined = if cancelled {
        combiner.await
    } else {
        let joined = tokio::select! {
            joined = &mut combiner => Some(joined),
            _ = cancel.cancelled() => None,
        };
        match joined {
            Some(joined) => joined,
            None => {
                info!(task = %label, "cancelling leftover processes");
                cancelled = true;
                kill_group(pgid);
                combiner.await
            }
        }
    };
    if let Err(err) = joined {
        warn!(task = %label, error = %err, "output combiner stopped abnormally");
    }

    let (mut status, mut exit_code) = classify_exit(status);
    if cancelled {
        status = TaskStatus::Failed;
        if exit_code == 0 {
            exit_code = 1;
        }
    }
    debug!(task = %label, status = status.label(), exit_code, "task finished");
    finish(&task, &tx, status, exit_code).await;
}

/// Maps the result of waiting on a child to a terminal status and exit code.
fn classify_exit(result: std::io::Result<ExitStatus>) -> (TaskStatus, i32) {
    match result {
        Ok(status) if status.success() => (TaskStatus::Success, 0),
        Ok(status) => (TaskStatus::Failed, status.code().unwrap_or(1)),
        Err(err) => {
            warn!(error = %err, "failed to wait for task");
            (TaskStatus::Failed, 1)
        }
    }
}

async fn fail_to_launch(task: &Task, tx: &mpsc::Sender<TaskUpdate>, message: String) {
    let now = Instant::now();
    task.mark_started(now);
    let _ = tx.send(TaskUpdate::started(task.index(), now)).await;
    task.append_line(message.clone());
    let _ = tx
        .send(TaskUpdate::line(task.index(), message, Some(now)))
        .await;
    finish(task, tx, TaskStatus::Failed, 1).await;
}

async fn finish(task: &Task, tx: &mpsc::Sender<TaskUpdate>, status: TaskStatus, exit_code: i32) {
    let now = Instant::now();
    task.mark_finished(status, exit_code, now);
    let update = TaskUpdate::finished(
        task.index(),
        task.status(),
        task.exit_code(),
        task.started_at(),
        task.finished_at().unwrap_or(now),
    );
    let _ = tx.send(update).await;
}

/// Sends SIGKILL to the child and, on Unix, to its whole process group.
async fn terminate(child: &mut Child, pgid: Option<u32>) {
    kill_group(pgid);
    if let Err(err) = child.kill().await {
        debug!(error = %err, "kill after group signal failed");
    }
}

fn kill_group(pgid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = pgid {
        unsafe {
            let _ = libc::kill(-(pgid as i32), libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pgid;
}

async fn forward_lines(
    task: Arc<Task>,
    mut lines: mpsc::Receiver<String>,
    tx: mpsc::Sender<TaskUpdate>,
    started_at: Instant,
) {
    while let Some(line) = lines.recv().await {
        task.append_line(line.clone());
        // A closed channel only means nobody is watching; keep the buffer filling.
        let _ = tx
            .send(TaskUpdate::line(task.index(), line, Some(started_at)))
            .await;
    }
}

async fn read_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match read_bounded_line(&mut reader, &mut buf, MAX_LINE_BYTES).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(decode_line(&buf)).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                debug!(error = %err, "stream read failed");
                break;
            }
        }
    }
}

/// Reads one newline-terminated line, keeping at most `limit` bytes of it.
///
/// Returns the number of bytes consumed from the reader (0 at EOF). Bytes past
/// the limit are consumed and discarded up to the next newline.
async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(consumed);
        }
        let (chunk_len, found_newline) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };
        let keep = chunk_len.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&available[..keep]);
        reader.consume(chunk_len);
        consumed += chunk_len;
        if found_newline {
            return Ok(consumed);
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
