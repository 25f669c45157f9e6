//! buildrack command-line entry point.
//!
//! Collects tasks from the config file, a manifest and the command line, then
//! hands them to a `Suite`. Exit codes: 0 when every task succeeded, 1 when at
//! least one failed, 2 when the run itself could not happen.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use buildrack::config::{self, Config};
use buildrack::manifest::{load_manifest, parse_task_line};
use buildrack::output::DEFAULT_MAX_LINES;
use buildrack::render::DEFAULT_WIDTH;
use buildrack::{Shell, Suite, TaskSpec};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `BUILDRACK_LOG=debug`.
const LOG_ENV: &str = "BUILDRACK_LOG";

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "buildrack",
    version,
    about = "Run build tasks concurrently with a live dashboard",
    styles = help_styles()
)]
struct Cli {
    /// Task definitions: "group/name: command".
    #[arg(value_name = "TASK")]
    tasks: Vec<String>,
    /// Add a task definition (repeatable).
    #[arg(long = "task", value_name = "TASK")]
    task_flags: Vec<String>,
    /// File with one "group/name: command" per line.
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Path to buildrack.toml configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ignore any buildrack.toml in the current directory.
    #[arg(long)]
    no_config: bool,
    /// Max output lines kept per task.
    #[arg(long)]
    max_lines: Option<usize>,
    /// Print plain output even on a terminal.
    #[arg(long)]
    no_ui: bool,
    /// Use ASCII status glyphs.
    #[arg(long)]
    ascii: bool,
    /// Shell program that runs each command (default: sh).
    #[arg(long, value_name = "PROGRAM")]
    shell: Option<String>,
    /// Column width for formatted blocks in plain output.
    #[arg(long)]
    width: Option<usize>,
}

/// Effective settings after merging the config file under the CLI.
#[derive(Debug, Clone, PartialEq)]
struct Settings {
    max_lines: usize,
    use_symbols: bool,
    no_ui: bool,
    shell: Shell,
    width: usize,
}

impl Settings {
    fn from_cli(cli: &Cli, config: &Config) -> Self {
        let default_shell = Shell::default();
        let shell = match (cli.shell.clone().or_else(|| config.shell.clone()), &config.shell_args) {
            (None, None) => default_shell,
            (program, args) => Shell::new(
                program.unwrap_or(default_shell.program),
                args.clone().unwrap_or(default_shell.args),
            ),
        };
        Self {
            max_lines: cli.max_lines.or(config.max_lines).unwrap_or(DEFAULT_MAX_LINES),
            use_symbols: !cli.ascii && config.symbols.unwrap_or(true),
            no_ui: cli.no_ui || config.no_ui.unwrap_or(false),
            shell,
            width: cli.width.or(config.width).unwrap_or_else(terminal_width),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = exit_code_for(&err);
            // Task failures were already reported in the summary.
            if code == 2 {
                eprintln!("buildrack: {:#}", err);
            }
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (specs, settings) = load_specs(&cli)?;
    if specs.is_empty() {
        eprintln!("buildrack: no tasks defined (pass \"group/name: command\" or use buildrack.toml)");
        return Ok(());
    }
    debug!(?settings, tasks = specs.len(), "starting run");

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    Suite::new()
        .tasks(specs)
        .max_lines(settings.max_lines)
        .symbols(settings.use_symbols)
        .no_ui(settings.no_ui)
        .shell(settings.shell)
        .width(settings.width)
        .run(&cancel)
        .await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("off"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<buildrack::Error>()
        .and_then(|err| u8::try_from(err.exit_code()).ok())
        .unwrap_or(2)
}

/// Cancels the run on SIGINT or SIGTERM.
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("received ctrl-c");
        }
        cancel.cancel();
    });
}

/// Gathers tasks in order: config file, manifest, then command line.
fn load_specs(cli: &Cli) -> Result<(Vec<TaskSpec>, Settings)> {
    let mut config = Config::default();
    if !cli.no_config {
        let path = cli.config.clone().or_else(config::default_config_path);
        if let Some(path) = path {
            config = config::load_config(&path)?;
        }
    }

    let mut specs: Vec<TaskSpec> = config.tasks.iter().cloned().map(TaskSpec::from).collect();
    if let Some(path) = &cli.manifest {
        specs.extend(load_manifest(path)?);
    }
    for (position, text) in cli.tasks.iter().chain(&cli.task_flags).enumerate() {
        let spec = parse_task_line(text, position + 1)
            .with_context(|| format!("invalid task argument {:?}", text))?;
        specs.push(spec);
    }
    for spec in &specs {
        spec.validate()
            .map_err(buildrack::Error::from)
            .with_context(|| format!("invalid task {:?}", spec.label()))?;
    }

    let settings = Settings::from_cli(cli, &config);
    Ok((specs, settings))
}

fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(width, _)| usize::from(width))
        .ok()
        .filter(|width| *width > 0)
        .unwrap_or(DEFAULT_WIDTH)
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
}
