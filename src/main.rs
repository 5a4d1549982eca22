#![forbid(unsafe_code)]

//! `cpputf-adapter`: command-line front end for the test-run protocol engine.
//!
//! Loads adapter settings, then discovers, runs, debugs or watches the
//! configured CppUnitTestFramework executables. Test output goes to stdout
//! as text or JSON lines; logs go to stderr.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use cpputf_adapter::mode::ProtocolMode;
use cpputf_adapter::models::{DiscoveryResult, ExecutableRun, RunOutcome, TestSelection, TestUpdate};
use cpputf_adapter::runner::RunCoordinator;
use cpputf_adapter::watcher::ExecutableWatcher;
use cpputf_adapter::{AdapterConfig, AppError, Result};

/// Pause after a rebuild signal so a linker's burst of writes settles.
const REBUILD_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "cpputf-adapter", about = "Drive CppUnitTestFramework test executables", version, long_about = None)]
struct Cli {
    /// Path to the TOML settings file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Result output format (text or json lines).
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Override the run-mode protocol version from the settings file.
    #[arg(long, value_enum)]
    protocol: Option<ProtocolMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the tests of every configured executable.
    Discover,
    /// Run the given tests, or every test when none is given.
    Run {
        /// `Fixture::Test` identities to run.
        identities: Vec<String>,
    },
    /// Launch tests under the configured debugger.
    Debug {
        /// Executable to debug; the first configured one by default.
        #[arg(long)]
        executable: Option<PathBuf>,
        /// `Fixture::Test` identities to run.
        identities: Vec<String>,
    },
    /// Re-run discovery whenever an executable is rebuilt.
    Watch,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let mut config = AdapterConfig::load_from_path(&args.config)?;
    if let Some(protocol) = args.protocol {
        config.protocol = protocol;
    }
    init_tracing(args.log_format, config.debug_logging)?;
    info!(config = %args.config.display(), "cpputf-adapter starting");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args, config))
}

async fn run(args: Cli, config: AdapterConfig) -> Result<()> {
    if !config.enabled {
        info!("adapter disabled, nothing to do");
        return Ok(());
    }

    let coordinator = RunCoordinator::from_config(&config);
    let shutdown = CancellationToken::new();
    spawn_shutdown_handler(coordinator.clone(), shutdown.clone());

    let output = Output(args.output);
    match args.command {
        Command::Discover => discover_all(&coordinator, &config, output).await,
        Command::Run { identities } => run_tests(&coordinator, &config, output, identities).await,
        Command::Debug {
            executable,
            identities,
        } => {
            let executable = match executable {
                Some(path) => path,
                None => config
                    .executables
                    .first()
                    .cloned()
                    .ok_or_else(|| AppError::Config("no executables configured".into()))?,
            };
            let code = coordinator
                .debug(&executable, &TestSelection::from(identities))
                .await?;
            info!(code, "debugger exited");
            Ok(())
        }
        Command::Watch => watch(&coordinator, &config, output, shutdown).await,
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn discover_all(
    coordinator: &RunCoordinator,
    config: &AdapterConfig,
    output: Output,
) -> Result<()> {
    let mut failures = 0usize;
    for exe in &config.executables {
        match coordinator.discover(exe).await {
            Ok(result) => output.discovery(config, &result),
            Err(err) => {
                error!(%err, executable = %exe.display(), "discovery failed");
                output.error(exe, &err);
                failures += 1;
            }
        }
    }
    if failures > 0 {
        return Err(AppError::DiscoveryFailed(format!(
            "{failures} executable(s) could not be discovered"
        )));
    }
    Ok(())
}

async fn run_tests(
    coordinator: &RunCoordinator,
    config: &AdapterConfig,
    output: Output,
    identities: Vec<String>,
) -> Result<()> {
    let (tx, rx) = mpsc::channel(64);
    let printer = spawn_printer(output, rx);

    let runs = if identities.is_empty() {
        coordinator.run_all(&config.executables, &tx).await
    } else {
        let mut tests = Vec::new();
        for exe in &config.executables {
            let discovered = coordinator.discover(exe).await?;
            tests.extend(
                discovered
                    .into_tests()
                    .into_iter()
                    .filter(|test| identities.contains(&test.identity)),
            );
        }
        for id in &identities {
            if !tests.iter().any(|test| &test.identity == id) {
                warn!(identity = %id, "no such test in any executable");
            }
        }
        coordinator.run_tests(&tests, &tx).await
    };
    drop(tx);
    if let Err(err) = printer.await {
        warn!(%err, "output task failed");
    }

    let runs = runs?;
    let mut problems = 0usize;
    for run in &runs {
        output.run(run);
        match &run.result {
            Ok(summary) => problems += summary.failed,
            Err(_) => problems += 1,
        }
    }
    if problems > 0 {
        return Err(AppError::RunFailed(format!(
            "{problems} failed test(s) or session(s)"
        )));
    }
    Ok(())
}

async fn watch(
    coordinator: &RunCoordinator,
    config: &AdapterConfig,
    output: Output,
    shutdown: CancellationToken,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(16);
    let _watcher = ExecutableWatcher::new(&config.executables, tx)?;

    if let Err(err) = discover_all(coordinator, config, output).await {
        warn!(%err, "initial discovery incomplete");
    }

    loop {
        let first = tokio::select! {
            () = shutdown.cancelled() => break,
            changed = rx.recv() => match changed {
                Some(path) => path,
                None => break,
            },
        };

        tokio::time::sleep(REBUILD_SETTLE).await;
        let mut changed = BTreeSet::from([first]);
        while let Ok(path) = rx.try_recv() {
            changed.insert(path);
        }

        for exe in changed {
            if !exe.is_file() {
                info!(executable = %exe.display(), "executable removed, waiting for rebuild");
                continue;
            }
            info!(executable = %exe.display(), "executable rebuilt, rediscovering");
            match coordinator.discover(&exe).await {
                Ok(result) => output.discovery(config, &result),
                Err(err) => {
                    warn!(%err, executable = %exe.display(), "rediscovery failed");
                    output.error(&exe, &err);
                }
            }
        }
    }

    info!("watch stopped");
    Ok(())
}

// ── Output ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Output(OutputFormat);

#[derive(Serialize)]
struct ErrorLine<'a> {
    executable: &'a Path,
    error: String,
}

impl Output {
    fn json<T: Serialize>(value: &T) {
        match serde_json::to_string(value) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(%err, "failed to serialize output"),
        }
    }

    fn update(self, update: &TestUpdate) {
        match self.0 {
            OutputFormat::Json => Self::json(update),
            OutputFormat::Text => {
                let label = match update.outcome {
                    RunOutcome::Running => "RUN",
                    RunOutcome::Passed => "PASS",
                    RunOutcome::Failed => "FAIL",
                    RunOutcome::Skipped => "SKIP",
                };
                println!("{label:<5} {}", update.identity);
                for line in update.message.lines() {
                    println!("      {line}");
                }
            }
        }
    }

    fn discovery(self, config: &AdapterConfig, result: &DiscoveryResult) {
        match self.0 {
            OutputFormat::Json => Self::json(result),
            OutputFormat::Text => {
                println!("{}", result.executable.display());
                for fixture in &result.fixtures {
                    println!("  {}", fixture.name);
                    for test in &fixture.tests {
                        println!(
                            "    {} ({}:{})",
                            test.name,
                            config.resolve_source_path(&test.source_file).display(),
                            test.source_line
                        );
                    }
                }
                for warning in &result.warnings {
                    println!("  skipped line: {warning}");
                }
            }
        }
    }

    fn run(self, run: &ExecutableRun) {
        match (&run.result, self.0) {
            (Ok(summary), OutputFormat::Json) => Self::json(summary),
            (Ok(summary), OutputFormat::Text) => {
                println!(
                    "{}: {} passed, {} failed, {} skipped",
                    run.executable.display(),
                    summary.passed,
                    summary.failed,
                    summary.skipped
                );
                for id in &summary.unreported {
                    println!("  not run: {id}");
                }
            }
            (Err(err), _) => self.error(&run.executable, err),
        }
    }

    fn error(self, executable: &Path, err: &AppError) {
        match self.0 {
            OutputFormat::Json => Self::json(&ErrorLine {
                executable,
                error: err.to_string(),
            }),
            OutputFormat::Text => println!("{}: {err}", executable.display()),
        }
    }
}

fn spawn_printer(output: Output, mut rx: mpsc::Receiver<TestUpdate>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            output.update(&update);
        }
    })
}

// ── Process plumbing ──────────────────────────────────────────────────────────

fn spawn_shutdown_handler(coordinator: RunCoordinator, shutdown: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, cancelling active session");
        shutdown.cancel();
        coordinator.cancel();
    });
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat, debug_logging: bool) -> Result<()> {
    let default_filter = if debug_logging {
        "info,cpputf_adapter=debug"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
