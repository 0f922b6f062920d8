use std::{
    io::{self, Stdout},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use backend_memory::{MemoryBackend, MemoryBackendConfig};
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use sync_core::BackendError;
use talc_tui::{
    ConfigError, PollScheduler, TuiConfig, demo, logging,
    tui::{TerminalSink, spawn_input_reader},
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEMO_LATENCY: Duration = Duration::from_millis(120);

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] io::Error),
    #[error("terminal error: {0}")]
    Terminal(#[source] io::Error),
    #[error("demo backend failed: {0}")]
    Demo(#[from] BackendError),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "talc-tui exited with an error");
            eprintln!("talc-tui: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), AppError> {
    let config = TuiConfig::from_env()?;
    let log_path = logging::init(&config.data_dir);
    info!(
        data_dir = %config.data_dir.display(),
        log_file = ?log_path,
        "starting talc-tui"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;
    runtime.block_on(run_app(config))
}

async fn run_app(config: TuiConfig) -> Result<(), AppError> {
    let backend = Arc::new(MemoryBackend::new(MemoryBackendConfig {
        latency: DEMO_LATENCY,
        ..MemoryBackendConfig::default()
    }));
    demo::start(&backend, config.demo_chatter).await?;

    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let mut terminal = setup_terminal().map_err(AppError::Terminal)?;
    let reader = match spawn_input_reader(input_tx, shutdown.clone()) {
        Ok(reader) => reader,
        Err(err) => {
            restore_terminal(&mut terminal).ok();
            return Err(AppError::Terminal(err));
        }
    };

    let scheduler = PollScheduler::from_config(
        Arc::clone(&backend),
        TerminalSink::new(terminal),
        &config,
    );
    let mut sink = scheduler.run(input_rx, shutdown.clone()).await;

    shutdown.cancel();
    backend.stop_chatter().await;
    restore_terminal(sink.terminal_mut()).map_err(AppError::Terminal)?;
    if !matches!(tokio::task::spawn_blocking(move || reader.join()).await, Ok(Ok(()))) {
        warn!("input reader did not stop cleanly");
    }
    info!("talc-tui stopped");
    Ok(())
}

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    if let Err(err) = execute!(stdout, EnterAlternateScreen) {
        disable_raw_mode().ok();
        return Err(err);
    }
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.hide_cursor().ok();
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    if let Err(err) = execute!(terminal.backend_mut(), LeaveAlternateScreen) {
        warn!(error = %err, "failed to leave alternate screen");
    }
    terminal.show_cursor()
}
