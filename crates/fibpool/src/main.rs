use anyhow::{Context, bail};
use clap::Parser;
use fibpool::backend::{Backend, ProcessBackend, ThreadBackend};
use fibpool::child::{run_sink, run_worker};
use fibpool::oneshot::run_compute;
use fibpool::config::{BackendKind, CliArgs, EngineConfig, Role};
use fibpool::console::{ConsoleDriver, DriverReport, parse_worker_count, stdin_lines};
use fibpool::pool::Pool;
use fibpool::telemetry::init_telemetry;
use fibpool_core::UnitId;
use fibpool_core::compute::Fibonacci;
use std::io::{self, Write};
use std::num::NonZeroUsize;
use tokio::signal;
use tokio_stream::{Stream, StreamExt};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    // Only the console exports; every other role owns its stdout.
    let providers = init_telemetry(args.role.is_none())?;

    let res = match args.role.clone() {
        Some(Role::Compute { value }) => run_compute(value),
        Some(Role::Worker { id }) => run_worker(id),
        Some(Role::Sink { display_cap }) => run_sink(display_cap),
        None => EngineConfig::try_from(args).and_then(run_console),
    };

    providers.shutdown();
    res
}

fn run_console(config: EngineConfig) -> anyhow::Result<()> {
    let span = tracing::info_span!("unit", id = %UnitId::Driver);
    let _enter = span.enter();

    log_startup_info(&config);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let report = match config.backend {
        BackendKind::Thread => {
            let backend = ThreadBackend::new(Fibonacci, config.display_cap);
            runtime.block_on(drive(&backend, &config))?
        }
        BackendKind::Process => {
            let backend = ProcessBackend::current_exe(config.display_cap)?;
            runtime.block_on(drive(&backend, &config))?
        }
    };

    tracing::info!(
        "Session ended ({:?}): {} accepted, {} rejected",
        report.cause,
        report.accepted,
        report.rejected
    );
    if !report.shutdown.failed_units.is_empty() {
        bail!("units failed during the session: {:?}", report.shutdown.failed_units);
    }
    Ok(())
}

async fn drive<B: Backend>(backend: &B, config: &EngineConfig) -> anyhow::Result<DriverReport> {
    let mut lines = stdin_lines()?;
    let num_workers = match config.num_workers {
        Some(n) => n,
        None => prompt_worker_count(&mut lines).await?,
    };

    let pool = Pool::start(backend, num_workers)?;
    println!(
        "Enter numbers and press enter to compute their Fibonacci value. Enter '{}' to quit.",
        config.exit_keyword
    );

    let mut driver = ConsoleDriver::new(pool, config.exit_keyword.as_str());
    Ok(driver.run(lines, shutdown_signal()).await?)
}

async fn prompt_worker_count<S>(lines: &mut S) -> anyhow::Result<NonZeroUsize>
where
    S: Stream<Item = io::Result<String>> + Unpin,
{
    print!("How many workers? ");
    io::stdout().flush()?;
    let line = lines
        .next()
        .await
        .context("no worker count provided")??;
    parse_worker_count(&line).context("invalid worker count")
}

fn log_startup_info(config: &EngineConfig) {
    if cfg!(debug_assertions) {
        tracing::debug!("Starting console with full config: {config:#?}");
    } else {
        tracing::debug!("Starting console with the {:?} backend", config.backend);
    }
}

/// Resolves on Ctrl+C or SIGTERM. If no handler can be installed the future
/// never resolves and the session ends through input instead.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
