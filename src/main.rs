//! Binary entrypoint for the photo booth.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use rust_photo_booth::config::Configuration;
use rust_photo_booth::display::LogDisplay;
use rust_photo_booth::events::{BoothEvent, StateCell};
use rust_photo_booth::platform::printer::{LpPrinter, PrintService};
use rust_photo_booth::platform::storage::MountProbe;
use rust_photo_booth::platform::{camera, gpio};
use rust_photo_booth::processing::composite::CompositeBuilder;
use rust_photo_booth::processing::enhance::{ColorEnhancer, EnhanceParams};
use rust_photo_booth::processing::layout::{LayoutParams, compute_strip_layout};
use rust_photo_booth::tasks::capture::CapturePipeline;
use rust_photo_booth::tasks::control::{ControlSocket, force_insert};
use rust_photo_booth::tasks::controller::{Collaborators, SessionController};
use rust_photo_booth::tasks::dispatcher::{Finalizer, PrintDispatcher};
use rust_photo_booth::tasks::monitor;

#[derive(Debug, Parser)]
#[command(
    name = "photo-booth",
    version,
    about = "Coin-operated photo booth session controller"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Increase log verbosity (repeatable); RUST_LOG takes precedence
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
    /// Load and validate the configuration, print it and exit
    #[arg(long = "check-config")]
    check_config: bool,
    /// Print the strip geometry for photos of the given size (e.g. 640x480) and exit
    #[arg(long = "dry-run-layout", value_name = "WIDTHxHEIGHT")]
    dry_run_layout: Option<String>,
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        verbose,
        check_config,
        dry_run_layout,
    } = Args::parse();
    init_tracing(verbose);

    let cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;

    if check_config {
        println!("{cfg:#?}");
        return Ok(());
    }
    if let Some(size) = dry_run_layout {
        return run_layout_dry_run(&cfg, &size);
    }
    tracing::debug!("Loaded configuration from {}:\n{:#?}", config.display(), cfg);

    // Hardware first: without a coin line or a camera there is no booth.
    let coin_line = gpio::open(&cfg.signal).context("failed to acquire coin signal source")?;
    let camera = camera::open(&cfg.camera).context("failed to acquire camera")?;

    let printer = LpPrinter::discover(&cfg.print).map(|p| Arc::new(p) as Arc<dyn PrintService>);
    let finalizer = Finalizer::new(
        CompositeBuilder::new(cfg.composite.clone(), cfg.session.total_shots),
        PrintDispatcher::new(printer, &cfg.print),
    );
    let capture = CapturePipeline::new(
        camera,
        Arc::new(ColorEnhancer),
        EnhanceParams::from(&cfg.enhance),
    );

    let state = StateCell::new();
    let (events_tx, events_rx) = crossbeam_channel::unbounded::<BoothEvent>();
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sigterm.recv() => {
                            tracing::info!("SIGTERM received; initiating shutdown");
                            cancel.cancel();
                        }
                    }
                }
                Err(err) => tracing::warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let state = state.clone();
        let events = events_tx.clone();
        tokio::spawn(async move {
            match signal(SignalKind::user_defined1()) {
                Ok(mut sigusr1) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = sigusr1.recv() => {
                            if received.is_none() {
                                break;
                            }
                            tracing::info!("SIGUSR1 received; forcing insert");
                            force_insert(&state, &events);
                        }
                    }
                },
                Err(err) => tracing::warn!("failed to register SIGUSR1 handler: {err}"),
            }
        });
    }

    match ControlSocket::bind(&cfg.control_socket_path) {
        Ok(socket) => {
            tokio::spawn(socket.run(state.clone(), events_tx.clone(), cancel.clone()));
        }
        Err(err) => tracing::warn!("control socket unavailable: {err:#}"),
    }

    let monitor = monitor::spawn(
        Arc::clone(&coin_line),
        state.clone(),
        events_tx,
        &cfg.signal,
        cancel.clone(),
    )
    .context("failed to start coin monitor")?;

    let controller = tokio::task::spawn_blocking({
        let settings = cfg.session.clone();
        let storage = MountProbe::new(&cfg.storage);
        let coin_line = Arc::clone(&coin_line);
        let cancel = cancel.clone();
        move || {
            let mut controller = SessionController::new(
                settings,
                state,
                Collaborators {
                    signal: coin_line,
                    capture,
                    storage: Box::new(storage),
                    finalizer,
                },
            );
            let mut display = LogDisplay::new();
            controller.run(&events_rx, &mut display, &cancel);
        }
    });

    if let Err(err) = controller.await {
        tracing::error!("controller thread failed: {err}");
    }
    cancel.cancel();
    if monitor.join().is_err() {
        tracing::error!("coin monitor panicked");
    }
    // Last handle: unexports the GPIO pins.
    drop(coin_line);
    tracing::info!("shutdown complete");
    Ok(())
}

fn run_layout_dry_run(cfg: &Configuration, size: &str) -> Result<()> {
    let (width, height) = size
        .split_once(['x', 'X'])
        .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)))
        .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT, got {size:?}"))?;
    let layout = compute_strip_layout(
        width,
        height,
        cfg.session.total_shots,
        &LayoutParams::from(&cfg.composite),
    )
    .context("cannot lay out strip")?;

    println!(
        "# canvas {}x{}, photo {}x{}, spacing {}, margin {}",
        layout.canvas_width,
        layout.canvas_height,
        layout.photo_width,
        layout.photo_height,
        layout.spacing,
        layout.margin
    );
    if let Some(header) = layout.header {
        println!(
            "  header: x={} y={} {}x{}",
            header.x, header.y, header.width, header.height
        );
    }
    for (idx, slot) in layout.slots.iter().enumerate() {
        println!(
            "  {:>2}: x={} y={} {}x{}",
            idx + 1,
            slot.x,
            slot.y,
            slot.width,
            slot.height
        );
    }
    Ok(())
}
