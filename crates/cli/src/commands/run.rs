//! `run` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use config_loader::ConfigLoader;
use contracts::SafetyConfig;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig, SourceSelection};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    if let Some(path) = &args.config {
        if !path.exists() {
            return Err(CliError::config_not_found(path.display().to_string()).into());
        }
    }
    info!(config = ?args.config, "Loading configuration");

    let mut config = ConfigLoader::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    apply_overrides(&mut config, args)?;
    ConfigLoader::validate(&config).context("Configuration invalid after overrides")?;

    let source = match (args.source.camera, &args.source.file) {
        (Some(index), _) => SourceSelection::Camera(index),
        (None, Some(path)) => SourceSelection::File(path.clone()),
        (None, None) => anyhow::bail!("Either --camera or --file is required"),
    };

    info!(
        camera = %config.source.camera_id,
        lanes = config.lane.lane_count(),
        sinks = config.sinks.iter().filter(|s| s.enabled).count(),
        queue_capacity = config.queue.capacity,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration validated, exiting");
        print_config_summary(&config, &source);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        safety: config,
        source,
        max_frames: (args.max_frames > 0).then_some(args.max_frames),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    let stats = pipeline.run(shutdown_signal()).await?;
    stats.print_summary();

    let undelivered = stats.undelivered();
    if undelivered > 0 {
        warn!(undelivered, "Some events were not delivered to every sink");
    }
    Ok(())
}

/// Apply command-line overrides on top of the loaded file
fn apply_overrides(config: &mut SafetyConfig, args: &RunArgs) -> Result<()> {
    if let Some(index) = args.source.camera {
        config.source.camera_id = ingestion::camera_id(index);
    }

    if let Some(capacity) = args.queue_capacity {
        info!(capacity, "Overriding detection queue capacity");
        config.queue.capacity = capacity;
    }

    for (names, enabled) in [(&args.enable_sinks, true), (&args.disable_sinks, false)] {
        for name in names {
            match config.sinks.iter_mut().find(|s| &s.name == name) {
                Some(sink) => sink.enabled = enabled,
                None => {
                    let known: Vec<&str> = config.sinks.iter().map(|s| s.name.as_str()).collect();
                    return Err(CliError::unknown_sink(name, &known).into());
                }
            }
        }
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
///
/// If a handler cannot be installed the failure is logged and that signal
/// is simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

fn print_config_summary(config: &SafetyConfig, source: &SourceSelection) {
    println!("\n=== Configuration Summary ===");
    println!("Camera: {}", config.source.camera_id);
    match source {
        SourceSelection::Camera(index) => println!("Source: camera {} (stdin)", index),
        SourceSelection::File(path) => println!("Source: {}", path.display()),
    }
    println!(
        "Lanes: {} (boundaries {:?}, headings {:?})",
        config.lane.lane_count(),
        config.lane.effective_boundaries(),
        config.lane.headings_deg
    );
    println!(
        "Queue: capacity {}, send timeout {}ms",
        config.queue.capacity, config.queue.send_timeout_ms
    );
    println!("\nSinks:");
    for sink in &config.sinks {
        println!(
            "  - {} ({:?}){}",
            sink.name,
            sink.sink_type,
            if sink.enabled { "" } else { " [disabled]" }
        );
    }
    println!();
}
