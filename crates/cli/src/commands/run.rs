//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cli::RunArgs;
use crate::session::{Session, SessionConfig};

use super::load_blueprint;

/// Execute the `run` command
pub async fn run_session(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let blueprint = load_blueprint(&args.config, args.store.as_ref())?;

    info!(
        store = %blueprint.store.path.display(),
        max_queue_size = blueprint.store.max_queue_size,
        dispatchers = blueprint.dispatchers.len(),
        barriers = blueprint.barriers.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let session = Session::new(SessionConfig {
        blueprint,
        input: args.input.clone(),
        drain_timeout: Duration::from_secs(args.drain_timeout),
        metrics_port: (args.metrics_port != 0).then_some(args.metrics_port),
    });

    let timeout = async {
        match args.timeout {
            0 => std::future::pending::<()>().await,
            secs => tokio::time::sleep(Duration::from_secs(secs)).await,
        }
    };

    info!("Starting session...");

    // Queued Dispatches survive an interrupted session
    tokio::select! {
        result = session.run() => {
            let stats = result.context("Session failed")?;
            info!(
                events_tracked = stats.events_tracked,
                pending_at_exit = stats.pending_at_exit,
                duration_secs = stats.duration.as_secs_f64(),
                events_per_sec = format!("{:.2}", stats.events_per_sec()),
                "Session completed"
            );
            stats.print_summary();
        }
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping session...");
        }
        _ = timeout => {
            warn!(timeout_secs = args.timeout, "Session timed out");
        }
    }

    info!("Beacon finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::SdkBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Store:");
    println!("  Path: {}", blueprint.store.path.display());
    println!("  Max queue size: {}", blueprint.store.max_queue_size);
    println!("  Expiration: {}s", blueprint.store.expiration_secs);
    println!("  Max in flight: {}", blueprint.coordinator.max_in_flight);
    println!("  Connectivity: {:?}", blueprint.connectivity.mode);

    println!("\nDispatchers ({}):", blueprint.dispatchers.len());
    for dispatcher in &blueprint.dispatchers {
        println!(
            "  - {} ({:?}, limit {})",
            dispatcher.name, dispatcher.kind, dispatcher.dispatch_limit
        );
    }

    if !blueprint.barriers.is_empty() {
        println!("\nBarriers ({}):", blueprint.barriers.len());
        for barrier in &blueprint.barriers {
            match &barrier.scopes {
                Some(scopes) => println!("  - {} scopes={:?}", barrier.id, scopes),
                None => println!("  - {}", barrier.id),
            }
        }
    }

    println!();
}
