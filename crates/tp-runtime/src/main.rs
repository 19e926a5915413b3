//! Transaction processor executable.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tp_processor::{ProcessorConfig, ShutdownHandle, TransactionProcessor};
use tp_runtime::cli::Args;
use tp_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let telemetry = TelemetryConfig::from_env().with_verbosity(args.verbose);
    init_telemetry(&telemetry).context("failed to initialize telemetry")?;

    // Flags override environment, environment overrides defaults.
    let config = args.apply(ProcessorConfig::from_env());
    config.validate().context("invalid configuration")?;

    let processor = Arc::new(TransactionProcessor::new(config));
    register_families(&processor)?;

    tokio::spawn(stop_on_signal(processor.shutdown_handle()));

    info!(
        endpoint = %processor.config().endpoint,
        version = env!("CARGO_PKG_VERSION"),
        "Starting transaction processor"
    );
    let result = processor.run().await;

    if let Ok(metrics) = encode_metrics() {
        debug!(metrics = %metrics, "Final metrics");
    }
    result.context("transaction processor failed")
}

fn register_families(processor: &TransactionProcessor) -> Result<()> {
    #[cfg(feature = "intkey")]
    processor
        .register_handler(Arc::new(tp_runtime::intkey::IntkeyHandler::new()))
        .context("failed to register intkey handler")?;

    #[cfg(not(feature = "intkey"))]
    let _ = processor;

    Ok(())
}

async fn stop_on_signal(shutdown: ShutdownHandle) {
    wait_for_signal().await;
    info!("Shutdown signal received");
    shutdown.shutdown();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl+C will stop the processor");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
