//! # Karma-Gate Gateway
//!
//! The executable entry point.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging and register metrics
//! 2. Load configuration from the environment
//! 3. Validate the shared secret (an ephemeral one is generated when unset)
//! 4. Start the gateway (the stored audit chain is verified here)
//! 5. Serve JSON-lines commands on stdin until EOF or Ctrl+C
//!
//! Responses and outbound ack requests for Core are written to stdout, one
//! JSON object per line. Logs go to stderr.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use gateway_runtime::{CommandHandler, ConfigError, GatewayConfig, TrustGateway};
use gateway_telemetry::{init_logging, register_metrics, TelemetryConfig};
use serde_json::json;
use shared_bus::{ChannelGateway, EventFilter, EventTopic};
use shared_types::SharedSecret;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Output lines buffered before command tasks wait on stdout.
const OUTPUT_BUFFER: usize = 1024;

/// Load configuration and resolve the shared secret.
fn load_config() -> Result<GatewayConfig> {
    let mut config = GatewayConfig::from_env().context("invalid gateway configuration")?;

    match config.validate_for_production() {
        Ok(()) => info!("Loaded shared secret from environment"),
        Err(ConfigError::MissingSecret) => {
            warn!("KG_SHARED_SECRET not set; using an ephemeral secret for this process");
            config.shared_secret = Some(SharedSecret::generate());
        }
        Err(e) => bail!(e),
    }
    Ok(config)
}

/// Print every ack request so Core can answer with a `decision` command.
fn spawn_core_forwarder(
    gateway: &TrustGateway,
    output: mpsc::Sender<String>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let mut requests = gateway
        .channel()
        .subscribe(EventFilter::topics(vec![EventTopic::AckRequests]));
    tokio::spawn(async move {
        loop {
            tokio::select! {
                delivered = requests.recv() => {
                    let Some(delivered) = delivered else { break };
                    let line = json!({ "event": delivered.event.to_wire() }).to_string();
                    if output.send(line).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Core forwarder stopped");
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_logging(&telemetry)?;
    register_metrics()?;

    let config = load_config()?;
    let gateway = Arc::new(TrustGateway::start(config).context("failed to start gateway")?);
    let handler = CommandHandler::new(Arc::clone(&gateway));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (output_tx, mut output_rx) = mpsc::channel::<String>(OUTPUT_BUFFER);

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = output_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                error!("stdout closed");
                break;
            }
        }
    });
    let forwarder = spawn_core_forwarder(&gateway, output_tx.clone(), shutdown_rx);

    info!(
        channel = %gateway.channel().channel_id(),
        state = ?gateway.state(),
        "Gateway is running. Reading commands from stdin, Ctrl+C to stop."
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let handler = handler.clone();
                        let output = output_tx.clone();
                        tokio::spawn(async move {
                            let response = handler.handle_line(&line).await;
                            let _ = output.send(response.to_line()).await;
                        });
                    }
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if let Err(e) = shutdown_tx.send(true) {
        error!("Failed to send shutdown signal: {}", e);
    }
    let _ = forwarder.await;
    drop(output_tx);
    drop(handler);

    match Arc::try_unwrap(gateway) {
        Ok(gateway) => {
            gateway.shutdown().await;
            let _ = printer.await;
        }
        Err(gateway) => warn!(
            pending = gateway.gate().pending_count(),
            "Commands still in flight at shutdown"
        ),
    }

    info!("Shutdown complete");
    Ok(())
}
