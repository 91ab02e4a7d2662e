//! Ward - policy sync sidecar
//!
//! Dials the node agent, mirrors its policy state into memory and runs until
//! SIGINT or until the sync ends. Any end other than a requested shutdown is
//! a non-zero exit so the supervisor restarts the sidecar.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ward::store::{PolicyStore, ReadGate};
use ward::sync::{SyncClient, SyncClientConfig, SyncExit, DEFAULT_DIAL_TARGET};
use ward::telemetry::{init_telemetry, TelemetryConfig};

/// Ward - local policy cache fed by the node agent's policy sync API
#[derive(Parser, Debug)]
#[command(name = "ward", version, about, long_about = None)]
struct Cli {
    /// Policy sync server to dial (`unix:///path` or `http://host:port`)
    #[arg(long = "dial", env = "WARD_DIAL_TARGET", default_value = DEFAULT_DIAL_TARGET)]
    dial: String,

    /// Timeout for establishing the connection, in seconds
    #[arg(long, env = "WARD_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    connect_timeout_secs: u64,

    /// Refuse reads until the initial replay has completed
    #[arg(long, env = "WARD_REQUIRE_IN_SYNC")]
    require_in_sync: bool,

    /// Emit JSON structured logs
    #[arg(long, env = "WARD_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn gate(&self) -> ReadGate {
        if self.require_in_sync {
            ReadGate::AwaitInSync
        } else {
            ReadGate::Open
        }
    }

    fn sync_config(&self) -> SyncClientConfig {
        SyncClientConfig {
            target: self.dial.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        service_name: "ward".to_string(),
        json: cli.log_json,
    })?;

    let store = Arc::new(PolicyStore::new(cli.gate()));
    let client = SyncClient::new(cli.sync_config());
    let cancel = CancellationToken::new();

    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), cancel.clone()));

    info!(dial_target = %cli.dial, gate = ?store.gate(), "Starting policy sync");
    let result = client.sync(&store, cancel).await;

    match store.read(|state| state.summary()).await {
        Ok(summary) => info!(?summary, "Final policy state"),
        Err(e) => warn!(error = %e, "Policy state never became readable"),
    }

    match result {
        Ok(SyncExit::Cancelled) => {
            info!("Policy sync stopped");
            Ok(())
        }
        Ok(SyncExit::StreamEnded) => Err(anyhow::anyhow!(
            "policy sync server closed the stream"
        )),
        Err(e) => Err(anyhow::anyhow!("policy sync failed: {}", e)),
    }
}

/// Cancel `shutdown` when `signal` fires.
///
/// A signal that can't be installed leaves the sync running.
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received shutdown signal");
            shutdown.cancel();
        }
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
