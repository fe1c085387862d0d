//! chainwatch CLI: follow a node's slot stream and report drift against RPC.
//!
//! Usage:
//! ```bash
//! # Watch the stream until Ctrl-C
//! RPC_URL_PATH=https://example.rpcpool.com/ RPC_TOKEN=... chainwatch run
//!
//! # Poll the reference once and print its slot
//! chainwatch check
//! ```

mod logging;

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use chainwatch_core::policy::RetryPolicy;
use chainwatch_core::{
    shutdown, DriftMonitor, PayloadHandler, SharedMarker, ShutdownTrigger, SlotSource,
    StreamWatcher, WatchConfig, WatchError,
};
use chainwatch_http::{HttpClientConfig, HttpSlotClient};
use chainwatch_ws::{stream_url, WsStreamSource};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("run");

    match command {
        "run" | "check" => {}
        "version" | "--version" | "-V" => {
            println!("chainwatch {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        "help" | "--help" | "-h" => {
            print_usage();
            return;
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }

    // configuration problems are fatal before anything is spawned
    let config = match WatchConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    logging::init_tracing(&config.log);

    let result = match command {
        "check" => cmd_check(&config).await,
        _ => cmd_run(&config).await,
    };

    if let Err(e) = result {
        error!(error = %e, "chainwatch failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

type WatcherTask = JoinHandle<Result<(), WatchError>>;

/// Fire shutdown and join both loops, then report the first failure. The
/// tasks are always joined, even when the Ctrl-C listener itself failed.
async fn stop_loops(
    trigger: &ShutdownTrigger,
    early: Option<Result<Result<(), WatchError>, JoinError>>,
    watcher_task: WatcherTask,
    monitor_task: JoinHandle<()>,
    signal_result: std::io::Result<()>,
) -> anyhow::Result<()> {
    trigger.trigger();
    let watcher_result = match early {
        Some(res) => res,
        None => watcher_task.await,
    };
    monitor_task.await.context("drift monitor task panicked")?;
    watcher_result.context("stream watcher task panicked")??;
    signal_result.context("listening for Ctrl-C")?;
    Ok(())
}

fn print_usage() {
    println!("chainwatch {}", env!("CARGO_PKG_VERSION"));
    println!("Follow a node's slot stream and report drift against its RPC endpoint\n");
    println!("USAGE:");
    println!("    chainwatch [COMMAND]\n");
    println!("COMMANDS:");
    println!("    run        Watch the stream and monitor drift until Ctrl-C (default)");
    println!("    check      Poll the RPC reference once and print the slot");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("ENVIRONMENT:");
    println!("    RPC_URL_PATH                  Node endpoint URL  [required]");
    println!("    RPC_TOKEN                     Access token       [required]");
    println!("    CHAINWATCH_RECONNECT_SECS     Delay between stream sessions (default 5)");
    println!("    CHAINWATCH_POLL_SECS          Drift poll interval (default 5)");
    println!("    CHAINWATCH_COMMITMENT         processed | confirmed | finalized");
    println!("    CHAINWATCH_ACCOUNT_INCLUDE    Comma-separated account filters");
    println!("    CHAINWATCH_ACCOUNT_EXCLUDE");
    println!("    CHAINWATCH_ACCOUNT_REQUIRED");
    println!("    CHAINWATCH_MAX_MESSAGE_BYTES  Stream message cap (default 64 MiB)");
    println!("    CHAINWATCH_LOG                Log filter (default info)");
    println!("    CHAINWATCH_LOG_JSON           Emit JSON logs when true");
}

/// Logs every transaction payload at debug level.
struct LogPayloadHandler;

#[async_trait]
impl PayloadHandler for LogPayloadHandler {
    async fn on_transaction(&self, slot: u64, payload: &Value) {
        debug!(slot, %payload, "transaction");
    }
}

fn reference_client(config: &WatchConfig) -> anyhow::Result<HttpSlotClient> {
    HttpSlotClient::new(config.rpc_url(), HttpClientConfig::default())
        .context("building RPC client")
}

async fn cmd_check(config: &WatchConfig) -> anyhow::Result<()> {
    let client = reference_client(config)?;
    let slot = client
        .current_slot(config.commitment)
        .await
        .context("polling RPC reference")?;
    println!("{} slot at {}: {slot}", client.endpoint(), config.commitment);
    Ok(())
}

async fn cmd_run(config: &WatchConfig) -> anyhow::Result<()> {
    let marker = SharedMarker::new();

    let source = Arc::new(
        WsStreamSource::new(stream_url(&config.endpoint), config.token.clone())
            .with_max_message_bytes(config.max_message_bytes),
    );
    let watcher = Arc::new(
        StreamWatcher::new(source, config.subscribe_request(), marker.clone())
            .with_retry_policy(RetryPolicy::new(config.retry_config()))
            .with_payload_handler(Arc::new(LogPayloadHandler)),
    );

    let monitor = Arc::new(
        DriftMonitor::new(Arc::new(reference_client(config)?), marker)
            .with_commitment(config.commitment)
            .with_interval(config.poll_interval()),
    );

    info!(
        endpoint = %config.endpoint,
        commitment = %config.commitment,
        reconnect_secs = config.reconnect_interval_secs,
        poll_secs = config.poll_interval_secs,
        "chainwatch starting"
    );

    let (trigger, signal) = shutdown::channel();
    let mut watcher_task = tokio::spawn({
        let watcher = watcher.clone();
        let signal = signal.clone();
        async move { watcher.run(signal).await }
    });
    let monitor_task = tokio::spawn({
        let monitor = monitor.clone();
        async move { monitor.run(signal).await }
    });

    // The watcher only returns early when a retry cap is configured and hit.
    let mut signal_result = Ok(());
    let early = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            match &res {
                Ok(()) => info!("shutdown requested"),
                Err(e) => error!(error = %e, "failed to listen for Ctrl-C, shutting down"),
            }
            signal_result = res;
            None
        }
        res = &mut watcher_task => Some(res),
    };

    stop_loops(&trigger, early, watcher_task, monitor_task, signal_result).await?;

    let stats = watcher.stats();
    info!(
        sessions = stats.sessions_established,
        markers = stats.markers_written,
        events = stats.events,
        "chainwatch stopped"
    );
    Ok(())
}
