//! `hanp_to_iri_converter` – process entry point.
//!
//! 1. Initialises tracing (see `segbridge_node::telemetry`).
//! 2. Loads `~/.segbridge/config.toml`, or the file given as the first
//!    argument, plus `SEGBRIDGE_*` overrides.
//! 3. Wires a [`ConverterNode`] and a [`RosbridgeClient`] on one event bus.
//! 4. Runs both until Ctrl-C, or until the transport fails.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use segbridge_middleware::{EventBus, RosbridgeClient};
use segbridge_node::ConverterNode;
use segbridge_node::node::NODE_NAME;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

fn main() -> ExitCode {
    let _guard = segbridge_node::init_tracing(NODE_NAME);
    debug!("started {NODE_NAME} node");

    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let cfg = match config::load(explicit.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = cfg.validate() {
        error!(error = %e, "invalid configuration");
        return ExitCode::FAILURE;
    }
    debug!(config = ?cfg, "configuration loaded");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "cannot start tokio runtime");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(cfg))
}

async fn run(cfg: config::Config) -> ExitCode {
    let bus = EventBus::new();
    let node_config = cfg.node_config();
    let node = ConverterNode::initialize(node_config.clone(), bus.clone());
    let client = RosbridgeClient::new(cfg.rosbridge_config(&node_config), bus.clone());

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let stop = node.stop_handle();
    let ctrlc_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        debug!("{NODE_NAME}: node will now shutdown");
        ctrlc_stop.stop();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; shutdown on Ctrl-C unavailable");
    }

    let mut node_task = tokio::spawn(node.run());
    let mut transport_task = tokio::spawn(client.run(stop.signal()));

    // Whichever side ends first takes the other one down with it.
    let (processed, transport) = tokio::select! {
        transport = &mut transport_task => {
            stop.stop();
            (node_task.await, transport)
        }
        processed = &mut node_task => {
            stop.stop();
            (processed, transport_task.await)
        }
    };
    bus.close();

    report(processed, transport)
}

fn report(
    processed: Result<u64, JoinError>,
    transport: Result<Result<(), segbridge_types::BridgeError>, JoinError>,
) -> ExitCode {
    match processed {
        Ok(n) => info!(batches = n, "{NODE_NAME} stopped"),
        Err(e) => error!(error = %e, "converter task panicked"),
    }
    match transport {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!(error = %e, "transport failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "transport task panicked");
            ExitCode::FAILURE
        }
    }
}
