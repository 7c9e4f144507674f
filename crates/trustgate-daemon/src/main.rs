// crates/trustgate-daemon/src/main.rs
//
// Binary entrypoint for the TrustGate broker daemon.
//
// Initializes tracing, parses CLI arguments, loads configuration, builds the
// initial trust snapshot and the admission gate, spawns the periodic refresh
// loop, and serves the line-protocol ingress until shutdown.

mod config;
mod feedback;
mod ingress;
mod scheduler;
mod shared;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use config::DaemonConfig;
use feedback::FeedbackPublisher;
use shared::{DaemonPaths, DaemonSharedState};

use trustgate_admission::AdmissionGate;
use trustgate_core::{BrokerId, MessageAuthenticator};
use trustgate_reputation::SnapshotCell;
use trustgate_store::ReputationStore;
use trustgate_verify::{load_acl_file, SignerChainVerifier};

/// TrustGate daemon: verifies signer chains and maintains broker reputation.
#[derive(Parser, Debug)]
#[command(name = "trustgate-daemon", version = "0.1.0", about = "TrustGate broker daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.trustgate/config.toml")]
    config: String,

    /// Override the configured broker id.
    #[arg(long)]
    broker_id: Option<String>,

    /// Override the configured ingress address.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration from TOML file, falling back to defaults if the file
    // is not found. Logged once tracing is up.
    let config_path = expand_tilde(&args.config);
    let loaded = DaemonConfig::load(&config_path);
    let mut daemon_config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => DaemonConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&daemon_config.log_level)),
        )
        .init();

    match loaded {
        Ok(_) => tracing::info!("Loaded configuration from {}", config_path),
        Err(e) => tracing::warn!(
            "Could not load config from {}: {}. Using defaults.",
            config_path,
            e
        ),
    }

    // CLI flags override the config file values.
    if let Some(id) = args.broker_id {
        daemon_config.broker_id = id;
    }
    if let Some(listen) = args.listen {
        daemon_config.listen_addr = listen;
    }

    daemon_config.validate()?;

    let broker_id = BrokerId::new(daemon_config.broker_id.as_str());
    if !broker_id.is_well_formed() {
        return Err(format!("Invalid broker id: {:?}", daemon_config.broker_id).into());
    }

    let paths = DaemonPaths {
        topology: PathBuf::from(expand_tilde(&daemon_config.topology_path)),
        store_dir: PathBuf::from(expand_tilde(&daemon_config.store_dir)),
        network_map: PathBuf::from(expand_tilde(&daemon_config.network_map_path)),
    };

    tracing::info!("TrustGate Daemon v0.1.0");
    tracing::info!("Broker: {}", broker_id);
    tracing::info!("Topology: {}", paths.topology.display());
    tracing::info!("Store directory: {}", paths.store_dir.display());
    tracing::info!("Network map: {}", paths.network_map.display());
    tracing::info!(
        "Policy: {}, max chain length: {}, threshold: {}",
        daemon_config.policy,
        daemon_config.max_chain_length,
        daemon_config.trust_threshold
    );

    // ---------------------------------------------------------------
    // Authentication and verification.
    // ---------------------------------------------------------------
    if daemon_config.shared_secret.is_empty() {
        return Err("shared_secret must be set in the configuration".into());
    }
    let authenticator = MessageAuthenticator::new(daemon_config.shared_secret.as_bytes())?;

    let acl = match &daemon_config.acl_path {
        Some(path) => {
            let table = load_acl_file(&PathBuf::from(expand_tilde(path)))?;
            tracing::info!("Loaded {} ACL rules from {}", table.len(), path);
            Some(table)
        }
        None => None,
    };
    let verifier = SignerChainVerifier::new(daemon_config.verifier_config(acl))?;
    if daemon_config.authorized_clients.is_empty() {
        tracing::warn!("No authorized clients configured; every message will be rejected");
    }

    // ---------------------------------------------------------------
    // Reputation state and the first snapshot.
    // ---------------------------------------------------------------
    let store = ReputationStore::open(&paths.store_dir, broker_id.clone())?;
    tracing::info!("Reputation store at {}", store.path().display());

    let graph = scheduler::initial_graph(
        &paths.network_map,
        &paths.topology,
        &store,
        daemon_config.base_rate_delta,
    );
    tracing::info!("Initial trust graph: {} edges", graph.edge_count());
    let snapshots = Arc::new(SnapshotCell::new(graph, daemon_config.evaluator_cache_capacity));

    let gate = AdmissionGate::new(
        authenticator,
        verifier,
        Arc::clone(&snapshots),
        &daemon_config.admission_config(),
    )?;

    let shared_state = DaemonSharedState {
        broker_id,
        paths,
        delta: daemon_config.base_rate_delta,
        snapshots,
        gate: Arc::new(gate),
        store: Arc::new(tokio::sync::Mutex::new(store)),
        feedback_topic: daemon_config.feedback_topic.clone(),
        negative_multiplier: daemon_config.negative_multiplier,
        feedback_publisher: Arc::new(FeedbackPublisher::new(Duration::from_millis(
            daemon_config.feedback_publish_interval_ms,
        ))),
        start_time: Instant::now(),
    };

    // Spawn the refresh loop.
    let refresh_state = shared_state.clone();
    let interval = daemon_config.aggregation_interval_secs;
    let run_aggregator = daemon_config.run_aggregator;
    tokio::spawn(async move {
        scheduler::run_refresh_loop(refresh_state, interval, run_aggregator).await;
    });

    // Serve ingress in the foreground until shutdown.
    let listener = tokio::net::TcpListener::bind(&daemon_config.listen_addr).await?;
    tokio::select! {
        result = ingress::serve(listener, shared_state.clone()) => {
            if let Err(e) = result {
                tracing::error!("Ingress error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    tracing::info!(
        "Admitted {} frames in {:?}; outcomes: {:?}",
        shared_state.gate.admitted_total(),
        shared_state.start_time.elapsed(),
        shared_state.gate.outcome_counts()
    );
    tracing::info!("TrustGate daemon shut down gracefully");

    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/etc/trustgate.toml"), "/etc/trustgate.toml");
        assert_eq!(expand_tilde("relative/x"), "relative/x");
    }

    #[test]
    fn expand_tilde_uses_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_tilde("~/.trustgate/map.txt"),
                format!("{}/.trustgate/map.txt", home.display())
            );
        }
    }

    #[test]
    fn args_accept_overrides() {
        let args = Args::parse_from(["trustgate-daemon", "--broker-id", "B4", "--listen", "0.0.0.0:9000"]);
        assert_eq!(args.broker_id.as_deref(), Some("B4"));
        assert_eq!(args.listen.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(args.config, "~/.trustgate/config.toml");
    }
}
