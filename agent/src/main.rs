//! netpulse telemetry agent
//!
//! Samples network-health metrics from a local Prometheus, buffers them in a
//! SQLite file and forwards them to the configured remote sink:
//! 1. Collect: one ping and one speed sample per collect tick
//! 2. Evaluate: flush each kind when its last confirmed sync is too old
//!
//! Usage:
//!   netpulse-agent --config /etc/netpulse/agent.json
//!
//! Records are kept locally until the sink confirms them.

use std::{path::PathBuf, sync::Arc};
use anyhow::{Context, Result};
use clap::Parser;
use netpulse_agent::{build_router, load_or_create_site_id, ApiState, PrometheusCollector, SiteTags};
use netpulse_store::LocalStore;
use netpulse_sync::{build_sink, Relay, RelayConfig, RelayScheduler};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "netpulse-agent")]
#[command(about = "netpulse telemetry agent")]
struct Args {
    /// JSON relay configuration file
    #[arg(short, long, env = "NETPULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Prometheus base URL
    #[arg(long, env = "PROMETHEUS_URL", default_value = "http://localhost:9090")]
    prometheus_url: String,

    /// Human-readable location tag
    #[arg(long, env = "LOCATION")]
    location: Option<String>,

    /// Public IP address tag
    #[arg(long, env = "IP_ADDRESS")]
    ip_address: Option<String>,

    /// File holding this device's site id
    #[arg(long, env = "SITE_ID_FILE", default_value = "/etc/network-monitor/site_id")]
    site_id_file: PathBuf,

    /// Local buffer database (overrides the config file)
    #[arg(long, env = "NETPULSE_DB")]
    database: Option<PathBuf>,

    /// HTTP port for the status API
    #[arg(long, env = "NETPULSE_HTTP_PORT", default_value = "8787")]
    http_port: u16,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("netpulse agent starting...");

    let mut config = match &args.config {
        Some(path) => RelayConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RelayConfig::default(),
    };
    if let Some(db) = args.database.clone() {
        config.database_path = db;
    }
    config.validate().context("Invalid relay configuration")?;

    let site_id = load_or_create_site_id(&args.site_id_file)?;
    info!("Site id: {}", site_id);

    let store = Arc::new(
        LocalStore::open(&config.database_path)
            .context("Failed to open local store")?
            .with_staleness_window(config.staleness_window()),
    );
    let sink = build_sink(&config.sink).context("Failed to build remote sink")?;
    let sink_name = sink.provider_name();

    let relay = Arc::new(
        Relay::new(Arc::clone(&store), sink)
            .with_policy(config.sync_policy())
            .with_retry(config.retry.clone()),
    );

    let collector = Arc::new(
        PrometheusCollector::new(
            args.prometheus_url.clone(),
            SiteTags {
                site_id: site_id.clone(),
                location: args.location.clone(),
                ip_address: args.ip_address.clone(),
            },
        )
        .context("Failed to create Prometheus collector")?,
    );

    // Status API
    let app = build_router(Arc::new(ApiState {
        store: Arc::clone(&store),
        site_id: site_id.clone(),
        sink: sink_name.to_string(),
    }));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.http_port))
        .await
        .context("Failed to bind HTTP port")?;
    let mut http_shutdown = relay.subscribe_shutdown();
    let http = tokio::spawn(async move {
        let stop = async move {
            let _ = http_shutdown.wait_for(|stop| *stop).await;
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(stop).await {
            error!("HTTP server failed: {}", e);
        }
    });
    info!("Status API listening on port {}", args.http_port);

    let scheduler = RelayScheduler::new(Arc::clone(&relay), collector)
        .with_intervals(config.collect_interval(), config.evaluate_interval())
        .start();

    println!("\n========================================");
    println!("  netpulse agent running");
    println!("========================================");
    println!("  Site id:    {}", site_id);
    println!("  Buffer:     {}", config.database_path.display());
    println!("  Sink:       {}", sink_name);
    println!("  Prometheus: {}", args.prometheus_url);
    println!("  HTTP Port:  {}", args.http_port);
    println!("========================================\n");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    scheduler.shutdown().await;
    if let Err(e) = http.await {
        error!("HTTP task ended abnormally: {}", e);
    }

    info!("netpulse agent stopped");
    Ok(())
}
