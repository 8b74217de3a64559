use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use idlecraft::config::Config;
use idlecraft::monitor::IdleMonitor;
use idlecraft::system::{Ec2InstanceHandle, SystemProcessProbe};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(
        host = %config.host,
        port = config.port,
        interval_secs = config.check_interval_secs,
        idle_threshold_secs = config.idle_threshold_secs,
        variant = ?config.ping_protocol,
        "starting idle monitor"
    );

    let instance = Ec2InstanceHandle {
        instance_id: config.instance_id.clone(),
    };
    let monitor = IdleMonitor::new(config, SystemProcessProbe, instance);

    // Ctrl-c drops the monitor future at its current suspension point; any
    // in-flight RCON exchange is abandoned with its socket, never left
    // half-authenticated.
    tokio::select! {
        result = monitor.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down monitor");
            Ok(())
        }
    }
}
