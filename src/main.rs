use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ringchat::config::Config;
use ringchat::net::transport::TcpPeerTransport;
use ringchat::ring::types::NodeInfo;
use ringchat::server::context::ChatServer;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    // 1. Per-node data directory tree. An opaque durability target: created
    //    here, never formatted by the core.
    let node_dir = config.data_dir.join(config.id.to_string());
    std::fs::create_dir_all(node_dir.join("users"))?;
    std::fs::create_dir_all(node_dir.join("chats"))?;

    // 2. Bind before joining: the ring calls this node back during its own
    //    integration.
    let listener = TcpListener::bind(config.bind).await?;
    let local = NodeInfo::new(config.id, listener.local_addr()?);
    tracing::info!("starting {} with {} workers", local, config.max_workers);

    let server = ChatServer::new(local, Arc::new(TcpPeerTransport), config.max_workers);
    let accept = tokio::spawn(server.clone().run(listener));

    // 3. Enter the ring, or found a new one.
    if let Some(seed) = config.seed {
        if let Err(err) = server.join(seed).await {
            tracing::error!("could not join the ring through {}: {}", seed, err);
            return Err(err.into());
        }
    } else {
        tracing::info!("no seed given; founding a new ring");
    }

    // 4. Periodic ring status report.
    let stats_server = server.clone();
    let stats_interval = config.stats_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
        loop {
            interval.tick().await;
            let status = stats_server.status().await;
            tracing::info!(
                "ring status: state={} predecessor={:?} successor={} users={} backups={} sessions={}",
                status.state,
                status.predecessor,
                status.successor,
                status.primary_users,
                status.backup_users,
                status.live_sessions
            );
        }
    });

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::select! {
        result = accept => result??,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
    Ok(())
}
