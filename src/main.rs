use std::net::SocketAddr;
use std::time::Duration;
use storage_cluster::config::NodeConfig;
use storage_cluster::membership::table::MembershipTable;
use storage_cluster::membership::types::Member;
use storage_cluster::node::handlers::router;
use storage_cluster::node::service::StorageNodeService;
use storage_cluster::node::store::LocalStore;
use storage_cluster::storage::client::{HttpNodeClient, StorageNodeClient};
use storage_cluster::storage::protocol::GossipMessage;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    tracing::info!("Starting storage node {}", config.node_id);
    tracing::info!("Data directory: {}", config.data_dir.display());

    // 1. Local object store:
    let store = LocalStore::open(&config.data_dir, config.lock_stripes).await?;
    tracing::info!("Opened local store ({} lock stripes)", store.lock_stripes());

    // 2. Membership view:
    let local = Member::alive(config.node_id.clone(), config.advertise.clone());
    let membership = MembershipTable::new(local.clone());

    // 3. Node service:
    let service = StorageNodeService::new(store, membership.clone());

    // 4. Announce to seeds:
    if config.seeds.is_empty() {
        tracing::info!("No seeds configured, starting as first node");
    }
    for seed in &config.seeds {
        let client = HttpNodeClient::new(seed);
        let message = GossipMessage {
            from: local.clone(),
            members: membership.members(),
        };
        match client.gossip(&message).await {
            Ok(resp) => {
                let learned = membership.merge_all(resp.members);
                tracing::info!("Joined via seed {} ({} member(s) learned)", seed, learned);
            }
            Err(e) => tracing::warn!("Seed {} unreachable: {}", seed, e),
        }
    }

    // 5. Spawn stats reporter:
    let stats_membership = membership.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_INTERVAL);

        loop {
            interval.tick().await;
            let alive = stats_membership.alive_members();
            tracing::info!("Cluster stats: {} alive nodes", alive.len());
            for member in alive {
                tracing::debug!(
                    "  - {} addr={} (inc={})",
                    member.id,
                    member.addr,
                    member.incarnation
                );
            }
        }
    });

    // 6. Start HTTP server:
    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(service);

    tracing::info!("Storage node listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Storage node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
