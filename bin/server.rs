// Branch Registry - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use branch_registry::api::router;
use branch_registry::{
    init_tracing, BranchRegistry, FileSelectionStore, LogToasts, NotificationBus, RegistryConfig,
    SqliteGateway,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = RegistryConfig::discover()?;
    init_tracing(&config.log_filter);

    info!("🌐 Branch Registry - Web Server v{}", branch_registry::VERSION);

    // Open database
    let gateway = SqliteGateway::open(&config.database_path)?;
    info!("✓ Database opened: {}", config.database_path.display());

    let store = FileSelectionStore::open(&config.selection_path);
    info!("✓ Selection file: {}", store.path().display());
    let bus = Arc::new(NotificationBus::new());
    bus.subscribe(|event| info!("Branch changed to {} at {}", event.branch_id, event.timestamp));

    let registry = BranchRegistry::from_config(&config, Arc::new(gateway), Arc::new(store), bus)
        .with_toasts(Arc::new(LogToasts));
    let registry = Arc::new(registry);

    let branches = registry.load().await;
    info!("✓ Loaded {} branches", branches.len());

    let app = router(registry);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server_addr))?;

    info!("🚀 Server running on http://{}", config.server_addr);
    info!("   API: http://{}/api/branches", config.server_addr);

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
