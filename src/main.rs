use tracing::{info, warn};

use tablebook::config::Config;
use tablebook::tenant::TenantManager;

/// Offline maintenance: replay every tenant WAL in the data directory, report
/// what it holds, and compact it.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    tablebook::observability::init(config.metrics_port)?;
    std::fs::create_dir_all(&config.data_dir)?;

    info!("tablebook maintenance");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  compact_threshold: {}", config.compact_threshold);

    let tenant_manager = TenantManager::from_config(&config);
    let tenants = tenant_manager.known_tenants()?;
    info!("found {} tenant WAL files", tenants.len());

    for tenant in tenants {
        let engine = match tenant_manager.get_or_create(tenant) {
            Ok(engine) => engine,
            Err(e) => {
                warn!("tenant {tenant}: cannot open WAL: {e}");
                continue;
            }
        };
        for branch in engine.list_branches().await {
            info!(
                "tenant {tenant} branch {} ({}): {} tables, {} reservations",
                branch.id,
                branch.name.as_deref().unwrap_or("unnamed"),
                branch.table_count,
                branch.reservation_count
            );
        }
        let records = engine.compact().await?;
        info!("tenant {tenant}: {records} records after compaction");
    }

    info!("tablebook maintenance done");
    Ok(())
}
