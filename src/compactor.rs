use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::Engine;

/// Background task that compacts the tenant's WAL once enough records piled up.
/// Exits when the WAL writer is gone.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let appended = match engine.appends_since_compact().await {
            Ok(n) => n,
            Err(e) => {
                debug!("compactor for tenant {} stopping: {e}", engine.tenant_id);
                return;
            }
        };
        if appended < threshold {
            continue;
        }
        if let Err(e) = engine.compact().await {
            warn!("compaction failed for tenant {}: {e}", engine.tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use crate::wal::Wal;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("tablebook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_after_threshold() {
        let path = test_wal_path("compactor_threshold.wal");
        let engine = Arc::new(
            Engine::new(TenantId::new(), path.clone(), Arc::new(NotifyHub::new())).unwrap(),
        );
        let branch = BranchId::new();
        engine.create_branch(branch, None).await.unwrap();
        let table = Table::new(TableId::new(), "A1", 4, false);
        engine.add_table(branch, table.clone()).await.unwrap();
        for _ in 0..5 {
            engine.set_table_out_of_service(branch, table.id, true).await.unwrap();
            engine.set_table_out_of_service(branch, table.id, false).await.unwrap();
        }
        assert_eq!(engine.appends_since_compact().await.unwrap(), 12);

        let task = tokio::spawn(run_compactor(engine.clone(), 10, Duration::from_millis(10)));
        let mut compacted = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if engine.appends_since_compact().await.unwrap() == 0 {
                compacted = true;
                break;
            }
        }
        task.abort();
        assert!(compacted, "compactor never ran");
        // Branch + table.
        assert_eq!(Wal::replay(&path).unwrap().len(), 2);
    }
}
