use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;
use ulid::Ulid;

use crate::compactor;
use crate::config::Config;
use crate::engine::Engine;
use crate::limits::*;
use crate::model::TenantId;
use crate::notify::NotifyHub;

/// Per-tenant engines. Each tenant gets its own Engine, WAL file and compactor.
pub struct TenantManager {
    engines: DashMap<TenantId, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    compact_interval: Duration,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, compact_interval: Duration) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            compact_interval,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.data_dir.clone(),
            config.compact_threshold,
            config.compact_interval,
        )
    }

    pub fn wal_path(&self, tenant: TenantId) -> PathBuf {
        self.data_dir.join(format!("{tenant}.wal"))
    }

    /// Get or lazily create the engine for `tenant`. Must run inside a Tokio runtime.
    pub fn get_or_create(&self, tenant: TenantId) -> io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(&tenant) {
            return Ok(engine.value().clone());
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(io::Error::other("too many tenants"));
        }

        // Hold the entry so two callers never open the same WAL twice.
        let engine = match self.engines.entry(tenant) {
            Entry::Occupied(e) => return Ok(e.get().clone()),
            Entry::Vacant(slot) => {
                let notify = Arc::new(NotifyHub::new());
                let engine = Arc::new(Engine::new(tenant, self.wal_path(tenant), notify)?);
                slot.insert(engine.clone());
                engine
            }
        };

        tokio::spawn(compactor::run_compactor(
            engine.clone(),
            self.compact_threshold,
            self.compact_interval,
        ));
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        info!("tenant {tenant} loaded");
        Ok(engine)
    }

    /// Tenants that already have a WAL file in the data directory.
    pub fn known_tenants(&self) -> io::Result<Vec<TenantId>> {
        let mut tenants = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "wal") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Ulid::from_str(s).ok())
            {
                tenants.push(TenantId(id));
            }
        }
        tenants.sort();
        Ok(tenants)
    }

    pub fn loaded(&self) -> usize {
        self.engines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use crate::model::*;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("tablebook_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn manager(dir: PathBuf) -> TenantManager {
        TenantManager::new(dir, 1000, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let tm = manager(test_data_dir("isolation"));
        let eng_a = tm.get_or_create(TenantId::new()).unwrap();
        let eng_b = tm.get_or_create(TenantId::new()).unwrap();

        let branch = BranchId::new();
        eng_a.create_branch(branch, None).await.unwrap();
        eng_b.create_branch(branch, None).await.unwrap();
        eng_a
            .add_table(branch, Table::new(TableId::new(), "A1", 4, false))
            .await
            .unwrap();

        assert_eq!(eng_a.list_tables(branch).await.unwrap().len(), 1);
        assert!(eng_b.list_tables(branch).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tenant_lazy_creation() {
        let dir = test_data_dir("lazy");
        let tm = manager(dir.clone());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        let tenant = TenantId::new();
        let _eng = tm.get_or_create(tenant).unwrap();
        assert!(dir.join(format!("{tenant}.wal")).exists());
        assert_eq!(tm.known_tenants().unwrap(), vec![tenant]);
    }

    #[tokio::test]
    async fn tenant_same_engine_returned() {
        let tm = manager(test_data_dir("same_eng"));
        let tenant = TenantId::new();
        let eng1 = tm.get_or_create(tenant).unwrap();
        let eng2 = tm.get_or_create(tenant).unwrap();
        assert!(Arc::ptr_eq(&eng1, &eng2));
        assert_eq!(tm.loaded(), 1);
    }

    #[tokio::test]
    async fn known_tenants_ignores_other_files() {
        let dir = test_data_dir("known");
        fs::write(dir.join("notes.txt"), b"hi").unwrap();
        fs::write(dir.join("not-a-ulid.wal"), b"").unwrap();
        let tm = manager(dir);
        assert!(tm.known_tenants().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tenant_count_limit() {
        let tm = manager(test_data_dir("count_limit"));
        for _ in 0..MAX_TENANTS {
            tm.get_or_create(TenantId::new()).unwrap();
        }
        let err = tm.get_or_create(TenantId::new()).err().unwrap();
        assert!(err.to_string().contains("too many tenants"));
    }
}
