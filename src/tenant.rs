use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::config::{Facility, Settings};
use crate::engine::{Engine, EngineError};
use crate::limits::*;
use crate::maintenance;
use crate::notify::NotifyHub;
use crate::ports::CourtDirectory;
use crate::store::LedgerStore;

/// Everything one club needs: its facility definition, its ledger and the
/// engine wired over both.
pub struct Tenant {
    pub name: String,
    pub facility: Arc<Facility>,
    pub store: Arc<LedgerStore>,
    pub engine: Arc<Engine>,
}

impl Tenant {
    pub fn notify(&self) -> &Arc<NotifyHub> {
        &self.store.notify
    }
}

/// Strip everything but `[A-Za-z0-9_-]` so the name is safe as a file stem.
pub fn sanitize_tenant_name(tenant: &str) -> Result<String, EngineError> {
    if tenant.len() > MAX_TENANT_NAME_LEN {
        return Err(EngineError::LimitExceeded("tenant name too long"));
    }
    let safe: String = tenant
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if safe.is_empty() {
        return Err(EngineError::InvalidConfig(format!("unusable tenant name {tenant:?}")));
    }
    Ok(safe)
}

/// Lazily opens one tenant per club: `<data_dir>/<tenant>.json` for the
/// facility and `<data_dir>/<tenant>.wal` for the ledger.
pub struct TenantManager {
    tenants: DashMap<String, Arc<Tenant>>,
    settings: Settings,
}

impl TenantManager {
    pub fn new(settings: Settings) -> Self {
        Self {
            tenants: DashMap::new(),
            settings,
        }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.settings.data_dir
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    /// Must run inside a tokio runtime: opening a ledger spawns its WAL
    /// writer and maintenance task.
    pub fn get_or_create(&self, tenant: &str) -> Result<Arc<Tenant>, EngineError> {
        let safe_name = sanitize_tenant_name(tenant)?;
        if let Some(existing) = self.tenants.get(&safe_name) {
            return Ok(existing.value().clone());
        }
        if self.tenants.len() >= MAX_TENANTS {
            return Err(EngineError::LimitExceeded("too many tenants"));
        }

        let dir = &self.settings.data_dir;
        let facility = Arc::new(Facility::load(&dir.join(format!("{safe_name}.json")))?);
        let wal_path = dir.join(format!("{safe_name}.wal"));
        let store = Arc::new(
            LedgerStore::open(&wal_path, Arc::new(NotifyHub::new()))
                .map_err(|e| EngineError::WalError(format!("{}: {e}", wal_path.display())))?,
        );
        let engine = Engine::new(
            facility.clone(),
            facility.clone(),
            facility.clone(),
            store.clone(),
            facility.policy.clone(),
            facility.fees,
        )?
        .with_store_timeout(self.settings.store_timeout);

        let entry = self.tenants.entry(safe_name.clone()).or_insert_with(|| {
            tokio::spawn(maintenance::run_maintenance(store.clone(), self.settings.compact_threshold));
            info!("opened tenant {safe_name} ({}, {} courts)", facility.name, facility.court_ids().len());
            Arc::new(Tenant {
                name: safe_name.clone(),
                facility: facility.clone(),
                store: store.clone(),
                engine: Arc::new(engine),
            })
        });
        let tenant = entry.value().clone();
        drop(entry);

        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.tenants.len() as f64);
        Ok(tenant)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const FACILITY: &str = r#"{
        "name": "Club Sur",
        "durations": [60, 90],
        "courts": [{
            "id": "01HZY5J8Q6R9V3W2X1Y0Z9A8B7",
            "name": "Pista Central",
            "windows": [{ "on": { "weekly": "Tue" }, "start": "09:00:00", "end": "21:00:00" }],
            "max_players": 4,
            "rates": { "brackets": [{ "start": "09:00:00", "end": "21:00:00", "per_hour": 1800 }] }
        }]
    }"#;

    fn test_settings(name: &str) -> Settings {
        let dir = std::env::temp_dir().join("courtbook_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        Settings {
            data_dir: dir,
            ..Settings::default()
        }
    }

    fn write_facility(settings: &Settings, tenant: &str) {
        fs::write(settings.data_dir.join(format!("{tenant}.json")), FACILITY).unwrap();
    }

    #[tokio::test]
    async fn lazy_creation_opens_wal() {
        let settings = test_settings("lazy");
        write_facility(&settings, "club_sur");
        let tm = TenantManager::new(settings.clone());
        assert!(tm.is_empty());

        let tenant = tm.get_or_create("club_sur").unwrap();
        assert_eq!(tenant.facility.court_ids().len(), 1);
        assert!(settings.data_dir.join("club_sur.wal").exists());
        assert_eq!(tm.len(), 1);
    }

    #[tokio::test]
    async fn same_tenant_same_instance() {
        let settings = test_settings("same");
        write_facility(&settings, "club");
        let tm = TenantManager::new(settings);
        let a = tm.get_or_create("club").unwrap();
        let b = tm.get_or_create("club").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn missing_facility_is_config_error() {
        let tm = TenantManager::new(test_settings("missing"));
        assert!(matches!(tm.get_or_create("nobody"), Err(EngineError::InvalidConfig(_))));
        assert!(tm.is_empty());
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_tenant_name("../evil").unwrap(), "evil");
        assert_eq!(sanitize_tenant_name("club-norte_2").unwrap(), "club-norte_2");
        assert!(matches!(sanitize_tenant_name("../.."), Err(EngineError::InvalidConfig(_))));
        let long = "x".repeat(MAX_TENANT_NAME_LEN + 1);
        assert!(matches!(sanitize_tenant_name(&long), Err(EngineError::LimitExceeded(_))));
    }
}
