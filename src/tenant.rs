use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::compactor;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::limits::*;

/// Manages per-tenant engines. Each tenant (salon) gets its own Engine + WAL +
/// compactor, so every query and booking is scoped to one tenant.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    config: EngineConfig,
}

impl TenantManager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engines: DashMap::new(),
            config,
        }
    }

    /// Get or lazily create (replaying its WAL) the engine for a tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Sanitize tenant name to prevent path traversal
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        std::fs::create_dir_all(&self.config.data_dir)?;
        let wal_path = self.config.data_dir.join(format!("{safe_name}.wal"));
        let mut created = false;
        let engine = self
            .engines
            .entry(tenant.to_string())
            .or_try_insert_with(|| {
                created = true;
                Engine::new(wal_path, self.config.clone()).map(Arc::new)
            })?
            .value()
            .clone();
        if !created {
            return Ok(engine);
        }

        let compactor_engine = engine.clone();
        let threshold = self.config.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        info!("tenant {safe_name} loaded");
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }

    pub fn tenant_count(&self) -> usize {
        self.engines.len()
    }
}
