// ============================================================================
// Module: platform/src/services/tenant_config.rs
// Description: Tenant Config Loader (C5), spec §4.5
// ============================================================================

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use invoice_shared::error::{Error, Result};
use invoice_shared::models::tenant::Tenant;
use sqlx::PgPool;

use crate::models::{IndustryTemplate, MergedTenantConfig};

/// Loads a base template per `industry_kind` and deep-merges the tenant's
/// row onto it. Grounded on `original_source/backend/config_loader.py`'s
/// `load_template`/`load_user_config`/`merge_configs`, reimplemented over a
/// Postgres `tenants` row instead of a per-tenant JSON file on disk —
/// the industry template stays file-based since it's shared, versioned
/// content rather than per-tenant state.
pub struct TenantConfigLoader {
    pool: PgPool,
    templates_dir: PathBuf,
    template_cache: RwLock<HashMap<String, Arc<IndustryTemplate>>>,
    config_cache: RwLock<HashMap<String, Arc<MergedTenantConfig>>>,
}

impl TenantConfigLoader {
    pub fn new(pool: PgPool, templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            templates_dir: templates_dir.into(),
            template_cache: RwLock::new(HashMap::new()),
            config_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Spec §4.5: "Lookup is case-preferring: exact tenant name first,
    /// then lowercase fallback."
    async fn fetch_tenant(&self, username: &str) -> Result<Tenant> {
        if let Some(tenant) = self.fetch_tenant_exact(username).await? {
            return Ok(tenant);
        }
        let lower = username.to_lowercase();
        if lower != username {
            if let Some(tenant) = self.fetch_tenant_exact(&lower).await? {
                return Ok(tenant);
            }
        }
        Err(Error::NotFound(format!("tenant {username}")))
    }

    async fn fetch_tenant_exact(&self, username: &str) -> Result<Option<Tenant>> {
        sqlx::query_as("SELECT * FROM tenants WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)
    }

    async fn load_template(&self, industry_kind: &str, bypass_cache: bool) -> Result<Arc<IndustryTemplate>> {
        if !bypass_cache {
            if let Some(template) = self.template_cache.read().unwrap().get(industry_kind) {
                return Ok(template.clone());
            }
        }

        let path = self.templates_dir.join(format!("{industry_kind}.json"));
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::NotFound(format!("industry template {industry_kind}: {e}")))?;
        let template: IndustryTemplate = serde_json::from_slice(&bytes)?;
        let template = Arc::new(template);

        self.template_cache.write().unwrap().insert(industry_kind.to_string(), template.clone());
        Ok(template)
    }

    /// Spec §4.5's merge policy: top-level identity fields from the tenant
    /// row; `column_label_overrides` (the tenant's `column_map`) patch
    /// matching `db_column` entries in `template.columns.*`; a non-empty
    /// tenant `extraction_prompt` replaces the template's.
    pub async fn load(&self, username: &str, bypass_cache: bool) -> Result<Arc<MergedTenantConfig>> {
        if !bypass_cache {
            if let Some(cached) = self.config_cache.read().unwrap().get(username) {
                return Ok(cached.clone());
            }
        }

        let tenant = self.fetch_tenant(username).await?;
        let template = self.load_template(&tenant.industry_kind, bypass_cache).await?;

        let overrides: HashMap<String, String> =
            serde_json::from_value(tenant.column_map.clone()).unwrap_or_default();

        let mut columns = template.columns.clone();
        for section in columns.values_mut() {
            for column in section.iter_mut() {
                if let Some(label) = overrides.get(&column.db_column) {
                    column.label = label.clone();
                }
            }
        }

        let extraction_prompt =
            if tenant.extraction_prompt.is_empty() { template.extraction_prompt.clone() } else { tenant.extraction_prompt.clone() };

        let merged = Arc::new(MergedTenantConfig {
            username: tenant.username.clone(),
            industry_kind: tenant.industry_kind,
            object_store_bucket: tenant.object_store_bucket,
            extraction_prompt,
            columns,
        });

        self.config_cache.write().unwrap().insert(tenant.username, merged.clone());
        Ok(merged)
    }

    pub fn clear_cache(&self) {
        self.template_cache.write().unwrap().clear();
        self.config_cache.write().unwrap().clear();
    }
}
