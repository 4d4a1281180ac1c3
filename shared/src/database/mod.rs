// ============================================================================
// Module: shared/src/database/mod.rs
// Description: Database connection management and utilities
// ============================================================================

pub mod connection;
pub mod migrations;
pub mod health;
pub mod rls;

pub use connection::{DatabaseConnection, DatabaseConfig, ConnectionPool};
pub use migrations::MigrationRunner;
pub use health::HealthChecker;
pub use rls::{AdvisoryLock, RowLevelSecurity};

use sqlx::{PgPool, Postgres, Transaction};

/// Type alias for database pool
pub type DbPool = PgPool;

/// Type alias for database transaction
pub type DbTransaction<'a> = Transaction<'a, Postgres>;

/// Database result type
pub type DbResult<T> = Result<T, sqlx::Error>;

/// Database context for tenant-scoped operations.
///
/// Tenants are identified by their username (spec §3: "Tenant
/// (__username__)"), not a surrogate UUID, so RLS session variables and the
/// advisory-lock id derivation (§4.4) both key off this string.
#[derive(Debug, Clone)]
pub struct DatabaseContext {
    pub tenant: String,
    pub user_id: Option<String>,
    pub role: Option<String>,
}

impl DatabaseContext {
    /// Create a new database context
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            user_id: None,
            role: None,
        }
    }

    /// Set user context
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set role context
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}