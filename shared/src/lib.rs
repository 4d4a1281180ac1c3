pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod services;

pub use config::AppConfig;
pub use error::{Error, Result, ErrorResponse, ErrorExt};
pub use database::{
    AdvisoryLock, ConnectionPool, DatabaseConfig, DatabaseConnection, DatabaseContext, DbPool,
    DbResult, RowLevelSecurity,
};
pub use models::*;
pub use services::TaskRegistry;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_module_compilation() {
        // Basic test to ensure the module compiles
        assert!(true);
    }
}