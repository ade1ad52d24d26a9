//! # dcatd-db
//!
//! Storage and search backends for dcatd.
//!
//! This crate provides:
//! - Connection pool management with startup retries
//! - A PostgreSQL backend (`jsonb` documents, weighted `tsvector` search)
//! - An in-memory backend for tests and single-process deployments
//! - Translation of search queries into parameterized SQL
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dcatd_db::{Database, HookRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/dcatd").await?;
//!     let hooks = HookRegistry::builder()
//!         .storage(db.datasets.clone())
//!         .search(db.datasets.clone())
//!         .build()?;
//!     Ok(())
//! }
//! ```
pub mod datasets;
pub mod ids;
pub mod memory;
pub mod pool;
pub mod query;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use std::sync::Arc;

// Re-export core types
pub use dcatd_core::*;

pub use datasets::PgDatasetStore;
pub use ids::generate_id;
pub use memory::MemoryDatasetStore;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Database context: the pool and the dataset backend built on it.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Storage and search backend for the `dataset` table.
    pub datasets: Arc<PgDatasetStore>,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            datasets: Arc::new(PgDatasetStore::new(pool.clone())),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
