//! # glossa-db
//!
//! PostgreSQL work-item store for the glossa pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - The PostgreSQL `WorkItemRepository` with skip-locked claiming
//! - An in-process repository with identical semantics for tests and
//!   single-node development
//!
//! ## Example
//!
//! ```rust,ignore
//! use glossa_db::{Database, WorkItemRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/glossa").await?;
//!     let outcome = db.items.submit("5jeezDV1Cik").await?;
//!     println!("queued, depth {}", outcome.queue_depth);
//!     Ok(())
//! }
//! ```
pub mod items;
pub mod memory;
pub mod pool;

// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use glossa_core::*;

pub use items::PgWorkItemRepository;
pub use memory::MemoryWorkItemRepository;
pub use pool::{
    create_pool, create_pool_with_config, log_pool_metrics, validate_schema_name, PoolConfig,
};

/// Combined database context.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Work item queue.
    pub items: PgWorkItemRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            items: PgWorkItemRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
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
