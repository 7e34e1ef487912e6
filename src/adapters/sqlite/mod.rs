//! SQLite adapters for the persistence ports.

pub mod cache_repository;
pub mod connection;
pub mod migrations;
pub mod session_repository;
pub mod usage_repository;

pub use cache_repository::SqliteCacheRepository;
pub use connection::{create_pool, create_test_pool, ConnectionError};
pub use migrations::{all_migrations, Migrator};
pub use session_repository::SqliteSessionRepository;
pub use usage_repository::SqliteUsageRepository;
