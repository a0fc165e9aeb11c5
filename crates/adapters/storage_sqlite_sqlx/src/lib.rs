//! # capbridge-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement `TokenRepository` and `CrashRepository` from
//!   `capbridge-app::ports::storage`
//! - Manage the `SQLite` connection pool lifecycle
//! - Run the embedded migrations
//! - Map between domain records and rows; timestamps are stored as RFC 3339
//!   text with nanosecond precision so records round-trip losslessly
//!
//! ## Dependency rule
//! Depends on `capbridge-app` (for port traits) and `capbridge-domain` (for
//! domain types). The `app` and `domain` crates must never reference this
//! adapter.

mod crash_repo;
mod error;
mod pool;
mod timestamp;
mod token_repo;

pub use crash_repo::SqliteCrashRepository;
pub use error::StorageError;
pub use pool::{Config, Database};
pub use token_repo::SqliteTokenRepository;
