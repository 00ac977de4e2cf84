//! SQLite backend for staged records.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Promotion runs as a single SQLite
//! transaction.

mod encode;
mod permanent;
mod schema;
mod store;

pub mod config;
pub mod error;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use store::{CleanupHook, SqliteDatabase, SqliteStagingStore, delete_staging_record};

#[cfg(test)]
mod tests;
