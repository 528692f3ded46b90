//! Storage for validated product records.
//!
//! Available backends:
//! - `MemoryStore` - In-memory storage (always available)
//! - `SqliteStore` - SQLite file-based storage (requires `sqlite` feature)
//!
//! [`ResultStore`] wraps a backend with URL keying and per-key write
//! serialization.

pub mod memory;
pub mod result;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
pub use result::ResultStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
