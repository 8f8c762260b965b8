//! Persistence layer — local-storage blobs and the tenancy directory.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStorage;
pub use traits::{Directory, LocalStorage};
