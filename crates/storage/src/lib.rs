pub mod error;
pub mod lease_cache;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use lease_cache::SqliteLeaseCache;
pub use sqlite::SqliteStorage;
pub use traits::*;
