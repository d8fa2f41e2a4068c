//! Avtale DB - redb implementation of the record store.

pub mod store;
pub mod tables;

pub use store::RedbStore;

use std::path::Path;
use std::sync::Arc;

use redb::Database;

use avtale_core::StorageError;

/// Initialize a database with all required tables.
pub fn init_database(path: impl AsRef<Path>) -> Result<Arc<Database>, StorageError> {
    let db = Database::create(path).map_err(|e| StorageError::Database(e.to_string()))?;

    RedbStore::init_tables(&db)?;

    Ok(Arc::new(db))
}
