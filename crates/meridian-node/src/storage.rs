//! RocksDB storage backend for the Meridian node.

use meridian_core::{Datastore, RoutingError};
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use std::path::Path;

/// Column family holding routing records and other repo data.
const CF_DATASTORE: &str = "datastore";
/// Column family for node-local state (e.g. last known peers).
const CF_STATE: &str = "state";

/// RocksDB-backed repo datastore.
pub struct RocksDatastore {
    db: DB,
}

impl RocksDatastore {
    /// Open or create a RocksDB database at the given path with column families.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_DATASTORE, Options::default()),
            ColumnFamilyDescriptor::new(CF_STATE, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
        tracing::debug!(path = %path.display(), "datastore opened");

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, RoutingError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| RoutingError::Storage(format!("column family '{}' not found", name)))
    }

    /// Store node state.
    pub fn put_state(&self, key: &str, data: &[u8]) -> Result<(), RoutingError> {
        let cf = self.cf(CF_STATE)?;
        self.db.put_cf(&cf, key.as_bytes(), data).map_err(storage_err)
    }

    /// Get node state.
    pub fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, RoutingError> {
        let cf = self.cf(CF_STATE)?;
        self.db.get_cf(&cf, key.as_bytes()).map_err(storage_err)
    }
}

fn storage_err(err: rocksdb::Error) -> RoutingError {
    RoutingError::Storage(err.to_string())
}

impl Datastore for RocksDatastore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RoutingError> {
        let cf = self.cf(CF_DATASTORE)?;
        self.db.get_cf(&cf, key).map_err(storage_err)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), RoutingError> {
        let cf = self.cf(CF_DATASTORE)?;
        self.db.put_cf(&cf, key, value).map_err(storage_err)
    }

    fn delete(&self, key: &[u8]) -> Result<(), RoutingError> {
        let cf = self.cf(CF_DATASTORE)?;
        self.db.delete_cf(&cf, key).map_err(storage_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("meridian-test-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_open_storage() {
        let dir = temp_dir();
        let storage = RocksDatastore::open(&dir);
        assert!(storage.is_ok());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_datastore_put_get_delete() {
        let dir = temp_dir();
        let store = RocksDatastore::open(&dir).unwrap();

        assert_eq!(store.get(b"/routing/record/ipns/k").unwrap(), None);
        store.put(b"/routing/record/ipns/k", b"value").unwrap();
        assert!(store.has(b"/routing/record/ipns/k").unwrap());
        assert_eq!(
            store.get(b"/routing/record/ipns/k").unwrap(),
            Some(b"value".to_vec())
        );

        store.delete(b"/routing/record/ipns/k").unwrap();
        assert!(!store.has(b"/routing/record/ipns/k").unwrap());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_state_is_separate_from_datastore() {
        let dir = temp_dir();
        let store = RocksDatastore::open(&dir).unwrap();

        store.put_state("k", b"state").unwrap();
        assert_eq!(store.get_state("k").unwrap(), Some(b"state".to_vec()));
        assert_eq!(store.get(b"k").unwrap(), None);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = temp_dir();
        {
            let store = RocksDatastore::open(&dir).unwrap();
            store.put(b"key", b"persisted").unwrap();
        }
        let store = RocksDatastore::open(&dir).unwrap();
        assert_eq!(store.get(b"key").unwrap(), Some(b"persisted".to_vec()));

        std::fs::remove_dir_all(&dir).ok();
    }
}
