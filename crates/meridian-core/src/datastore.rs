use dashmap::DashMap;

use crate::error::RoutingError;
use crate::traits::Datastore;

/// In-memory [`Datastore`] backed by DashMap.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    entries: DashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Datastore for MemoryDatastore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RoutingError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), RoutingError> {
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), RoutingError> {
        self.entries.remove(key);
        Ok(())
    }

    fn has(&self, key: &[u8]) -> Result<bool, RoutingError> {
        Ok(self.entries.contains_key(key))
    }
}
