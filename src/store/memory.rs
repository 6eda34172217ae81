//! In-process storage engine

use super::{KeyValueStorage, StorageKey, StorageResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;

/// Keeps every record in a `HashMap`; contents die with the process
#[derive(Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<StorageKey, Map<String, Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &StorageKey) -> StorageResult<Option<Map<String, Value>>> {
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &StorageKey, value: Map<String, Value>) -> StorageResult<()> {
        self.records.lock().unwrap().insert(key.clone(), value);
        Ok(())
    }

    async fn clear(&self, key: &StorageKey) -> StorageResult<()> {
        self.records.lock().unwrap().remove(key);
        Ok(())
    }
}
