//! In-memory reference `BackingStore`, used by tests and the CLI demo in
//! place of a real parameter-server client.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::BackingStore;
use crate::error::TransformerError;

pub struct InMemoryBackingStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBackingStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBackingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BackingStore for InMemoryBackingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransformerError> {
        Ok(self.data.lock().get(key).cloned())
    }

    async fn put(&self, key: String, value: Vec<u8>) -> Result<(), TransformerError> {
        self.data.lock().insert(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_value() {
        let store = InMemoryBackingStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.put("k".to_string(), vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.len(), 1);
    }
}
