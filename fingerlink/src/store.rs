//! Template persistence contract

use std::collections::BTreeMap;

use async_trait::async_trait;
use fingerlink_types::{FingerprintRecord, StoredTemplate};
use parking_lot::RwLock;

use crate::error::Result;

/// Storage for enrolled fingerprints, keyed by sensor slot
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Number of stored records, active or not
    async fn count(&self) -> Result<usize>;

    /// Insert or replace the record for its sensor slot
    async fn insert(&self, record: FingerprintRecord) -> Result<()>;

    /// Remove a record, returning whether it existed
    async fn remove(&self, sensor_id: u32) -> Result<bool>;

    async fn clear(&self) -> Result<()>;

    /// Templates of active records that carry one, ordered by sensor slot
    async fn active_templates(&self) -> Result<Vec<StoredTemplate>>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    records: RwLock<BTreeMap<u32, FingerprintRecord>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get record by sensor slot
    pub fn get(&self, sensor_id: u32) -> Option<FingerprintRecord> {
        self.records.read().get(&sensor_id).cloned()
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }

    async fn insert(&self, record: FingerprintRecord) -> Result<()> {
        self.records.write().insert(record.sensor_id, record);
        Ok(())
    }

    async fn remove(&self, sensor_id: u32) -> Result<bool> {
        Ok(self.records.write().remove(&sensor_id).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.records.write().clear();
        Ok(())
    }

    async fn active_templates(&self) -> Result<Vec<StoredTemplate>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| record.active)
            .filter_map(FingerprintRecord::stored_template)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fingerlink_types::Template;
    use pretty_assertions::assert_eq;

    fn template(byte: u8) -> Template {
        Template::from_bytes(&[byte; Template::SIZE]).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemoryTemplateStore::new();

        store.insert(FingerprintRecord::new(4, Some(template(0x10)))).await.unwrap();
        store.insert(FingerprintRecord::new(2, Some(template(0x20)))).await.unwrap();
        store.insert(FingerprintRecord::new(9, None)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 3);

        let active = store.active_templates().await.unwrap();
        assert_eq!(active.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 4]);

        assert!(store.remove(4).await.unwrap());
        assert!(!store.remove(4).await.unwrap());
        assert!(store.get(2).is_some());

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_inactive_records_are_not_matched() {
        let store = MemoryTemplateStore::new();

        let mut record = FingerprintRecord::new(1, Some(template(0x33)));
        record.active = false;
        store.insert(record).await.unwrap();

        assert!(store.active_templates().await.unwrap().is_empty());
    }
}
