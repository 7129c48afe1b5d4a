use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use sheets_codec::{deserialize_record, Record};
use sheets_repo::ObjectDatabase;
use sheets_types::ObjectId;
use tracing::trace;

use crate::error::SheetResult;

/// Decoded records keyed by blob hash.
///
/// Blobs never change under their hash, so entries are never invalidated.
/// Two tasks decoding the same blob at once both insert the same value.
#[derive(Default)]
pub struct RecordCache {
    entries: Mutex<HashMap<ObjectId, Arc<Record>>>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ObjectId) -> Option<Arc<Record>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// The record stored in blob `id`, reading and decoding it on a miss.
    pub async fn load(&self, db: &dyn ObjectDatabase, id: &ObjectId) -> SheetResult<Arc<Record>> {
        if let Some(record) = self.get(id) {
            return Ok(record);
        }
        let bytes = db.read_blob(id).await?;
        let record = Arc::new(deserialize_record(&bytes)?);
        trace!(blob = %id.short_hex(), "cached record");
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*id, Arc::clone(&record));
        Ok(record)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheets_codec::serialize_record;
    use sheets_repo::Repository;

    #[tokio::test]
    async fn decodes_once_per_blob() {
        let repo = Repository::in_memory();
        let record: Record = toml::from_str(r#"id = "1""#).unwrap();
        let blob = repo
            .write_blob(&serialize_record(&record).unwrap())
            .await
            .unwrap();

        let cache = RecordCache::new();
        assert!(cache.get(&blob.id).is_none());
        let first = cache.load(&repo, &blob.id).await.unwrap();
        let second = cache.load(&repo, &blob.id).await.unwrap();
        assert_eq!(*first, record);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn undecodable_blob_is_serialization_error() {
        let repo = Repository::in_memory();
        let blob = repo.write_blob(b"not = [toml").await.unwrap();
        let err = RecordCache::new().load(&repo, &blob.id).await.unwrap_err();
        assert!(matches!(err, crate::SheetError::Serialization(_)));
    }
}
