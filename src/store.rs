use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;

/// The record-store collaborator consumed by the dispatcher. Implementations
///  own their own mutual-exclusion discipline; the protocol core takes no locks.
///
/// Every call may fail independently of the protocol layer - failures are
///  mapped to response codes by the dispatcher, never to a protocol fault.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn get(&self, id: u32) -> anyhow::Result<Option<String>>;

    async fn get_all(&self) -> anyhow::Result<Vec<(u32, String)>>;

    /// inserts with an auto-assigned id, returning it
    async fn insert(&self, value: &str) -> anyhow::Result<u32>;

    /// false if the id is already taken
    async fn insert_with_id(&self, id: u32, value: &str) -> anyhow::Result<bool>;

    /// false if no record with this id exists
    async fn update(&self, id: u32, value: &str) -> anyhow::Result<bool>;

    /// false if no record with this id exists
    async fn delete(&self, id: u32) -> anyhow::Result<bool>;
}


struct MemoryStoreInner {
    records: FxHashMap<u32, String>,
    next_id: u32,
}

/// In-memory store, the default collaborator for the server binary and tests.
///  Auto-assigned ids start at 1 and skip ids taken by explicit inserts.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl Default for MemoryStore {
    fn default() -> MemoryStore {
        MemoryStore::new()
    }
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            inner: RwLock::new(MemoryStoreInner {
                records: FxHashMap::default(),
                next_id: 1,
            }),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, id: u32) -> anyhow::Result<Option<String>> {
        Ok(self.inner.read().await.records.get(&id).cloned())
    }

    async fn get_all(&self) -> anyhow::Result<Vec<(u32, String)>> {
        let mut records = self.inner.read().await.records.iter()
            .map(|(&id, value)| (id, value.clone()))
            .collect::<Vec<_>>();
        records.sort_by_key(|(id, _)| *id);
        Ok(records)
    }

    async fn insert(&self, value: &str) -> anyhow::Result<u32> {
        let mut inner = self.inner.write().await;
        while inner.records.contains_key(&inner.next_id) {
            inner.next_id += 1;
        }
        let id = inner.next_id;
        inner.records.insert(id, value.to_string());
        inner.next_id += 1;
        Ok(id)
    }

    async fn insert_with_id(&self, id: u32, value: &str) -> anyhow::Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.records.contains_key(&id) {
            return Ok(false);
        }
        inner.records.insert(id, value.to_string());
        Ok(true)
    }

    async fn update(&self, id: u32, value: &str) -> anyhow::Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.records.get_mut(&id) {
            Some(stored) => {
                *stored = value.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: u32) -> anyhow::Result<bool> {
        Ok(self.inner.write().await.records.remove(&id).is_some())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryStore::new();
        let id = store.insert("{\"temp\":22}").await.unwrap();
        assert_eq!(id, 1);

        assert_eq!(store.get(id).await.unwrap(), Some("{\"temp\":22}".to_string()));
        assert_eq!(store.get(99).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_with_id_conflict() {
        let store = MemoryStore::new();
        assert!(store.insert_with_id(7, "a").await.unwrap());
        assert!(!store.insert_with_id(7, "b").await.unwrap());
        assert_eq!(store.get(7).await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_auto_id_skips_explicit_ids() {
        let store = MemoryStore::new();
        store.insert_with_id(1, "explicit").await.unwrap();
        let id = store.insert("auto").await.unwrap();
        assert_eq!(id, 2);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        let id = store.insert("old").await.unwrap();

        assert!(store.update(id, "new").await.unwrap());
        assert_eq!(store.get(id).await.unwrap(), Some("new".to_string()));
        assert!(!store.update(99, "x").await.unwrap());

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert_eq!(store.get(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_all_sorted_by_id() {
        let store = MemoryStore::new();
        store.insert_with_id(3, "c").await.unwrap();
        store.insert_with_id(1, "a").await.unwrap();
        store.insert_with_id(2, "b").await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all, vec![
            (1, "a".to_string()),
            (2, "b".to_string()),
            (3, "c".to_string()),
        ]);
    }
}
