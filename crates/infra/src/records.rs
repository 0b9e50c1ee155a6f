//! Record storage for billing resources.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use billforge_core::{Entity, RecordId, UserId};

use crate::billing::BillingRecord;

/// Key/value store for one billing record type.
pub trait RecordStore<V>: Send + Sync {
    fn get(&self, id: RecordId) -> Option<V>;
    fn upsert(&self, value: V);
    fn remove(&self, id: RecordId) -> Option<V>;
    /// Every record, oldest first.
    fn list(&self) -> Vec<V>;
}

impl<V, S> RecordStore<V> for Arc<S>
where
    S: RecordStore<V> + ?Sized,
{
    fn get(&self, id: RecordId) -> Option<V> {
        (**self).get(id)
    }

    fn upsert(&self, value: V) {
        (**self).upsert(value)
    }

    fn remove(&self, id: RecordId) -> Option<V> {
        (**self).remove(id)
    }

    fn list(&self) -> Vec<V> {
        (**self).list()
    }
}

/// Records owned by `owner`, oldest first.
pub fn owned_by<V, S>(store: &S, owner: UserId) -> Vec<V>
where
    V: BillingRecord,
    S: RecordStore<V> + ?Sized,
{
    store
        .list()
        .into_iter()
        .filter(|record| record.owner_id() == owner)
        .collect()
}

/// In-memory record store for tests/dev.
#[derive(Debug)]
pub struct InMemoryRecordStore<V> {
    inner: RwLock<HashMap<RecordId, V>>,
}

impl<V> InMemoryRecordStore<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Default for InMemoryRecordStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RecordStore<V> for InMemoryRecordStore<V>
where
    V: Entity<Id = RecordId> + Clone + Send + Sync + 'static,
{
    fn get(&self, id: RecordId) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&id).cloned()
    }

    fn upsert(&self, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(*value.id(), value);
        }
    }

    fn remove(&self, id: RecordId) -> Option<V> {
        self.inner.write().ok()?.remove(&id)
    }

    fn list(&self) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        // RecordIds are UUIDv7, so id order is creation order.
        let mut records: Vec<(RecordId, V)> =
            map.iter().map(|(id, v)| (*id, v.clone())).collect();
        records.sort_by_key(|(id, _)| *id);
        records.into_iter().map(|(_, v)| v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{Client, ClientInput};

    fn client(owner: UserId, name: &str) -> Client {
        Client::create(
            owner,
            ClientInput {
                name: name.to_string(),
                email: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn upsert_get_remove() {
        let store = InMemoryRecordStore::new();
        let owner = UserId::new();
        let mut acme = client(owner, "Acme");
        store.upsert(acme.clone());
        assert_eq!(store.get(acme.id).map(|c| c.name), Some("Acme".to_string()));

        acme.name = "Acme Corp".into();
        store.upsert(acme.clone());
        assert_eq!(store.list().len(), 1);

        assert!(store.remove(acme.id).is_some());
        assert!(store.get(acme.id).is_none());
        assert!(store.remove(acme.id).is_none());
    }

    #[test]
    fn list_filters_by_owner() {
        let store: Arc<InMemoryRecordStore<Client>> = Arc::new(InMemoryRecordStore::new());
        let ana = UserId::new();
        let bo = UserId::new();
        for (owner, name) in [(ana, "first"), (bo, "second"), (ana, "third")] {
            store.upsert(client(owner, name));
        }

        let mut names: Vec<String> = store.list().into_iter().map(|c| c.name).collect();
        names.sort();
        assert_eq!(names, vec!["first", "second", "third"]);

        let mut mine: Vec<String> = owned_by::<Client, _>(&store, ana)
            .into_iter()
            .map(|c| c.name)
            .collect();
        mine.sort();
        assert_eq!(mine, vec!["first", "third"]);
    }
}
