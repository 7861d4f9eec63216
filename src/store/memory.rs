// In-process RecordStore
//
// No batch support: two-record writes against this store go through the
// reconciler's saga path, the same way they would against a plain REST store.

use super::{
    merge_patch, require_key, set_version, version_of, ChangeEvent, ChangeKind, Collection,
    Filter, Listener, RecordStore, StoreResult, Subscribers,
};
use crate::error::StoreError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockWriteGuard};

type Tables = HashMap<Collection, BTreeMap<String, Value>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    subscribers: Subscribers,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.tables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        Collection::ALL.iter().all(|c| self.len(*c) == 0)
    }

    fn apply_update(
        &self,
        collection: Collection,
        id: &str,
        expected: Option<i64>,
        patch: &Value,
    ) -> StoreResult<Value> {
        let updated = {
            let mut tables = self.write();
            let record = tables
                .get_mut(&collection)
                .and_then(|table| table.get_mut(id))
                .ok_or_else(|| StoreError::NotFound {
                    collection,
                    id: id.to_string(),
                })?;

            let found = version_of(record);
            if let Some(expected) = expected {
                if found != expected {
                    return Err(StoreError::Conflict {
                        collection,
                        id: id.to_string(),
                        expected,
                        found,
                    });
                }
            }

            merge_patch(collection, record, patch);
            set_version(record, found + 1);
            record.clone()
        };

        self.subscribers.notify(&ChangeEvent {
            collection,
            kind: ChangeKind::Updated,
            id: id.to_string(),
            record: Some(updated.clone()),
        });
        Ok(updated)
    }
}

impl RecordStore for MemoryStore {
    fn create(&self, collection: Collection, mut record: Value) -> StoreResult<Value> {
        let id = require_key(collection, &record)?;
        set_version(&mut record, 1);

        {
            let mut tables = self.write();
            let table = tables.entry(collection).or_default();
            if table.contains_key(&id) {
                return Err(StoreError::Duplicate { collection, id });
            }
            table.insert(id.clone(), record.clone());
        }

        self.subscribers.notify(&ChangeEvent {
            collection,
            kind: ChangeKind::Created,
            id,
            record: Some(record.clone()),
        });
        Ok(record)
    }

    fn read(&self, collection: Collection, filter: Option<&Filter>) -> StoreResult<Vec<Value>> {
        let tables = self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(table) = tables.get(&collection) else {
            return Ok(Vec::new());
        };

        Ok(table
            .values()
            .filter(|record| filter.is_none_or(|f| f.matches(record)))
            .cloned()
            .collect())
    }

    fn update(&self, collection: Collection, id: &str, patch: Value) -> StoreResult<Value> {
        self.apply_update(collection, id, None, &patch)
    }

    fn update_if_version(
        &self,
        collection: Collection,
        id: &str,
        expected: i64,
        patch: Value,
    ) -> StoreResult<Value> {
        self.apply_update(collection, id, Some(expected), &patch)
    }

    fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        let removed = self
            .write()
            .get_mut(&collection)
            .and_then(|table| table.remove(id));

        if removed.is_none() {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        }

        self.subscribers.notify(&ChangeEvent {
            collection,
            kind: ChangeKind::Deleted,
            id: id.to_string(),
            record: None,
        });
        Ok(())
    }

    fn subscribe(&self, collection: Collection, listener: Listener) {
        self.subscribers.add(collection, listener);
    }
}
