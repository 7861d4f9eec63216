// 🗄️ RecordStore - persistence boundary
//
// Four collections of JSON records, each keyed by a business identifier:
//   rolls      → bim_number
//   machines   → machine_number
//   workers    → id
//   production → taka_number
//
// Every stored record carries a "version" (1 on create, +1 per update) so
// callers can do optimistic concurrency with update_if_version().

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{Event, SqliteStore};

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::RwLock;

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// COLLECTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Rolls,
    Machines,
    Workers,
    Production,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Rolls,
        Collection::Machines,
        Collection::Workers,
        Collection::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Rolls => "rolls",
            Collection::Machines => "machines",
            Collection::Workers => "workers",
            Collection::Production => "production",
        }
    }

    /// Field holding the record's identifier
    pub fn key_field(&self) -> &'static str {
        match self {
            Collection::Rolls => "bim_number",
            Collection::Machines => "machine_number",
            Collection::Workers => "id",
            Collection::Production => "taka_number",
        }
    }

    pub fn key_of<'a>(&self, record: &'a Value) -> Option<&'a str> {
        record.get(self.key_field()).and_then(Value::as_str)
    }

    pub fn parse(name: &str) -> Option<Collection> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// FILTERS, CHANGES, BATCHES
// ============================================================================

/// Equality filter on one field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &Value) -> bool {
        record.get(&self.field) == Some(&self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub id: String,
    /// Stored record after the change (None for deletes)
    pub record: Option<Value>,
}

pub type Listener = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// One write inside an atomic batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    Create {
        collection: Collection,
        record: Value,
    },
    UpdateIfVersion {
        collection: Collection,
        id: String,
        expected: i64,
        patch: Value,
    },
    Delete {
        collection: Collection,
        id: String,
    },
}

/// Outcome of one WriteOp (deleted records come back as their last state)
pub type BatchResult = Vec<Value>;

// ============================================================================
// STORE TRAIT
// ============================================================================

pub trait RecordStore: Send + Sync {
    /// Insert a new record; fails with Duplicate if the key is taken
    fn create(&self, collection: Collection, record: Value) -> StoreResult<Value>;

    /// All records, optionally narrowed by an equality filter
    fn read(&self, collection: Collection, filter: Option<&Filter>) -> StoreResult<Vec<Value>>;

    /// Shallow-merge `patch` into the record
    fn update(&self, collection: Collection, id: &str, patch: Value) -> StoreResult<Value>;

    /// Like update, but only when the stored version equals `expected`
    fn update_if_version(
        &self,
        collection: Collection,
        id: &str,
        expected: i64,
        patch: Value,
    ) -> StoreResult<Value>;

    fn delete(&self, collection: Collection, id: &str) -> StoreResult<()>;

    /// Register a change listener for one collection
    fn subscribe(&self, collection: Collection, listener: Listener);

    /// Whether write_batch() is available
    fn supports_batch(&self) -> bool {
        false
    }

    /// Apply every op or none of them
    fn write_batch(&self, _ops: Vec<WriteOp>) -> StoreResult<BatchResult> {
        Err(StoreError::Unsupported("batch writes"))
    }

    /// Single record by key
    fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Value>> {
        let filter = Filter::eq(collection.key_field(), id);
        Ok(self.read(collection, Some(&filter))?.into_iter().next())
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

pub fn version_of(record: &Value) -> i64 {
    record.get("version").and_then(Value::as_i64).unwrap_or(0)
}

/// Merge top-level fields of `patch` into `target`
///
/// The key field and version are owned by the store and never patched.
pub(crate) fn merge_patch(collection: Collection, target: &mut Value, patch: &Value) {
    let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) else {
        return;
    };
    for (field, value) in patch {
        if field == collection.key_field() || field == "version" {
            continue;
        }
        target.insert(field.clone(), value.clone());
    }
}

pub(crate) fn set_version(record: &mut Value, version: i64) {
    if let Some(map) = record.as_object_mut() {
        map.insert("version".to_string(), Value::from(version));
    }
}

/// Key of a record about to be created
pub(crate) fn require_key(collection: Collection, record: &Value) -> StoreResult<String> {
    if !record.is_object() {
        return Err(StoreError::Backend(format!(
            "{} record must be a JSON object",
            collection
        )));
    }
    collection
        .key_of(record)
        .map(str::to_string)
        .ok_or_else(|| {
            StoreError::Backend(format!(
                "{} record has no {}",
                collection,
                collection.key_field()
            ))
        })
}

/// Listener registry shared by the adapters
#[derive(Default)]
pub(crate) struct Subscribers {
    listeners: RwLock<Vec<(Collection, Listener)>>,
}

impl Subscribers {
    pub fn add(&self, collection: Collection, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((collection, listener));
    }

    pub fn notify(&self, event: &ChangeEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (collection, listener) in listeners.iter() {
            if *collection == event.collection {
                listener(event);
            }
        }
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.listeners.read().map(|l| l.len()).unwrap_or(0);
        f.debug_struct("Subscribers").field("count", &count).finish()
    }
}
