// SQLite RecordStore - JSON documents + audit trail
//
// One table per collection:
//   record_key (business identifier) | version | data (JSON) | timestamps
//
// Every write also appends to `events` ("every change is an event"), inside
// the same transaction as the write itself.

use super::{
    merge_patch, require_key, set_version, BatchResult, ChangeEvent, ChangeKind, Collection,
    Filter, Listener, RecordStore, StoreResult, Subscribers, WriteOp,
};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// EVENTS (audit trail)
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: Value,
}

impl Event {
    pub fn new(kind: ChangeKind, collection: Collection, entity_id: &str, data: Value) -> Self {
        let event_type = match kind {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        };

        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: collection.as_str().to_string(),
            entity_id: entity_id.to_string(),
            data,
        }
    }
}

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // WAL for crash recovery (in-memory databases silently stay in "memory" mode)
    conn.pragma_update(None, "journal_mode", "WAL")?;

    for collection in Collection::ALL {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    record_key TEXT PRIMARY KEY,
                    version INTEGER NOT NULL DEFAULT 1,
                    data TEXT NOT NULL,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    updated_at TEXT
                )",
                collection.as_str()
            ),
            [],
        )?;
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

fn insert_event(conn: &Connection, event: &Event) -> StoreResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
        ],
    )?;

    Ok(())
}

// ============================================================================
// ROW OPERATIONS (run on a connection or an open transaction)
// ============================================================================

fn fetch(conn: &Connection, collection: Collection, id: &str) -> StoreResult<Option<Value>> {
    let data: Option<String> = conn
        .query_row(
            &format!("SELECT data FROM {} WHERE record_key = ?1", collection.as_str()),
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn insert_record(conn: &Connection, collection: Collection, mut record: Value) -> StoreResult<Value> {
    let id = require_key(collection, &record)?;
    set_version(&mut record, 1);

    let result = conn.execute(
        &format!(
            "INSERT INTO {} (record_key, version, data) VALUES (?1, 1, ?2)",
            collection.as_str()
        ),
        params![id, serde_json::to_string(&record)?],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(StoreError::Duplicate { collection, id });
        }
        Err(e) => return Err(e.into()),
    }

    insert_event(conn, &Event::new(ChangeKind::Created, collection, &id, record.clone()))?;
    Ok(record)
}

fn update_record(
    conn: &Connection,
    collection: Collection,
    id: &str,
    expected: Option<i64>,
    patch: &Value,
) -> StoreResult<Value> {
    let mut record = fetch(conn, collection, id)?.ok_or_else(|| StoreError::NotFound {
        collection,
        id: id.to_string(),
    })?;

    let found = super::version_of(&record);
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

    merge_patch(collection, &mut record, patch);
    set_version(&mut record, found + 1);

    // Guard on the old version as well, in case another connection wrote in between
    let changed = conn.execute(
        &format!(
            "UPDATE {} SET data = ?1, version = ?2, updated_at = ?3
             WHERE record_key = ?4 AND version = ?5",
            collection.as_str()
        ),
        params![
            serde_json::to_string(&record)?,
            found + 1,
            Utc::now().to_rfc3339(),
            id,
            found
        ],
    )?;

    if changed == 0 {
        return Err(StoreError::Conflict {
            collection,
            id: id.to_string(),
            expected: found,
            found: found + 1,
        });
    }

    insert_event(conn, &Event::new(ChangeKind::Updated, collection, id, patch.clone()))?;
    Ok(record)
}

fn delete_record(conn: &Connection, collection: Collection, id: &str) -> StoreResult<Value> {
    let record = fetch(conn, collection, id)?.ok_or_else(|| StoreError::NotFound {
        collection,
        id: id.to_string(),
    })?;

    conn.execute(
        &format!("DELETE FROM {} WHERE record_key = ?1", collection.as_str()),
        params![id],
    )?;

    insert_event(conn, &Event::new(ChangeKind::Deleted, collection, id, record.clone()))?;
    Ok(record)
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    subscribers: Subscribers,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> StoreResult<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
            subscribers: Subscribers::default(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Audit trail for one record, newest first
    pub fn events_for(&self, collection: Collection, id: &str) -> StoreResult<Vec<Event>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data
             FROM events
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY id DESC",
        )?;

        let rows = stmt
            .query_map(params![collection.as_str(), id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(event_id, timestamp, event_type, entity_type, entity_id, data)| -> StoreResult<Event> {
                let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| StoreError::Backend(format!("bad event timestamp: {}", e)))?
                    .with_timezone(&Utc);
                Ok(Event {
                    event_id,
                    timestamp,
                    event_type,
                    entity_type,
                    entity_id,
                    data: serde_json::from_str(&data)?,
                })
            })
            .collect()
    }

    pub fn count(&self, collection: Collection) -> StoreResult<i64> {
        let count = self.lock().query_row(
            &format!("SELECT COUNT(*) FROM {}", collection.as_str()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Run one write in its own transaction, then notify listeners
    fn write_one<F>(&self, collection: Collection, id: &str, kind: ChangeKind, op: F) -> StoreResult<Value>
    where
        F: FnOnce(&Connection) -> StoreResult<Value>,
    {
        let record = {
            let mut conn = self.lock();
            let tx = conn.transaction()?;
            let record = op(&*tx)?;
            tx.commit()?;
            record
        };

        self.subscribers.notify(&ChangeEvent {
            collection,
            kind,
            id: id.to_string(),
            record: (kind != ChangeKind::Deleted).then(|| record.clone()),
        });
        Ok(record)
    }
}

impl RecordStore for SqliteStore {
    fn create(&self, collection: Collection, record: Value) -> StoreResult<Value> {
        let id = require_key(collection, &record)?;
        self.write_one(collection, &id, ChangeKind::Created, |conn| {
            insert_record(conn, collection, record)
        })
    }

    fn read(&self, collection: Collection, filter: Option<&Filter>) -> StoreResult<Vec<Value>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT data FROM {} ORDER BY record_key",
            collection.as_str()
        ))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for json in rows {
            let record: Value = serde_json::from_str(&json)?;
            if filter.is_none_or(|f| f.matches(&record)) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Keyed lookup on the primary key instead of scanning the table
    fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Value>> {
        fetch(&self.lock(), collection, id)
    }

    fn update(&self, collection: Collection, id: &str, patch: Value) -> StoreResult<Value> {
        self.write_one(collection, id, ChangeKind::Updated, |conn| {
            update_record(conn, collection, id, None, &patch)
        })
    }

    fn update_if_version(
        &self,
        collection: Collection,
        id: &str,
        expected: i64,
        patch: Value,
    ) -> StoreResult<Value> {
        self.write_one(collection, id, ChangeKind::Updated, |conn| {
            update_record(conn, collection, id, Some(expected), &patch)
        })
    }

    fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        self.write_one(collection, id, ChangeKind::Deleted, |conn| {
            delete_record(conn, collection, id)
        })
        .map(|_| ())
    }

    fn subscribe(&self, collection: Collection, listener: Listener) {
        self.subscribers.add(collection, listener);
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> StoreResult<BatchResult> {
        let mut changes = Vec::with_capacity(ops.len());

        {
            let mut conn = self.lock();
            let tx = conn.transaction()?;

            for op in &ops {
                let change = match op {
                    WriteOp::Create { collection, record } => {
                        let id = require_key(*collection, record)?;
                        let stored = insert_record(&tx, *collection, record.clone())?;
                        (*collection, ChangeKind::Created, id, stored)
                    }
                    WriteOp::UpdateIfVersion {
                        collection,
                        id,
                        expected,
                        patch,
                    } => {
                        let stored = update_record(&tx, *collection, id, Some(*expected), patch)?;
                        (*collection, ChangeKind::Updated, id.clone(), stored)
                    }
                    WriteOp::Delete { collection, id } => {
                        let last = delete_record(&tx, *collection, id)?;
                        (*collection, ChangeKind::Deleted, id.clone(), last)
                    }
                };
                changes.push(change);
            }

            // Dropping `tx` on an early return above rolls everything back
            tx.commit()?;
        }

        let mut results = Vec::with_capacity(changes.len());
        for (collection, kind, id, record) in changes {
            self.subscribers.notify(&ChangeEvent {
                collection,
                kind,
                id,
                record: (kind != ChangeKind::Deleted).then(|| record.clone()),
            });
            results.push(record);
        }
        Ok(results)
    }
}

// ============================================================================
// TESTS
// ============================================================================
