// Entity Models - the four record kinds on the factory floor
//
// Each entity has:
// - A business identifier used as the store key (BIM001, M001, T001, worker UUID)
// - A store-managed version (1 on create, +1 per update)
// - Conversions to/from the JSON records held by a RecordStore

pub mod machine;
pub mod production;
pub mod roll;
pub mod worker;

pub use machine::{Machine, MachineDraft, MAX_WORKERS};
pub use production::{ProductionDraft, ProductionEntry};
pub use roll::{Roll, RollBalance, RollDraft};
pub use worker::Worker;

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Serialize an entity into a store record
pub fn to_record<T: Serialize>(entity: &T) -> Result<Value> {
    Ok(serde_json::to_value(entity)?)
}

/// Deserialize a store record into an entity
pub fn from_record<T: DeserializeOwned>(record: Value) -> Result<T> {
    Ok(serde_json::from_value(record)?)
}

/// Deserialize every record of a read
pub fn from_records<T: DeserializeOwned>(records: Vec<Value>) -> Result<Vec<T>> {
    records.into_iter().map(from_record).collect()
}
