// 👷 Worker Entity
//
// Identity is a UUID; `machine_number` is a back-reference written when a
// machine is saved with this worker on it, never by worker edits.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// Stable identity (UUID, store key)
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub contact: String,

    #[serde(default)]
    pub machine_number: Option<String>,

    #[serde(default)]
    pub version: i64,
}

impl Worker {
    pub fn new(name: String, contact: String) -> Self {
        Worker {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            contact,
            machine_number: None,
            version: 0,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.machine_number.is_some()
    }
}
