// ⚙️ Machine Entity - one loaded roll, up to three workers

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Workers a machine can be staffed with
pub const MAX_WORKERS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Machine number (store key)
    pub machine_number: String,

    pub production_rate: f64,

    /// Worker ids, at most MAX_WORKERS
    #[serde(default)]
    pub worker_ids: Vec<String>,

    /// BIM number of the loaded roll
    #[serde(default)]
    pub roll_number: Option<String>,

    #[serde(default)]
    pub version: i64,
}

impl Machine {
    pub fn new(
        machine_number: String,
        production_rate: f64,
        worker_ids: Vec<String>,
        roll_number: Option<String>,
    ) -> Result<Self> {
        validate_staffing(&worker_ids)?;

        Ok(Machine {
            machine_number,
            production_rate,
            worker_ids,
            roll_number,
            version: 0,
        })
    }

    pub fn has_worker(&self, worker_id: &str) -> bool {
        self.worker_ids.iter().any(|id| id == worker_id)
    }
}

/// Form input for creating or editing a machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineDraft {
    pub machine_number: String,
    pub production_rate: f64,
    #[serde(default)]
    pub worker_ids: Vec<String>,
    #[serde(default)]
    pub roll_number: Option<String>,
}

impl MachineDraft {
    pub fn into_machine(self) -> Result<Machine> {
        Machine::new(
            self.machine_number,
            self.production_rate,
            self.worker_ids,
            self.roll_number,
        )
    }

    pub fn to_edit_patch(&self) -> Result<Value> {
        validate_staffing(&self.worker_ids)?;
        Ok(json!({
            "production_rate": self.production_rate,
            "worker_ids": self.worker_ids,
            "roll_number": self.roll_number,
        }))
    }
}

fn validate_staffing(worker_ids: &[String]) -> Result<()> {
    if worker_ids.len() > MAX_WORKERS {
        return Err(LedgerError::InvalidRecord(format!(
            "a machine takes at most {} workers, got {}",
            MAX_WORKERS,
            worker_ids.len()
        )));
    }

    for (i, id) in worker_ids.iter().enumerate() {
        if worker_ids[..i].contains(id) {
            return Err(LedgerError::InvalidRecord(format!(
                "worker {} assigned twice",
                id
            )));
        }
    }
    Ok(())
}
