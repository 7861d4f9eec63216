// 📦 Production Entry - one Taka drawn from a roll
//
// Derived at write time:
//   total_contribution = worker1 + worker2 + worker3   (absent = 0)
//   wet_per_unit       = wet / total_contribution      (0 when total is 0)

use crate::error::{LedgerError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionEntry {
    pub date: NaiveDate,

    /// Taka number (store key)
    pub taka_number: String,

    pub machine_number: String,

    /// BIM number the Taka was drawn from
    pub roll_number: String,

    pub worker1: f64,
    pub worker2: f64,
    pub worker3: f64,

    pub wet: f64,

    pub total_contribution: f64,
    pub wet_per_unit: f64,

    #[serde(default)]
    pub version: i64,
}

/// Form input for one production entry
///
/// Worker fields left blank on the form arrive as None.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionDraft {
    pub date: NaiveDate,
    pub taka_number: String,
    pub machine_number: String,
    pub roll_number: String,
    #[serde(default)]
    pub worker1: Option<f64>,
    #[serde(default)]
    pub worker2: Option<f64>,
    #[serde(default)]
    pub worker3: Option<f64>,
    #[serde(default)]
    pub wet: Option<f64>,
}

impl ProductionDraft {
    /// Fill in absent values and compute the derived fields
    ///
    /// Negative contributions pass through unchanged. NaN and infinities are
    /// rejected: JSON has no representation for them.
    pub fn into_entry(self) -> Result<ProductionEntry> {
        let worker1 = finite("worker1", self.worker1.unwrap_or(0.0))?;
        let worker2 = finite("worker2", self.worker2.unwrap_or(0.0))?;
        let worker3 = finite("worker3", self.worker3.unwrap_or(0.0))?;
        let wet = finite("wet", self.wet.unwrap_or(0.0))?;

        let total_contribution = finite("total contribution", worker1 + worker2 + worker3)?;

        Ok(ProductionEntry {
            date: self.date,
            taka_number: self.taka_number,
            machine_number: self.machine_number,
            roll_number: self.roll_number,
            worker1,
            worker2,
            worker3,
            wet,
            total_contribution,
            wet_per_unit: wet_per_unit(wet, total_contribution),
            version: 0,
        })
    }
}

fn finite(field: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LedgerError::InvalidRecord(format!(
            "{} must be a finite number, got {}",
            field, value
        )))
    }
}

pub fn wet_per_unit(wet: f64, total_contribution: f64) -> f64 {
    if total_contribution > 0.0 {
        wet / total_contribution
    } else {
        0.0
    }
}
