// 🧵 Roll Entity (BIM) - raw material loaded onto a machine
//
// "Pending" fields are the remaining stock:
// - pending_length: meters not yet turned into Taka
// - pending_unit_count: whole Taka still expected from this roll
//
// At load time: pending_unit_count = floor(total_length / par_rate)
// After that only the reconciler moves the balances.

use crate::error::{LedgerError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roll {
    /// BIM number (store key)
    pub bim_number: String,

    /// Meters loaded
    pub total_length: f64,

    /// Meters per Taka ("par")
    pub par_rate: f64,

    /// Taka expected from the full roll
    pub unit_count: i64,

    pub pending_length: f64,
    pub pending_unit_count: i64,

    #[serde(default)]
    pub machine_number: Option<String>,

    pub load_date: NaiveDate,

    #[serde(default)]
    pub version: i64,
}

impl Roll {
    /// Load a fresh roll with full balances
    pub fn new(
        bim_number: String,
        total_length: f64,
        par_rate: f64,
        machine_number: Option<String>,
        load_date: NaiveDate,
    ) -> Result<Self> {
        validate_dimensions(total_length, par_rate)?;
        let unit_count = Self::units_for(total_length, par_rate);

        Ok(Roll {
            bim_number,
            total_length,
            par_rate,
            unit_count,
            pending_length: total_length,
            pending_unit_count: unit_count,
            machine_number,
            load_date,
            version: 0,
        })
    }

    /// Whole Taka that fit into `length` meters
    pub fn units_for(length: f64, par_rate: f64) -> i64 {
        (length / par_rate).floor() as i64
    }

    pub fn balance(&self) -> RollBalance {
        RollBalance {
            pending_length: self.pending_length,
            pending_unit_count: self.pending_unit_count,
        }
    }

    pub fn consumed_length(&self) -> f64 {
        self.total_length - self.pending_length
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending_unit_count <= 0 || self.pending_length <= 0.0
    }
}

/// The two balance fields of a roll, as written by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollBalance {
    pub pending_length: f64,
    pub pending_unit_count: i64,
}

impl RollBalance {
    /// Balance after one Taka consumed `length` meters
    pub fn consume(&self, length: f64) -> RollBalance {
        RollBalance {
            pending_length: self.pending_length - length,
            pending_unit_count: self.pending_unit_count - 1,
        }
    }

    /// Balance after a Taka of `length` meters is given back
    pub fn restore(&self, length: f64) -> RollBalance {
        RollBalance {
            pending_length: self.pending_length + length,
            pending_unit_count: self.pending_unit_count + 1,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.pending_length < 0.0 || self.pending_unit_count < 0
    }

    pub fn to_patch(&self) -> Value {
        json!({
            "pending_length": self.pending_length,
            "pending_unit_count": self.pending_unit_count,
        })
    }
}

/// Form input for loading or editing a roll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollDraft {
    pub bim_number: String,
    pub total_length: f64,
    pub par_rate: f64,
    #[serde(default)]
    pub machine_number: Option<String>,
    pub load_date: NaiveDate,
}

impl RollDraft {
    pub fn into_roll(self) -> Result<Roll> {
        Roll::new(
            self.bim_number,
            self.total_length,
            self.par_rate,
            self.machine_number,
            self.load_date,
        )
    }

    /// Descriptive fields only; balances are never touched by an edit
    pub fn to_edit_patch(&self) -> Result<Value> {
        validate_dimensions(self.total_length, self.par_rate)?;
        Ok(json!({
            "total_length": self.total_length,
            "par_rate": self.par_rate,
            "unit_count": Roll::units_for(self.total_length, self.par_rate),
            "machine_number": self.machine_number,
            "load_date": self.load_date,
        }))
    }
}

fn validate_dimensions(total_length: f64, par_rate: f64) -> Result<()> {
    if !par_rate.is_finite() || par_rate <= 0.0 {
        return Err(LedgerError::InvalidRecord(format!(
            "par rate must be positive, got {}",
            par_rate
        )));
    }
    if !total_length.is_finite() || total_length < 0.0 {
        return Err(LedgerError::InvalidRecord(format!(
            "roll length must not be negative, got {}",
            total_length
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_roll_creation_sets_full_balance() {
        let roll = Roll::new(
            "BIM001".to_string(),
            1000.0,
            50.0,
            Some("M001".to_string()),
            load_date(),
        )
        .unwrap();

        assert_eq!(roll.unit_count, 20);
        assert_eq!(roll.pending_unit_count, 20);
        assert_eq!(roll.pending_length, 1000.0);
        assert_eq!(roll.consumed_length(), 0.0);
        assert!(!roll.is_exhausted());
    }

    #[test]
    fn test_unit_count_is_floored() {
        let roll = Roll::new("BIM002".to_string(), 1030.0, 40.0, None, load_date()).unwrap();

        // 1030 / 40 = 25.75
        assert_eq!(roll.unit_count, 25);
        assert!(roll.pending_length <= roll.total_length);
    }

    #[test]
    fn test_rejects_zero_par_rate() {
        let err = Roll::new("BIM003".to_string(), 1000.0, 0.0, None, load_date()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRecord(_)));

        let err = Roll::new("BIM003".to_string(), -5.0, 10.0, None, load_date()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRecord(_)));
    }

    #[test]
    fn test_balance_consume_and_restore() {
        let balance = RollBalance {
            pending_length: 1000.0,
            pending_unit_count: 50,
        };

        let after = balance.consume(40.0);
        assert_eq!(after.pending_length, 960.0);
        assert_eq!(after.pending_unit_count, 49);

        assert_eq!(after.restore(40.0), balance);
        assert!(!after.is_negative());
        assert!(after.consume(2000.0).is_negative());
    }

    #[test]
    fn test_edit_patch_leaves_balances_out() {
        let draft = RollDraft {
            bim_number: "BIM001".to_string(),
            total_length: 1200.0,
            par_rate: 60.0,
            machine_number: Some("M002".to_string()),
            load_date: load_date(),
        };

        let patch = draft.to_edit_patch().unwrap();
        assert_eq!(patch["unit_count"], 20);
        assert!(patch.get("pending_length").is_none());
        assert!(patch.get("pending_unit_count").is_none());
        assert_eq!(patch["load_date"], "2024-01-15");
    }
}
