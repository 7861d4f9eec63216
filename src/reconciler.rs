// ⚖️ Ledger Reconciler - roll balances vs production entries
//
// Every production entry draws one Taka from a roll:
//   pending_length'     = pending_length - total_contribution
//   pending_unit_count' = pending_unit_count - 1
//
// The roll update and the entry write must land together. Two strategies:
// - Batch: the store applies both in one transaction (SqliteStore)
// - Saga:  roll update, then entry write; if the entry write fails, a
//          compensating update puts the old balance back. If that fails
//          too the caller gets PartialCommit.
//
// Roll updates are version-checked, and writes to the same roll are
// serialized inside the process, so concurrent commits never drop a decrement.

use crate::entities::{
    from_record, to_record, ProductionDraft, ProductionEntry, Roll, RollBalance, RollDraft,
};
use crate::error::{LedgerError, Result, StoreError};
use crate::store::{version_of, Collection, RecordStore, WriteOp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

// ============================================================================
// RECEIPT
// ============================================================================

/// What a commit or revert left in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub entry: ProductionEntry,
    /// Roll snapshot after the balance change
    pub roll: Roll,
}

/// Second half of the two-record write
enum EntryWrite {
    Create(Value),
    Delete(String),
}

/// Why one write attempt did not go through
enum AttemptError {
    /// Roll version moved since we read it; safe to re-read and retry
    Conflict,
    Failed(LedgerError),
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct LedgerReconciler {
    store: Arc<dyn RecordStore>,

    /// One lock per BIM number while some write holds it
    roll_locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,

    /// Re-reads allowed after a version conflict
    pub conflict_retries: u32,
}

impl LedgerReconciler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_retries(store, crate::config::DEFAULT_CONFLICT_RETRIES)
    }

    pub fn with_retries(store: Arc<dyn RecordStore>, conflict_retries: u32) -> Self {
        LedgerReconciler {
            store,
            roll_locks: Mutex::new(HashMap::new()),
            conflict_retries,
        }
    }

    /// Record one Taka and draw its length from the roll
    ///
    /// The taka number must already be registered with the allocator in
    /// create mode; this component does not check it.
    pub fn commit_production(&self, draft: ProductionDraft) -> Result<Receipt> {
        let entry = draft.into_entry()?;
        let record = to_record(&entry)?;
        let total = entry.total_contribution;

        let (roll, stored) = self.apply(
            &entry.roll_number,
            &entry.taka_number,
            EntryWrite::Create(record),
            |balance| balance.consume(total),
        )?;

        let entry: ProductionEntry = match stored {
            Some(record) => from_record(record)?,
            None => entry,
        };

        tracing::info!(
            taka = %entry.taka_number,
            roll = %roll.bim_number,
            total_contribution = entry.total_contribution,
            pending_length = roll.pending_length,
            pending_unit_count = roll.pending_unit_count,
            "production committed"
        );

        Ok(Receipt { entry, roll })
    }

    /// Remove an entry and give its length and Taka back to the roll
    pub fn revert_production(&self, taka_number: &str) -> Result<Receipt> {
        let record = self
            .store
            .get(Collection::Production, taka_number)
            .map_err(LedgerError::StoreReadFailed)?
            .ok_or_else(|| LedgerError::NotFound {
                collection: Collection::Production,
                id: taka_number.to_string(),
            })?;
        let entry: ProductionEntry = from_record(record)?;
        let total = entry.total_contribution;

        let (roll, _) = self.apply(
            &entry.roll_number,
            taka_number,
            EntryWrite::Delete(taka_number.to_string()),
            |balance| balance.restore(total),
        )?;

        tracing::info!(
            taka = %entry.taka_number,
            roll = %roll.bim_number,
            pending_length = roll.pending_length,
            pending_unit_count = roll.pending_unit_count,
            "production reverted"
        );

        Ok(Receipt { entry, roll })
    }

    fn roll_lock(&self, roll_number: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .roll_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(lock) = locks.get(roll_number).and_then(Weak::upgrade) {
            return lock;
        }

        // Drop entries for rolls nobody is writing to (finished or deleted)
        locks.retain(|_, lock| lock.strong_count() > 0);

        let lock = Arc::new(Mutex::new(()));
        locks.insert(roll_number.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Change a roll's descriptive fields without touching its balances
    ///
    /// The new total length may not drop below what is still pending. The
    /// write is version-checked against the roll that was validated.
    pub fn edit_roll(&self, roll_number: &str, draft: &RollDraft) -> Result<Roll> {
        let patch = draft.to_edit_patch()?;

        let lock = self.roll_lock(roll_number);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut attempts = 0;
        loop {
            attempts += 1;

            let roll = self.read_roll(roll_number).map_err(|err| match err {
                LedgerError::RollNotFound(id) => LedgerError::NotFound {
                    collection: Collection::Rolls,
                    id,
                },
                other => other,
            })?;

            if draft.total_length < roll.pending_length {
                return Err(LedgerError::InvalidRecord(format!(
                    "roll {} still has {} m pending, total length cannot be {}",
                    roll_number, roll.pending_length, draft.total_length
                )));
            }

            match self
                .store
                .update_if_version(Collection::Rolls, roll_number, roll.version, patch.clone())
            {
                Ok(updated) => return from_record(updated),
                Err(StoreError::Conflict { .. }) if attempts <= self.conflict_retries => {
                    tracing::debug!(roll = roll_number, attempts, "roll changed during edit, retrying");
                }
                Err(StoreError::Conflict { .. }) => {
                    return Err(LedgerError::Conflict {
                        roll_number: roll_number.to_string(),
                        attempts,
                    });
                }
                Err(other) => return Err(LedgerError::from_write(other)),
            }
        }
    }

    fn read_roll(&self, roll_number: &str) -> Result<Roll> {
        let record = self
            .store
            .get(Collection::Rolls, roll_number)
            .map_err(LedgerError::StoreReadFailed)?
            .ok_or_else(|| LedgerError::RollNotFound(roll_number.to_string()))?;
        from_record(record)
    }

    /// Read-modify-write loop around one balance change + entry write
    fn apply<F>(
        &self,
        roll_number: &str,
        taka_number: &str,
        entry_write: EntryWrite,
        adjust: F,
    ) -> Result<(Roll, Option<Value>)>
    where
        F: Fn(RollBalance) -> RollBalance,
    {
        let lock = self.roll_lock(roll_number);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut attempts = 0;
        loop {
            attempts += 1;

            let roll = self.read_roll(roll_number)?;
            let before = roll.balance();
            let after = adjust(before);

            if after.is_negative() {
                tracing::warn!(
                    roll = roll_number,
                    pending_length = after.pending_length,
                    pending_unit_count = after.pending_unit_count,
                    "roll balance going negative"
                );
            }

            let outcome = if self.store.supports_batch() {
                self.write_batch(&roll, after, &entry_write)
            } else {
                self.write_saga(&roll, before, after, taka_number, &entry_write)
            };

            match outcome {
                Ok(done) => return Ok(done),
                Err(AttemptError::Conflict) if attempts <= self.conflict_retries => {
                    tracing::debug!(roll = roll_number, attempts, "roll changed underneath, retrying");
                }
                Err(AttemptError::Conflict) => {
                    return Err(LedgerError::Conflict {
                        roll_number: roll_number.to_string(),
                        attempts,
                    });
                }
                Err(AttemptError::Failed(err)) => return Err(err),
            }
        }
    }

    fn write_batch(
        &self,
        roll: &Roll,
        after: RollBalance,
        entry_write: &EntryWrite,
    ) -> std::result::Result<(Roll, Option<Value>), AttemptError> {
        let mut ops = vec![WriteOp::UpdateIfVersion {
            collection: Collection::Rolls,
            id: roll.bim_number.clone(),
            expected: roll.version,
            patch: after.to_patch(),
        }];
        ops.push(match entry_write {
            EntryWrite::Create(record) => WriteOp::Create {
                collection: Collection::Production,
                record: record.clone(),
            },
            EntryWrite::Delete(id) => WriteOp::Delete {
                collection: Collection::Production,
                id: id.clone(),
            },
        });

        let mut results = self
            .store
            .write_batch(ops)
            .map_err(|err| classify_roll_error(&roll.bim_number, err))?
            .into_iter();

        let roll: Roll = results
            .next()
            .ok_or_else(|| {
                AttemptError::Failed(LedgerError::StoreWriteFailed(StoreError::Backend(
                    "batch returned no roll".to_string(),
                )))
            })
            .and_then(|record| from_record(record).map_err(AttemptError::Failed))?;
        let entry = match entry_write {
            EntryWrite::Create(_) => results.next(),
            EntryWrite::Delete(_) => None,
        };

        Ok((roll, entry))
    }

    fn write_saga(
        &self,
        roll: &Roll,
        before: RollBalance,
        after: RollBalance,
        taka_number: &str,
        entry_write: &EntryWrite,
    ) -> std::result::Result<(Roll, Option<Value>), AttemptError> {
        // Step 1: roll balance (nothing to undo if this fails)
        let updated = self
            .store
            .update_if_version(Collection::Rolls, &roll.bim_number, roll.version, after.to_patch())
            .map_err(|err| classify_roll_error(&roll.bim_number, err))?;
        let updated_version = version_of(&updated);

        // Step 2: the production entry
        let written = match entry_write {
            EntryWrite::Create(record) => self
                .store
                .create(Collection::Production, record.clone())
                .map(Some),
            EntryWrite::Delete(id) => self.store.delete(Collection::Production, id).map(|_| None),
        };

        match written {
            Ok(entry) => {
                let roll: Roll = from_record(updated).map_err(AttemptError::Failed)?;
                Ok((roll, entry))
            }
            Err(entry_err) => Err(AttemptError::Failed(self.compensate(
                roll,
                before,
                updated_version,
                taka_number,
                entry_err,
            ))),
        }
    }

    /// Put the old balance back after the entry write failed
    fn compensate(
        &self,
        roll: &Roll,
        before: RollBalance,
        updated_version: i64,
        taka_number: &str,
        entry_err: StoreError,
    ) -> LedgerError {
        tracing::warn!(
            roll = %roll.bim_number,
            taka = taka_number,
            error = %entry_err,
            "entry write failed, restoring roll balance"
        );

        match self.store.update_if_version(
            Collection::Rolls,
            &roll.bim_number,
            updated_version,
            before.to_patch(),
        ) {
            Ok(_) => LedgerError::StoreWriteFailed(entry_err),
            Err(restore_err) => {
                tracing::error!(
                    roll = %roll.bim_number,
                    taka = taka_number,
                    entry_error = %entry_err,
                    restore_error = %restore_err,
                    "roll balance left without matching production entry"
                );
                LedgerError::PartialCommit {
                    roll_number: roll.bim_number.clone(),
                    taka_number: taka_number.to_string(),
                    detail: format!(
                        "entry write failed ({}); balance restore failed ({})",
                        entry_err, restore_err
                    ),
                }
            }
        }
    }
}

/// Sort a failed roll write into retry / not found / hard failure
fn classify_roll_error(roll_number: &str, err: StoreError) -> AttemptError {
    match err {
        StoreError::Conflict {
            collection: Collection::Rolls,
            ..
        } => AttemptError::Conflict,
        StoreError::NotFound {
            collection: Collection::Rolls,
            ..
        } => AttemptError::Failed(LedgerError::RollNotFound(roll_number.to_string())),
        other => AttemptError::Failed(LedgerError::StoreWriteFailed(other)),
    }
}

// ============================================================================
// TESTS
// ============================================================================
