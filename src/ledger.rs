// 🏭 Ledger - allocator + reconciler + store behind one handle
//
// This is what the floor-tracking UI talks to. Form submissions go through
// here so identifier checks happen before anything is written:
//   save_roll / save_machine  → typed number is new? create : edit
//   record_production         → taka number must be new, then reconcile

use crate::config::LedgerConfig;
use crate::entities::{
    from_record, from_records, to_record, Machine, MachineDraft, ProductionDraft, ProductionEntry,
    Roll, RollDraft, Worker,
};
use crate::error::{LedgerError, Result};
use crate::identifier::{AllocationMode, IdKind, IdentifierAllocator, Registration};
use crate::reconciler::{LedgerReconciler, Receipt};
use crate::store::{Collection, Filter, RecordStore};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;

/// A record written by a save, and whether it was created or edited
#[derive(Debug, Clone, PartialEq)]
pub struct Saved<T> {
    pub record: T,
    pub mode: AllocationMode,
}

/// Result of saving a machine
///
/// Worker back-references are written after the machine; their failures are
/// listed here and never undo the machine write.
#[derive(Debug)]
pub struct MachineSave {
    pub machine: Machine,
    pub mode: AllocationMode,
    /// Workers now pointing at this machine
    pub assigned: Vec<String>,
    /// Workers whose back-reference was cleared (taken off the machine)
    pub released: Vec<String>,
    pub worker_failures: Vec<(String, LedgerError)>,
}

pub struct Ledger {
    store: Arc<dyn RecordStore>,
    allocator: Arc<IdentifierAllocator>,
    reconciler: LedgerReconciler,
}

impl Ledger {
    /// Build a ledger over `store`, seeding the allocator unless disabled
    pub fn open(store: Arc<dyn RecordStore>, config: &LedgerConfig) -> Result<Self> {
        let allocator = IdentifierAllocator::new();
        if config.seed_allocator {
            allocator
                .seed_from_store(store.as_ref())
                .map_err(LedgerError::StoreReadFailed)?;
        }
        Ok(Self::with_allocator(store, Arc::new(allocator), config))
    }

    /// Use an allocator prepared elsewhere (shared between ledgers, or pre-seeded)
    pub fn with_allocator(
        store: Arc<dyn RecordStore>,
        allocator: Arc<IdentifierAllocator>,
        config: &LedgerConfig,
    ) -> Self {
        let reconciler = LedgerReconciler::with_retries(Arc::clone(&store), config.conflict_retries);
        Ledger {
            store,
            allocator,
            reconciler,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn allocator(&self) -> &IdentifierAllocator {
        &self.allocator
    }

    // ========================================================================
    // IDENTIFIERS
    // ========================================================================

    pub fn next_identifier(&self, kind: IdKind) -> String {
        self.allocator.next(kind)
    }

    pub fn check_identifier(&self, kind: IdKind, candidate: &str) -> Result<Registration> {
        self.allocator.validate_and_register(kind, candidate)
    }

    pub fn reset_counter(&self, kind: IdKind) {
        self.allocator.reset(kind)
    }

    // ========================================================================
    // GENERIC HELPERS
    // ========================================================================

    fn find(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        self.store
            .get(collection, id)
            .map_err(LedgerError::StoreReadFailed)
    }

    fn fetch(&self, collection: Collection, id: &str) -> Result<Value> {
        self.find(collection, id)?
            .ok_or_else(|| LedgerError::NotFound {
                collection,
                id: id.to_string(),
            })
    }

    fn list(&self, collection: Collection, filter: Option<&Filter>) -> Result<Vec<Value>> {
        self.store
            .read(collection, filter)
            .map_err(LedgerError::StoreReadFailed)
    }

    fn create(&self, collection: Collection, record: Value) -> Result<Value> {
        self.store
            .create(collection, record)
            .map_err(LedgerError::from_write)
    }

    fn update(&self, collection: Collection, id: &str, patch: Value) -> Result<Value> {
        self.store
            .update(collection, id, patch)
            .map_err(LedgerError::from_write)
    }

    fn remove(&self, collection: Collection, id: &str) -> Result<()> {
        self.store
            .delete(collection, id)
            .map_err(LedgerError::from_write)
    }

    /// Register the typed number, then decide create vs edit by what the store holds
    ///
    /// A number issued by next() but never saved is registered without a
    /// record behind it; that still counts as a create.
    fn resolve_mode(&self, kind: IdKind, id: &str) -> Result<AllocationMode> {
        let registration = self.allocator.validate_and_register(kind, id)?;
        if registration.mode == AllocationMode::Create {
            return Ok(AllocationMode::Create);
        }
        Ok(match self.find(kind.collection(), id)? {
            Some(_) => AllocationMode::Edit,
            None => AllocationMode::Create,
        })
    }

    // ========================================================================
    // ROLLS
    // ========================================================================

    /// Load a new roll, or edit the existing one with the same BIM number
    pub fn save_roll(&self, draft: RollDraft) -> Result<Saved<Roll>> {
        // Reject bad dimensions before the number gets registered
        draft.to_edit_patch()?;

        match self.resolve_mode(IdKind::Bim, &draft.bim_number)? {
            AllocationMode::Create => {
                let roll = draft.into_roll()?;
                let stored = self.create(Collection::Rolls, to_record(&roll)?)?;
                let roll: Roll = from_record(stored)?;
                tracing::info!(roll = %roll.bim_number, units = roll.unit_count, "roll loaded");
                Ok(Saved {
                    record: roll,
                    mode: AllocationMode::Create,
                })
            }
            AllocationMode::Edit => {
                let bim_number = draft.bim_number.clone();
                let roll = self.update_roll(&bim_number, &draft)?;
                Ok(Saved {
                    record: roll,
                    mode: AllocationMode::Edit,
                })
            }
        }
    }

    pub fn roll(&self, bim_number: &str) -> Result<Roll> {
        from_record(self.fetch(Collection::Rolls, bim_number)?)
    }

    pub fn rolls(&self) -> Result<Vec<Roll>> {
        from_records(self.list(Collection::Rolls, None)?)
    }

    pub fn rolls_on_machine(&self, machine_number: &str) -> Result<Vec<Roll>> {
        let filter = Filter::eq("machine_number", machine_number);
        from_records(self.list(Collection::Rolls, Some(&filter))?)
    }

    /// Change a roll's descriptive fields; balances stay with the reconciler
    pub fn update_roll(&self, bim_number: &str, draft: &RollDraft) -> Result<Roll> {
        let roll = self.reconciler.edit_roll(bim_number, draft)?;
        tracing::info!(roll = bim_number, total_length = roll.total_length, "roll edited");
        Ok(roll)
    }

    pub fn delete_roll(&self, bim_number: &str) -> Result<()> {
        self.remove(Collection::Rolls, bim_number)?;
        tracing::info!(roll = bim_number, "roll deleted");
        Ok(())
    }

    // ========================================================================
    // MACHINES
    // ========================================================================

    /// Create a machine or edit the existing one, then point its workers at it
    pub fn save_machine(&self, draft: MachineDraft) -> Result<MachineSave> {
        draft.to_edit_patch()?;

        match self.resolve_mode(IdKind::Machine, &draft.machine_number)? {
            AllocationMode::Create => {
                let machine = draft.into_machine()?;
                let stored = self.create(Collection::Machines, to_record(&machine)?)?;
                let machine: Machine = from_record(stored)?;
                tracing::info!(machine = %machine.machine_number, "machine added");
                Ok(self.propagate_workers(machine, AllocationMode::Create, &[]))
            }
            AllocationMode::Edit => {
                let machine_number = draft.machine_number.clone();
                self.update_machine(&machine_number, &draft)
            }
        }
    }

    pub fn machine(&self, machine_number: &str) -> Result<Machine> {
        from_record(self.fetch(Collection::Machines, machine_number)?)
    }

    pub fn machines(&self) -> Result<Vec<Machine>> {
        from_records(self.list(Collection::Machines, None)?)
    }

    pub fn update_machine(&self, machine_number: &str, draft: &MachineDraft) -> Result<MachineSave> {
        let previous = self.machine(machine_number)?;
        let stored = self.update(Collection::Machines, machine_number, draft.to_edit_patch()?)?;
        let machine: Machine = from_record(stored)?;
        tracing::info!(machine = machine_number, "machine edited");

        let dropped: Vec<String> = previous
            .worker_ids
            .into_iter()
            .filter(|id| !machine.has_worker(id))
            .collect();
        Ok(self.propagate_workers(machine, AllocationMode::Edit, &dropped))
    }

    pub fn delete_machine(&self, machine_number: &str) -> Result<()> {
        self.remove(Collection::Machines, machine_number)?;
        tracing::info!(machine = machine_number, "machine deleted");
        Ok(())
    }

    /// Write worker back-references concurrently; each write stands alone
    fn propagate_workers(&self, machine: Machine, mode: AllocationMode, dropped: &[String]) -> MachineSave {
        let machine_number = machine.machine_number.as_str();
        let assign_patch = json!({ "machine_number": machine_number });
        let release_patch = json!({ "machine_number": null });

        let outcomes: Vec<(String, bool, Result<()>)> = std::thread::scope(|scope| {
            let assigns = machine.worker_ids.iter().map(|id| (id, true, &assign_patch));
            let releases = dropped.iter().map(|id| (id, false, &release_patch));

            let handles: Vec<_> = assigns
                .chain(releases)
                .map(|(id, assign, patch)| {
                    let handle = scope.spawn(move || {
                        if assign {
                            self.update(Collection::Workers, id, patch.clone()).map(|_| ())
                        } else {
                            self.release_worker(id, machine_number)
                        }
                    });
                    (id.clone(), assign, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(id, assign, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(LedgerError::InvalidRecord(format!(
                            "worker {} update panicked",
                            id
                        )))
                    });
                    (id, assign, result)
                })
                .collect()
        });

        let mut save = MachineSave {
            machine,
            mode,
            assigned: Vec::new(),
            released: Vec::new(),
            worker_failures: Vec::new(),
        };

        for (id, assign, result) in outcomes {
            match result {
                Ok(()) if assign => save.assigned.push(id),
                Ok(()) => save.released.push(id),
                Err(err) => {
                    tracing::warn!(
                        machine = %save.machine.machine_number,
                        worker = %id,
                        error = %err,
                        "worker back-reference not written"
                    );
                    save.worker_failures.push((id, err));
                }
            }
        }
        save
    }

    /// Clear a worker's back-reference if it still points at this machine
    fn release_worker(&self, worker_id: &str, machine_number: &str) -> Result<()> {
        let worker: Worker = from_record(self.fetch(Collection::Workers, worker_id)?)?;
        if worker.machine_number.as_deref() == Some(machine_number) {
            self.update(Collection::Workers, worker_id, json!({ "machine_number": null }))?;
        }
        Ok(())
    }

    // ========================================================================
    // WORKERS
    // ========================================================================

    pub fn add_worker(&self, name: &str, contact: &str) -> Result<Worker> {
        let worker = Worker::new(name.to_string(), contact.to_string());
        let stored = self.create(Collection::Workers, to_record(&worker)?)?;
        tracing::info!(worker = %worker.id, "worker added");
        from_record(stored)
    }

    pub fn worker(&self, id: &str) -> Result<Worker> {
        from_record(self.fetch(Collection::Workers, id)?)
    }

    pub fn workers(&self) -> Result<Vec<Worker>> {
        from_records(self.list(Collection::Workers, None)?)
    }

    /// Name/contact edits; the machine back-reference is not editable here
    pub fn update_worker(&self, id: &str, name: Option<&str>, contact: Option<&str>) -> Result<Worker> {
        let mut patch = serde_json::Map::new();
        if let Some(name) = name {
            patch.insert("name".to_string(), Value::from(name));
        }
        if let Some(contact) = contact {
            patch.insert("contact".to_string(), Value::from(contact));
        }
        from_record(self.update(Collection::Workers, id, Value::Object(patch))?)
    }

    pub fn delete_worker(&self, id: &str) -> Result<()> {
        self.remove(Collection::Workers, id)
    }

    // ========================================================================
    // PRODUCTION
    // ========================================================================

    /// Check the taka number, then commit the entry against its roll
    pub fn record_production(&self, draft: ProductionDraft) -> Result<Receipt> {
        if self.resolve_mode(IdKind::Taka, &draft.taka_number)? == AllocationMode::Edit {
            return Err(LedgerError::DuplicateRejected {
                kind: IdKind::Taka,
                id: draft.taka_number,
            });
        }
        self.reconciler.commit_production(draft)
    }

    /// Undo an entry; the taka number stays used
    pub fn revert_production(&self, taka_number: &str) -> Result<Receipt> {
        self.reconciler.revert_production(taka_number)
    }

    pub fn production_entry(&self, taka_number: &str) -> Result<ProductionEntry> {
        from_record(self.fetch(Collection::Production, taka_number)?)
    }

    pub fn production(&self) -> Result<Vec<ProductionEntry>> {
        from_records(self.list(Collection::Production, None)?)
    }

    pub fn production_for_roll(&self, bim_number: &str) -> Result<Vec<ProductionEntry>> {
        let filter = Filter::eq("roll_number", bim_number);
        from_records(self.list(Collection::Production, Some(&filter))?)
    }

    /// Sum of total contributions recorded on one date
    pub fn day_total(&self, date: NaiveDate) -> Result<f64> {
        let filter = Filter::eq("date", date.format("%Y-%m-%d").to_string());
        let entries: Vec<ProductionEntry> =
            from_records(self.list(Collection::Production, Some(&filter))?)?;
        Ok(entries.iter().map(|e| e.total_contribution).sum())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{Listener, MemoryStore, SqliteStore, StoreResult};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn ledger() -> Ledger {
        Ledger::open(Arc::new(MemoryStore::new()), &LedgerConfig::default()).unwrap()
    }

    fn roll_draft(bim: &str, meters: f64, par: f64) -> RollDraft {
        RollDraft {
            bim_number: bim.to_string(),
            total_length: meters,
            par_rate: par,
            machine_number: Some("M001".to_string()),
            load_date: date(15),
        }
    }

    fn production(taka: &str, bim: &str, w: [f64; 3], wet: f64) -> ProductionDraft {
        ProductionDraft {
            date: date(20),
            taka_number: taka.to_string(),
            machine_number: "M001".to_string(),
            roll_number: bim.to_string(),
            worker1: Some(w[0]),
            worker2: Some(w[1]),
            worker3: Some(w[2]),
            wet: Some(wet),
        }
    }

    #[test]
    fn test_save_roll_create_then_edit() {
        let ledger = ledger();

        let created = ledger.save_roll(roll_draft("BIM001", 1000.0, 50.0)).unwrap();
        assert_eq!(created.mode, AllocationMode::Create);
        assert_eq!(created.record.pending_unit_count, 20);

        ledger
            .record_production(production("T001", "BIM001", [20.0, 15.0, 5.0], 8.0))
            .unwrap();

        // Same number again: edit, balances untouched
        let edited = ledger.save_roll(roll_draft("BIM001", 1200.0, 50.0)).unwrap();
        assert_eq!(edited.mode, AllocationMode::Edit);
        assert_eq!(edited.record.total_length, 1200.0);
        assert_eq!(edited.record.unit_count, 24);
        assert_eq!(edited.record.pending_length, 960.0);
        assert_eq!(edited.record.pending_unit_count, 19);
        assert_eq!(ledger.rolls().unwrap().len(), 1);
    }

    #[test]
    fn test_edit_cannot_shrink_roll_below_pending() {
        let ledger = ledger();
        ledger.save_roll(roll_draft("BIM001", 1000.0, 20.0)).unwrap();

        let err = ledger.save_roll(roll_draft("BIM001", 500.0, 20.0)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRecord(_)));

        let roll = ledger.roll("BIM001").unwrap();
        assert_eq!(roll.total_length, 1000.0);
        assert_eq!(roll.pending_length, 1000.0);
        assert_eq!(roll.version, 1);
    }

    #[test]
    fn test_save_roll_with_issued_number() {
        let ledger = ledger();

        let bim = ledger.next_identifier(IdKind::Bim);
        let saved = ledger.save_roll(roll_draft(&bim, 500.0, 25.0)).unwrap();

        assert_eq!(saved.mode, AllocationMode::Create);
        assert_eq!(saved.record.bim_number, "BIM001");
    }

    #[test]
    fn test_save_roll_rejects_bad_input() {
        let ledger = ledger();

        let err = ledger.save_roll(roll_draft("B-1", 100.0, 10.0)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidFormat { kind: IdKind::Bim, .. }));

        let err = ledger.save_roll(roll_draft("BIM005", 100.0, 0.0)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRecord(_)));
        assert!(!ledger.allocator().is_registered(IdKind::Bim, "BIM005"));
    }

    #[test]
    fn test_roll_queries() {
        let ledger = ledger();
        ledger.save_roll(roll_draft("BIM001", 1000.0, 50.0)).unwrap();
        let mut other = roll_draft("BIM002", 800.0, 40.0);
        other.machine_number = Some("M002".to_string());
        ledger.save_roll(other).unwrap();

        assert_eq!(ledger.rolls_on_machine("M002").unwrap().len(), 1);
        assert_eq!(ledger.roll("BIM002").unwrap().unit_count, 20);

        ledger.delete_roll("BIM002").unwrap();
        assert!(matches!(
            ledger.roll("BIM002").unwrap_err(),
            LedgerError::NotFound { collection: Collection::Rolls, .. }
        ));
        assert!(matches!(
            ledger.delete_roll("BIM002").unwrap_err(),
            LedgerError::NotFound { .. }
        ));
        assert!(matches!(
            ledger.update_roll("BIM404", &roll_draft("BIM404", 1.0, 1.0)).unwrap_err(),
            LedgerError::NotFound { .. }
        ));
    }

    #[test]
    fn test_record_production_flow() {
        let ledger = ledger();
        ledger.save_roll(roll_draft("BIM001", 1000.0, 20.0)).unwrap();

        let taka = ledger.next_identifier(IdKind::Taka);
        let receipt = ledger
            .record_production(production(&taka, "BIM001", [20.0, 15.0, 5.0], 8.0))
            .unwrap();

        assert_eq!(receipt.entry.taka_number, "T001");
        assert_eq!(receipt.roll.pending_length, 960.0);
        assert_eq!(receipt.roll.pending_unit_count, 49);
        assert_eq!(ledger.production_for_roll("BIM001").unwrap().len(), 1);
        assert_eq!(ledger.day_total(date(20)).unwrap(), 40.0);
        assert_eq!(ledger.day_total(date(21)).unwrap(), 0.0);
    }

    #[test]
    fn test_record_production_rejects_reused_taka() {
        let ledger = ledger();
        ledger.save_roll(roll_draft("BIM001", 1000.0, 20.0)).unwrap();
        ledger
            .record_production(production("T001", "BIM001", [1.0, 1.0, 1.0], 1.0))
            .unwrap();

        let err = ledger
            .record_production(production("T001", "BIM001", [1.0, 1.0, 1.0], 1.0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateRejected { kind: IdKind::Taka, .. }));

        let err = ledger
            .record_production(production("X1", "BIM001", [1.0, 1.0, 1.0], 1.0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidFormat { kind: IdKind::Taka, .. }));

        assert_eq!(ledger.roll("BIM001").unwrap().pending_unit_count, 49);
    }

    #[test]
    fn test_auto_taka_past_999_is_rejected() {
        use crate::identifier::AllocatorState;

        let allocator = IdentifierAllocator::from_state(
            AllocatorState::new().with_registered(IdKind::Taka, ["T999"]),
        );
        let ledger = Ledger::with_allocator(
            Arc::new(MemoryStore::new()),
            Arc::new(allocator),
            &LedgerConfig::default(),
        );
        ledger.save_roll(roll_draft("BIM001", 1000.0, 20.0)).unwrap();

        let taka = ledger.next_identifier(IdKind::Taka);
        assert_eq!(taka, "T1000");

        let err = ledger
            .record_production(production(&taka, "BIM001", [1.0, 0.0, 0.0], 0.0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidFormat { kind: IdKind::Taka, .. }));
        assert_eq!(ledger.roll("BIM001").unwrap().pending_unit_count, 50);
    }

    #[test]
    fn test_reverted_taka_number_stays_used() {
        let ledger = ledger();
        ledger.save_roll(roll_draft("BIM001", 1000.0, 20.0)).unwrap();
        ledger
            .record_production(production("T001", "BIM001", [10.0, 0.0, 0.0], 1.0))
            .unwrap();

        ledger.revert_production("T001").unwrap();

        assert_eq!(ledger.roll("BIM001").unwrap().pending_length, 1000.0);
        assert_eq!(ledger.next_identifier(IdKind::Taka), "T002");
    }

    #[test]
    fn test_open_seeds_from_existing_store() {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        {
            let first = Ledger::open(Arc::clone(&store), &LedgerConfig::default()).unwrap();
            first.save_roll(roll_draft("BIM001", 1000.0, 20.0)).unwrap();
            first.save_roll(roll_draft("BIM002", 1000.0, 20.0)).unwrap();
            first
                .record_production(production("T001", "BIM001", [1.0, 0.0, 0.0], 0.0))
                .unwrap();
        }

        let restarted = Ledger::open(Arc::clone(&store), &LedgerConfig::default()).unwrap();
        assert_eq!(restarted.next_identifier(IdKind::Bim), "BIM003");
        assert_eq!(restarted.next_identifier(IdKind::Taka), "T002");

        let err = restarted
            .record_production(production("T001", "BIM002", [1.0, 0.0, 0.0], 0.0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateRejected { .. }));
    }

    #[test]
    fn test_save_machine_assigns_workers() {
        let ledger = ledger();
        let a = ledger.add_worker("Ramesh", "111").unwrap();
        let b = ledger.add_worker("Suresh", "222").unwrap();
        let c = ledger.add_worker("Mahesh", "333").unwrap();

        let save = ledger
            .save_machine(MachineDraft {
                machine_number: "M001".to_string(),
                production_rate: 100.0,
                worker_ids: vec![a.id.clone(), b.id.clone()],
                roll_number: None,
            })
            .unwrap();

        assert_eq!(save.mode, AllocationMode::Create);
        assert_eq!(save.assigned.len(), 2);
        assert!(save.worker_failures.is_empty());
        assert_eq!(ledger.worker(&a.id).unwrap().machine_number.as_deref(), Some("M001"));

        // Edit: swap Suresh for Mahesh
        let save = ledger
            .save_machine(MachineDraft {
                machine_number: "M001".to_string(),
                production_rate: 110.0,
                worker_ids: vec![a.id.clone(), c.id.clone()],
                roll_number: Some("BIM001".to_string()),
            })
            .unwrap();

        assert_eq!(save.mode, AllocationMode::Edit);
        assert_eq!(save.machine.production_rate, 110.0);
        assert_eq!(save.released, vec![b.id.clone()]);
        assert_eq!(ledger.worker(&b.id).unwrap().machine_number, None);
        assert_eq!(ledger.worker(&c.id).unwrap().machine_number.as_deref(), Some("M001"));
        assert_eq!(ledger.machines().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_worker_does_not_block_machine() {
        let ledger = ledger();
        let a = ledger.add_worker("Ramesh", "111").unwrap();

        let save = ledger
            .save_machine(MachineDraft {
                machine_number: "M002".to_string(),
                production_rate: 120.0,
                worker_ids: vec![a.id.clone(), "ghost".to_string()],
                roll_number: None,
            })
            .unwrap();

        assert_eq!(save.assigned, vec![a.id.clone()]);
        assert_eq!(save.worker_failures.len(), 1);
        assert_eq!(save.worker_failures[0].0, "ghost");
        assert!(matches!(save.worker_failures[0].1, LedgerError::NotFound { .. }));
        assert!(ledger.machine("M002").is_ok());
    }

    #[test]
    fn test_worker_crud() {
        let ledger = ledger();
        let worker = ledger.add_worker("Ramesh", "111").unwrap();
        assert_eq!(worker.version, 1);

        let updated = ledger.update_worker(&worker.id, None, Some("999")).unwrap();
        assert_eq!(updated.name, "Ramesh");
        assert_eq!(updated.contact, "999");
        assert_eq!(updated.version, 2);

        ledger.delete_worker(&worker.id).unwrap();
        assert!(ledger.workers().unwrap().is_empty());
        assert!(matches!(
            ledger.update_worker(&worker.id, Some("x"), None).unwrap_err(),
            LedgerError::NotFound { .. }
        ));
    }

    /// Store that refuses every read, to check error mapping on open
    struct DownStore;

    impl RecordStore for DownStore {
        fn create(&self, _: Collection, _: Value) -> StoreResult<Value> {
            Err(StoreError::Backend("down".to_string()))
        }
        fn read(&self, _: Collection, _: Option<&Filter>) -> StoreResult<Vec<Value>> {
            Err(StoreError::Backend("down".to_string()))
        }
        fn update(&self, _: Collection, _: &str, _: Value) -> StoreResult<Value> {
            Err(StoreError::Backend("down".to_string()))
        }
        fn update_if_version(&self, _: Collection, _: &str, _: i64, _: Value) -> StoreResult<Value> {
            Err(StoreError::Backend("down".to_string()))
        }
        fn delete(&self, _: Collection, _: &str) -> StoreResult<()> {
            Err(StoreError::Backend("down".to_string()))
        }
        fn subscribe(&self, _: Collection, _: Listener) {}
    }

    #[test]
    fn test_open_reports_unreachable_store() {
        let err = Ledger::open(Arc::new(DownStore), &LedgerConfig::default()).err().unwrap();
        assert!(matches!(err, LedgerError::StoreReadFailed(_)));

        let config = LedgerConfig {
            seed_allocator: false,
            ..LedgerConfig::default()
        };
        let ledger = Ledger::open(Arc::new(DownStore), &config).unwrap();
        assert!(matches!(
            ledger.add_worker("A", "1").unwrap_err(),
            LedgerError::StoreWriteFailed(_)
        ));
    }
}
