// Taka Ledger - Core Library
// Floor tracking for a weaving unit: rolls, machines, workers, production entries.
// Exposes all modules for use in the CLI and tests.

pub mod config;
pub mod entities;
pub mod error;
pub mod identifier;  // BIM / M / T number allocation
pub mod ledger;      // Facade the UI talks to
pub mod reconciler;  // Roll balance <-> production entry consistency
pub mod store;

// Re-export commonly used types
pub use config::LedgerConfig;
pub use entities::{
    Machine, MachineDraft, ProductionDraft, ProductionEntry, Roll, RollBalance, RollDraft, Worker,
};
pub use error::{LedgerError, Result, StoreError};
pub use identifier::{AllocationMode, AllocatorState, IdKind, IdentifierAllocator, Registration};
pub use ledger::{Ledger, MachineSave, Saved};
pub use reconciler::{LedgerReconciler, Receipt};
pub use store::{
    ChangeEvent, ChangeKind, Collection, Event, Filter, MemoryStore, RecordStore, SqliteStore,
    WriteOp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
