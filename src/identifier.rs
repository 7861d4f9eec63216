// 🔢 Identifier Allocator - BIM / Machine / Taka numbers
//
// Human-readable identifiers: BIM001, M001, T001
//
// Each kind has:
// - A sequence counter (monotonic, never hands out the same number twice)
// - A uniqueness set of every identifier seen (issued, typed in, or seeded)
//
// Typing an existing identifier into a creation form is not an error:
// validate_and_register() answers "edit" so the caller loads the record.

use crate::error::{LedgerError, Result, StoreError};
use crate::store::{Collection, RecordStore};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{LazyLock, Mutex, MutexGuard};

static BIM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^BIM[0-9]{3}$").expect("invalid BIM pattern"));
static MACHINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^M[0-9]{3}$").expect("invalid machine pattern"));
static TAKA_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^T[0-9]{3}$").expect("invalid taka pattern"));

// ============================================================================
// IDENTIFIER KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    /// Raw-material roll
    Bim,
    Machine,
    /// Production batch
    Taka,
}

impl IdKind {
    pub const ALL: [IdKind; 3] = [IdKind::Bim, IdKind::Machine, IdKind::Taka];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdKind::Bim => "bim",
            IdKind::Machine => "machine",
            IdKind::Taka => "taka",
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            IdKind::Bim => "BIM",
            IdKind::Machine => "M",
            IdKind::Taka => "T",
        }
    }

    /// Example shown to users when their input does not match
    pub fn example(&self) -> &'static str {
        match self {
            IdKind::Bim => "BIM001",
            IdKind::Machine => "M001",
            IdKind::Taka => "T001",
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            IdKind::Bim => &BIM_PATTERN,
            IdKind::Machine => &MACHINE_PATTERN,
            IdKind::Taka => &TAKA_PATTERN,
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.pattern().is_match(candidate)
    }

    /// Canonical form for a sequence number (zero-padded to 3 digits)
    pub fn format(&self, sequence: u32) -> String {
        format!("{}{:03}", self.prefix(), sequence)
    }

    /// Sequence number of a well-formed identifier
    pub fn sequence_of(&self, id: &str) -> Option<u32> {
        if !self.matches(id) {
            return None;
        }
        id[self.prefix().len()..].parse().ok()
    }

    /// Collection whose records are keyed by this kind
    pub fn collection(&self) -> Collection {
        match self {
            IdKind::Bim => Collection::Rolls,
            IdKind::Machine => Collection::Machines,
            IdKind::Taka => Collection::Production,
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bim" => Ok(IdKind::Bim),
            "machine" => Ok(IdKind::Machine),
            "taka" => Ok(IdKind::Taka),
            _ => Err(LedgerError::UnknownKind(s.to_string())),
        }
    }
}

// ============================================================================
// REGISTRATION RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMode {
    /// New identifier, caller creates a record
    Create,
    /// Known identifier, caller loads the existing record for editing
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: String,
    pub mode: AllocationMode,
    pub message: String,
}

impl Registration {
    pub fn is_edit(&self) -> bool {
        self.mode == AllocationMode::Edit
    }
}

// ============================================================================
// ALLOCATOR STATE
// ============================================================================

/// Counters and uniqueness sets for every kind
#[derive(Debug, Clone, Default)]
pub struct AllocatorState {
    counters: HashMap<IdKind, u32>,
    registered: HashMap<IdKind, BTreeSet<String>>,
}

impl AllocatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register known identifiers and advance the counter past them
    pub fn with_registered<I, S>(mut self, kind: IdKind, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            self.observe(kind, id.into());
        }
        self
    }

    pub fn counter(&self, kind: IdKind) -> u32 {
        self.counters.get(&kind).copied().unwrap_or(0)
    }

    pub fn is_registered(&self, kind: IdKind, id: &str) -> bool {
        self.registered
            .get(&kind)
            .is_some_and(|set| set.contains(id))
    }

    pub fn registered_count(&self, kind: IdKind) -> usize {
        self.registered.get(&kind).map_or(0, BTreeSet::len)
    }

    /// Record an identifier that already exists somewhere
    ///
    /// Returns false when the identifier is malformed and was skipped.
    fn observe(&mut self, kind: IdKind, id: String) -> bool {
        let Some(sequence) = kind.sequence_of(&id) else {
            return false;
        };

        let counter = self.counters.entry(kind).or_insert(0);
        if sequence > *counter {
            *counter = sequence;
        }
        self.registered.entry(kind).or_default().insert(id);
        true
    }

    fn next(&mut self, kind: IdKind) -> String {
        let set = self.registered.entry(kind).or_default();
        let counter = self.counters.entry(kind).or_insert(0);

        loop {
            *counter += 1;
            let candidate = kind.format(*counter);
            if set.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    fn validate_and_register(&mut self, kind: IdKind, candidate: &str) -> Result<Registration> {
        if !kind.matches(candidate) {
            return Err(LedgerError::InvalidFormat {
                kind,
                expected: kind.example(),
            });
        }

        let set = self.registered.entry(kind).or_default();
        if set.contains(candidate) {
            return Ok(Registration {
                id: candidate.to_string(),
                mode: AllocationMode::Edit,
                message: format!("{} number already exists", kind.as_str().to_uppercase()),
            });
        }

        set.insert(candidate.to_string());
        Ok(Registration {
            id: candidate.to_string(),
            mode: AllocationMode::Create,
            message: String::new(),
        })
    }
}

// ============================================================================
// ALLOCATOR
// ============================================================================

/// Thread-safe allocator over an AllocatorState
///
/// One instance per process; share it through Arc.
#[derive(Debug, Default)]
pub struct IdentifierAllocator {
    state: Mutex<AllocatorState>,
}

impl IdentifierAllocator {
    /// Cold-start allocator (nothing registered)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: AllocatorState) -> Self {
        IdentifierAllocator {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AllocatorState> {
        // State stays consistent across a panic: every mutation is a single insert/assign
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register every identifier already present in the store
    ///
    /// Returns how many identifiers were registered.
    pub fn seed_from_store(&self, store: &dyn RecordStore) -> std::result::Result<usize, StoreError> {
        let mut seeded = 0;

        for kind in IdKind::ALL {
            let collection = kind.collection();
            let records = store.read(collection, None)?;

            let mut state = self.lock();
            for record in records {
                let Some(id) = collection.key_of(&record) else {
                    continue;
                };
                if state.observe(kind, id.to_string()) {
                    seeded += 1;
                } else {
                    tracing::debug!(%kind, id, "skipping malformed identifier while seeding");
                }
            }
        }

        tracing::info!(seeded, "identifier allocator seeded from store");
        Ok(seeded)
    }

    /// Next unused identifier of this kind (registered before it is returned)
    ///
    /// Past sequence 999 the number widens to four digits (`T1000`). Those
    /// no longer pass validate_and_register(), so a typed-input path such as
    /// record_production rejects them with InvalidFormat.
    pub fn next(&self, kind: IdKind) -> String {
        let id = self.lock().next(kind);
        tracing::debug!(%kind, %id, "issued identifier");
        id
    }

    /// Check a typed identifier: create mode registers it, edit mode means it exists
    pub fn validate_and_register(&self, kind: IdKind, candidate: &str) -> Result<Registration> {
        self.lock().validate_and_register(kind, candidate)
    }

    /// Rewind the counter; the uniqueness set is kept so issued numbers stay blocked
    pub fn reset(&self, kind: IdKind) {
        self.lock().counters.insert(kind, 0);
        tracing::info!(%kind, "identifier counter reset");
    }

    pub fn counter(&self, kind: IdKind) -> u32 {
        self.lock().counter(kind)
    }

    pub fn is_registered(&self, kind: IdKind, id: &str) -> bool {
        self.lock().is_registered(kind, id)
    }

    /// Copy of the current state (diagnostics)
    pub fn snapshot(&self) -> AllocatorState {
        self.lock().clone()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn factory_defaults() -> IdentifierAllocator {
        IdentifierAllocator::from_state(
            AllocatorState::new()
                .with_registered(IdKind::Bim, ["BIM001", "BIM002", "BIM003"])
                .with_registered(IdKind::Machine, ["M001", "M002", "M003"]),
        )
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("bim".parse::<IdKind>().unwrap(), IdKind::Bim);
        assert_eq!("MACHINE".parse::<IdKind>().unwrap(), IdKind::Machine);
        assert_eq!("Taka".parse::<IdKind>().unwrap(), IdKind::Taka);

        let err = "roll".parse::<IdKind>().unwrap_err();
        assert!(matches!(err, LedgerError::UnknownKind(k) if k == "roll"));
    }

    #[test]
    fn test_format_and_sequence() {
        assert_eq!(IdKind::Bim.format(4), "BIM004");
        assert_eq!(IdKind::Machine.format(12), "M012");
        assert_eq!(IdKind::Taka.format(1), "T001");

        assert_eq!(IdKind::Bim.sequence_of("BIM042"), Some(42));
        assert_eq!(IdKind::Bim.sequence_of("M042"), None);
        assert_eq!(IdKind::Taka.sequence_of("T12"), None);
    }

    #[test]
    fn test_next_is_strictly_increasing() {
        let allocator = IdentifierAllocator::new();

        for kind in IdKind::ALL {
            let issued: Vec<String> = (0..20).map(|_| allocator.next(kind)).collect();

            for id in &issued {
                assert!(kind.matches(id), "{} should match {} pattern", id, kind);
            }
            for pair in issued.windows(2) {
                let a = kind.sequence_of(&pair[0]).unwrap();
                let b = kind.sequence_of(&pair[1]).unwrap();
                assert!(b > a);
            }
            assert_eq!(issued[0], kind.format(1));
        }
    }

    #[test]
    fn test_next_continues_after_defaults() {
        let allocator = factory_defaults();

        assert_eq!(allocator.next(IdKind::Bim), "BIM004");
        assert_eq!(allocator.next(IdKind::Machine), "M004");
        assert_eq!(allocator.next(IdKind::Taka), "T001");
    }

    #[test]
    fn test_next_skips_typed_identifiers() {
        let allocator = IdentifierAllocator::new();

        allocator.validate_and_register(IdKind::Taka, "T002").unwrap();

        assert_eq!(allocator.next(IdKind::Taka), "T001");
        assert_eq!(allocator.next(IdKind::Taka), "T003");
    }

    #[test]
    fn test_validate_create_then_edit() {
        let allocator = factory_defaults();

        let first = allocator.validate_and_register(IdKind::Bim, "BIM004").unwrap();
        assert_eq!(first.mode, AllocationMode::Create);
        assert!(first.message.is_empty());

        let second = allocator.validate_and_register(IdKind::Bim, "BIM004").unwrap();
        assert_eq!(second.mode, AllocationMode::Edit);
        assert_eq!(second.message, "BIM number already exists");
        assert!(second.is_edit());
    }

    #[test]
    fn test_validate_rejects_bad_format() {
        let allocator = factory_defaults();

        let err = allocator
            .validate_and_register(IdKind::Machine, "XYZ")
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidFormat { kind: IdKind::Machine, expected: "M001" }
        ));

        // Wrong prefix for the kind and wrong width
        assert!(allocator.validate_and_register(IdKind::Bim, "M004").is_err());
        assert!(allocator.validate_and_register(IdKind::Taka, "T0001").is_err());
        assert!(allocator.validate_and_register(IdKind::Taka, "t001").is_err());

        // Non-ASCII decimal digits (Arabic-Indic, Devanagari, fullwidth)
        for (kind, id) in [
            (IdKind::Bim, "BIM\u{661}\u{662}\u{663}"),
            (IdKind::Taka, "T\u{966}\u{967}\u{968}"),
            (IdKind::Machine, "M\u{ff10}\u{ff10}\u{ff11}"),
        ] {
            let err = allocator.validate_and_register(kind, id).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidFormat { .. }));
            assert!(!allocator.is_registered(kind, id));
        }

        // Nothing registered on failure
        assert!(!allocator.is_registered(IdKind::Machine, "XYZ"));
    }

    #[test]
    fn test_next_widens_past_999() {
        let allocator = IdentifierAllocator::from_state(
            AllocatorState::new().with_registered(IdKind::Taka, ["T999"]),
        );

        let id = allocator.next(IdKind::Taka);
        assert_eq!(id, "T1000");
        assert_eq!(allocator.counter(IdKind::Taka), 1000);
        assert!(allocator.is_registered(IdKind::Taka, "T1000"));

        // Typed input stays three digits wide
        let err = allocator
            .validate_and_register(IdKind::Taka, &id)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidFormat { kind: IdKind::Taka, .. }));
    }

    #[test]
    fn test_kinds_are_independent() {
        let allocator = IdentifierAllocator::new();

        allocator.next(IdKind::Bim);
        allocator.next(IdKind::Bim);

        assert_eq!(allocator.counter(IdKind::Bim), 2);
        assert_eq!(allocator.counter(IdKind::Machine), 0);
        assert_eq!(allocator.next(IdKind::Machine), "M001");
    }

    #[test]
    fn test_reset_keeps_issued_blocked() {
        let allocator = IdentifierAllocator::new();

        let a = allocator.next(IdKind::Taka);
        let b = allocator.next(IdKind::Taka);
        allocator.reset(IdKind::Taka);

        assert_eq!(allocator.counter(IdKind::Taka), 0);
        let c = allocator.next(IdKind::Taka);
        assert_ne!(c, a);
        assert_ne!(c, b);
        assert_eq!(c, "T003");

        // Previously issued numbers are still known
        let again = allocator.validate_and_register(IdKind::Taka, &a).unwrap();
        assert_eq!(again.mode, AllocationMode::Edit);
    }

    #[test]
    fn test_concurrent_next_never_collides() {
        let allocator = Arc::new(IdentifierAllocator::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                std::thread::spawn(move || {
                    (0..50).map(|_| allocator.next(IdKind::Taka)).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = BTreeSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id), "identifier issued twice");
            }
        }
        assert_eq!(all.len(), 400);
    }

    #[test]
    fn test_seed_from_store() {
        let store = MemoryStore::new();
        store
            .create(Collection::Rolls, json!({"bim_number": "BIM007"}))
            .unwrap();
        store
            .create(Collection::Rolls, json!({"bim_number": "legacy-roll"}))
            .unwrap();
        store
            .create(Collection::Production, json!({"taka_number": "T010"}))
            .unwrap();

        let allocator = IdentifierAllocator::new();
        let seeded = allocator.seed_from_store(&store).unwrap();

        assert_eq!(seeded, 2);
        assert_eq!(allocator.next(IdKind::Bim), "BIM008");
        assert_eq!(allocator.next(IdKind::Taka), "T011");
        assert_eq!(allocator.next(IdKind::Machine), "M001");

        let existing = allocator
            .validate_and_register(IdKind::Bim, "BIM007")
            .unwrap();
        assert!(existing.is_edit());
    }
}
