// Runtime configuration (environment driven)

use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "taka-ledger.db";
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// SQLite file used by the CLI
    pub db_path: PathBuf,

    /// Re-reads allowed when a roll changed between read and write
    pub conflict_retries: u32,

    /// Register existing store identifiers with the allocator on open
    pub seed_allocator: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            seed_allocator: true,
        }
    }
}

impl LedgerConfig {
    /// TAKA_LEDGER_DB, TAKA_LEDGER_CONFLICT_RETRIES, TAKA_LEDGER_SEED
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LedgerConfig::default();

        LedgerConfig {
            db_path: lookup("TAKA_LEDGER_DB")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            conflict_retries: lookup("TAKA_LEDGER_CONFLICT_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.conflict_retries),
            seed_allocator: lookup("TAKA_LEDGER_SEED")
                .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(defaults.seed_allocator),
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }
}
