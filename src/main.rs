use anyhow::{bail, Context, Result};
use chrono::Local;
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use taka_ledger::{
    Collection, IdKind, Ledger, LedgerConfig, ProductionDraft, RecordStore, RollDraft, SqliteStore,
};

const USAGE: &str = "\
Usage: taka-ledger <command>

Commands:
  init                                             create the database
  next <bim|machine|taka>                          show the next free number
  check <bim|machine|taka> <id>                    new number or existing record?
  rolls                                            list rolls with balances
  add-roll <bim|auto> <meters> <par> [machine]     load a roll (or edit it)
  produce <taka|auto> <bim> <machine> <w1> <w2> <w3> <wet>
                                                   record one Taka
  revert <taka>                                    undo a production entry
  history <collection> <id>                        change log for a record

Environment: TAKA_LEDGER_DB, TAKA_LEDGER_CONFLICT_RETRIES, TAKA_LEDGER_SEED, RUST_LOG";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taka_ledger=info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = LedgerConfig::from_env();

    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[1..];

    match command.as_str() {
        "init" => run_init(&config),
        "next" => run_next(&config, rest),
        "check" => run_check(&config, rest),
        "rolls" => run_rolls(&config),
        "add-roll" => run_add_roll(&config, rest),
        "produce" => run_produce(&config, rest),
        "revert" => run_revert(&config, rest),
        "history" => run_history(&config, rest),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn open_store(config: &LedgerConfig) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    Ok(Arc::new(store))
}

fn open_ledger(config: &LedgerConfig) -> Result<Ledger> {
    let store: Arc<dyn RecordStore> = open_store(config)?;
    Ok(Ledger::open(store, config)?)
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("missing <{}>\n\n{}", name, USAGE))
}

fn number(args: &[String], index: usize, name: &str) -> Result<f64> {
    let raw = arg(args, index, name)?;
    raw.parse::<f64>()
        .with_context(|| format!("<{}> must be a number, got '{}'", name, raw))
}

fn run_init(config: &LedgerConfig) -> Result<()> {
    println!("🔧 Setting up database...");
    let store = open_store(config)?;
    println!("✓ {} ready (WAL mode)", config.db_path.display());

    for collection in Collection::ALL {
        println!("  {:<10} {} records", collection.as_str(), store.count(collection)?);
    }
    Ok(())
}

fn run_next(config: &LedgerConfig, args: &[String]) -> Result<()> {
    let kind: IdKind = arg(args, 0, "kind")?.parse()?;
    let ledger = open_ledger(config)?;
    println!("{}", ledger.next_identifier(kind));
    Ok(())
}

fn run_check(config: &LedgerConfig, args: &[String]) -> Result<()> {
    let kind: IdKind = arg(args, 0, "kind")?.parse()?;
    let id = arg(args, 1, "id")?;
    let ledger = open_ledger(config)?;

    let registration = ledger.check_identifier(kind, id)?;
    if registration.is_edit() {
        println!("✏️  {}", registration.message);
    } else {
        println!("✓ {} is free", registration.id);
    }
    Ok(())
}

fn run_rolls(config: &LedgerConfig) -> Result<()> {
    let ledger = open_ledger(config)?;
    let rolls = ledger.rolls()?;

    if rolls.is_empty() {
        println!("No rolls loaded");
        return Ok(());
    }

    println!(
        "{:<8} {:>10} {:>6} {:>8} {:>12} {:>8}  {}",
        "BIM", "meters", "par", "units", "pending m", "pending", "machine"
    );
    for roll in rolls {
        println!(
            "{:<8} {:>10.1} {:>6.1} {:>8} {:>12.1} {:>8}  {}",
            roll.bim_number,
            roll.total_length,
            roll.par_rate,
            roll.unit_count,
            roll.pending_length,
            roll.pending_unit_count,
            roll.machine_number.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn run_add_roll(config: &LedgerConfig, args: &[String]) -> Result<()> {
    let ledger = open_ledger(config)?;

    let bim_number = match arg(args, 0, "bim")? {
        "auto" => ledger.next_identifier(IdKind::Bim),
        typed => typed.to_string(),
    };
    let draft = RollDraft {
        bim_number,
        total_length: number(args, 1, "meters")?,
        par_rate: number(args, 2, "par")?,
        machine_number: args.get(3).cloned(),
        load_date: Local::now().date_naive(),
    };

    let saved = ledger.save_roll(draft)?;
    let roll = saved.record;
    println!(
        "✓ {} {:?}: {:.1} m, {} units ({} pending)",
        roll.bim_number, saved.mode, roll.total_length, roll.unit_count, roll.pending_unit_count
    );
    Ok(())
}

fn run_produce(config: &LedgerConfig, args: &[String]) -> Result<()> {
    let ledger = open_ledger(config)?;

    let taka_number = match arg(args, 0, "taka")? {
        "auto" => ledger.next_identifier(IdKind::Taka),
        typed => typed.to_string(),
    };
    let date = Local::now().date_naive();
    let draft = ProductionDraft {
        date,
        taka_number,
        roll_number: arg(args, 1, "bim")?.to_string(),
        machine_number: arg(args, 2, "machine")?.to_string(),
        worker1: Some(number(args, 3, "w1")?),
        worker2: Some(number(args, 4, "w2")?),
        worker3: Some(number(args, 5, "w3")?),
        wet: Some(number(args, 6, "wet")?),
    };

    let receipt = ledger.record_production(draft)?;
    println!(
        "✓ {} on {}: total {:.2}, wet/unit {:.3}",
        receipt.entry.taka_number,
        receipt.entry.roll_number,
        receipt.entry.total_contribution,
        receipt.entry.wet_per_unit
    );
    println!(
        "  {} now {:.1} m / {} units pending",
        receipt.roll.bim_number, receipt.roll.pending_length, receipt.roll.pending_unit_count
    );
    println!("  Today total: {:.2}", ledger.day_total(date)?);
    Ok(())
}

fn run_revert(config: &LedgerConfig, args: &[String]) -> Result<()> {
    let taka_number = arg(args, 0, "taka")?;
    let ledger = open_ledger(config)?;

    let receipt = ledger.revert_production(taka_number)?;
    println!(
        "✓ {} reverted; {} back to {:.1} m / {} units pending",
        taka_number,
        receipt.roll.bim_number,
        receipt.roll.pending_length,
        receipt.roll.pending_unit_count
    );
    Ok(())
}

fn run_history(config: &LedgerConfig, args: &[String]) -> Result<()> {
    let name = arg(args, 0, "collection")?;
    let Some(collection) = Collection::parse(name) else {
        bail!("unknown collection '{}' (rolls, machines, workers, production)", name);
    };
    let id = arg(args, 1, "id")?;

    let store = open_store(config)?;
    let events = store.events_for(collection, id)?;
    if events.is_empty() {
        println!("No history for {} {}", collection, id);
        return Ok(());
    }

    for event in events {
        println!(
            "{}  {:<22} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_type,
            event.data
        );
    }
    Ok(())
}
