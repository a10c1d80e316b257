use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use balance_engine::bootstrap::bootstrap_balances;
use balance_engine::engine::contracts::{Handler, Helper, Parser as EngineParser};
use balance_engine::ids::{AccountId, BlockId, CurrencyId};
use balance_engine::model::{Amount, BalanceChange, BalanceExemption, BootstrapRecord};
use balance_engine::reconcile::reconciliation_coverage;
use balance_engine::store::memory::MemoryStore;
use balance_engine::store::KvStore;
use balance_engine::{BalanceEngine, CancellationToken, EngineConfig, EngineResult};

use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use stderrlog::{ColorChoice, Timestamp};

#[derive(Parser, Debug)]
#[command(name = "balance-enginectl", author, version, about = "Drive the balance engine over its in-memory reference store")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Max stdout log level
    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed genesis balances from a JSON-lines file of `BootstrapRecord`s
    Bootstrap {
        /// Path to a file containing one JSON `{account, currency, value}`
        /// record per line
        #[arg(long, value_name = "FILE")]
        records_file: PathBuf,

        /// Genesis block index
        #[arg(long, default_value_t = 0)]
        genesis_index: i64,

        /// Genesis block hash
        #[arg(long, default_value = "genesis")]
        genesis_hash: String,
    },
    /// Print reconciliation coverage against an empty, freshly bootstrapped
    /// store, as a smoke test of the engine without a real chain connection
    Coverage {
        #[arg(long, value_name = "FILE")]
        records_file: PathBuf,

        #[arg(long, default_value_t = 0)]
        minimum_index: i64,
    },
}

/// A parser that never sees any blocks; the CLI only exercises the
/// bootstrap and reconciliation-coverage paths, not block ingestion.
struct NoopParser;

impl EngineParser for NoopParser {
    fn balance_changes(
        &self,
        _block: &BlockId,
        _reverse: bool,
        _cancel: &CancellationToken,
    ) -> EngineResult<Vec<BalanceChange>> {
        Ok(Vec::new())
    }

    fn find_exemptions(&self, _account: &AccountId, _currency: &CurrencyId) -> Vec<BalanceExemption> {
        Vec::new()
    }
}

/// A helper with no live node to query; the CLI's subcommands never reach
/// the code paths that would call it.
struct UnreachableHelper;

impl Helper for UnreachableHelper {
    fn account_balance(
        &self,
        account: &AccountId,
        currency: &CurrencyId,
        block: &BlockId,
        _cancel: &CancellationToken,
    ) -> EngineResult<Amount> {
        Err(balance_engine::EngineError::helper(format!(
            "balance-enginectl has no live helper; queried {account}/{currency} at {block}"
        )))
    }
}

struct SilentHandler;

impl Handler for SilentHandler {
    fn block_added(
        &self,
        _block: &BlockId,
        _changes: &[BalanceChange],
        _cancel: &CancellationToken,
    ) -> EngineResult<()> {
        Ok(())
    }

    fn block_removed(
        &self,
        _block: &BlockId,
        _changes: &[BalanceChange],
        _cancel: &CancellationToken,
    ) -> EngineResult<()> {
        Ok(())
    }
}

fn read_records(path: &PathBuf) -> anyhow::Result<Vec<BootstrapRecord>> {
    let contents = fs::read_to_string(path)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Ok(serde_json::from_str(line)?))
        .collect()
}

fn build_engine(genesis_block: BlockId) -> (BalanceEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = BalanceEngine::initialize(
        store.clone(),
        Box::new(NoopParser),
        Box::new(UnreachableHelper),
        Arc::new(SilentHandler),
        EngineConfig::new(genesis_block),
    );
    (engine, store)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    stderrlog::new()
        .module(module_path!())
        .color(ColorChoice::Never)
        .timestamp(Timestamp::Microsecond)
        .verbosity(cli.log_level)
        .init()
        .expect("stderrlog initializes exactly once");

    let cancel = CancellationToken::new();

    match cli.command {
        Command::Bootstrap {
            records_file,
            genesis_index,
            genesis_hash,
        } => {
            let records = read_records(&records_file)?;
            let genesis_block = BlockId::new(genesis_index, genesis_hash);
            let (engine, _store) = build_engine(genesis_block.clone());
            let count = bootstrap_balances(&engine, &records, &genesis_block, &cancel)?;
            info!("seeded {count} balances at genesis {genesis_block}");
            println!("seeded {count} balances");
        }
        Command::Coverage {
            records_file,
            minimum_index,
        } => {
            let records = read_records(&records_file)?;
            let genesis_block = BlockId::new(0, "genesis");
            let (engine, store) = build_engine(genesis_block.clone());
            bootstrap_balances(&engine, &records, &genesis_block, &cancel)?;

            let txn = store.begin(false)?;
            let coverage = reconciliation_coverage(txn.as_ref(), minimum_index)?;
            txn.discard()?;
            println!("coverage at minimum_index={minimum_index}: {coverage:.4}");
        }
    }

    Ok(())
}
