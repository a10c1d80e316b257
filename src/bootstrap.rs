//! `BootstrapLoader` (§4.4.7-§4.4.8): seeds genesis or imported balances,
//! bypassing the normal per-block history path. Parsing the bootstrap file
//! itself is out of scope (§1); this module starts from an already-parsed
//! record list, e.g. one a CLI subcommand read from a JSON-lines file.

use crate::cancel::CancellationToken;
use crate::engine::BalanceEngine;
use crate::error::{EngineError, EngineResult};
use crate::ids::{AccountId, BlockId};
use crate::model::{parse_decimal, Amount, BootstrapRecord};

/// A single imported balance with its own block, used by
/// [`set_balance_imported`]. Unlike [`BootstrapRecord`], the value is not
/// required to be positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedBalance {
    pub account: AccountId,
    pub amount: Amount,
    pub block: BlockId,
}

/// §4.4.7: seeds `records` at `genesis_block`, one transaction for the
/// whole batch. Rejects the batch (no partial writes) if any record's
/// value is not a strictly positive integer.
pub fn bootstrap_balances(
    engine: &BalanceEngine,
    records: &[BootstrapRecord],
    genesis_block: &BlockId,
    cancel: &CancellationToken,
) -> EngineResult<usize> {
    cancel.check()?;
    for record in records {
        let value = parse_decimal(&record.value)?;
        if value <= 0 {
            return Err(EngineError::arithmetic(format!(
                "bootstrap value for {}/{} must be a strictly positive integer, got {}",
                record.account, record.currency, record.value
            )));
        }
    }

    let txn = engine.store().begin(true).map_err(EngineError::Store)?;
    for record in records {
        cancel.check()?;
        let amount = Amount::new(record.value.clone(), record.currency.clone());
        if let Err(err) = engine.set_balance(txn.as_ref(), &record.account, &amount, genesis_block) {
            txn.discard().map_err(EngineError::Store)?;
            return Err(err);
        }
    }
    txn.commit().map_err(EngineError::Store)?;
    log::info!(
        "bootstrap seeded {} balances at genesis {genesis_block}",
        records.len()
    );
    Ok(records.len())
}

/// §4.4.8: like [`bootstrap_balances`], but each record carries its own
/// block and no positivity check is performed (e.g. a negative imported
/// debt balance is legitimate).
pub fn set_balance_imported(
    engine: &BalanceEngine,
    records: &[ImportedBalance],
    cancel: &CancellationToken,
) -> EngineResult<usize> {
    cancel.check()?;
    let txn = engine.store().begin(true).map_err(EngineError::Store)?;
    for record in records {
        cancel.check()?;
        if let Err(err) = engine.set_balance(txn.as_ref(), &record.account, &record.amount, &record.block) {
            txn.discard().map_err(EngineError::Store)?;
            return Err(err);
        }
    }
    txn.commit().map_err(EngineError::Store)?;
    log::info!("imported {} balances", records.len());
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::contracts::{Handler, Helper, Parser};
    use crate::ids::CurrencyId;
    use crate::model::{BalanceChange, BalanceExemption};
    use crate::store::memory::MemoryStore;
    use crate::config::EngineConfig;
    use std::sync::Arc;

    struct NoopParser;
    impl Parser for NoopParser {
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

    struct NoopHelper;
    impl Helper for NoopHelper {
        fn account_balance(
            &self,
            _account: &AccountId,
            _currency: &CurrencyId,
            _block: &BlockId,
            _cancel: &CancellationToken,
        ) -> EngineResult<Amount> {
            Err(EngineError::helper("helper not expected to be called"))
        }
    }

    struct NoopHandler;
    impl Handler for NoopHandler {
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

    fn engine() -> BalanceEngine {
        BalanceEngine::initialize(
            Arc::new(MemoryStore::new()),
            Box::new(NoopParser),
            Box::new(NoopHelper),
            Arc::new(NoopHandler),
            EngineConfig::new(BlockId::new(0, "g")),
        )
    }

    #[test]
    fn s5_bootstrap_seeds_exactly_one_entry_per_record() {
        let engine = engine();
        let cancel = CancellationToken::new();
        let records = vec![BootstrapRecord {
            account: AccountId::new("A"),
            currency: CurrencyId::new("C", 0),
            value: "1000".to_string(),
        }];
        let genesis = BlockId::new(0, "g");
        let count = bootstrap_balances(&engine, &records, &genesis, &cancel).unwrap();
        assert_eq!(count, 1);

        let balance = engine
            .get_balance(&AccountId::new("A"), &CurrencyId::new("C", 0), &genesis, &cancel)
            .unwrap();
        assert_eq!(balance.value, "1000");
    }

    #[test]
    fn bootstrap_rejects_non_positive_values_without_writing_anything() {
        let engine = engine();
        let cancel = CancellationToken::new();
        let records = vec![
            BootstrapRecord {
                account: AccountId::new("A"),
                currency: CurrencyId::new("C", 0),
                value: "1000".to_string(),
            },
            BootstrapRecord {
                account: AccountId::new("B"),
                currency: CurrencyId::new("C", 0),
                value: "0".to_string(),
            },
        ];
        let genesis = BlockId::new(0, "g");
        let err = bootstrap_balances(&engine, &records, &genesis, &cancel).unwrap_err();
        assert!(matches!(err, EngineError::Arithmetic(_)));
    }

    #[test]
    fn set_balance_imported_allows_non_positive_values() {
        let engine = engine();
        let cancel = CancellationToken::new();
        let block = BlockId::new(7, "h7");
        let records = vec![ImportedBalance {
            account: AccountId::new("A"),
            amount: Amount::new("-5", CurrencyId::new("C", 0)),
            block: block.clone(),
        }];
        set_balance_imported(&engine, &records, &cancel).unwrap();

        let balance = engine
            .get_balance(&AccountId::new("A"), &CurrencyId::new("C", 0), &block, &cancel)
            .unwrap();
        assert_eq!(balance.value, "-5");
    }
}
