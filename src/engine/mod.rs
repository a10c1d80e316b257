//! `BalanceEngine` (§4.4): the stateful core. Everything else in this crate
//! exists to support `apply_change` and its two callers, `adding_block` and
//! `removing_block`.

pub mod contracts;

use std::sync::Arc;

pub use contracts::{Handler, Helper, Parser};

use crate::cancel::CancellationToken;
use crate::codec::entries::encode_account_entry;
use crate::codec::keys::{account_key, account_key_for};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::history::{delete_from_index, last_at_or_before, write_entry};
use crate::ids::{AccountId, AccountKey, BlockId, CurrencyId};
use crate::model::{
    decimal_add, match_balance_exemption, parse_decimal, AccountEntry, Amount, BalanceChange,
    BalanceEntry, BalanceExemption,
};
use crate::store::{KvStore, KvTransaction};

/// A post-commit notification, deferred until the caller's transaction
/// durably commits (§4.6, §9). Never invoked if the transaction is
/// discarded instead.
pub type PostCommit = Box<dyn FnOnce(&CancellationToken) -> EngineResult<()>>;

pub struct BalanceEngine {
    store: Arc<dyn KvStore>,
    parser: Box<dyn Parser>,
    helper: Box<dyn Helper>,
    handler: Arc<dyn Handler>,
    config: EngineConfig,
}

impl BalanceEngine {
    /// Consumes its collaborators once, at process start. There is
    /// deliberately no setter for `parser`/`helper`/`handler` afterward
    /// (§5: "subsequent operations must not re-assign them").
    pub fn initialize(
        store: Arc<dyn KvStore>,
        parser: Box<dyn Parser>,
        helper: Box<dyn Helper>,
        handler: Arc<dyn Handler>,
        mut config: EngineConfig,
    ) -> Self {
        if config.exemptions.is_empty() {
            config.exemptions = helper.balance_exemptions();
        }
        log::info!(
            "balance engine initialized at genesis {}",
            config.genesis_block
        );
        Self {
            store,
            parser,
            helper,
            handler,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Human-readable one-liner for lifecycle log lines.
    pub fn summary(&self) -> String {
        format!(
            "BalanceEngine {{ genesis: {}, exemptions: {} }}",
            self.config.genesis_block,
            self.config.exemptions.len()
        )
    }

    /// §4.4.1: applies every change `block` implies, inside `txn`. Returns
    /// a callback the caller must invoke iff `txn` goes on to commit.
    pub fn adding_block(
        &self,
        txn: &dyn KvTransaction,
        block: &BlockId,
        parent_block: Option<&BlockId>,
        cancel: &CancellationToken,
    ) -> EngineResult<PostCommit> {
        cancel.check()?;
        let changes = self.parser.balance_changes(block, false, cancel)?;
        for change in &changes {
            self.apply_change(txn, change, parent_block, cancel)?;
        }
        log::trace!("adding_block {} applied {} changes", block, changes.len());

        let handler = self.handler.clone();
        let block = block.clone();
        Ok(Box::new(move |cancel: &CancellationToken| {
            cancel.check()?;
            handler.block_added(&block, &changes, cancel)
        }))
    }

    /// §4.4.4: orphans `block`'s effects inside `txn`. Returns a callback
    /// the caller must invoke iff `txn` goes on to commit.
    pub fn removing_block(
        &self,
        txn: &dyn KvTransaction,
        block: &BlockId,
        cancel: &CancellationToken,
    ) -> EngineResult<PostCommit> {
        cancel.check()?;
        let changes = self.parser.balance_changes(block, true, cancel)?;
        for change in &changes {
            delete_from_index(txn, &change.account, &change.currency, block.index)?;
        }
        log::trace!("removing_block {} orphaned {} changes", block, changes.len());

        let handler = self.handler.clone();
        let block = block.clone();
        Ok(Box::new(move |cancel: &CancellationToken| {
            cancel.check()?;
            handler.block_removed(&block, &changes, cancel)
        }))
    }

    /// §4.4.2.
    pub fn apply_change(
        &self,
        txn: &dyn KvTransaction,
        change: &BalanceChange,
        parent_block: Option<&BlockId>,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        cancel.check()?;
        let key = AccountKey::new(change.account.clone(), change.currency.clone());
        let key_bytes = account_key_for(&key);
        let exists = txn.has(&key_bytes).map_err(EngineError::Store)?;

        let stored = if exists {
            let prev = last_at_or_before(txn, &change.account, &change.currency, &change.block)?;
            if let Some(prev_entry) = &prev {
                if prev_entry.block.index >= change.block.index {
                    return Err(EngineError::integrity(format!(
                        "duplicate update for {key} at index {}: existing entry at index {} (use the orphan path for reorgs)",
                        change.block.index, prev_entry.block.index
                    )));
                }
            }
            Some(prev.map(|e| e.amount.value).unwrap_or_else(|| "0".to_string()))
        } else {
            None
        };

        let exemptions = self.parser.find_exemptions(&change.account, &change.currency);
        let existing = self.existing_value(
            change,
            parent_block,
            stored.as_deref(),
            &exemptions,
            cancel,
        )?;
        let new_value = decimal_add(&existing, &change.difference)?;

        if parse_decimal(&new_value)? < 0 {
            return Err(EngineError::NegativeBalance {
                account_key: key.to_string(),
                value: new_value,
            });
        }

        if !exists {
            let account_entry = AccountEntry::new(change.account.clone(), change.currency.clone());
            let bytes = encode_account_entry(&account_entry).map_err(EngineError::Store)?;
            txn.set(&key_bytes, &bytes, true).map_err(EngineError::Store)?;
        }

        write_entry(
            txn,
            &BalanceEntry::new(
                change.account.clone(),
                Amount::new(new_value, change.currency.clone()),
                change.block.clone(),
            ),
        )?;
        log::trace!("apply_change {key} at {}", change.block);
        Ok(())
    }

    /// §4.4.3.
    fn existing_value(
        &self,
        change: &BalanceChange,
        parent_block: Option<&BlockId>,
        stored: Option<&str>,
        exemptions: &[BalanceExemption],
        cancel: &CancellationToken,
    ) -> EngineResult<String> {
        match stored {
            None => match parent_block {
                Some(parent) if parent.hash == change.block.hash => Ok("0".to_string()),
                Some(parent) => {
                    let amount = self.helper.account_balance(
                        &change.account,
                        &change.currency,
                        parent,
                        cancel,
                    )?;
                    Ok(amount.value)
                }
                None => Ok("0".to_string()),
            },
            Some(stored_value) => {
                if exemptions.is_empty() {
                    return Ok(stored_value.to_string());
                }
                let reference_block = parent_block.unwrap_or(&change.block);
                let live = self.helper.account_balance(
                    &change.account,
                    &change.currency,
                    reference_block,
                    cancel,
                )?;
                let live_value = live.parsed()?;
                let stored_value_parsed = parse_decimal(stored_value)?;
                if live_value == stored_value_parsed {
                    return Ok(stored_value.to_string());
                }
                let difference = live_value
                    .checked_sub(stored_value_parsed)
                    .ok_or_else(|| EngineError::arithmetic("live/stored difference overflowed i128"))?;
                if match_balance_exemption(exemptions, difference).is_some() {
                    Ok(live.value)
                } else {
                    Err(EngineError::InvalidLiveBalance {
                        account_key: AccountKey::new(change.account.clone(), change.currency.clone())
                            .to_string(),
                        stored: stored_value.to_string(),
                        live: live.value,
                    })
                }
            }
        }
    }

    /// §4.4.5, opening and committing its own transaction.
    pub fn get_balance(
        &self,
        account: &AccountId,
        currency: &CurrencyId,
        block: &BlockId,
        cancel: &CancellationToken,
    ) -> EngineResult<Amount> {
        let txn = self.store.begin(true).map_err(EngineError::Store)?;
        match self.get_balance_transactional(txn.as_ref(), account, currency, block, cancel) {
            Ok(amount) => {
                txn.commit().map_err(EngineError::Store)?;
                Ok(amount)
            }
            Err(err) => {
                txn.discard().map_err(EngineError::Store)?;
                Err(err)
            }
        }
    }

    /// §4.4.5, leaving commit/discard to the caller.
    ///
    /// When the account exists but has no history entry at or before
    /// `block` (a sync that started after genesis never observed its
    /// earlier balance), this returns `"0"` rather than an error. That is
    /// a known soft corner, not a correctness guarantee — see DESIGN.md.
    pub fn get_balance_transactional(
        &self,
        txn: &dyn KvTransaction,
        account: &AccountId,
        currency: &CurrencyId,
        block: &BlockId,
        cancel: &CancellationToken,
    ) -> EngineResult<Amount> {
        cancel.check()?;
        let key_bytes = account_key(account, currency);
        if !txn.has(&key_bytes).map_err(EngineError::Store)? {
            let amount = self.helper.account_balance(account, currency, block, cancel)?;
            self.set_balance(txn, account, &amount, block)?;
            return Ok(amount);
        }
        match last_at_or_before(txn, account, currency, block)? {
            Some(entry) => Ok(entry.amount),
            None => Ok(Amount::zero(currency.clone())),
        }
    }

    /// §4.4.6: seed/overwrite an account's entire history with a single
    /// entry at `block`.
    pub fn set_balance(
        &self,
        txn: &dyn KvTransaction,
        account: &AccountId,
        amount: &Amount,
        block: &BlockId,
    ) -> EngineResult<()> {
        delete_from_index(txn, account, &amount.currency, -1)?;
        let account_entry = AccountEntry::new(account.clone(), amount.currency.clone());
        let key_bytes = account_key(account, &amount.currency);
        let bytes = encode_account_entry(&account_entry).map_err(EngineError::Store)?;
        txn.set(&key_bytes, &bytes, true).map_err(EngineError::Store)?;
        write_entry(
            txn,
            &BalanceEntry::new(account.clone(), amount.clone(), block.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::Mutex;

    struct FixedParser {
        changes: Vec<BalanceChange>,
        exemptions: Vec<BalanceExemption>,
    }

    impl Parser for FixedParser {
        fn balance_changes(
            &self,
            block: &BlockId,
            _reverse: bool,
            _cancel: &CancellationToken,
        ) -> EngineResult<Vec<BalanceChange>> {
            Ok(self
                .changes
                .iter()
                .filter(|c| c.block.index == block.index)
                .cloned()
                .collect())
        }

        fn find_exemptions(&self, _account: &AccountId, _currency: &CurrencyId) -> Vec<BalanceExemption> {
            self.exemptions.clone()
        }
    }

    struct FixedHelper {
        balances: Vec<(i64, &'static str)>,
    }

    impl Helper for FixedHelper {
        fn account_balance(
            &self,
            _account: &AccountId,
            currency: &CurrencyId,
            block: &BlockId,
            _cancel: &CancellationToken,
        ) -> EngineResult<Amount> {
            self.balances
                .iter()
                .find(|(idx, _)| *idx == block.index)
                .map(|(_, value)| Amount::new(*value, currency.clone()))
                .ok_or_else(|| EngineError::helper(format!("no fixture balance at {}", block.index)))
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        added: Mutex<Vec<i64>>,
        removed: Mutex<Vec<i64>>,
    }

    impl Handler for RecordingHandler {
        fn block_added(
            &self,
            block: &BlockId,
            _changes: &[BalanceChange],
            _cancel: &CancellationToken,
        ) -> EngineResult<()> {
            self.added.lock().unwrap().push(block.index);
            Ok(())
        }

        fn block_removed(
            &self,
            block: &BlockId,
            _changes: &[BalanceChange],
            _cancel: &CancellationToken,
        ) -> EngineResult<()> {
            self.removed.lock().unwrap().push(block.index);
            Ok(())
        }
    }

    fn acc() -> AccountId {
        AccountId::new("A")
    }
    fn cur() -> CurrencyId {
        CurrencyId::new("C", 0)
    }

    fn make_engine(
        changes: Vec<BalanceChange>,
        helper_balances: Vec<(i64, &'static str)>,
        exemptions: Vec<BalanceExemption>,
        handler: Arc<RecordingHandler>,
    ) -> (BalanceEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = BalanceEngine::initialize(
            store.clone(),
            Box::new(FixedParser { changes, exemptions }),
            Box::new(FixedHelper { balances: helper_balances }),
            handler,
            EngineConfig::new(BlockId::new(0, "g")),
        );
        (engine, store)
    }

    #[test]
    fn s1_first_change_creates_account_and_balance() {
        let handler = Arc::new(RecordingHandler::default());
        let change = BalanceChange {
            account: acc(),
            currency: cur(),
            block: BlockId::new(1, "h1"),
            difference: "100".to_string(),
        };
        let (engine, store) = make_engine(vec![change], vec![], vec![], handler.clone());
        let cancel = CancellationToken::new();

        let txn = store.begin(true).unwrap();
        let post_commit = engine
            .adding_block(txn.as_ref(), &BlockId::new(1, "h1"), Some(&BlockId::new(0, "g")), &cancel)
            .unwrap();
        txn.commit().unwrap();
        post_commit(&cancel).unwrap();

        let balance = engine
            .get_balance(&acc(), &cur(), &BlockId::new(1, "h1"), &cancel)
            .unwrap();
        assert_eq!(balance.value, "100");
        assert_eq!(handler.added.lock().unwrap().as_slice(), &[1]);
    }

    #[test]
    fn s2_second_change_accumulates() {
        let handler = Arc::new(RecordingHandler::default());
        let changes = vec![
            BalanceChange {
                account: acc(),
                currency: cur(),
                block: BlockId::new(1, "h1"),
                difference: "100".to_string(),
            },
            BalanceChange {
                account: acc(),
                currency: cur(),
                block: BlockId::new(2, "h2"),
                difference: "-30".to_string(),
            },
        ];
        let (engine, store) = make_engine(changes, vec![], vec![], handler);
        let cancel = CancellationToken::new();

        let txn = store.begin(true).unwrap();
        engine
            .adding_block(txn.as_ref(), &BlockId::new(1, "h1"), Some(&BlockId::new(0, "g")), &cancel)
            .unwrap();
        txn.commit().unwrap();

        let txn = store.begin(true).unwrap();
        engine
            .adding_block(txn.as_ref(), &BlockId::new(2, "h2"), Some(&BlockId::new(1, "h1")), &cancel)
            .unwrap();
        txn.commit().unwrap();

        let balance = engine
            .get_balance(&acc(), &cur(), &BlockId::new(2, "h2"), &cancel)
            .unwrap();
        assert_eq!(balance.value, "70");
    }

    #[test]
    fn s3_reapplying_same_index_without_removal_is_integrity_error() {
        let handler = Arc::new(RecordingHandler::default());
        let changes = vec![
            BalanceChange {
                account: acc(),
                currency: cur(),
                block: BlockId::new(1, "h1"),
                difference: "100".to_string(),
            },
            BalanceChange {
                account: acc(),
                currency: cur(),
                block: BlockId::new(2, "h2"),
                difference: "-30".to_string(),
            },
        ];
        let (engine, store) = make_engine(changes, vec![], vec![], handler);
        let cancel = CancellationToken::new();

        let txn = store.begin(true).unwrap();
        engine
            .adding_block(txn.as_ref(), &BlockId::new(1, "h1"), Some(&BlockId::new(0, "g")), &cancel)
            .unwrap();
        txn.commit().unwrap();
        let txn = store.begin(true).unwrap();
        engine
            .adding_block(txn.as_ref(), &BlockId::new(2, "h2"), Some(&BlockId::new(1, "h1")), &cancel)
            .unwrap();
        txn.commit().unwrap();

        let txn = store.begin(true).unwrap();
        let err = engine
            .apply_change(
                txn.as_ref(),
                &BalanceChange {
                    account: acc(),
                    currency: cur(),
                    block: BlockId::new(2, "different-h2"),
                    difference: "5".to_string(),
                },
                Some(&BlockId::new(1, "h1")),
                &cancel,
            )
            .unwrap_err();
        txn.discard().unwrap();
        assert!(matches!(err, EngineError::Integrity(_)));
    }

    #[test]
    fn s4_removing_block_restores_prior_balance() {
        let handler = Arc::new(RecordingHandler::default());
        let changes = vec![
            BalanceChange {
                account: acc(),
                currency: cur(),
                block: BlockId::new(1, "h1"),
                difference: "100".to_string(),
            },
            BalanceChange {
                account: acc(),
                currency: cur(),
                block: BlockId::new(2, "h2"),
                difference: "-30".to_string(),
            },
        ];
        let (engine, store) = make_engine(changes, vec![], vec![], handler.clone());
        let cancel = CancellationToken::new();

        let txn = store.begin(true).unwrap();
        engine
            .adding_block(txn.as_ref(), &BlockId::new(1, "h1"), Some(&BlockId::new(0, "g")), &cancel)
            .unwrap();
        txn.commit().unwrap();
        let txn = store.begin(true).unwrap();
        engine
            .adding_block(txn.as_ref(), &BlockId::new(2, "h2"), Some(&BlockId::new(1, "h1")), &cancel)
            .unwrap();
        txn.commit().unwrap();

        let txn = store.begin(true).unwrap();
        let post_commit = engine
            .removing_block(txn.as_ref(), &BlockId::new(2, "h2"), &cancel)
            .unwrap();
        txn.commit().unwrap();
        post_commit(&cancel).unwrap();

        let balance = engine
            .get_balance(&acc(), &cur(), &BlockId::new(1, "h1"), &cancel)
            .unwrap();
        assert_eq!(balance.value, "100");
        assert_eq!(handler.removed.lock().unwrap().as_slice(), &[2]);
    }

    #[test]
    fn s6_helper_fallback_seeds_new_account_from_parent_balance() {
        let handler = Arc::new(RecordingHandler::default());
        let changes = vec![BalanceChange {
            account: acc(),
            currency: cur(),
            block: BlockId::new(5, "h5"),
            difference: "50".to_string(),
        }];
        let (engine, store) = make_engine(changes, vec![(4, "200")], vec![], handler);
        let cancel = CancellationToken::new();

        let txn = store.begin(true).unwrap();
        engine
            .adding_block(txn.as_ref(), &BlockId::new(5, "h5"), Some(&BlockId::new(4, "h4")), &cancel)
            .unwrap();
        txn.commit().unwrap();

        let balance = engine
            .get_balance(&acc(), &cur(), &BlockId::new(5, "h5"), &cancel)
            .unwrap();
        assert_eq!(balance.value, "250");
    }

    struct ReseedHelper;
    impl Helper for ReseedHelper {
        fn account_balance(
            &self,
            _account: &AccountId,
            currency: &CurrencyId,
            _block: &BlockId,
            _cancel: &CancellationToken,
        ) -> EngineResult<Amount> {
            Ok(Amount::new("101", currency.clone()))
        }
    }

    fn seeded_store_at_100() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let engine = BalanceEngine::initialize(
            store.clone(),
            Box::new(FixedParser {
                changes: vec![],
                exemptions: vec![],
            }),
            Box::new(FixedHelper { balances: vec![] }),
            Arc::new(RecordingHandler::default()),
            EngineConfig::new(BlockId::new(0, "g")),
        );
        let cancel = CancellationToken::new();
        let txn = store.begin(true).unwrap();
        engine
            .apply_change(
                txn.as_ref(),
                &BalanceChange {
                    account: acc(),
                    currency: cur(),
                    block: BlockId::new(1, "h1"),
                    difference: "100".to_string(),
                },
                Some(&BlockId::new(0, "g")),
                &cancel,
            )
            .unwrap();
        txn.commit().unwrap();
        store
    }

    #[test]
    fn s7_non_matching_exemption_fails_invalid_live_balance() {
        let store = seeded_store_at_100();
        let engine = BalanceEngine::initialize(
            store.clone(),
            Box::new(FixedParser {
                changes: vec![],
                exemptions: vec![BalanceExemption::exact(0)],
            }),
            Box::new(ReseedHelper),
            Arc::new(RecordingHandler::default()),
            EngineConfig::new(BlockId::new(0, "g")),
        );
        let cancel = CancellationToken::new();
        let txn = store.begin(true).unwrap();
        let err = engine
            .apply_change(
                txn.as_ref(),
                &BalanceChange {
                    account: acc(),
                    currency: cur(),
                    block: BlockId::new(2, "h2"),
                    difference: "0".to_string(),
                },
                Some(&BlockId::new(1, "h1")),
                &cancel,
            )
            .unwrap_err();
        txn.discard().unwrap();
        assert!(matches!(err, EngineError::InvalidLiveBalance { .. }));
    }

    #[test]
    fn s7_matching_exemption_reseeds_series_to_live_value() {
        let store = seeded_store_at_100();
        let reseed_engine = BalanceEngine::initialize(
            store.clone(),
            Box::new(FixedParser {
                changes: vec![],
                exemptions: vec![BalanceExemption::exact(1)],
            }),
            Box::new(ReseedHelper),
            Arc::new(RecordingHandler::default()),
            EngineConfig::new(BlockId::new(0, "g")),
        );
        let cancel = CancellationToken::new();
        let txn = store.begin(true).unwrap();
        reseed_engine
            .apply_change(
                txn.as_ref(),
                &BalanceChange {
                    account: acc(),
                    currency: cur(),
                    block: BlockId::new(2, "h2"),
                    difference: "0".to_string(),
                },
                Some(&BlockId::new(1, "h1")),
                &cancel,
            )
            .unwrap();
        txn.commit().unwrap();

        let balance = reseed_engine
            .get_balance(&acc(), &cur(), &BlockId::new(2, "h2"), &cancel)
            .unwrap();
        assert_eq!(balance.value, "101");
    }
}
