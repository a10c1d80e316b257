//! Wire-level entities from §3: accounts, balances, and the chain-side
//! inputs the engine consumes (`BalanceChange`, `BalanceExemption`).

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::ids::{AccountId, BlockId, CurrencyId};

/// An integer-as-string amount paired with its currency, exactly as it is
/// stored and exchanged with the helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub value: String,
    pub currency: CurrencyId,
}

impl Amount {
    pub fn new(value: impl Into<String>, currency: CurrencyId) -> Self {
        Self {
            value: value.into(),
            currency,
        }
    }

    pub fn zero(currency: CurrencyId) -> Self {
        Self::new("0", currency)
    }

    /// Parses `value` as a signed integer, failing with `ArithmeticError`
    /// rather than panicking on malformed input.
    pub fn parsed(&self) -> Result<i128, EngineError> {
        parse_decimal(&self.value)
    }
}

/// Parses a decimal integer string, rejecting anything that isn't one.
pub fn parse_decimal(s: &str) -> Result<i128, EngineError> {
    s.parse::<i128>()
        .map_err(|_| EngineError::arithmetic(format!("not an integer: {s:?}")))
}

/// Adds a signed decimal `difference` to a decimal `base`, both given as
/// strings, returning the sum as a decimal string. Fails on non-integer
/// input or on overflow rather than silently saturating (unlike the
/// saturating arithmetic, which would violate I1's exact-sum requirement).
pub fn decimal_add(base: &str, difference: &str) -> Result<String, EngineError> {
    let base = parse_decimal(base)?;
    let difference = parse_decimal(difference)?;
    let sum = base
        .checked_add(difference)
        .ok_or_else(|| EngineError::arithmetic("addition overflowed i128"))?;
    Ok(sum.to_string())
}

/// One per `AccountKey`. Created on first observation of a change or on
/// bootstrap; mutated only by reconciliation cursor updates; never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub account: AccountId,
    pub currency: CurrencyId,
    pub last_reconciled: Option<BlockId>,
}

impl AccountEntry {
    pub fn new(account: AccountId, currency: CurrencyId) -> Self {
        Self {
            account,
            currency,
            last_reconciled: None,
        }
    }
}

/// One per `(AccountKey, block_index)`. Created when a change at that index
/// affects this account; deleted on reorg of its block or on bootstrap
/// reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub account: AccountId,
    pub amount: Amount,
    pub block: BlockId,
}

impl BalanceEntry {
    pub fn new(account: AccountId, amount: Amount, block: BlockId) -> Self {
        Self {
            account,
            amount,
            block,
        }
    }
}

/// A signed delta applied to an `(account, currency)` at a specific block,
/// as produced by the (out-of-scope) block-change parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub account: AccountId,
    pub currency: CurrencyId,
    pub block: BlockId,
    pub difference: String,
}

/// A rule permitting a bounded discrepancy between the computed balance and
/// an authoritative balance reported by the helper. `min`/`max` bound the
/// (live - stored) difference inclusively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceExemption {
    pub min_difference: i128,
    pub max_difference: i128,
}

impl BalanceExemption {
    pub fn exact(difference: i128) -> Self {
        Self {
            min_difference: difference,
            max_difference: difference,
        }
    }

    pub fn matches(&self, difference: i128) -> bool {
        difference >= self.min_difference && difference <= self.max_difference
    }
}

/// Returns the first exemption (if any) whose range contains `difference`,
/// mirroring the `MatchBalanceExemption` parser contract (§6.2).
pub fn match_balance_exemption(
    exemptions: &[BalanceExemption],
    difference: i128,
) -> Option<&BalanceExemption> {
    exemptions.iter().find(|e| e.matches(difference))
}

/// One record from a parsed bootstrap file (§6.5): `{account, currency,
/// value}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapRecord {
    pub account: AccountId,
    pub currency: CurrencyId,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_add_basic() {
        assert_eq!(decimal_add("100", "-30").unwrap(), "70");
        assert_eq!(decimal_add("0", "100").unwrap(), "100");
    }

    #[test]
    fn decimal_add_rejects_garbage() {
        assert!(decimal_add("abc", "1").is_err());
        assert!(decimal_add("1", "xyz").is_err());
    }

    #[test]
    fn exemption_matches_inclusive_range() {
        let e = BalanceExemption {
            min_difference: -1,
            max_difference: 1,
        };
        assert!(e.matches(-1));
        assert!(e.matches(0));
        assert!(e.matches(1));
        assert!(!e.matches(2));
    }
}
