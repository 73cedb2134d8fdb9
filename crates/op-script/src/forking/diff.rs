use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use revm::primitives::KECCAK_EMPTY;
use serde::{Deserialize, Serialize};

use super::ForkError;
use crate::{AllocAccount, Allocs};

/// Changes to a single account. Unset fields are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDiff {
    /// The new nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    /// The new balance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<U256>,
    /// Written slots; `None` deletes the slot.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub storage: BTreeMap<B256, Option<B256>>,
    /// Hash of the new code, resolved through [`ExportDiff::code`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_hash: Option<B256>,
}

impl AccountDiff {
    /// Returns `true` if the diff changes nothing.
    pub fn is_empty(&self) -> bool {
        self.nonce.is_none() &&
            self.balance.is_none() &&
            self.storage.is_empty() &&
            self.code_hash.is_none()
    }
}

/// A structural diff between two states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDiff {
    /// Changed accounts; `None` marks a deleted account.
    pub accounts: BTreeMap<Address, Option<AccountDiff>>,
    /// Code referenced by [`AccountDiff::code_hash`].
    pub code: BTreeMap<B256, Bytes>,
}

fn code_hash(code: &Bytes) -> B256 {
    if code.is_empty() {
        KECCAK_EMPTY
    } else {
        keccak256(code)
    }
}

impl ExportDiff {
    /// Returns `true` if the diff changes nothing.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Applies the diff on top of `pre`.
    pub fn apply(&self, pre: &Allocs) -> Result<Allocs, ForkError> {
        let mut post = pre.clone();
        for (address, diff) in &self.accounts {
            let Some(diff) = diff else {
                post.remove(address);
                continue;
            };
            let account = post.entry(*address).or_default();
            if let Some(nonce) = diff.nonce {
                account.nonce = nonce;
            }
            if let Some(balance) = diff.balance {
                account.balance = balance;
            }
            if let Some(hash) = diff.code_hash {
                account.code = if hash == KECCAK_EMPTY {
                    Bytes::new()
                } else {
                    self.code.get(&hash).cloned().ok_or(ForkError::CodeNotFound(hash))?
                };
            }
            for (slot, value) in &diff.storage {
                match value {
                    Some(value) => account.storage.insert(*slot, *value),
                    None => account.storage.remove(slot),
                };
            }
        }
        Ok(post)
    }

    /// Computes the diff that turns `pre` into `post`.
    pub fn compute(pre: &Allocs, post: &Allocs) -> Self {
        let mut diff = Self::default();
        let addresses: BTreeSet<&Address> = pre.keys().chain(post.keys()).collect();
        for address in addresses {
            let Some(after) = post.get(address) else {
                diff.accounts.insert(*address, None);
                continue;
            };
            let before = pre.get(address);
            let account = diff_account(before, after);
            if let Some(hash) = account.code_hash.filter(|hash| *hash != KECCAK_EMPTY) {
                diff.code.insert(hash, after.code.clone());
            }
            if before.is_none() || !account.is_empty() {
                diff.accounts.insert(*address, Some(account));
            }
        }
        diff
    }
}

fn diff_account(before: Option<&AllocAccount>, after: &AllocAccount) -> AccountDiff {
    let empty = AllocAccount::default();
    let before = before.unwrap_or(&empty);
    let mut diff = AccountDiff::default();
    if before.nonce != after.nonce {
        diff.nonce = Some(after.nonce);
    }
    if before.balance != after.balance {
        diff.balance = Some(after.balance);
    }
    if before.code != after.code {
        diff.code_hash = Some(code_hash(&after.code));
    }
    let slots: BTreeSet<&B256> = before.storage.keys().chain(after.storage.keys()).collect();
    for slot in slots {
        let value = after.storage.get(slot);
        if before.storage.get(slot) != value {
            diff.storage.insert(*slot, value.copied());
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, bytes};

    use super::*;

    fn allocs(entries: impl IntoIterator<Item = (Address, AllocAccount)>) -> Allocs {
        entries.into_iter().collect()
    }

    #[test]
    fn test_compute_then_apply_restores_post_state() {
        let alice = address!("0x00000000000000000000000000000000000a11ce");
        let bob = address!("0x0000000000000000000000000000000000000b0b");
        let carol = address!("0x00000000000000000000000000000000000ca201");
        let slot = B256::with_last_byte(1);

        let pre = allocs([
            (alice, AllocAccount { nonce: 1, ..Default::default() }),
            (
                bob,
                AllocAccount {
                    code: bytes!("6000"),
                    storage: BTreeMap::from([(slot, B256::with_last_byte(7))]),
                    ..Default::default()
                },
            ),
        ]);
        let post = allocs([
            (alice, AllocAccount { nonce: 2, balance: U256::from(5), ..Default::default() }),
            (carol, AllocAccount { code: bytes!("6001"), ..Default::default() }),
        ]);

        let diff = ExportDiff::compute(&pre, &post);
        assert_eq!(diff.accounts[&bob], None);
        assert_eq!(diff.accounts[&alice].as_ref().unwrap().nonce, Some(2));
        assert_eq!(diff.code.len(), 1);
        assert_eq!(diff.apply(&pre).unwrap(), post);
    }

    #[test]
    fn test_slot_deletion() {
        let bob = address!("0x0000000000000000000000000000000000000b0b");
        let slot = B256::with_last_byte(1);
        let pre = allocs([(
            bob,
            AllocAccount {
                nonce: 1,
                storage: BTreeMap::from([(slot, B256::with_last_byte(7))]),
                ..Default::default()
            },
        )]);
        let post = allocs([(bob, AllocAccount { nonce: 1, ..Default::default() })]);

        let diff = ExportDiff::compute(&pre, &post);
        assert_eq!(diff.accounts[&bob].as_ref().unwrap().storage[&slot], None);
        assert_eq!(diff.apply(&pre).unwrap(), post);
        assert!(ExportDiff::compute(&post, &post).is_empty());
    }
}
