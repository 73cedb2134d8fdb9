use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A state dump: every account of a host, in the Forge `dumpState` JSON layout.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::Deref,
    derive_more::DerefMut,
)]
#[serde(transparent)]
pub struct Allocs {
    #[deref]
    #[deref_mut]
    accounts: BTreeMap<Address, AllocAccount>,
}

/// A single account of an [`Allocs`] dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocAccount {
    /// The account nonce.
    #[serde(default, with = "alloy_serde::quantity")]
    pub nonce: u64,
    /// The account balance in wei.
    #[serde(default)]
    pub balance: U256,
    /// The runtime code, empty for externally owned accounts.
    #[serde(default, skip_serializing_if = "<[u8]>::is_empty")]
    pub code: Bytes,
    /// Non-zero storage slots.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub storage: BTreeMap<B256, B256>,
}

impl AllocAccount {
    /// Returns `true` if the account has no nonce, balance, code or storage.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 &&
            self.balance.is_zero() &&
            self.code.is_empty() &&
            self.storage.values().all(|value| value.is_zero())
    }
}

impl Allocs {
    /// Creates a dump from a map of accounts.
    pub fn new(accounts: BTreeMap<Address, AllocAccount>) -> Self {
        Self { accounts }
    }

    /// Consumes the dump, returning the account map.
    pub fn into_inner(self) -> BTreeMap<Address, AllocAccount> {
        self.accounts
    }

    /// Parses a Forge allocs JSON document.
    pub fn from_json(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    /// Serializes the dump as Forge allocs JSON.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl FromIterator<(Address, AllocAccount)> for Allocs {
    fn from_iter<T: IntoIterator<Item = (Address, AllocAccount)>>(iter: T) -> Self {
        Self { accounts: iter.into_iter().collect() }
    }
}
