use std::{fmt, sync::Arc};

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use auto_impl::auto_impl;

use super::ForkError;
use crate::Allocs;

/// Read-only state of a remote chain at a fixed state root.
///
/// Missing accounts and slots read as zero, never as an error.
#[auto_impl(&, Box, Arc)]
pub trait ForkSource: fmt::Debug + Send + Sync {
    /// The url or alias the source was created from.
    fn url_or_alias(&self) -> &str;

    /// The state root the source is pinned to.
    fn state_root(&self) -> B256;

    /// Nonce of `address`.
    fn nonce(&self, address: Address) -> Result<u64, ForkError>;

    /// Balance of `address`.
    fn balance(&self, address: Address) -> Result<U256, ForkError>;

    /// Storage slot `key` of `address`.
    fn storage_at(&self, address: Address, key: B256) -> Result<B256, ForkError>;

    /// Runtime code of `address`.
    fn code(&self, address: Address) -> Result<Bytes, ForkError>;
}

/// The block a fork is pinned to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForkBlock {
    /// The chain head at fork creation.
    #[default]
    Latest,
    /// A block number.
    Number(u64),
    /// The block that included a transaction.
    Transaction(B256),
}

/// Creates fork sources for the `createFork` family of cheat codes.
pub trait ForkSourceFactory: fmt::Debug + Send + Sync {
    /// Opens a source for `url_or_alias` pinned at `block`.
    fn fork_source(
        &self,
        url_or_alias: &str,
        block: ForkBlock,
    ) -> Result<Arc<dyn ForkSource>, ForkError>;
}

/// A fork source backed by a state dump.
#[derive(Debug, Clone)]
pub struct AllocsSource {
    alias: String,
    state_root: B256,
    allocs: Allocs,
}

impl AllocsSource {
    /// Serves `allocs` under `alias`. The state root is the hash of the JSON encoding.
    pub fn new(alias: impl Into<String>, allocs: Allocs) -> Self {
        let state_root = keccak256(allocs.to_json().unwrap_or_default());
        Self { alias: alias.into(), state_root, allocs }
    }

    /// The served accounts.
    pub const fn allocs(&self) -> &Allocs {
        &self.allocs
    }
}

impl ForkSource for AllocsSource {
    fn url_or_alias(&self) -> &str {
        &self.alias
    }

    fn state_root(&self) -> B256 {
        self.state_root
    }

    fn nonce(&self, address: Address) -> Result<u64, ForkError> {
        Ok(self.allocs.get(&address).map(|account| account.nonce).unwrap_or_default())
    }

    fn balance(&self, address: Address) -> Result<U256, ForkError> {
        Ok(self.allocs.get(&address).map(|account| account.balance).unwrap_or_default())
    }

    fn storage_at(&self, address: Address, key: B256) -> Result<B256, ForkError> {
        Ok(self
            .allocs
            .get(&address)
            .and_then(|account| account.storage.get(&key).copied())
            .unwrap_or_default())
    }

    fn code(&self, address: Address) -> Result<Bytes, ForkError> {
        Ok(self.allocs.get(&address).map(|account| account.code.clone()).unwrap_or_default())
    }
}
