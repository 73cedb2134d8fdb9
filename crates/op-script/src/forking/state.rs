use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{Address, Bytes, B256, U256};
use revm::{
    database::{AccountState, CacheDB, DbAccount},
    primitives::{StorageKey, StorageValue},
    state::{Account, AccountInfo, Bytecode, EvmState},
    Database, DatabaseCommit,
};
use tracing::{debug, warn};

use super::{
    script_block_hash, AccountDiff, ExportDiff, ForkError, ForkId, ForkSource, LayerDb, SourceDb,
};
use crate::{AllocAccount, Allocs};

#[derive(Debug)]
struct Fork {
    source: Arc<dyn ForkSource>,
    db: LayerDb,
}

impl Fork {
    fn new(source: Arc<dyn ForkSource>) -> Self {
        Self { db: CacheDB::new(SourceDb::new(source.clone())), source }
    }
}

/// The host's state database: a base state plus a registry of forks.
///
/// Every access to an address `A` is routed to:
/// 1. the fork recorded for `A` by [`ForkableState::make_persistent`], if any;
/// 2. otherwise the active fork;
/// 3. otherwise the base state.
#[derive(Debug)]
pub struct ForkableState {
    base: LayerDb,
    forks: HashMap<ForkId, Fork>,
    active: ForkId,
    persistent: HashMap<Address, ForkId>,
    next_id: u64,
}

impl Default for ForkableState {
    fn default() -> Self {
        Self::new()
    }
}

impl ForkableState {
    /// An empty base state without forks.
    pub fn new() -> Self {
        Self {
            base: CacheDB::new(SourceDb::empty()),
            forks: HashMap::new(),
            active: ForkId::BASE,
            persistent: HashMap::new(),
            next_id: 1,
        }
    }

    /// The active fork, [`ForkId::BASE`] if none.
    pub const fn active_fork(&self) -> ForkId {
        self.active
    }

    /// Returns `true` if `id` is the base state or a created fork.
    pub fn fork_exists(&self, id: ForkId) -> bool {
        id.is_base() || self.forks.contains_key(&id)
    }

    /// The source of fork `id`.
    pub fn fork_source(&self, id: ForkId) -> Result<&Arc<dyn ForkSource>, ForkError> {
        self.forks.get(&id).map(|fork| &fork.source).ok_or(ForkError::Missing(id))
    }

    /// Registers a fork over `source` without selecting it.
    pub fn create_fork(&mut self, source: Arc<dyn ForkSource>) -> ForkId {
        let id = ForkId::from(self.next_id);
        self.next_id += 1;
        debug!(fork = %id, source = source.url_or_alias(), "Created fork");
        self.forks.insert(id, Fork::new(source));
        id
    }

    /// Registers a fork over `source` and selects it.
    pub fn create_select_fork(&mut self, source: Arc<dyn ForkSource>) -> ForkId {
        let id = self.create_fork(source);
        self.active = id;
        id
    }

    /// Makes `id` the active fork. [`ForkId::BASE`] selects the base state.
    pub fn select_fork(&mut self, id: ForkId) -> Result<(), ForkError> {
        if !self.fork_exists(id) {
            return Err(ForkError::Missing(id));
        }
        debug!(fork = %id, "Selected fork");
        self.active = id;
        Ok(())
    }

    /// Discards the writes of fork `id` and rebinds it to `source`.
    pub fn reset_fork(&mut self, id: ForkId, source: Arc<dyn ForkSource>) -> Result<(), ForkError> {
        let fork = self.forks.get_mut(&id).ok_or(ForkError::Missing(id))?;
        *fork = Fork::new(source);
        Ok(())
    }

    /// Exports the writes of fork `id` relative to its source, then re-initializes the fork on
    /// the same source.
    pub fn export_diff(&mut self, id: ForkId) -> Result<ExportDiff, ForkError> {
        let fork = self.forks.get_mut(&id).ok_or(ForkError::Missing(id))?;
        let source = fork.source.clone();
        let mut diff = ExportDiff::default();
        for (address, account) in &fork.db.cache.accounts {
            let address = *address;
            let code = source.code(address)?;
            if account.account_state == AccountState::NotExisting {
                let existed = !code.is_empty() ||
                    source.nonce(address)? != 0 ||
                    !source.balance(address)?.is_zero();
                if existed {
                    diff.accounts.insert(address, None);
                }
                continue;
            }

            let mut changes = AccountDiff::default();
            if account.info.nonce != source.nonce(address)? {
                changes.nonce = Some(account.info.nonce);
            }
            if account.info.balance != source.balance(address)? {
                changes.balance = Some(account.info.balance);
            }
            let current = layer_code(&fork.db, account);
            if current != code {
                changes.code_hash = Some(account.info.code_hash);
                if !current.is_empty() {
                    diff.code.insert(account.info.code_hash, current);
                }
            }
            for (slot, value) in &account.storage {
                let key = B256::from(slot.to_be_bytes::<32>());
                let value = B256::from(value.to_be_bytes::<32>());
                if source.storage_at(address, key)? != value {
                    changes.storage.insert(key, (!value.is_zero()).then_some(value));
                }
            }
            if !changes.is_empty() {
                diff.accounts.insert(address, Some(changes));
            }
        }
        fork.db = CacheDB::new(SourceDb::new(source));
        debug!(fork = %id, accounts = diff.accounts.len(), "Exported fork diff");
        Ok(diff)
    }

    /// Commits `changes` to fork `id` regardless of the current routing.
    ///
    /// Used to flush journaled accounts into the fork that served them before a fork switch.
    pub fn commit_to(&mut self, id: ForkId, changes: EvmState) -> Result<(), ForkError> {
        self.layer_mut(id)?.commit(changes);
        Ok(())
    }

    /// Pins `address` to the active fork, or to the base state if none is active.
    pub fn make_persistent(&mut self, address: Address) {
        self.persistent.insert(address, self.active);
    }

    /// Routes `address` through the active fork again.
    pub fn revoke_persistent(&mut self, address: Address) {
        self.persistent.remove(&address);
    }

    /// Returns `true` if `address` is pinned to a fork.
    pub fn is_persistent(&self, address: &Address) -> bool {
        self.persistent.contains_key(address)
    }

    /// The fork that serves `address`.
    pub fn route(&self, address: &Address) -> ForkId {
        self.persistent.get(address).copied().unwrap_or(self.active)
    }

    fn layer(&self, id: ForkId) -> Result<&LayerDb, ForkError> {
        if id.is_base() {
            return Ok(&self.base);
        }
        self.forks.get(&id).map(|fork| &fork.db).ok_or(ForkError::Missing(id))
    }

    fn layer_mut(&mut self, id: ForkId) -> Result<&mut LayerDb, ForkError> {
        if id.is_base() {
            return Ok(&mut self.base);
        }
        self.forks.get_mut(&id).map(|fork| &mut fork.db).ok_or(ForkError::Missing(id))
    }

    fn account_mut(&mut self, address: Address) -> Result<&mut DbAccount, ForkError> {
        let account = self.layer_mut(self.route(&address))?.load_account(address)?;
        if account.account_state == AccountState::NotExisting {
            account.account_state = AccountState::None;
        }
        Ok(account)
    }

    /// The account at `address`, `None` if it does not exist.
    pub fn account_info(&mut self, address: Address) -> Result<Option<AccountInfo>, ForkError> {
        self.basic(address)
    }

    /// Nonce of `address`.
    pub fn nonce(&mut self, address: Address) -> Result<u64, ForkError> {
        Ok(self.basic(address)?.map(|info| info.nonce).unwrap_or_default())
    }

    /// Sets the nonce of `address`.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<(), ForkError> {
        self.account_mut(address)?.info.nonce = nonce;
        Ok(())
    }

    /// Balance of `address`.
    pub fn balance(&mut self, address: Address) -> Result<U256, ForkError> {
        Ok(self.basic(address)?.map(|info| info.balance).unwrap_or_default())
    }

    /// Sets the balance of `address`.
    pub fn set_balance(&mut self, address: Address, balance: U256) -> Result<(), ForkError> {
        self.account_mut(address)?.info.balance = balance;
        Ok(())
    }

    /// Runtime code of `address`.
    pub fn code(&mut self, address: Address) -> Result<Bytes, ForkError> {
        let id = self.route(&address);
        let layer = self.layer_mut(id)?;
        let account = layer.load_account(address)?;
        let account = account.clone();
        Ok(layer_code(self.layer(id)?, &account))
    }

    /// Replaces the runtime code of `address`.
    pub fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), ForkError> {
        let bytecode = if code.is_empty() {
            Bytecode::default()
        } else {
            Bytecode::new_raw_checked(code).map_err(|err| ForkError::Bytecode(err.to_string()))?
        };
        let code_hash = bytecode.hash_slow();
        let layer = self.layer_mut(self.route(&address))?;
        layer.cache.contracts.insert(code_hash, bytecode.clone());
        let account = self.account_mut(address)?;
        account.info.code_hash = code_hash;
        account.info.code = Some(bytecode);
        Ok(())
    }

    /// Storage slot `slot` of `address`.
    pub fn storage(&mut self, address: Address, slot: U256) -> Result<U256, ForkError> {
        Database::storage(self, address, slot)
    }

    /// Writes storage slot `slot` of `address`.
    pub fn set_storage(
        &mut self,
        address: Address,
        slot: U256,
        value: U256,
    ) -> Result<(), ForkError> {
        self.account_mut(address)?.storage.insert(slot, value);
        Ok(())
    }

    /// Clears nonce, balance and code of `address`. Storage is kept.
    pub fn wipe(&mut self, address: Address) -> Result<(), ForkError> {
        let account = self.account_mut(address)?;
        account.info = AccountInfo::default();
        Ok(())
    }

    /// Inserts `account` at `address`, replacing the previous account and its storage.
    pub fn insert_account(
        &mut self,
        address: Address,
        account: &AllocAccount,
    ) -> Result<(), ForkError> {
        let layer = self.layer_mut(self.route(&address))?;
        let bytecode = if account.code.is_empty() {
            Bytecode::default()
        } else {
            Bytecode::new_raw_checked(account.code.clone())
                .map_err(|err| ForkError::Bytecode(err.to_string()))?
        };
        let info =
            AccountInfo::new(account.balance, account.nonce, bytecode.hash_slow(), bytecode);
        layer.insert_account_info(address, info);
        layer.replace_account_storage(
            address,
            account
                .storage
                .iter()
                .map(|(slot, value)| {
                    (U256::from_be_bytes(slot.0), U256::from_be_bytes(value.0))
                })
                .collect(),
        )?;
        Ok(())
    }

    /// Inserts every account of `allocs`.
    pub fn import_allocs(&mut self, allocs: &Allocs) -> Result<(), ForkError> {
        for (address, account) in allocs.iter() {
            self.insert_account(*address, account)?;
        }
        Ok(())
    }

    /// Serializes the accounts held by fork `id` (the base state for [`ForkId::BASE`]).
    ///
    /// Forks only hold the accounts that were touched; empty accounts and zero slots are
    /// skipped.
    pub fn dump(&self, id: ForkId) -> Result<Allocs, ForkError> {
        let layer = self.layer(id)?;
        let mut allocs = Allocs::default();
        for (address, account) in &layer.cache.accounts {
            if account.account_state == AccountState::NotExisting {
                continue;
            }
            let storage = account
                .storage
                .iter()
                .filter(|(_, value)| !value.is_zero())
                .map(|(slot, value)| {
                    (B256::from(slot.to_be_bytes::<32>()), B256::from(value.to_be_bytes::<32>()))
                })
                .collect();
            let dumped = AllocAccount {
                nonce: account.info.nonce,
                balance: account.info.balance,
                code: layer_code(layer, account),
                storage,
            };
            if !dumped.is_empty() {
                allocs.insert(*address, dumped);
            }
        }
        Ok(allocs)
    }
}

fn layer_code(layer: &LayerDb, account: &DbAccount) -> Bytes {
    account
        .info
        .code
        .as_ref()
        .or_else(|| layer.cache.contracts.get(&account.info.code_hash))
        .map(|code| code.original_bytes())
        .unwrap_or_default()
}

impl Database for ForkableState {
    type Error = ForkError;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        let id = self.route(&address);
        self.layer_mut(id)?.basic(address)
    }

    fn code_by_hash(&mut self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        let layers = std::iter::once(&self.base).chain(self.forks.values().map(|fork| &fork.db));
        for layer in layers {
            if let Some(code) = layer.cache.contracts.get(&code_hash) {
                return Ok(code.clone());
            }
        }
        Err(ForkError::CodeNotFound(code_hash))
    }

    fn storage(
        &mut self,
        address: Address,
        index: StorageKey,
    ) -> Result<StorageValue, Self::Error> {
        let id = self.route(&address);
        self.layer_mut(id)?.storage(address, index)
    }

    fn block_hash(&mut self, number: u64) -> Result<B256, Self::Error> {
        Ok(script_block_hash(number))
    }
}

impl DatabaseCommit for ForkableState {
    fn commit(&mut self, changes: revm::primitives::HashMap<Address, Account>) {
        let mut routed: HashMap<ForkId, EvmState> = HashMap::new();
        for (address, account) in changes {
            routed.entry(self.route(&address)).or_default().insert(address, account);
        }
        for (id, changes) in routed {
            match self.forks.get_mut(&id) {
                Some(fork) => fork.db.commit(changes),
                None => {
                    if !id.is_base() {
                        warn!(fork = %id, "Committing changes of missing fork to base state");
                    }
                    self.base.commit(changes)
                }
            }
        }
    }
}
