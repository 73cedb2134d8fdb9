//! Fork management cheat codes.
//!
//! Switching forks changes which state an address is routed to while accounts are still loaded
//! in the journal. Affected journaled accounts are flushed into the fork that served them and
//! reloaded from their new route in place, so reverting the journal afterwards stays valid.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolValue;
use revm::{
    state::{Account, AccountInfo, AccountStatus, EvmState},
    Database,
};
use tracing::{debug, info};

use super::{cheat_err, Cheatcode, CheatsCtxt, Vm::*};
use crate::{
    forking::{ForkBlock, ForkId, ForkSource, ForkableState},
    Result, ScriptInspector, CONSOLE_ADDR, VM_ADDR,
};

/// Reloads `account` from `db`. Accounts and slots are updated, never dropped.
fn refresh_account(db: &mut ForkableState, address: Address, account: &mut Account) -> Result<()> {
    match db.basic(address)? {
        Some(mut info) => {
            if info.code.is_none() && !info.is_empty_code_hash() {
                info.code = Some(db.code_by_hash(info.code_hash)?);
            }
            account.info = info;
            account.status.remove(AccountStatus::LoadedAsNotExisting);
        }
        None => {
            account.info = AccountInfo::default();
            account.status.insert(AccountStatus::LoadedAsNotExisting);
        }
    }
    for (slot, value) in account.storage.iter_mut() {
        let present = db.storage(address, *slot)?;
        value.original_value = present;
        value.present_value = present;
    }
    Ok(())
}

/// Runs `switch` on the state and reconciles the journal with the new routing.
///
/// Accounts routed to `reset` are reloaded without flushing their changes.
fn switch_forks(
    ccx: &mut CheatsCtxt<'_>,
    reset: Option<ForkId>,
    switch: impl FnOnce(&mut ForkableState) -> Result<()>,
) -> Result<()> {
    let journal = &mut ccx.ecx.journaled_state;
    let routes: Vec<(Address, ForkId)> = journal
        .inner
        .state
        .keys()
        .map(|address| (*address, journal.database.route(address)))
        .collect();

    switch(&mut journal.database)?;

    for (address, old) in routes {
        let new = journal.database.route(&address);
        if old == new && reset != Some(new) {
            continue;
        }
        let Some(account) = journal.inner.state.get_mut(&address) else { continue };
        if old != new && account.is_touched() {
            debug!(%address, from = %old, to = %new, "Flushing journaled account");
            let changes = EvmState::from_iter([(address, account.clone())]);
            journal.database.commit_to(old, changes)?;
        }
        refresh_account(&mut journal.database, address, account)?;
    }
    Ok(())
}

fn open_source(
    state: &ScriptInspector,
    url_or_alias: &str,
    block: ForkBlock,
) -> Result<Arc<dyn ForkSource>> {
    let factory = state
        .fork_factory
        .as_ref()
        .ok_or_else(|| cheat_err!("no fork source factory configured"))?;
    Ok(factory.fork_source(url_or_alias, block)?)
}

/// Keeps the accounts a script needs across forks on the state they were created on.
fn persist_script_accounts(ccx: &mut CheatsCtxt<'_>) {
    let origin = ccx.ecx.tx.caller;
    let db = &mut ccx.ecx.journaled_state.database;
    for address in [VM_ADDR, CONSOLE_ADDR, ccx.caller, origin] {
        if !db.is_persistent(&address) {
            db.make_persistent(address);
        }
    }
}

fn create_fork(
    ccx: &mut CheatsCtxt<'_>,
    url_or_alias: &str,
    block: ForkBlock,
    select: bool,
) -> Result<Vec<u8>> {
    let source = open_source(ccx.state, url_or_alias, block)?;
    persist_script_accounts(ccx);
    let id = if select {
        let mut id = ForkId::BASE;
        switch_forks(ccx, None, |db| {
            id = db.create_select_fork(source);
            Ok(())
        })?;
        id
    } else {
        ccx.ecx.journaled_state.database.create_fork(source)
    };
    info!(fork = %id, url_or_alias, ?block, select, "Created fork");
    Ok(id.0.abi_encode())
}

fn block_number(number: U256) -> Result<u64> {
    number.try_into().map_err(|_| cheat_err!("block number {number} does not fit into 64 bits"))
}

impl Cheatcode for createFork_0Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        create_fork(ccx, &self.urlOrAlias, ForkBlock::Latest, false)
    }
}

impl Cheatcode for createFork_1Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        let block = ForkBlock::Number(block_number(self.blockNumber)?);
        create_fork(ccx, &self.urlOrAlias, block, false)
    }
}

impl Cheatcode for createFork_2Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        create_fork(ccx, &self.urlOrAlias, ForkBlock::Transaction(self.txHash), false)
    }
}

impl Cheatcode for createSelectFork_0Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        create_fork(ccx, &self.urlOrAlias, ForkBlock::Latest, true)
    }
}

impl Cheatcode for createSelectFork_1Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        let block = ForkBlock::Number(block_number(self.blockNumber)?);
        create_fork(ccx, &self.urlOrAlias, block, true)
    }
}

impl Cheatcode for createSelectFork_2Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        create_fork(ccx, &self.urlOrAlias, ForkBlock::Transaction(self.txHash), true)
    }
}

impl Cheatcode for selectForkCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        let id = ForkId::from(self.forkId);
        switch_forks(ccx, None, |db| Ok(db.select_fork(id)?))?;
        Ok(Vec::new())
    }
}

fn roll_fork(ccx: &mut CheatsCtxt<'_>, id: ForkId, number: U256) -> Result<Vec<u8>> {
    let block = ForkBlock::Number(block_number(number)?);
    let url_or_alias =
        ccx.ecx.journaled_state.database.fork_source(id)?.url_or_alias().to_string();
    let source = open_source(ccx.state, &url_or_alias, block)?;
    info!(fork = %id, %number, "Rolling fork");
    switch_forks(ccx, Some(id), |db| Ok(db.reset_fork(id, source)?))?;
    Ok(Vec::new())
}

impl Cheatcode for rollFork_0Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        let id = ccx.ecx.journaled_state.database.active_fork();
        if id.is_base() {
            return Err(cheat_err!("no active fork"));
        }
        roll_fork(ccx, id, self.blockNumber)
    }
}

impl Cheatcode for rollFork_1Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        roll_fork(ccx, ForkId::from(self.forkId), self.blockNumber)
    }
}

impl Cheatcode for activeForkCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        let id = ccx.ecx.journaled_state.database.active_fork();
        if id.is_base() {
            return Err(cheat_err!("no active fork"));
        }
        Ok(id.0.abi_encode())
    }
}

fn make_persistent(ccx: &mut CheatsCtxt<'_>, accounts: &[Address]) -> Result<Vec<u8>> {
    switch_forks(ccx, None, |db| {
        for account in accounts {
            db.make_persistent(*account);
        }
        Ok(())
    })?;
    Ok(Vec::new())
}

impl Cheatcode for makePersistent_0Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        make_persistent(ccx, &[self.account])
    }
}

impl Cheatcode for makePersistent_1Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        make_persistent(ccx, &[self.account0, self.account1])
    }
}

impl Cheatcode for makePersistent_2Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        make_persistent(ccx, &[self.account0, self.account1, self.account2])
    }
}

impl Cheatcode for makePersistent_3Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        make_persistent(ccx, &self.accounts)
    }
}

fn revoke_persistent(ccx: &mut CheatsCtxt<'_>, accounts: &[Address]) -> Result<Vec<u8>> {
    switch_forks(ccx, None, |db| {
        for account in accounts {
            db.revoke_persistent(*account);
        }
        Ok(())
    })?;
    Ok(Vec::new())
}

impl Cheatcode for revokePersistent_0Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        revoke_persistent(ccx, &[self.account])
    }
}

impl Cheatcode for revokePersistent_1Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        revoke_persistent(ccx, &self.accounts)
    }
}

impl Cheatcode for isPersistentCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        Ok(ccx.ecx.journaled_state.database.is_persistent(&self.account).abi_encode())
    }
}

impl Cheatcode for allowCheatcodesCall {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        debug!(account = %self.account, "Granting cheatcode access");
        state.cheat_access.insert(self.account);
        Ok(Vec::new())
    }
}
