//! Block environment and account state cheat codes.

use alloy_primitives::{Address, B256};
use alloy_sol_types::SolValue;
use revm::{bytecode::Bytecode, context::JournalTr, state::Account};
use tracing::{debug, warn};

use super::{cheat_err, Cheatcode, CheatsCtxt, Vm::*};
use crate::Result;

/// Loads `address` into the journal and marks it touched, so changes get committed.
fn journaled_account<'a>(
    ccx: &'a mut CheatsCtxt<'_>,
    address: Address,
) -> Result<&'a mut Account> {
    let account = ccx.ecx.journaled_state.load_account(address)?.data;
    account.mark_touch();
    Ok(account)
}

impl Cheatcode for warpCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        ccx.ecx.block.timestamp = self.newTimestamp;
        Ok(Vec::new())
    }
}

impl Cheatcode for rollCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        ccx.ecx.block.number = self.newHeight;
        Ok(Vec::new())
    }
}

impl Cheatcode for feeCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        ccx.ecx.block.basefee = self
            .newBasefee
            .try_into()
            .map_err(|_| cheat_err!("base fee {} does not fit into 64 bits", self.newBasefee))?;
        Ok(Vec::new())
    }
}

impl Cheatcode for coinbaseCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        ccx.ecx.block.beneficiary = self.newCoinbase;
        Ok(Vec::new())
    }
}

impl Cheatcode for prevrandao_0Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        ccx.ecx.block.prevrandao = Some(self.newPrevrandao);
        Ok(Vec::new())
    }
}

impl Cheatcode for prevrandao_1Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        ccx.ecx.block.prevrandao = Some(B256::from(self.newPrevrandao));
        Ok(Vec::new())
    }
}

impl Cheatcode for chainIdCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        let chain_id: u64 = self
            .newChainId
            .try_into()
            .map_err(|_| cheat_err!("chain ID {} does not fit into 64 bits", self.newChainId))?;
        ccx.ecx.cfg.chain_id = chain_id;
        ccx.ecx.tx.chain_id = Some(chain_id);
        Ok(Vec::new())
    }
}

impl Cheatcode for getBlockNumberCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        Ok(ccx.ecx.block.number.abi_encode())
    }
}

impl Cheatcode for getBlockTimestampCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        Ok(ccx.ecx.block.timestamp.abi_encode())
    }
}

impl Cheatcode for storeCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        let Self { target, slot, value } = self;
        journaled_account(ccx, *target)?;
        ccx.ecx.journaled_state.sstore(*target, (*slot).into(), (*value).into())?;
        Ok(Vec::new())
    }
}

impl Cheatcode for loadCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        let Self { target, slot } = self;
        ccx.ecx.journaled_state.load_account(*target)?;
        let value = ccx.ecx.journaled_state.sload(*target, (*slot).into())?.data;
        Ok(B256::from(value).abi_encode())
    }
}

impl Cheatcode for etchCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        let Self { target, newRuntimeBytecode } = self;
        journaled_account(ccx, *target)?;
        ccx.ecx
            .journaled_state
            .set_code(*target, Bytecode::new_raw(newRuntimeBytecode.clone()));
        if !newRuntimeBytecode.is_empty() {
            debug!(%target, "Granting cheatcode access to etched contract");
            ccx.state.cheat_access.insert(*target);
        }
        Ok(Vec::new())
    }
}

impl Cheatcode for dealCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        journaled_account(ccx, self.account)?.info.balance = self.newBalance;
        Ok(Vec::new())
    }
}

impl Cheatcode for setNonceCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        journaled_account(ccx, self.account)?.info.nonce = self.newNonce;
        Ok(Vec::new())
    }
}

impl Cheatcode for setNonceUnsafeCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        journaled_account(ccx, self.account)?.info.nonce = self.newNonce;
        Ok(Vec::new())
    }
}

impl Cheatcode for getNonceCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        let nonce = ccx.ecx.journaled_state.load_account(self.account)?.data.info.nonce;
        Ok(nonce.abi_encode())
    }
}

impl Cheatcode for resetNonceCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        ccx.ecx.journaled_state.load_account_code(self.account)?;
        let account = journaled_account(ccx, self.account)?;
        // Contracts start at nonce 1 since EIP-161.
        account.info.nonce = u64::from(!account.info.is_empty_code_hash());
        Ok(Vec::new())
    }
}

impl Cheatcode for dumpStateCall {
    fn apply(&self, _state: &mut crate::ScriptInspector) -> Result<Vec<u8>> {
        warn!(path = %self.pathToStateJson, "dumpState is not supported, skipping");
        Ok(Vec::new())
    }
}
